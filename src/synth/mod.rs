pub mod config;
pub mod mixer;
pub mod tone;
pub mod wavetable;
