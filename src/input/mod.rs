mod keyboard;

pub use self::keyboard::{KeyboardHandler, KEY_FREQUENCIES};
