use std::fmt;

/// Membership change sent from the control thread to the render callback.
///
/// Frequencies are validated before a command is queued, so the callback
/// applies these without further checks.
#[derive(Debug, Clone, Copy)]
pub enum ToneCommand {
    Start(f32),
    Stop(f32),
}

/// A tone as the render callback tracks it: the requested frequency plus a
/// phase accumulator walking the shared wavetable.
#[derive(Debug, Clone, Copy)]
pub struct ActiveTone {
    pub freq: f32,
    pub phase: f32,
    pub step: f32,
}

impl ActiveTone {
    pub fn new(freq: f32, step: f32) -> Self {
        Self {
            freq,
            phase: 0.0,
            step,
        }
    }
}

/// Checks a requested frequency before it is allowed anywhere near the
/// audio thread.
pub fn validate_frequency(freq: f32, nyquist: f32) -> Result<f32, ToneError> {
    if !freq.is_finite() {
        return Err(ToneError::NonFinite(freq));
    }

    if freq <= 0.0 || freq >= nyquist {
        return Err(ToneError::OutOfRange { freq, nyquist });
    }

    Ok(freq)
}

#[derive(Debug)]
pub enum ToneError {
    NonFinite(f32),
    OutOfRange { freq: f32, nyquist: f32 },
}

impl fmt::Display for ToneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToneError::NonFinite(freq) => {
                write!(f, "Invalid tone frequency: {}. Must be finite.", freq)
            }
            ToneError::OutOfRange { freq, nyquist } => {
                write!(
                    f,
                    "Invalid tone frequency: {} Hz. Must be above 0 and below {} Hz.",
                    freq, nyquist
                )
            }
        }
    }
}

impl std::error::Error for ToneError {}
