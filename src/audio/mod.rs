mod cpal_backend;
mod session;

pub use self::cpal_backend::CpalBackend;
pub use self::session::AudioSession;

use crate::synth::config::AudioConfig;
use crate::synth::mixer::ToneMixer;
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// A device-facing output stream.
///
/// Implementations only manage the stream itself. Lifecycle ordering is
/// enforced by [`AudioSession`], so `start`/`stop`/`close` may assume a
/// successful `open` happened first.
pub trait AudioBackend {
    /// Open a stereo output stream and hand the mixer to its render
    /// callback. `fault` is latched by the callback if rendering ever
    /// panics; no audio is produced until `start`.
    fn open(
        &mut self,
        config: &AudioConfig,
        mixer: ToneMixer,
        fault: Arc<AtomicBool>,
    ) -> Result<StreamInfo, AudioError>;

    fn start(&mut self) -> Result<(), AudioError>;

    fn stop(&mut self) -> Result<(), AudioError>;

    fn close(&mut self) -> Result<(), AudioError>;
}

/// What the backend actually negotiated with the device.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub device_name: String,
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames per callback, when the host commits to one.
    pub buffer_frames: Option<u32>,
}

/// Lifecycle of the output stream: `Closed → Opened → Started ⇄ Stopped →
/// Closed`. The transition methods are pure; [`AudioSession`] consults them
/// before touching the backend so an out-of-order call never reaches the
/// device layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Closed,
    Opened,
    Started,
    Stopped,
}

impl StreamState {
    pub fn open(self) -> Result<StreamState, AudioError> {
        match self {
            StreamState::Closed => Ok(StreamState::Opened),
            state => Err(AudioError::InvalidState { op: "open", state }),
        }
    }

    pub fn start(self) -> Result<StreamState, AudioError> {
        match self {
            StreamState::Opened | StreamState::Stopped => Ok(StreamState::Started),
            state => Err(AudioError::InvalidState { op: "start", state }),
        }
    }

    /// Stopping an already stopped or never-started stream is a no-op, not
    /// an error. Only a closed stream refuses.
    pub fn stop(self) -> Result<StreamState, AudioError> {
        match self {
            StreamState::Started | StreamState::Stopped => Ok(StreamState::Stopped),
            StreamState::Opened => Ok(StreamState::Opened),
            state => Err(AudioError::InvalidState { op: "stop", state }),
        }
    }

    /// A running stream must be stopped before it is closed. Closing twice
    /// is accepted.
    pub fn close(self) -> Result<StreamState, AudioError> {
        match self {
            StreamState::Opened | StreamState::Stopped | StreamState::Closed => {
                Ok(StreamState::Closed)
            }
            state => Err(AudioError::InvalidState { op: "close", state }),
        }
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamState::Closed => "closed",
            StreamState::Opened => "opened",
            StreamState::Started => "started",
            StreamState::Stopped => "stopped",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug)]
pub enum AudioError {
    /// No output device, or the requested device index does not exist.
    DeviceUnavailable,
    /// The host rejected the stream or its configuration.
    StreamOpenFailed(String),
    /// An operation arrived out of lifecycle order.
    InvalidState {
        op: &'static str,
        state: StreamState,
    },
    /// The render callback panicked. Never returned from lifecycle calls;
    /// logged after the fact once the control thread notices the latch.
    CallbackFault,
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioError::DeviceUnavailable => {
                write!(f, "No usable audio output device found.")
            }
            AudioError::StreamOpenFailed(reason) => {
                write!(f, "Audio backend rejected the output stream: {}", reason)
            }
            AudioError::InvalidState { op, state } => {
                write!(f, "Cannot {} an audio stream that is {}.", op, state)
            }
            AudioError::CallbackFault => {
                write!(f, "Audio render callback faulted; output degraded to silence.")
            }
        }
    }
}

impl std::error::Error for AudioError {}
