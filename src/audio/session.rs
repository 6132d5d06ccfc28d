use crate::audio::{AudioBackend, AudioError, CpalBackend, StreamInfo, StreamState};
use crate::synth::config::AudioConfig;
use crate::synth::mixer::ToneMixer;
use crate::synth::tone::{validate_frequency, ToneCommand, ToneError};
use crossbeam_channel::{Sender, TrySendError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The one façade the rest of the application talks to.
///
/// Owns the stream lifecycle and the control-side view of the active tone
/// set. Tone membership changes travel to the render callback over the
/// mixer's bounded queue; the session keeps a shadow set of requested
/// frequencies so repeated requests and releases collapse to a single
/// pending state per frequency.
pub struct AudioSession<B: AudioBackend = CpalBackend> {
    backend: B,
    config: AudioConfig,
    state: StreamState,
    commands: Option<Sender<ToneCommand>>,
    requested: HashSet<u32>,
    fault: Arc<AtomicBool>,
}

impl AudioSession<CpalBackend> {
    pub fn new(config: AudioConfig) -> Self {
        Self::with_backend(CpalBackend::new(), config)
    }
}

impl<B: AudioBackend> AudioSession<B> {
    pub fn with_backend(backend: B, config: AudioConfig) -> Self {
        Self {
            backend,
            config,
            state: StreamState::Closed,
            commands: None,
            requested: HashSet::new(),
            fault: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Open the output stream. A fresh mixer is built per open, so a
    /// session can be reopened after `close`.
    pub fn open(&mut self) -> Result<StreamInfo, AudioError> {
        let next = self.state.open()?;

        let mixer = ToneMixer::new(&self.config);
        let sender = mixer.get_command_sender();
        self.fault = Arc::new(AtomicBool::new(false));

        let info = self.backend.open(&self.config, mixer, self.fault.clone())?;

        self.commands = Some(sender);
        self.state = next;
        Ok(info)
    }

    pub fn start(&mut self) -> Result<(), AudioError> {
        let next = self.state.start()?;
        self.backend.start()?;
        self.state = next;
        log::debug!("output stream started");
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), AudioError> {
        let next = self.state.stop()?;
        if self.state == StreamState::Started {
            self.backend.stop()?;
            log::debug!("output stream stopped");
        }
        self.state = next;
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), AudioError> {
        let next = self.state.close()?;
        if self.state != StreamState::Closed {
            self.backend.close()?;
            self.commands = None;
            self.requested.clear();
            log::debug!("output stream closed");
        }
        self.state = next;
        Ok(())
    }

    /// Ask for a tone at `freq` Hz. Repeating a request for a frequency
    /// that is already sounding does nothing. Without an open stream the
    /// request is logged and dropped so the caller can keep running
    /// without audio.
    pub fn request_tone(&mut self, freq: f32) -> Result<(), ToneError> {
        let freq = validate_frequency(freq, self.config.nyquist_hz())?;

        let Some(commands) = &self.commands else {
            log::warn!("tone request at {} Hz ignored: no open stream", freq);
            return Ok(());
        };

        let key = freq.to_bits();
        if self.requested.contains(&key) {
            return Ok(());
        }
        if self.requested.len() >= self.config.max_tones {
            log::warn!("tone request at {} Hz ignored: tone limit reached", freq);
            return Ok(());
        }

        match commands.try_send(ToneCommand::Start(freq)) {
            Ok(()) => {
                self.requested.insert(key);
                log::debug!("tone start queued at {} Hz", freq);
            }
            Err(TrySendError::Full(_)) => {
                log::warn!("tone request at {} Hz dropped: command queue full", freq);
            }
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("tone request at {} Hz dropped: stream is gone", freq);
            }
        }
        Ok(())
    }

    /// Release a tone. Releasing a frequency that was never requested is a
    /// no-op.
    pub fn release_tone(&mut self, freq: f32) -> Result<(), ToneError> {
        let freq = validate_frequency(freq, self.config.nyquist_hz())?;

        let Some(commands) = &self.commands else {
            return Ok(());
        };

        let key = freq.to_bits();
        if !self.requested.contains(&key) {
            return Ok(());
        }

        match commands.try_send(ToneCommand::Stop(freq)) {
            Ok(()) => {
                self.requested.remove(&key);
                log::debug!("tone stop queued at {} Hz", freq);
            }
            Err(TrySendError::Full(_)) => {
                log::warn!("tone release at {} Hz dropped: command queue full", freq);
            }
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("tone release at {} Hz dropped: stream is gone", freq);
            }
        }
        Ok(())
    }

    /// Heartbeat tone for the idle screen: one wavetable entry per frame.
    pub fn start_test_tone(&mut self) -> Result<(), ToneError> {
        self.request_tone(self.config.test_tone_hz())
    }

    pub fn stop_test_tone(&mut self) -> Result<(), ToneError> {
        self.release_tone(self.config.test_tone_hz())
    }

    /// True while any tone has been requested and not yet released.
    pub fn is_sounding(&self) -> bool {
        !self.requested.is_empty()
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Reports and clears a render-callback fault. The stream keeps running
    /// silently after a fault; it is up to the caller to close and reopen.
    pub fn take_fault(&self) -> Option<AudioError> {
        self.fault
            .swap(false, Ordering::Relaxed)
            .then_some(AudioError::CallbackFault)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MockBackend {
        mixer: Option<ToneMixer>,
        fail_open: bool,
        open_calls: usize,
        start_calls: usize,
        stop_calls: usize,
        close_calls: usize,
    }

    impl AudioBackend for MockBackend {
        fn open(
            &mut self,
            config: &AudioConfig,
            mixer: ToneMixer,
            _fault: Arc<AtomicBool>,
        ) -> Result<StreamInfo, AudioError> {
            self.open_calls += 1;
            if self.fail_open {
                return Err(AudioError::DeviceUnavailable);
            }
            self.mixer = Some(mixer);
            Ok(StreamInfo {
                device_name: String::from("mock"),
                sample_rate: config.sample_rate,
                channels: 2,
                buffer_frames: Some(config.frames_per_buffer),
            })
        }

        fn start(&mut self) -> Result<(), AudioError> {
            self.start_calls += 1;
            Ok(())
        }

        fn stop(&mut self) -> Result<(), AudioError> {
            self.stop_calls += 1;
            Ok(())
        }

        fn close(&mut self) -> Result<(), AudioError> {
            self.close_calls += 1;
            self.mixer = None;
            Ok(())
        }
    }

    fn session() -> AudioSession<MockBackend> {
        AudioSession::with_backend(MockBackend::default(), AudioConfig::default())
    }

    /// Drive the mock's mixer the way a callback would.
    fn render(session: &mut AudioSession<MockBackend>, frames: usize) -> Vec<f32> {
        let mixer = session.backend.mixer.as_mut().expect("no open mixer");
        let mut buffer = vec![0.0; frames];
        mixer.render(&mut buffer, 1);
        buffer
    }

    fn active_tones(session: &AudioSession<MockBackend>) -> usize {
        session.backend.mixer.as_ref().expect("no open mixer").active_tones()
    }

    #[test]
    fn lifecycle_happy_path() {
        let mut session = session();
        let info = session.open().unwrap();
        assert_eq!(info.device_name, "mock");
        assert_eq!(info.buffer_frames, Some(64));
        assert_eq!(session.state(), StreamState::Opened);
        session.start().unwrap();
        assert_eq!(session.state(), StreamState::Started);
        session.stop().unwrap();
        assert_eq!(session.state(), StreamState::Stopped);
        session.close().unwrap();
        assert_eq!(session.state(), StreamState::Closed);

        assert_eq!(session.backend.open_calls, 1);
        assert_eq!(session.backend.start_calls, 1);
        assert_eq!(session.backend.stop_calls, 1);
        assert_eq!(session.backend.close_calls, 1);
    }

    #[test]
    fn start_without_open_is_invalid() {
        let mut session = session();
        assert!(matches!(
            session.start(),
            Err(AudioError::InvalidState { op: "start", .. })
        ));
        assert_eq!(session.backend.start_calls, 0);
    }

    #[test]
    fn open_then_close_never_starts_the_stream() {
        let mut session = session();
        session.open().unwrap();
        session.close().unwrap();
        assert_eq!(session.backend.start_calls, 0);
        assert!(session.backend.mixer.is_none());
    }

    #[test]
    fn repeated_stop_reaches_the_backend_once() {
        let mut session = session();
        session.open().unwrap();
        session.start().unwrap();
        session.stop().unwrap();
        session.stop().unwrap();
        assert_eq!(session.backend.stop_calls, 1);
    }

    #[test]
    fn close_while_started_is_refused() {
        let mut session = session();
        session.open().unwrap();
        session.start().unwrap();
        assert!(matches!(
            session.close(),
            Err(AudioError::InvalidState { op: "close", .. })
        ));
        assert_eq!(session.state(), StreamState::Started);
        assert_eq!(session.backend.close_calls, 0);
    }

    #[test]
    fn open_failure_leaves_the_session_closed() {
        let mut session = AudioSession::with_backend(
            MockBackend {
                fail_open: true,
                ..MockBackend::default()
            },
            AudioConfig::default(),
        );
        assert!(matches!(session.open(), Err(AudioError::DeviceUnavailable)));
        assert_eq!(session.state(), StreamState::Closed);
        assert!(matches!(
            session.start(),
            Err(AudioError::InvalidState { .. })
        ));
    }

    #[test]
    fn session_reopens_after_close() {
        let mut session = session();
        session.open().unwrap();
        session.request_tone(440.0).unwrap();
        session.close().unwrap();
        assert!(!session.is_sounding());

        session.open().unwrap();
        assert_eq!(session.state(), StreamState::Opened);
        render(&mut session, 16);
        assert_eq!(active_tones(&session), 0, "reopen starts from silence");
    }

    #[test]
    fn request_release_round_trip_is_silent() {
        let mut session = session();
        session.open().unwrap();
        session.start().unwrap();

        session.request_tone(261.63).unwrap();
        let output = render(&mut session, 64);
        assert_eq!(active_tones(&session), 1);
        assert!(output.iter().any(|s| s.abs() > 0.01), "tone should sound");

        session.release_tone(261.63).unwrap();
        let output = render(&mut session, 64);
        assert_eq!(active_tones(&session), 0);
        assert!(
            output.iter().all(|&s| s == 0.0),
            "silence within one buffer of release"
        );
        assert!(!session.is_sounding());
    }

    #[test]
    fn double_request_collapses_to_one_tone() {
        let mut session = session();
        session.open().unwrap();
        session.request_tone(440.0).unwrap();
        session.request_tone(440.0).unwrap();
        render(&mut session, 16);
        assert_eq!(active_tones(&session), 1);
        assert_eq!(session.requested.len(), 1);
    }

    #[test]
    fn release_without_request_is_a_noop() {
        let mut session = session();
        session.open().unwrap();
        session.request_tone(440.0).unwrap();
        session.release_tone(880.0).unwrap();
        render(&mut session, 16);
        assert_eq!(active_tones(&session), 1);
    }

    #[test]
    fn invalid_frequencies_are_rejected() {
        let mut session = session();
        session.open().unwrap();
        assert!(session.request_tone(-1.0).is_err());
        assert!(session.request_tone(f32::NAN).is_err());
        assert!(session.request_tone(30000.0).is_err());
        assert!(!session.is_sounding());
    }

    #[test]
    fn requests_without_an_open_stream_are_dropped() {
        let mut session = session();
        session.request_tone(440.0).unwrap();
        assert!(!session.is_sounding());
    }

    #[test]
    fn tone_limit_applies_to_requests() {
        let config = AudioConfig {
            max_tones: 2,
            ..AudioConfig::default()
        };
        let mut session = AudioSession::with_backend(MockBackend::default(), config);
        session.open().unwrap();
        session.request_tone(261.63).unwrap();
        session.request_tone(329.63).unwrap();
        session.request_tone(392.0).unwrap();
        assert_eq!(session.requested.len(), 2);
    }

    #[test]
    fn test_tone_round_trip() {
        let mut session = session();
        session.open().unwrap();
        assert!((session.config().test_tone_hz() - 220.5).abs() < 1e-3);

        session.start_test_tone().unwrap();
        assert!(session.is_sounding());

        let output = render(&mut session, 64);
        assert!(output.iter().any(|s| s.abs() > 0.01));

        session.stop_test_tone().unwrap();
        let output = render(&mut session, 64);
        assert!(output.iter().all(|&s| s == 0.0));
        assert!(!session.is_sounding());
    }

    #[test]
    fn callback_fault_is_taken_once() {
        let mut session = session();
        session.open().unwrap();
        assert!(session.take_fault().is_none());

        session.fault.store(true, Ordering::Relaxed);
        assert!(matches!(
            session.take_fault(),
            Some(AudioError::CallbackFault)
        ));
        assert!(session.take_fault().is_none());
    }
}
