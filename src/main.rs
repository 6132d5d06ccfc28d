use keysynth::audio::{AudioError, AudioSession, StreamState};
use keysynth::input::KeyboardHandler;
use keysynth::synth::config::AudioConfig;
use std::thread;
use std::time::Duration;

fn open_audio(session: &mut AudioSession) -> Result<(), AudioError> {
    let info = session.open()?;
    match info.buffer_frames {
        Some(frames) => log::info!(
            "output stream on {} at {} Hz ({} channels, {} frames per buffer)",
            info.device_name,
            info.sample_rate,
            info.channels,
            frames
        ),
        None => log::info!(
            "output stream on {} at {} Hz ({} channels, host-chosen buffer size)",
            info.device_name,
            info.sample_rate,
            info.channels
        ),
    }
    session.start()
}

fn main() {
    env_logger::init();

    let mut session = AudioSession::new(AudioConfig::default());

    // Missing audio hardware is not fatal; the loop still runs, silently.
    let audio_ready = match open_audio(&mut session) {
        Ok(()) => true,
        Err(err) => {
            log::warn!("continuing without sound: {}", err);
            false
        }
    };

    if audio_ready {
        log::info!("heartbeat tone at {} Hz", session.config().test_tone_hz());
        if let Err(err) = session.start_test_tone() {
            log::warn!("heartbeat refused: {}", err);
        }
    }

    let mut keyboard = KeyboardHandler::new();
    log::info!("press C D E F G A B to play, S to stop the heartbeat, Escape to quit");

    // Main loop for keyboard handling
    loop {
        if !keyboard.update(&mut session) {
            break;
        }

        if let Some(fault) = session.take_fault() {
            log::error!("{}", fault);
        }

        thread::sleep(Duration::from_millis(10));
    }

    if session.state() != StreamState::Closed {
        if let Err(err) = session.stop() {
            log::warn!("stop failed during shutdown: {}", err);
        }
        if let Err(err) = session.close() {
            log::warn!("close failed during shutdown: {}", err);
        }
        log::info!("audio session closed");
    }
}
