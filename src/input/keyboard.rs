use crate::audio::{AudioBackend, AudioSession};
use device_query::{DeviceQuery, DeviceState, Keycode};
use std::collections::HashMap;

/// Piano keys on the letter row, one table entry per key.
pub const KEY_FREQUENCIES: [(Keycode, f32); 7] = [
    (Keycode::C, 261.63), // C4
    (Keycode::D, 293.66), // D4
    (Keycode::E, 329.63), // E4
    (Keycode::F, 349.23), // F4
    (Keycode::G, 392.00), // G4
    (Keycode::A, 440.00), // A4
    (Keycode::B, 493.88), // B4
];

/// Polls the keyboard each frame and turns press/release edges into tone
/// requests and releases.
pub struct KeyboardHandler {
    device_state: DeviceState,
    key_states: HashMap<Keycode, bool>,
}

impl KeyboardHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Poll once and forward any edges to the session. Returns false when
    /// the user asked to quit.
    pub fn update<B: AudioBackend>(&mut self, session: &mut AudioSession<B>) -> bool {
        let keys: Vec<Keycode> = self.device_state.get_keys();

        for (key, freq) in KEY_FREQUENCIES.iter() {
            let is_pressed = keys.contains(key);
            let was_pressed = self.key_states.get(key).copied().unwrap_or(false);

            if is_pressed != was_pressed {
                if is_pressed {
                    log::debug!("key {:?} pressed: requesting {} Hz", key, freq);
                    if let Err(e) = session.request_tone(*freq) {
                        log::warn!("tone request refused: {}", e);
                    }
                } else {
                    log::debug!("key {:?} released: releasing {} Hz", key, freq);
                    if let Err(e) = session.release_tone(*freq) {
                        log::warn!("tone release refused: {}", e);
                    }
                }
                self.key_states.insert(*key, is_pressed);
            }
        }

        // S ends the start-screen heartbeat.
        let s_pressed = keys.contains(&Keycode::S);
        let s_was_pressed = self.key_states.get(&Keycode::S).copied().unwrap_or(false);
        if s_pressed && !s_was_pressed {
            log::debug!("key S pressed: stopping the heartbeat tone");
            if let Err(e) = session.stop_test_tone() {
                log::warn!("heartbeat stop refused: {}", e);
            }
        }
        self.key_states.insert(Keycode::S, s_pressed);

        !keys.contains(&Keycode::Escape)
    }
}

impl Default for KeyboardHandler {
    fn default() -> Self {
        let device_state = DeviceState::new();

        // Initialize all keys as not pressed
        let mut key_states: HashMap<Keycode, bool> = HashMap::new();
        for (key, _) in KEY_FREQUENCIES.iter() {
            key_states.insert(*key, false);
        }
        key_states.insert(Keycode::S, false);

        Self {
            device_state,
            key_states,
        }
    }
}
