use super::config::AudioConfig;
use super::tone::{ActiveTone, ToneCommand};
use super::wavetable::Wavetable;
use crossbeam_channel::{bounded, Receiver, Sender};

/// Commands queued while a buffer is in flight; drained at the top of the
/// next render call.
const COMMAND_QUEUE_CAPACITY: usize = 256;

/// The render-side mixer that owns every active tone and the shared
/// wavetable.
///
/// Once handed to an output stream it lives on the audio thread. Render never
/// allocates, locks or logs: tone membership arrives through a bounded
/// channel, phase state stays in a pre-sized `Vec`, and each output frame is
/// the plain sum of the per-tone lookups.
pub struct ToneMixer {
    table: Wavetable,
    tones: Vec<ActiveTone>,
    amplitude: f32,
    sample_rate: f32,
    max_tones: usize,
    command_receiver: Receiver<ToneCommand>,
    command_sender: Sender<ToneCommand>,
}

impl ToneMixer {
    pub fn new(config: &AudioConfig) -> Self {
        let (command_tx, command_rx) = bounded(COMMAND_QUEUE_CAPACITY);

        Self {
            table: Wavetable::new(config.table_size),
            tones: Vec::with_capacity(config.max_tones),
            amplitude: config.tone_amplitude,
            sample_rate: config.sample_rate as f32,
            max_tones: config.max_tones,
            command_receiver: command_rx,
            command_sender: command_tx,
        }
    }

    /// Get a sender for tone commands that can be used by the control thread
    pub fn get_command_sender(&self) -> Sender<ToneCommand> {
        self.command_sender.clone()
    }

    /// Fill an interleaved output buffer. Every channel of a frame carries
    /// the same mixed sample.
    pub fn render(&mut self, output: &mut [f32], channels: usize) {
        // Handle any pending tone commands
        self.process_commands();

        if self.tones.is_empty() {
            output.fill(0.0);
            return;
        }

        for frame in output.chunks_mut(channels) {
            let mut sum = 0.0;
            for tone in self.tones.iter_mut() {
                sum += self.amplitude * self.table.sample(tone.phase);
                tone.phase = self.table.wrap(tone.phase + tone.step);
            }

            // Independent tones sum untouched; only a sum beyond full scale
            // is pinned to the rails.
            frame.fill(sum.clamp(-1.0, 1.0));
        }
    }

    /// Process any pending tone commands from the queue
    fn process_commands(&mut self) {
        while let Ok(command) = self.command_receiver.try_recv() {
            match command {
                ToneCommand::Start(freq) => self.start_tone(freq),
                ToneCommand::Stop(freq) => self.stop_tone(freq),
            }
        }
    }

    fn start_tone(&mut self, freq: f32) {
        // A tone already sounding at this frequency keeps its phase.
        if self.tones.iter().any(|t| t.freq.to_bits() == freq.to_bits()) {
            return;
        }

        if self.tones.len() >= self.max_tones {
            return;
        }

        let step = self.table.step_for(freq, self.sample_rate);
        self.tones.push(ActiveTone::new(freq, step));
    }

    fn stop_tone(&mut self, freq: f32) {
        if let Some(index) = self
            .tones
            .iter()
            .position(|t| t.freq.to_bits() == freq.to_bits())
        {
            self.tones.swap_remove(index);
        }
    }

    /// Number of tones currently being mixed.
    pub fn active_tones(&self) -> usize {
        self.tones.len()
    }

    pub fn is_silent(&self) -> bool {
        self.tones.is_empty()
    }
}
