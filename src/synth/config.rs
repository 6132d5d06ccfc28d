#[derive(Clone, Debug)]
pub struct AudioConfig {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Number of entries in the shared sine wavetable.
    pub table_size: usize,
    /// Requested frames per hardware buffer; clamped to what the device supports.
    pub frames_per_buffer: u32,
    /// Output device by enumeration index; `None` selects the system default.
    pub device_index: Option<usize>,
    /// Amplitude scalar applied to each tone before summing.
    pub tone_amplitude: f32,
    /// Maximum number of simultaneously active tones.
    pub max_tones: usize,
}

impl AudioConfig {
    /// Frequency of the heartbeat test tone: the pitch produced by stepping
    /// through the wavetable one entry per frame (220.5 Hz at the defaults).
    pub fn test_tone_hz(&self) -> f32 {
        self.sample_rate as f32 / self.table_size as f32
    }

    /// Highest representable frequency at this sample rate.
    pub fn nyquist_hz(&self) -> f32 {
        self.sample_rate as f32 / 2.0
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100, // Standard audio sample rate
            table_size: 200,
            frames_per_buffer: 64,
            device_index: None,
            tone_amplitude: 0.3,
            max_tones: 16,
        }
    }
}
