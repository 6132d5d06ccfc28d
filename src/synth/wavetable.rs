/// One precomputed cycle of a sine wave.
///
/// Built once before the stream opens; playback only ever reads it. Lookups
/// interpolate between adjacent entries and indices wrap modulo the table
/// length, so a phase accumulator can run forever without drifting out of
/// range.
#[derive(Debug, Clone)]
pub struct Wavetable {
    samples: Vec<f32>,
}

impl Wavetable {
    /// Fills the table with `sin(2π · i / len)`.
    pub fn new(len: usize) -> Self {
        assert!(len >= 2, "wavetable needs at least two entries");
        let samples = (0..len)
            .map(|i| ((i as f64 / len as f64) * std::f64::consts::PI * 2.0).sin() as f32)
            .collect();
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Interpolated lookup at `phase`, which is expressed in table entries.
    pub fn sample(&self, phase: f32) -> f32 {
        let len = self.samples.len();
        let index = phase as usize % len;
        let next = (index + 1) % len;
        let frac = phase - phase.floor();
        let a = self.samples[index];
        let b = self.samples[next];
        a + (b - a) * frac
    }

    /// Phase advance per output frame for a tone at `freq` Hz.
    pub fn step_for(&self, freq: f32, sample_rate: f32) -> f32 {
        freq * self.samples.len() as f32 / sample_rate
    }

    /// Wraps an advanced phase back into `[0, len)`. Validated frequencies
    /// stay below Nyquist, so the step is under half a table length and a
    /// single subtraction is enough.
    pub fn wrap(&self, phase: f32) -> f32 {
        let len = self.samples.len() as f32;
        if phase >= len {
            phase - len
        } else {
            phase
        }
    }
}
