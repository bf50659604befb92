use crate::types::waveform::Waveform;

/// Phase-accumulating oscillator
pub struct Oscillator {
    /// Current phase position (0.0 to 1.0)
    phase: f32,
    /// Phase increment per sample (frequency / sample_rate)
    phase_delta: f32,
    waveform: Waveform,
}

impl Oscillator {
    pub fn new(sample_rate: f32, waveform: Waveform, frequency: f32) -> Self {
        Self {
            phase: 0.0,
            phase_delta: frequency / sample_rate,
            waveform,
        }
    }

    /// Generate next sample and advance phase
    pub fn next_sample(&mut self) -> f32 {
        let output = self.waveform.generate(self.phase);

        self.phase += self.phase_delta;
        if self.phase >= 1.0 {
            self.phase -= self.phase.floor();
        }

        output
    }
}
