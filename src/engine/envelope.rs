/// ADSR envelope gated by a voice.
/// Opens on creation, ramps linearly through attack and decay, holds the
/// sustain level until released, then ramps to zero and finishes.
pub struct Envelope {
    state: EnvelopeState,
    /// Attack length in samples
    attack: u64,
    /// Decay length in samples
    decay: u64,
    /// Sustain level (0.0 to 1.0)
    sustain: f32,
    /// Release length in samples
    release: u64,
    /// Current envelope output level (0.0 to 1.0)
    current_level: f32,
    /// Samples rendered since the gate opened
    sample_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum EnvelopeState {
    Attack,
    Decay { start_sample: u64 },
    Sustain,
    Release { start_sample: u64, release_level: f32 },
    Finished,
}

impl Envelope {
    /// Create an open envelope; times are seconds, 1ms minimum to avoid clicks
    pub fn new(sample_rate: f32, attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        let samples = |seconds: f32| (seconds.max(0.001) * sample_rate) as u64;
        Self {
            state: EnvelopeState::Attack,
            attack: samples(attack),
            decay: samples(decay),
            sustain: sustain.clamp(0.0, 1.0),
            release: samples(release),
            current_level: 0.0,
            sample_count: 0,
        }
    }

    /// Close the gate and start the release phase
    pub fn release(&mut self) {
        if self.is_released() {
            return;
        }
        self.state = EnvelopeState::Release {
            start_sample: self.sample_count,
            release_level: self.current_level,
        };
    }

    pub fn is_released(&self) -> bool {
        matches!(self.state, EnvelopeState::Release { .. } | EnvelopeState::Finished)
    }

    /// True once the release ramp has reached zero
    pub fn is_finished(&self) -> bool {
        self.state == EnvelopeState::Finished
    }

    /// Generate next envelope sample
    pub fn next_sample(&mut self) -> f32 {
        match self.state {
            EnvelopeState::Attack => {
                if self.sample_count >= self.attack {
                    self.current_level = 1.0;
                    self.state = EnvelopeState::Decay {
                        start_sample: self.sample_count,
                    };
                } else {
                    self.current_level = self.sample_count as f32 / self.attack as f32;
                }
            }

            EnvelopeState::Decay { start_sample } => {
                let elapsed = self.sample_count - start_sample;
                if elapsed >= self.decay {
                    self.current_level = self.sustain;
                    self.state = EnvelopeState::Sustain;
                } else {
                    let progress = elapsed as f32 / self.decay as f32;
                    self.current_level = 1.0 - progress * (1.0 - self.sustain);
                }
            }

            EnvelopeState::Sustain => {
                self.current_level = self.sustain;
            }

            EnvelopeState::Release {
                start_sample,
                release_level,
            } => {
                let elapsed = self.sample_count - start_sample;
                if elapsed >= self.release {
                    self.current_level = 0.0;
                    self.state = EnvelopeState::Finished;
                } else {
                    let progress = elapsed as f32 / self.release as f32;
                    self.current_level = release_level * (1.0 - progress);
                }
            }

            EnvelopeState::Finished => {
                self.current_level = 0.0;
            }
        }

        self.sample_count += 1;
        self.current_level
    }
}
