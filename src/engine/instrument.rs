use serde::{Deserialize, Serialize};

use crate::types::waveform::Waveform;

/// Synth definition the engine can instantiate voices from:
/// oscillator → optional ring modulator → ADSR envelope
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Instrument {
    pub name: String,

    #[serde(default)]
    pub wave: Waveform,

    #[serde(default = "default_attack")]
    pub attack: f32,

    #[serde(default = "default_decay")]
    pub decay: f32,

    #[serde(default = "default_sustain")]
    pub sustain: f32,

    #[serde(default = "default_release")]
    pub release: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modulator: Option<Modulator>,
}

/// Second oscillator multiplied into the carrier
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Modulator {
    #[serde(default)]
    pub wave: Waveform,

    /// Modulator frequency as a multiple of the note frequency
    #[serde(default = "default_ratio")]
    pub ratio: f32,
}

impl Instrument {
    pub fn new(name: impl Into<String>, wave: Waveform) -> Self {
        Self {
            name: name.into(),
            wave,
            attack: default_attack(),
            decay: default_decay(),
            sustain: default_sustain(),
            release: default_release(),
            modulator: None,
        }
    }

    pub fn with_modulator(mut self, wave: Waveform, ratio: f32) -> Self {
        self.modulator = Some(Modulator { wave, ratio });
        self
    }

    /// Instruments available without a configuration file
    pub fn builtins() -> Vec<Instrument> {
        vec![
            Instrument::new("default", Waveform::Sawtooth),
            Instrument::new("simple_sine", Waveform::Sine),
            Instrument::new("mockingboard", Waveform::Sine).with_modulator(Waveform::Triangle, 0.5),
        ]
    }
}

fn default_attack() -> f32 {
    0.01
}

fn default_decay() -> f32 {
    0.3
}

fn default_sustain() -> f32 {
    0.5
}

fn default_release() -> f32 {
    1.0
}

fn default_ratio() -> f32 {
    1.0
}
