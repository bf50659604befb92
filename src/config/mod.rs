use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::engine::{Instrument, Placement};
use crate::input::keyboard::{DEFAULT_OCTAVE, DEFAULT_VELOCITY, MAX_OCTAVE};
use crate::tuning::{Key, Tuning, TuningSystem};

/// Top-level configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SerpentoneConfig {
    #[serde(default)]
    pub devices: DeviceConfig,

    #[serde(default)]
    pub input: InputMode,

    /// Starting octave for the QWERTY keyboard
    #[serde(default = "default_octave")]
    pub octave: u8,

    /// Velocity sent by QWERTY key presses
    #[serde(default = "default_velocity")]
    pub velocity: u8,

    /// Milliseconds to let released voices fade before the engine quits
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    #[serde(default)]
    pub tuning: TuningConfig,

    /// Instrument selected at startup
    #[serde(default = "default_instrument")]
    pub instrument: String,

    #[serde(default = "Instrument::builtins")]
    pub instruments: Vec<Instrument>,

    /// Where new voices go in the engine's voice order
    #[serde(default)]
    pub placement: Placement,
}

impl Default for SerpentoneConfig {
    fn default() -> Self {
        Self {
            devices: DeviceConfig::default(),
            input: InputMode::default(),
            octave: default_octave(),
            velocity: default_velocity(),
            settle_ms: default_settle_ms(),
            tuning: TuningConfig::default(),
            instrument: default_instrument(),
            instruments: Instrument::builtins(),
            placement: Placement::default(),
        }
    }
}

impl SerpentoneConfig {
    /// Load configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: SerpentoneConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.instruments.is_empty() {
            return Err(anyhow!("Configuration must define at least one instrument"));
        }

        let mut names = HashSet::new();
        for (idx, instrument) in self.instruments.iter().enumerate() {
            if !names.insert(instrument.name.as_str()) {
                return Err(anyhow!("Duplicate instrument name: {}", instrument.name));
            }
            validate_instrument(instrument)
                .with_context(|| format!("Invalid configuration for instrument {} ({})", idx, instrument.name))?;
        }

        if !names.contains(self.instrument.as_str()) {
            return Err(anyhow!("Initial instrument '{}' is not defined", self.instrument));
        }
        if self.octave > MAX_OCTAVE {
            return Err(anyhow!("Octave must be between 0 and {}", MAX_OCTAVE));
        }
        if self.velocity < 1 || self.velocity > 127 {
            return Err(anyhow!("Velocity must be between 1 and 127"));
        }

        Ok(())
    }

    pub fn initial_tuning(&self) -> Tuning {
        self.tuning.system.build(self.tuning.key)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn instrument_names(&self) -> Vec<String> {
        self.instruments.iter().map(|i| i.name.clone()).collect()
    }
}

fn validate_instrument(instrument: &Instrument) -> Result<()> {
    if instrument.name.trim().is_empty() {
        return Err(anyhow!("Instrument name must not be empty"));
    }
    // Validate ADSR envelope parameters
    if instrument.attack < 0.0 || instrument.attack > 10.0 {
        return Err(anyhow!("Attack must be between 0.0 and 10.0 seconds"));
    }
    if instrument.decay < 0.0 || instrument.decay > 10.0 {
        return Err(anyhow!("Decay must be between 0.0 and 10.0 seconds"));
    }
    if instrument.sustain < 0.0 || instrument.sustain > 1.0 {
        return Err(anyhow!("Sustain must be between 0.0 and 1.0"));
    }
    if instrument.release < 0.0 || instrument.release > 10.0 {
        return Err(anyhow!("Release must be between 0.0 and 10.0 seconds"));
    }
    if let Some(modulator) = &instrument.modulator {
        if modulator.ratio <= 0.0 || modulator.ratio > 16.0 {
            return Err(anyhow!("Modulator ratio must be greater than 0.0 and at most 16.0"));
        }
    }
    Ok(())
}

/// Device configuration; each entry is an index or a name substring
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DeviceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub midiin: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audioout: Option<String>,
}

/// Which input device drives the notes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    #[default]
    Qwerty,
    Midi,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct TuningConfig {
    #[serde(default)]
    pub system: TuningSystem,

    #[serde(default)]
    pub key: Key,
}

// Default value functions for serde
fn default_octave() -> u8 {
    DEFAULT_OCTAVE
}

fn default_velocity() -> u8 {
    DEFAULT_VELOCITY
}

fn default_settle_ms() -> u64 {
    500
}

fn default_instrument() -> String {
    "default".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::waveform::Waveform;

    #[test]
    fn test_parse_valid_config() {
        let yaml = r#"
devices:
  midiin: "keystep"
  audioout: "0"

input: midi
octave: 4
velocity: 100
settle_ms: 250
placement: tail

tuning:
  system: just
  key: D

instrument: "Lead"

instruments:
  - name: "Lead"
    wave: sawtooth
    attack: 0.001
    release: 0.2
  - name: "Bell"
    wave: sine
    modulator:
      wave: triangle
      ratio: 3.5
"#;

        let config: SerpentoneConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.input, InputMode::Midi);
        assert_eq!(config.devices.midiin.as_deref(), Some("keystep"));
        assert_eq!(config.settle(), Duration::from_millis(250));
        assert_eq!(config.placement, Placement::Tail);
        assert_eq!(config.initial_tuning(), Tuning::just(Key::D));
        assert_eq!(config.instrument_names(), vec!["Lead", "Bell"]);
        assert_eq!(config.instruments[0].wave, Waveform::Sawtooth);
        assert_eq!(config.instruments[1].modulator.unwrap().ratio, 3.5);
    }

    #[test]
    fn test_defaults() {
        let config: SerpentoneConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.input, InputMode::Qwerty);
        assert_eq!(config.octave, DEFAULT_OCTAVE);
        assert_eq!(config.velocity, DEFAULT_VELOCITY);
        assert_eq!(config.settle_ms, 500);
        assert_eq!(config.placement, Placement::Head);
        assert_eq!(config.initial_tuning(), Tuning::Equal);
        assert_eq!(config.instrument, "default");
        assert_eq!(config.instrument_names(), vec!["default", "simple_sine", "mockingboard"]);
        assert!(config.devices.audioout.is_none());
    }

    #[test]
    fn test_instrument_defaults() {
        let yaml = r#"
instrument: pad
instruments:
  - name: pad
"#;
        let config: SerpentoneConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        let pad = &config.instruments[0];
        assert_eq!(pad.wave, Waveform::Sine);
        assert_eq!(pad.attack, 0.01);
        assert_eq!(pad.decay, 0.3);
        assert_eq!(pad.sustain, 0.5);
        assert_eq!(pad.release, 1.0);
    }

    #[test]
    fn test_validate_unknown_initial_instrument() {
        let config: SerpentoneConfig = serde_yaml::from_str("instrument: theremin").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_duplicate_names() {
        let yaml = r#"
instruments:
  - name: default
  - name: default
"#;
        let config: SerpentoneConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_adsr_ranges() {
        let yaml = r#"
instruments:
  - name: default
    sustain: 1.5
"#;
        let config: SerpentoneConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_keyboard_ranges() {
        let config: SerpentoneConfig = serde_yaml::from_str("octave: 11").unwrap();
        assert!(config.validate().is_err());
        let config: SerpentoneConfig = serde_yaml::from_str("velocity: 0").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_key_is_rejected() {
        let yaml = r#"
tuning:
  key: H
"#;
        assert!(serde_yaml::from_str::<SerpentoneConfig>(yaml).is_err());
    }
}
