//! Pitch-to-frequency mapping under selectable tuning systems.
//!
//! Ratio-based tunings never store absolute frequencies. They start from
//! the equal-tempered frequency of the same pitch and swap the tempered
//! interval above the tonic for the pure one:
//!
//! `f = et(pitch) * ratio[degree] / 2^(degree / 12)`
//!
//! so the tonic always matches equal temperament and every octave doubles,
//! whatever the ratio table contains.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::note::{midi_note_to_frequency, PitchNumber};

/// 5-limit just intonation, indexed by scale degree above the tonic
pub const JUST_RATIOS: [f64; 12] = [
    1.0,
    16.0 / 15.0,
    9.0 / 8.0,
    6.0 / 5.0,
    5.0 / 4.0,
    4.0 / 3.0,
    45.0 / 32.0,
    3.0 / 2.0,
    8.0 / 5.0,
    5.0 / 3.0,
    9.0 / 5.0,
    15.0 / 8.0,
];

/// Pythagorean tuning, built only from perfect fifths and octaves
pub const PYTHAGOREAN_RATIOS: [f64; 12] = [
    1.0,
    256.0 / 243.0,
    9.0 / 8.0,
    32.0 / 27.0,
    81.0 / 64.0,
    4.0 / 3.0,
    729.0 / 512.0,
    3.0 / 2.0,
    128.0 / 81.0,
    27.0 / 16.0,
    16.0 / 9.0,
    243.0 / 128.0,
];

/// Musical key letter naming the tonic of a ratio-based tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum Key {
    #[default]
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl Key {
    /// Chromatic degree of the tonic (C = 0)
    pub fn degree(self) -> u8 {
        match self {
            Key::C => 0,
            Key::D => 2,
            Key::E => 4,
            Key::F => 5,
            Key::G => 7,
            Key::A => 9,
            Key::B => 11,
        }
    }
}

impl FromStr for Key {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "C" => Ok(Key::C),
            "D" => Ok(Key::D),
            "E" => Ok(Key::E),
            "F" => Ok(Key::F),
            "G" => Ok(Key::G),
            "A" => Ok(Key::A),
            "B" => Ok(Key::B),
            other => Err(format!("invalid key '{}', expected one of A-G", other)),
        }
    }
}

impl TryFrom<String> for Key {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.to_string()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Tuning family, used by configuration and by the keyboard's tuning cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TuningSystem {
    #[default]
    Equal,
    Just,
    Pythagorean,
}

impl TuningSystem {
    /// Build the tuning for this system, tonic `key` where relevant
    pub fn build(self, key: Key) -> Tuning {
        match self {
            TuningSystem::Equal => Tuning::Equal,
            TuningSystem::Just => Tuning::just(key),
            TuningSystem::Pythagorean => Tuning::pythagorean(key),
        }
    }

    /// Next system in cycle order: Equal -> Just -> Pythagorean -> Equal
    pub fn next(self) -> Self {
        match self {
            TuningSystem::Equal => TuningSystem::Just,
            TuningSystem::Just => TuningSystem::Pythagorean,
            TuningSystem::Pythagorean => TuningSystem::Equal,
        }
    }
}

/// Non-tempered tuning defined by a 12-entry ratio table relative to a tonic
#[derive(Debug, Clone, PartialEq)]
pub struct RatioTuning {
    name: &'static str,
    key: Key,
    ratios: [f64; 12],
}

impl RatioTuning {
    /// Entry 0 is the tonic and must be exactly 1.0
    pub fn new(name: &'static str, key: Key, ratios: [f64; 12]) -> Self {
        debug_assert!(ratios[0] == 1.0, "ratio table must start at unison");
        Self { name, key, ratios }
    }

    pub fn key(&self) -> Key {
        self.key
    }

    pub fn frequency(&self, pitch: PitchNumber) -> f64 {
        let pitch_class = pitch % 12;
        let degree = (pitch_class + 12 - self.key.degree()) % 12;
        let tempered = 2.0_f64.powf(degree as f64 / 12.0);
        midi_note_to_frequency(pitch) * (self.ratios[degree as usize] / tempered)
    }
}

/// Active mapping from pitch number to frequency in Hz
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Tuning {
    #[default]
    Equal,
    Ratio(RatioTuning),
}

impl Tuning {
    pub fn just(key: Key) -> Self {
        Tuning::Ratio(RatioTuning::new("Just Intonation", key, JUST_RATIOS))
    }

    pub fn pythagorean(key: Key) -> Self {
        Tuning::Ratio(RatioTuning::new("Pythagorean", key, PYTHAGOREAN_RATIOS))
    }

    /// Frequency in Hz; total over every pitch number
    pub fn frequency(&self, pitch: PitchNumber) -> f64 {
        match self {
            Tuning::Equal => midi_note_to_frequency(pitch),
            Tuning::Ratio(ratio) => ratio.frequency(pitch),
        }
    }

    /// Display name, e.g. "Equal Temperament" or "Just Intonation (C)"
    pub fn name(&self) -> String {
        match self {
            Tuning::Equal => "Equal Temperament".to_string(),
            Tuning::Ratio(ratio) => format!("{} ({})", ratio.name, ratio.key),
        }
    }

    pub fn system(&self) -> TuningSystem {
        match self {
            Tuning::Equal => TuningSystem::Equal,
            Tuning::Ratio(ratio) if ratio.ratios == PYTHAGOREAN_RATIOS => TuningSystem::Pythagorean,
            Tuning::Ratio(_) => TuningSystem::Just,
        }
    }
}
