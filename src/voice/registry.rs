//! Authoritative record of which pitch is sounding as which engine voice.
//!
//! A pitch is present in the registry exactly when the engine holds a live
//! voice for it. The registry is owned by a single thread; everyone else
//! reaches it through [`crate::dispatch`].

use std::collections::HashMap;
use tracing::{debug, trace, warn};

use crate::engine::{EngineError, Instrument, Placement, SoundEngine, VoiceHandle};
use crate::tuning::Tuning;
use crate::types::command::Command;
use crate::types::note::{midi_velocity_to_amplitude, PitchNumber, MAX_PITCH};

/// State changes reported to the observer, in the order they happened
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    NoteStarted {
        pitch: PitchNumber,
        frequency: f64,
        velocity: u8,
    },
    NoteStopped {
        pitch: PitchNumber,
    },
    InstrumentChanged {
        name: String,
    },
    TuningChanged {
        name: String,
    },
    OctaveChanged {
        octave: u8,
    },
    Status {
        text: String,
    },
}

impl Notification {
    pub fn status(text: impl Into<String>) -> Self {
        Notification::Status { text: text.into() }
    }
}

/// One sounding note. Frequency and velocity are fixed at note-on.
#[derive(Debug)]
pub struct Voice {
    pub pitch: PitchNumber,
    pub frequency: f64,
    pub velocity: u8,
    handle: VoiceHandle,
}

impl Voice {
    #[cfg(test)]
    pub fn handle(&self) -> VoiceHandle {
        self.handle
    }
}

/// Polyphony manager: one voice per pitch, many pitches at once
pub struct VoiceRegistry<E: SoundEngine> {
    engine: E,
    voices: HashMap<PitchNumber, Voice>,
    instruments: Vec<Instrument>,
    instrument: usize,
    tuning: Tuning,
    placement: Placement,
    /// Set by `free_all`; no voice is started afterwards
    sealed: bool,
}

impl<E: SoundEngine> VoiceRegistry<E> {
    /// `instruments` must be loaded in `engine` already. An unknown
    /// `initial_instrument` falls back to the first definition.
    pub fn new(engine: E, instruments: Vec<Instrument>, initial_instrument: &str, tuning: Tuning) -> Self {
        debug_assert!(!instruments.is_empty(), "registry needs at least one instrument");
        let instrument = instruments
            .iter()
            .position(|i| i.name == initial_instrument)
            .unwrap_or(0);
        Self {
            engine,
            voices: HashMap::new(),
            instruments,
            instrument,
            tuning,
            placement: Placement::default(),
            sealed: false,
        }
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instruments[self.instrument]
    }

    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    /// Engine order for new voices
    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    #[cfg(test)]
    pub fn voice(&self, pitch: PitchNumber) -> Option<&Voice> {
        self.voices.get(&pitch)
    }

    #[cfg(test)]
    pub fn is_sounding(&self, pitch: PitchNumber) -> bool {
        self.voices.contains_key(&pitch)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.voices.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    #[cfg(test)]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Start a voice for `pitch`. A pitch that is already sounding is left
    /// alone, which absorbs retriggers and duplicate onsets.
    pub fn note_on(&mut self, pitch: PitchNumber, velocity: u8) -> Result<Option<Notification>, EngineError> {
        debug_assert!(pitch <= MAX_PITCH, "pitch {} out of range", pitch);

        if self.sealed {
            debug!(pitch, "note on after teardown dropped");
            return Ok(None);
        }
        if self.voices.contains_key(&pitch) {
            trace!(pitch, "note already sounding");
            return Ok(None);
        }

        let frequency = self.tuning.frequency(pitch);
        let amplitude = midi_velocity_to_amplitude(velocity);
        let handle = self.engine.add_voice(
            &self.instruments[self.instrument],
            frequency,
            amplitude,
            self.placement,
        )?;

        self.voices.insert(
            pitch,
            Voice {
                pitch,
                frequency,
                velocity,
                handle,
            },
        );
        Ok(Some(Notification::NoteStarted {
            pitch,
            frequency,
            velocity,
        }))
    }

    /// Release the voice for `pitch`; an absent pitch is a no-op
    pub fn note_off(&mut self, pitch: PitchNumber) -> Option<Notification> {
        let Some(voice) = self.voices.remove(&pitch) else {
            trace!(pitch, "note not sounding");
            return None;
        };
        debug!(
            pitch = voice.pitch,
            frequency = voice.frequency,
            velocity = voice.velocity,
            "releasing voice"
        );
        self.engine.free(voice.handle);
        Some(Notification::NoteStopped { pitch: voice.pitch })
    }

    /// Release every voice and seal the registry. Callers must wait out the
    /// settle interval before quitting the engine.
    pub fn free_all(&mut self) -> Vec<Notification> {
        self.sealed = true;
        let mut pitches: Vec<PitchNumber> = self.voices.keys().copied().collect();
        pitches.sort_unstable();
        debug!(count = pitches.len(), "freeing all voices");
        pitches
            .into_iter()
            .filter_map(|pitch| self.note_off(pitch))
            .collect()
    }

    /// Affects later note-ons only
    pub fn select_instrument(&mut self, name: &str) -> Notification {
        match self.instruments.iter().position(|i| i.name == name) {
            Some(index) => {
                self.instrument = index;
                Notification::InstrumentChanged {
                    name: name.to_string(),
                }
            }
            None => {
                warn!(name, "unknown instrument");
                Notification::status(format!("Unknown instrument: {}", name))
            }
        }
    }

    /// Affects later note-ons only
    pub fn select_tuning(&mut self, tuning: Tuning) -> Notification {
        self.tuning = tuning;
        Notification::TuningChanged {
            name: self.tuning.name(),
        }
    }

    /// Apply one command and return what the observer should hear about
    pub fn apply(&mut self, command: Command) -> Result<Option<Notification>, EngineError> {
        Ok(match command {
            Command::NoteOn { pitch, velocity } => self.note_on(pitch, velocity)?,
            Command::NoteOff { pitch } => self.note_off(pitch),
            Command::SelectInstrument { name } => Some(self.select_instrument(&name)),
            Command::SelectTuning { tuning } => Some(self.select_tuning(tuning)),
            Command::ChangeOctave { octave } => Some(Notification::OctaveChanged { octave }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{EngineCall, RecordingEngine};
    use crate::tuning::Key;

    fn registry() -> (VoiceRegistry<RecordingEngine>, RecordingEngine) {
        let engine = RecordingEngine::new();
        let registry = VoiceRegistry::new(engine.clone(), Instrument::builtins(), "simple_sine", Tuning::Equal);
        (registry, engine)
    }

    #[test]
    fn test_note_on_registers_voice() {
        let (mut registry, engine) = registry();
        let notification = registry.note_on(69, 127).unwrap();

        assert_eq!(
            notification,
            Some(Notification::NoteStarted {
                pitch: 69,
                frequency: 440.0,
                velocity: 127
            })
        );
        assert!(registry.is_sounding(69));
        assert_eq!(
            engine.calls(),
            vec![EngineCall::Add {
                handle: VoiceHandle(1),
                instrument: "simple_sine".to_string(),
                frequency: 440.0,
                amplitude: 1.0,
                placement: Placement::Head,
            }]
        );
    }

    #[test]
    fn test_configured_placement_reaches_engine() {
        let engine = RecordingEngine::new();
        let mut registry = VoiceRegistry::new(engine.clone(), Instrument::builtins(), "default", Tuning::Equal)
            .with_placement(Placement::Tail);
        registry.note_on(60, 100).unwrap();
        assert!(matches!(
            engine.calls()[0],
            EngineCall::Add {
                placement: Placement::Tail,
                ..
            }
        ));
    }

    #[test]
    fn test_duplicate_note_on_is_idempotent() {
        let (mut registry, engine) = registry();
        assert!(registry.note_on(60, 100).unwrap().is_some());
        assert!(registry.note_on(60, 100).unwrap().is_none());
        assert_eq!(registry.len(), 1);
        assert_eq!(engine.add_count(), 1);
    }

    #[test]
    fn test_note_off_unknown_pitch_is_noop() {
        let (mut registry, engine) = registry();
        assert_eq!(registry.note_off(60), None);
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn test_note_off_frees_matching_handle() {
        let (mut registry, engine) = registry();
        registry.note_on(60, 100).unwrap();
        registry.note_on(64, 100).unwrap();
        let handle = registry.voice(60).unwrap().handle();

        assert_eq!(registry.note_off(60), Some(Notification::NoteStopped { pitch: 60 }));
        assert_eq!(registry.note_off(60), None);
        assert!(!registry.is_sounding(60));
        assert!(registry.is_sounding(64));
        assert_eq!(engine.calls().last(), Some(&EngineCall::Free(handle)));
    }

    #[test]
    fn test_notifications_follow_command_order() {
        let (mut registry, _engine) = registry();
        let notifications: Vec<_> = [
            Command::note_on(60, 100),
            Command::note_on(62, 100),
            Command::note_off(60),
        ]
        .into_iter()
        .filter_map(|command| registry.apply(command).unwrap())
        .collect();

        let pitches: Vec<_> = notifications
            .iter()
            .map(|n| match n {
                Notification::NoteStarted { pitch, .. } => (true, *pitch),
                Notification::NoteStopped { pitch } => (false, *pitch),
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(pitches, vec![(true, 60), (true, 62), (false, 60)]);
    }

    #[test]
    fn test_tuning_swap_keeps_sounding_frequency() {
        let (mut registry, engine) = registry();
        registry.note_on(64, 64).unwrap();
        registry.select_tuning(Tuning::just(Key::C));
        registry.note_on(76, 64).unwrap();

        assert!((registry.voice(64).unwrap().frequency - 329.63).abs() < 0.01);
        assert!((registry.voice(76).unwrap().frequency - 654.06).abs() < 0.01);
        assert_eq!(engine.add_count(), 2);
    }

    #[test]
    fn test_instrument_swap_affects_later_notes_only() {
        let (mut registry, engine) = registry();
        registry.note_on(60, 64).unwrap();
        assert_eq!(
            registry.select_instrument("mockingboard"),
            Notification::InstrumentChanged {
                name: "mockingboard".to_string()
            }
        );
        registry.note_on(61, 64).unwrap();

        let instruments: Vec<_> = engine
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                EngineCall::Add { instrument, .. } => Some(instrument),
                _ => None,
            })
            .collect();
        assert_eq!(instruments, vec!["simple_sine", "mockingboard"]);
    }

    #[test]
    fn test_unknown_instrument_keeps_selection() {
        let (mut registry, _engine) = registry();
        assert!(matches!(registry.select_instrument("theremin"), Notification::Status { .. }));
        assert_eq!(registry.instrument().name, "simple_sine");
    }

    #[test]
    fn test_free_all_empties_and_seals() {
        let (mut registry, engine) = registry();
        registry.note_on(62, 100).unwrap();
        registry.note_on(60, 100).unwrap();

        let stopped = registry.free_all();
        assert_eq!(
            stopped,
            vec![
                Notification::NoteStopped { pitch: 60 },
                Notification::NoteStopped { pitch: 62 }
            ]
        );
        assert!(registry.is_empty());
        assert!(registry.is_sealed());

        // A stale note-on arriving after teardown must not reach the engine
        assert_eq!(registry.note_on(67, 100).unwrap(), None);
        assert!(registry.is_empty());
        assert_eq!(engine.add_count(), 2);
    }

    #[test]
    fn test_engine_failure_leaves_registry_unchanged() {
        let mut registry =
            VoiceRegistry::new(RecordingEngine::failing_add(), Instrument::builtins(), "default", Tuning::Equal);
        assert!(registry.note_on(60, 100).is_err());
        assert!(!registry.is_sounding(60));
    }

    #[test]
    fn test_octave_change_is_forwarded() {
        let (mut registry, engine) = registry();
        assert_eq!(
            registry.apply(Command::ChangeOctave { octave: 3 }).unwrap(),
            Some(Notification::OctaveChanged { octave: 3 })
        );
        assert!(engine.calls().is_empty());
    }
}
