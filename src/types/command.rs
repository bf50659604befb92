use crate::tuning::Tuning;
use crate::types::note::PitchNumber;

/// Abstract commands produced by input adapters on listener threads
/// and applied, in order, by the thread that owns the voice registry
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Start a note unless the pitch is already sounding
    NoteOn { pitch: PitchNumber, velocity: u8 },
    /// Stop a note if the pitch is sounding
    NoteOff { pitch: PitchNumber },
    /// Switch the instrument used by later note-ons
    SelectInstrument { name: String },
    /// Switch the tuning used by later note-ons
    SelectTuning { tuning: Tuning },
    /// The keyboard octave moved; only observers care
    ChangeOctave { octave: u8 },
}

impl Command {
    pub fn note_on(pitch: PitchNumber, velocity: u8) -> Self {
        Command::NoteOn { pitch, velocity }
    }

    pub fn note_off(pitch: PitchNumber) -> Self {
        Command::NoteOff { pitch }
    }

    pub fn select_instrument(name: impl Into<String>) -> Self {
        Command::SelectInstrument { name: name.into() }
    }
}
