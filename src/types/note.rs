/// Pitch identity of a note, MIDI numbering (0-127)
pub type PitchNumber = u8;

/// Highest valid pitch number
pub const MAX_PITCH: PitchNumber = 127;

/// Reference pitch for concert tuning: MIDI note 69 = A4
pub const A4_PITCH: PitchNumber = 69;

/// Reference frequency for concert tuning
pub const A4_FREQUENCY: f64 = 440.0;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Check that a computed pitch can be used as a registry key
pub fn is_valid_pitch(value: i32) -> bool {
    (0..=MAX_PITCH as i32).contains(&value)
}

/// Convert MIDI note number to frequency in Hz
/// Uses equal temperament: f = 440 * 2^((n-69)/12)
pub fn midi_note_to_frequency(note: PitchNumber) -> f64 {
    let semitones = note as i32 - A4_PITCH as i32;
    A4_FREQUENCY * 2.0_f64.powf(semitones as f64 / 12.0)
}

/// Convert MIDI velocity (0-127) to normalized amplitude (0.0-1.0)
pub fn midi_velocity_to_amplitude(velocity: u8) -> f64 {
    (velocity as f64 / 127.0).clamp(0.0, 1.0)
}

/// Scientific pitch name, e.g. 60 -> "C4", 70 -> "A#4"
pub fn note_name(pitch: PitchNumber) -> String {
    let octave = pitch as i32 / 12 - 1;
    format!("{}{}", NOTE_NAMES[(pitch % 12) as usize], octave)
}

/// Interval between two frequencies in cents
pub fn cents(frequency: f64, reference: f64) -> f64 {
    1200.0 * (frequency / reference).log2()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_a4_conversion() {
        assert_eq!(midi_note_to_frequency(69), 440.0);
    }

    #[test]
    fn test_c4_middle_c() {
        let freq = midi_note_to_frequency(60);
        assert!((freq - 261.63).abs() < 0.01);
    }

    #[test]
    fn test_velocity_conversion() {
        assert_eq!(midi_velocity_to_amplitude(0), 0.0);
        assert_eq!(midi_velocity_to_amplitude(127), 1.0);
        assert!((midi_velocity_to_amplitude(64) - 0.504).abs() < 0.01);
    }

    #[test]
    fn test_velocity_curve_is_monotonic() {
        for v in 0..127u8 {
            assert!(midi_velocity_to_amplitude(v + 1) > midi_velocity_to_amplitude(v));
        }
    }

    #[test]
    fn test_note_names() {
        assert_eq!(note_name(60), "C4");
        assert_eq!(note_name(69), "A4");
        assert_eq!(note_name(70), "A#4");
        assert_eq!(note_name(0), "C-1");
        assert_eq!(note_name(127), "G9");
    }

    #[test]
    fn test_pitch_range() {
        assert!(is_valid_pitch(0));
        assert!(is_valid_pitch(127));
        assert!(!is_valid_pitch(128));
        assert!(!is_valid_pitch(-1));
    }

    #[test]
    fn test_cents() {
        assert!((cents(880.0, 440.0) - 1200.0).abs() < 1e-9);
        assert!(cents(440.0, 440.0).abs() < 1e-9);
    }
}
