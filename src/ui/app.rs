use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use crate::config::InputMode;
use crate::lifecycle::LifecycleState;
use crate::types::note::PitchNumber;
use crate::voice::Notification;

/// Maximum number of status lines kept for the status panel
pub const STATUS_LOG_LEN: usize = 20;

/// A note as shown in the notes panel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteView {
    pub frequency: f64,
    pub velocity: u8,
}

/// UI application state, rebuilt purely from notifications
pub struct App {
    pub input_mode: InputMode,
    /// Mirrored from the coordinator every frame
    pub lifecycle: LifecycleState,
    /// Current instrument name
    pub instrument: String,
    /// Current tuning name
    pub tuning: String,
    /// Keyboard octave; only known in QWERTY mode
    pub octave: Option<u8>,
    /// Sounding notes ordered by pitch
    pub notes: BTreeMap<PitchNumber, NoteView>,
    /// Status lines with the time since startup, oldest first
    pub status_log: VecDeque<(Duration, String)>,
    /// Whether to quit the application
    pub should_quit: bool,
    started: Instant,
}

impl App {
    pub fn new(input_mode: InputMode, octave: Option<u8>) -> Self {
        Self {
            input_mode,
            lifecycle: LifecycleState::Idle,
            instrument: String::new(),
            tuning: String::new(),
            octave,
            notes: BTreeMap::new(),
            status_log: VecDeque::with_capacity(STATUS_LOG_LEN),
            should_quit: false,
            started: Instant::now(),
        }
    }

    /// Fold one notification into the view
    pub fn apply(&mut self, notification: Notification) {
        match notification {
            Notification::NoteStarted {
                pitch,
                frequency,
                velocity,
            } => {
                self.notes.insert(pitch, NoteView { frequency, velocity });
            }
            Notification::NoteStopped { pitch } => {
                self.notes.remove(&pitch);
            }
            Notification::InstrumentChanged { name } => {
                self.push_status(format!("Instrument: {}", name));
                self.instrument = name;
            }
            Notification::TuningChanged { name } => {
                self.push_status(format!("Tuning: {}", name));
                self.tuning = name;
            }
            Notification::OctaveChanged { octave } => {
                self.octave = Some(octave);
            }
            Notification::Status { text } => self.push_status(text),
        }
    }

    pub fn push_status(&mut self, text: impl Into<String>) {
        if self.status_log.len() == STATUS_LOG_LEN {
            self.status_log.pop_front();
        }
        self.status_log.push_back((self.started.elapsed(), text.into()));
    }

    /// Mark app for quit
    pub fn quit(&mut self) {
        self.should_quit = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> App {
        App::new(InputMode::Qwerty, Some(5))
    }

    #[test]
    fn test_notes_follow_start_and_stop() {
        let mut app = app();
        app.apply(Notification::NoteStarted {
            pitch: 64,
            frequency: 329.63,
            velocity: 100,
        });
        app.apply(Notification::NoteStarted {
            pitch: 60,
            frequency: 261.63,
            velocity: 90,
        });
        let pitches: Vec<_> = app.notes.keys().copied().collect();
        assert_eq!(pitches, vec![60, 64]);

        app.apply(Notification::NoteStopped { pitch: 60 });
        assert_eq!(app.notes.len(), 1);
        assert_eq!(app.notes[&64].velocity, 100);

        // Stopping an unknown pitch is harmless
        app.apply(Notification::NoteStopped { pitch: 10 });
        assert_eq!(app.notes.len(), 1);
    }

    #[test]
    fn test_selection_changes_are_logged() {
        let mut app = app();
        app.apply(Notification::InstrumentChanged {
            name: "mockingboard".to_string(),
        });
        app.apply(Notification::TuningChanged {
            name: "Just Intonation (C)".to_string(),
        });
        app.apply(Notification::OctaveChanged { octave: 3 });

        assert_eq!(app.instrument, "mockingboard");
        assert_eq!(app.tuning, "Just Intonation (C)");
        assert_eq!(app.octave, Some(3));
        let lines: Vec<_> = app.status_log.iter().map(|(_, text)| text.as_str()).collect();
        assert_eq!(lines, vec!["Instrument: mockingboard", "Tuning: Just Intonation (C)"]);
    }

    #[test]
    fn test_status_log_is_bounded() {
        let mut app = app();
        for i in 0..STATUS_LOG_LEN + 5 {
            app.apply(Notification::status(format!("line {}", i)));
        }
        assert_eq!(app.status_log.len(), STATUS_LOG_LEN);
        assert_eq!(app.status_log.front().unwrap().1, "line 5");
        assert_eq!(app.status_log.back().unwrap().1, format!("line {}", STATUS_LOG_LEN + 4));
    }
}
