use crossbeam_channel::Sender;
use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use super::{InputAdapter, InputError};
use crate::dispatch::CommandSink;
use crate::tuning::{Key, TuningSystem};
use crate::types::command::Command;
use crate::types::note::{is_valid_pitch, PitchNumber};

/// Note keys; index is the semitone offset above the octave's C
pub const NOTE_KEYS: &str = "awsedftgyhujkolp;'";

pub const DEFAULT_OCTAVE: u8 = 5;
pub const MAX_OCTAVE: u8 = 10;
pub const DEFAULT_VELOCITY: u8 = 64;

const OCTAVE_DOWN: char = 'z';
const OCTAVE_UP: char = 'x';
const NEXT_INSTRUMENT: char = 'c';
const NEXT_TUNING: char = 'v';

/// How often the listener thread checks its stop flag
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Presses of one key closer together than this are terminal auto-repeat.
/// Covers common initial repeat delays (250 to 600 ms).
const REPEAT_WINDOW: Duration = Duration::from_millis(700);

fn scale_position(key: char) -> Option<u8> {
    NOTE_KEYS.chars().position(|c| c == key).map(|p| p as u8)
}

/// Per-keyboard state: octave, held keys and the local selection cycles.
///
/// Held keys remember the pitch they started so a release always stops
/// that pitch, even if the octave moved while the key was down.
#[derive(Debug)]
pub struct KeyboardState {
    octave: u8,
    velocity: u8,
    held: HashMap<char, PitchNumber>,
    instruments: Vec<String>,
    instrument: usize,
    tuning: TuningSystem,
    key: Key,
}

impl KeyboardState {
    pub fn new(
        octave: u8,
        velocity: u8,
        instruments: Vec<String>,
        current_instrument: &str,
        tuning: TuningSystem,
        key: Key,
    ) -> Self {
        let instrument = instruments
            .iter()
            .position(|name| name == current_instrument)
            .unwrap_or(0);
        Self {
            octave: octave.min(MAX_OCTAVE),
            velocity,
            held: HashMap::new(),
            instruments,
            instrument,
            tuning,
            key,
        }
    }

    pub fn octave(&self) -> u8 {
        self.octave
    }

    pub fn is_held(&self, key: char) -> bool {
        self.held.contains_key(&key)
    }

    pub fn press(&mut self, key: char) -> Option<Command> {
        match key {
            OCTAVE_DOWN => return self.shift_octave(-1),
            OCTAVE_UP => return self.shift_octave(1),
            NEXT_INSTRUMENT => return self.next_instrument(),
            NEXT_TUNING => {
                self.tuning = self.tuning.next();
                return Some(Command::SelectTuning {
                    tuning: self.tuning.build(self.key),
                });
            }
            _ => {}
        }

        if self.held.contains_key(&key) {
            return None;
        }
        let position = scale_position(key)?;
        let pitch = position as i32 + self.octave as i32 * 12;
        if !is_valid_pitch(pitch) {
            return None;
        }
        let pitch = pitch as PitchNumber;
        self.held.insert(key, pitch);
        Some(Command::note_on(pitch, self.velocity))
    }

    pub fn release(&mut self, key: char) -> Option<Command> {
        self.held.remove(&key).map(Command::note_off)
    }

    fn shift_octave(&mut self, delta: i8) -> Option<Command> {
        let octave = (self.octave as i8 + delta).clamp(0, MAX_OCTAVE as i8) as u8;
        if octave == self.octave {
            return None;
        }
        self.octave = octave;
        Some(Command::ChangeOctave { octave })
    }

    fn next_instrument(&mut self) -> Option<Command> {
        if self.instruments.is_empty() {
            return None;
        }
        self.instrument = (self.instrument + 1) % self.instruments.len();
        Some(Command::select_instrument(self.instruments[self.instrument].clone()))
    }
}

/// Whether the terminal can report key releases
pub fn supports_release_events() -> bool {
    crossterm::terminal::supports_keyboard_enhancement().unwrap_or(false)
}

/// QWERTY keyboard adapter reading the terminal on its own thread.
/// Esc and Ctrl-C are reported on the quit channel instead of as notes.
pub struct KeyboardAdapter {
    state: Option<KeyboardState>,
    quit: Sender<()>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<KeyboardState>>,
    enhanced: bool,
}

impl KeyboardAdapter {
    pub fn new(state: KeyboardState, quit: Sender<()>) -> Self {
        Self {
            state: Some(state),
            quit,
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
            enhanced: false,
        }
    }
}

impl InputAdapter for KeyboardAdapter {
    fn name(&self) -> &str {
        "QWERTY keyboard"
    }

    fn listen(&mut self, sink: CommandSink) -> Result<(), InputError> {
        let Some(state) = self.state.take() else {
            return Err(InputError::AlreadyListening(self.name().to_string()));
        };

        self.enhanced = supports_release_events();
        if self.enhanced {
            execute!(
                io::stdout(),
                PushKeyboardEnhancementFlags(
                    KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
                        | KeyboardEnhancementFlags::REPORT_EVENT_TYPES
                )
            )?;
        }

        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        let quit = self.quit.clone();
        let releases = self.enhanced;
        let handle = thread::Builder::new()
            .name("keyboard-listener".to_string())
            .spawn(move || listen_loop(state, releases, &running, &sink, &quit))?;
        self.thread = Some(handle);

        info!(release_events = self.enhanced, "listening for QWERTY input");
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            match handle.join() {
                Ok(state) => self.state = Some(state),
                Err(_) => error!("keyboard listener panicked"),
            }
        }
        if self.enhanced {
            let _ = execute!(io::stdout(), PopKeyboardEnhancementFlags);
            self.enhanced = false;
        }
        debug!("QWERTY input stopped");
    }
}

/// Key handling for terminals that only report presses.
///
/// Auto-repeat arrives as more presses, so a press within [`REPEAT_WINDOW`]
/// of the previous press of the same key is dropped. A fresh press of a
/// held key stops its note.
#[derive(Debug, Default)]
struct PressOnly {
    last_press: HashMap<char, Instant>,
}

impl PressOnly {
    fn press(&mut self, state: &mut KeyboardState, key: char, now: Instant) -> Option<Command> {
        let repeat = self
            .last_press
            .insert(key, now)
            .is_some_and(|last| now.saturating_duration_since(last) < REPEAT_WINDOW);
        if repeat {
            return None;
        }
        if state.is_held(key) {
            state.release(key)
        } else {
            state.press(key)
        }
    }
}

fn listen_loop(
    mut state: KeyboardState,
    releases: bool,
    running: &AtomicBool,
    sink: &CommandSink,
    quit: &Sender<()>,
) -> KeyboardState {
    let mut press_only = PressOnly::default();
    while running.load(Ordering::Acquire) {
        match event::poll(POLL_INTERVAL) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(err) => {
                error!("terminal poll failed: {}", err);
                let _ = quit.send(());
                break;
            }
        }
        let key = match event::read() {
            Ok(Event::Key(key)) => key,
            Ok(_) => continue,
            Err(err) => {
                error!("terminal read failed: {}", err);
                let _ = quit.send(());
                break;
            }
        };

        if is_quit_key(&key) {
            if key.kind == KeyEventKind::Press {
                let _ = quit.send(());
            }
            continue;
        }

        let KeyCode::Char(c) = key.code else {
            continue;
        };
        let c = c.to_ascii_lowercase();
        let command = match key.kind {
            KeyEventKind::Press if !releases => press_only.press(&mut state, c, Instant::now()),
            KeyEventKind::Press => state.press(c),
            KeyEventKind::Release => state.release(c),
            KeyEventKind::Repeat => None,
        };
        if let Some(command) = command {
            sink.send(command);
        }
    }
    state
}

/// Esc or Ctrl-C
pub fn is_quit_key(key: &KeyEvent) -> bool {
    key.code == KeyCode::Esc
        || (key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c'))
}
