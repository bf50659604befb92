//! Hardware input adapters.
//!
//! Each adapter turns raw events from its source into [`Command`]s and
//! pushes them into a [`CommandSink`] from its own listener thread.
//!
//! [`Command`]: crate::types::command::Command

pub mod keyboard;
pub mod midi;

use crate::dispatch::CommandSink;

#[derive(thiserror::Error, Debug)]
pub enum InputError {
    #[error("no MIDI input devices found")]
    NoMidiDevices,
    #[error("MIDI device '{0}' not found")]
    MidiDeviceNotFound(String),
    #[error("MIDI backend error: {0}")]
    MidiBackend(String),
    #[error("terminal input error: {0}")]
    Terminal(#[from] std::io::Error),
    #[error("{0} is already listening")]
    AlreadyListening(String),
}

/// Capability shared by all input sources
pub trait InputAdapter: Send {
    fn name(&self) -> &str;

    /// Start delivering commands into `sink` from a background thread
    fn listen(&mut self, sink: CommandSink) -> Result<(), InputError>;

    /// Stop producing commands. Returns once no further command can be sent.
    fn stop(&mut self);
}
