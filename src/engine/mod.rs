//! Sound engine boundary.
//!
//! The voice registry only ever talks to a [`SoundEngine`]: it asks for a
//! voice, gets back an opaque [`VoiceHandle`], and later frees that handle.
//! How the engine turns a handle into sound is its own business.

pub mod cpal_engine;
pub mod envelope;
pub mod instrument;
pub mod mixer;
pub mod oscillator;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use instrument::Instrument;

/// Errors surfaced by an engine backend
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("no audio output device available")]
    NoDevice,
    #[error("audio output device '{0}' not found")]
    DeviceNotFound(String),
    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),
    #[error("audio backend error: {0}")]
    Backend(String),
    #[error("engine did not confirm {0} within {1:?}")]
    Timeout(&'static str, Duration),
    #[error("engine is not running")]
    NotRunning,
    #[error("instrument '{0}' is not loaded")]
    UnknownInstrument(String),
}

/// Opaque reference to one live voice inside the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceHandle(pub u64);

/// Where a new voice is placed in the engine's voice order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    #[default]
    Head,
    Tail,
}

/// Operations the core consumes from the external sound engine.
///
/// `boot`, `load_instruments` and `quit` block until the engine confirms;
/// `add_voice` and `free` return as soon as the request is accepted.
pub trait SoundEngine {
    fn boot(&mut self) -> Result<(), EngineError>;

    /// Make instrument definitions available and wait until they are loaded
    fn load_instruments(&mut self, instruments: &[Instrument]) -> Result<(), EngineError>;

    fn add_voice(
        &mut self,
        instrument: &Instrument,
        frequency: f64,
        amplitude: f64,
        placement: Placement,
    ) -> Result<VoiceHandle, EngineError>;

    /// Release a voice; it fades out on the engine's side
    fn free(&mut self, handle: VoiceHandle);

    fn quit(&mut self) -> Result<(), EngineError>;
}

#[cfg(test)]
pub mod testing {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Engine call as observed by [`RecordingEngine`]
    #[derive(Debug, Clone, PartialEq)]
    pub enum EngineCall {
        Boot,
        Load(Vec<String>),
        Add {
            handle: VoiceHandle,
            instrument: String,
            frequency: f64,
            amplitude: f64,
            placement: Placement,
        },
        Free(VoiceHandle),
        Quit,
    }

    /// Engine double recording every call; clones share one call log
    #[derive(Clone, Default)]
    pub struct RecordingEngine {
        calls: Arc<Mutex<Vec<EngineCall>>>,
        fail_boot: bool,
        fail_add: bool,
        panic_add: bool,
        next_handle: u64,
    }

    impl RecordingEngine {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_boot() -> Self {
            Self {
                fail_boot: true,
                ..Self::default()
            }
        }

        pub fn failing_add() -> Self {
            Self {
                fail_add: true,
                ..Self::default()
            }
        }

        pub fn panicking_add() -> Self {
            Self {
                panic_add: true,
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<EngineCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn add_count(&self) -> usize {
            self.calls()
                .iter()
                .filter(|call| matches!(call, EngineCall::Add { .. }))
                .count()
        }

        fn record(&self, call: EngineCall) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl SoundEngine for RecordingEngine {
        fn boot(&mut self) -> Result<(), EngineError> {
            self.record(EngineCall::Boot);
            if self.fail_boot {
                return Err(EngineError::NoDevice);
            }
            Ok(())
        }

        fn load_instruments(&mut self, instruments: &[Instrument]) -> Result<(), EngineError> {
            self.record(EngineCall::Load(
                instruments.iter().map(|i| i.name.clone()).collect(),
            ));
            Ok(())
        }

        fn add_voice(
            &mut self,
            instrument: &Instrument,
            frequency: f64,
            amplitude: f64,
            placement: Placement,
        ) -> Result<VoiceHandle, EngineError> {
            if self.fail_add {
                return Err(EngineError::NotRunning);
            }
            if self.panic_add {
                panic!("voice allocation blew up");
            }
            self.next_handle += 1;
            let handle = VoiceHandle(self.next_handle);
            self.record(EngineCall::Add {
                handle,
                instrument: instrument.name.clone(),
                frequency,
                amplitude,
                placement,
            });
            Ok(handle)
        }

        fn free(&mut self, handle: VoiceHandle) {
            self.record(EngineCall::Free(handle));
        }

        fn quit(&mut self) -> Result<(), EngineError> {
            self.record(EngineCall::Quit);
            Ok(())
        }
    }
}
