//! Engine boot and teardown sequencing.
//!
//! ```text
//! Idle -> EngineBooting -> Ready -> ShuttingDown -> Stopped
//!              \-----------(boot failed)----------> Stopped
//! ```
//!
//! The control thread owns the engine and the voice registry for their
//! whole life. It reports back to the coordinator over an event channel
//! instead of callbacks.

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::dispatch::{self, Dispatcher, Inbox, Notifier, PumpExit};
use crate::engine::{EngineError, Instrument, Placement, SoundEngine};
use crate::input::{InputAdapter, InputError};
use crate::tuning::Tuning;
use crate::voice::{Notification, VoiceRegistry};

/// Fade-out budget between releasing every voice and quitting the engine
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    EngineBooting,
    Ready,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::EngineBooting => "booting",
            LifecycleState::Ready => "ready",
            LifecycleState::ShuttingDown => "shutting down",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// Reports from the control thread
#[derive(Debug)]
pub enum LifecycleEvent {
    /// Engine booted and instruments confirmed loaded
    Booted,
    BootFailed(EngineError),
    /// The engine rejected a request while running
    Faulted(EngineError),
    /// Command delivery panicked; the thread stays up only to tear down
    Panicked(String),
    /// Engine quit finished, successfully or not
    Quit(Result<(), EngineError>),
}

#[derive(thiserror::Error, Debug)]
pub enum LifecycleError {
    #[error("audio engine failed to boot: {0}")]
    Boot(#[source] EngineError),
    #[error("audio engine failed while running: {0}")]
    Engine(#[source] EngineError),
    #[error("failed to quit audio engine: {0}")]
    Quit(#[source] EngineError),
    #[error("failed to start {name}: {source}")]
    Listener {
        name: String,
        #[source]
        source: InputError,
    },
    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: LifecycleState,
    },
    #[error("engine control thread panicked: {0}")]
    ControlPanicked(String),
    #[error("control thread exited unexpectedly")]
    ControlThreadLost,
}

/// What the control thread needs to build the registry once the engine is up
pub struct Session {
    pub instruments: Vec<Instrument>,
    pub initial_instrument: String,
    pub tuning: Tuning,
    pub placement: Placement,
}

pub struct Coordinator {
    state: LifecycleState,
    dispatcher: Dispatcher,
    inbox: Option<Inbox>,
    notifier: Notifier,
    events_tx: Option<Sender<LifecycleEvent>>,
    events_rx: Receiver<LifecycleEvent>,
    control: Option<JoinHandle<()>>,
    listeners: Vec<Box<dyn InputAdapter>>,
    settle: Duration,
}

impl Coordinator {
    pub fn new(dispatcher: Dispatcher, inbox: Inbox, notifier: Notifier, settle: Duration) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            state: LifecycleState::Idle,
            dispatcher,
            inbox: Some(inbox),
            notifier,
            events_tx: Some(events_tx),
            events_rx,
            control: None,
            listeners: Vec::new(),
            settle,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    fn transition(&mut self, next: LifecycleState) {
        info!(from = %self.state, to = %next, "lifecycle");
        self.state = next;
        self.notifier.status(format!("Engine {}", next));
    }

    /// Spawn the control thread, boot the engine and load instruments.
    /// Returns once the engine confirmed both, or failed.
    ///
    /// `make_engine` runs on the control thread so engines holding
    /// thread-bound resources never cross threads.
    pub fn boot<E, F>(&mut self, make_engine: F, session: Session) -> Result<(), LifecycleError>
    where
        E: SoundEngine + 'static,
        F: FnOnce() -> E + Send + 'static,
    {
        if self.state != LifecycleState::Idle {
            return Err(LifecycleError::InvalidState {
                action: "boot",
                state: self.state,
            });
        }
        // Only the control thread holds the sender, so its exit disconnects us
        let (Some(inbox), Some(events)) = (self.inbox.take(), self.events_tx.take()) else {
            return Err(LifecycleError::ControlThreadLost);
        };

        self.transition(LifecycleState::EngineBooting);

        let notifier = self.notifier.clone();
        let handle = thread::Builder::new()
            .name("engine-control".to_string())
            .spawn(move || control_thread(make_engine, session, inbox, notifier, events));
        let handle = match handle {
            Ok(handle) => handle,
            Err(err) => {
                let err = EngineError::Backend(format!("failed to spawn engine control thread: {}", err));
                return Err(self.boot_failed(err));
            }
        };
        self.control = Some(handle);

        match self.events_rx.recv() {
            Ok(LifecycleEvent::Booted) => {
                self.transition(LifecycleState::Ready);
                Ok(())
            }
            Ok(LifecycleEvent::BootFailed(err)) => Err(self.boot_failed(err)),
            Ok(other) => {
                warn!(?other, "unexpected event during boot");
                self.abandon_control();
                Err(LifecycleError::ControlThreadLost)
            }
            Err(_) => {
                self.abandon_control();
                Err(LifecycleError::ControlThreadLost)
            }
        }
    }

    /// Every boot failure ends in Stopped
    fn boot_failed(&mut self, err: EngineError) -> LifecycleError {
        error!("engine boot failed: {}", err);
        self.notifier.status(format!("Engine boot failed: {}", err));
        self.abandon_control();
        LifecycleError::Boot(err)
    }

    /// Start listeners; only allowed once the engine is ready
    pub fn start_listeners(&mut self, adapters: Vec<Box<dyn InputAdapter>>) -> Result<(), LifecycleError> {
        if self.state != LifecycleState::Ready {
            return Err(LifecycleError::InvalidState {
                action: "start listeners",
                state: self.state,
            });
        }
        for mut adapter in adapters {
            adapter
                .listen(self.dispatcher.sink())
                .map_err(|source| LifecycleError::Listener {
                    name: adapter.name().to_string(),
                    source,
                })?;
            self.notifier.status(format!("Listening for {} events", adapter.name()));
            self.listeners.push(adapter);
        }
        Ok(())
    }

    /// Non-blocking check for an engine fault reported while running.
    /// A control thread that vanished is a fault too; the coordinator is
    /// stopped by the time it is returned.
    pub fn poll_fault(&mut self) -> Option<LifecycleError> {
        match self.events_rx.try_recv() {
            Ok(LifecycleEvent::Faulted(err)) => Some(LifecycleError::Engine(err)),
            Ok(LifecycleEvent::Panicked(message)) => Some(LifecycleError::ControlPanicked(message)),
            Ok(other) => {
                warn!(?other, "unexpected lifecycle event");
                None
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                if self.state != LifecycleState::Ready {
                    return None;
                }
                error!("engine control thread is gone");
                self.notifier.status("Engine control thread exited unexpectedly");
                self.stop_after_loss();
                Some(LifecycleError::ControlThreadLost)
            }
        }
    }

    /// Release everything after the control thread disappeared
    fn stop_after_loss(&mut self) {
        self.transition(LifecycleState::ShuttingDown);
        for listener in &mut self.listeners {
            listener.stop();
        }
        self.dispatcher.close_intake();
        // Still running but deaf to us: ask it to finish so the join returns
        self.dispatcher.request_shutdown(Duration::ZERO);
        self.listeners.clear();
        self.abandon_control();
    }

    /// Tear down in strict order: stop listeners, close the intake, free all
    /// voices, settle, quit the engine, then release listener resources.
    pub fn shutdown(&mut self) -> Result<(), LifecycleError> {
        if self.state != LifecycleState::Ready {
            return Err(LifecycleError::InvalidState {
                action: "shut down",
                state: self.state,
            });
        }
        self.transition(LifecycleState::ShuttingDown);

        for listener in &mut self.listeners {
            listener.stop();
            self.notifier.status(format!("Stopped listening for {} events", listener.name()));
        }
        self.dispatcher.close_intake();

        if !self.dispatcher.request_shutdown(self.settle) {
            self.abandon_control();
            self.listeners.clear();
            return Err(LifecycleError::ControlThreadLost);
        }

        let result = loop {
            match self.events_rx.recv() {
                Ok(LifecycleEvent::Quit(result)) => break result.map_err(LifecycleError::Quit),
                // A fault racing the shutdown request changes nothing here
                Ok(LifecycleEvent::Faulted(err)) => warn!("engine fault during shutdown: {}", err),
                Ok(LifecycleEvent::Panicked(message)) => warn!("control panic during shutdown: {}", message),
                Ok(other) => warn!(?other, "unexpected event during shutdown"),
                Err(_) => break Err(LifecycleError::ControlThreadLost),
            }
        };

        if let Some(handle) = self.control.take() {
            if handle.join().is_err() {
                error!("engine control thread panicked");
            }
        }
        self.listeners.clear();
        self.transition(LifecycleState::Stopped);
        result
    }

    fn abandon_control(&mut self) {
        if let Some(handle) = self.control.take() {
            if handle.join().is_err() {
                error!("engine control thread panicked");
            }
        }
        self.transition(LifecycleState::Stopped);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Body of the engine-control thread
fn control_thread<E, F>(
    make_engine: F,
    session: Session,
    inbox: Inbox,
    notifier: Notifier,
    events: Sender<LifecycleEvent>,
) where
    E: SoundEngine,
    F: FnOnce() -> E,
{
    let mut engine = make_engine();
    if let Err(err) = engine.boot() {
        let _ = events.send(LifecycleEvent::BootFailed(err));
        return;
    }
    if let Err(err) = engine.load_instruments(&session.instruments) {
        let _ = engine.quit();
        let _ = events.send(LifecycleEvent::BootFailed(err));
        return;
    }

    let mut registry = VoiceRegistry::new(engine, session.instruments, &session.initial_instrument, session.tuning)
        .with_placement(session.placement);
    notifier.notify(Notification::InstrumentChanged {
        name: registry.instrument().name.clone(),
    });
    notifier.notify(Notification::TuningChanged {
        name: registry.tuning().name(),
    });
    let _ = events.send(LifecycleEvent::Booted);

    let delivered = panic::catch_unwind(AssertUnwindSafe(|| dispatch::pump(&mut registry, &inbox, &notifier)));
    let exit = match delivered {
        Ok(Ok(exit)) => exit,
        Ok(Err(err)) => {
            error!("engine fault: {}", err);
            notifier.status(format!("Engine error: {}", err));
            let _ = events.send(LifecycleEvent::Faulted(err));
            dispatch::drain_until_shutdown(&inbox)
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("command delivery panicked: {}", message);
            notifier.status(format!("Engine control panicked: {}", message));
            let _ = events.send(LifecycleEvent::Panicked(message));
            dispatch::drain_until_shutdown(&inbox)
        }
    };
    let settle = match exit {
        PumpExit::Shutdown { settle } => settle,
        PumpExit::Disconnected => Duration::ZERO,
    };

    for notification in registry.free_all() {
        notifier.notify(notification);
    }
    thread::sleep(settle);
    let result = registry.engine_mut().quit();
    let _ = events.send(LifecycleEvent::Quit(result));
}
