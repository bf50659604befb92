//! Cross-thread delivery.
//!
//! Listener threads hold a [`CommandSink`] and never touch the registry.
//! Commands travel through one FIFO mailbox into the control thread, which
//! applies them with [`pump`] and forwards the resulting notifications to the
//! UI through a [`Notifier`]. Every step is a non-blocking channel send, so a
//! producer never waits for its command to be applied.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use crate::engine::{EngineError, SoundEngine};
use crate::types::command::Command;
use crate::voice::{Notification, VoiceRegistry};

/// Messages in the control thread's mailbox
#[derive(Debug)]
pub enum Mail {
    Command { seq: u64, command: Command },
    /// Tear down: free all voices, settle, quit the engine
    Shutdown { settle: Duration },
}

/// Producer-side handle; cheap to clone into listener callbacks
#[derive(Clone)]
pub struct CommandSink {
    mail: Sender<Mail>,
    open: Arc<AtomicBool>,
    seq: Arc<AtomicU64>,
}

impl CommandSink {
    /// Enqueue a command without blocking. Returns false when the intake has
    /// been closed for shutdown and the command was dropped.
    pub fn send(&self, command: Command) -> bool {
        if !self.open.load(Ordering::Acquire) {
            debug!(?command, "intake closed, command dropped");
            return false;
        }
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        trace!(seq, ?command, "enqueued");
        self.mail.send(Mail::Command { seq, command }).is_ok()
    }
}

/// Owner of the mailbox's sending side and of the intake gate
pub struct Dispatcher {
    mail: Sender<Mail>,
    open: Arc<AtomicBool>,
    seq: Arc<AtomicU64>,
}

/// Receiving side of the mailbox, moved into the control thread
pub struct Inbox {
    mail: Receiver<Mail>,
}

impl Dispatcher {
    pub fn new() -> (Self, Inbox) {
        let (mail_tx, mail_rx) = unbounded();
        let dispatcher = Self {
            mail: mail_tx,
            open: Arc::new(AtomicBool::new(true)),
            seq: Arc::new(AtomicU64::new(0)),
        };
        (dispatcher, Inbox { mail: mail_rx })
    }

    pub fn sink(&self) -> CommandSink {
        CommandSink {
            mail: self.mail.clone(),
            open: Arc::clone(&self.open),
            seq: Arc::clone(&self.seq),
        }
    }

    /// Stop accepting commands from every sink; already queued mail stays
    pub fn close_intake(&self) {
        self.open.store(false, Ordering::Release);
        debug!("command intake closed");
    }

    #[cfg(test)]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Queue the teardown request behind everything already enqueued
    pub fn request_shutdown(&self, settle: Duration) -> bool {
        self.mail.send(Mail::Shutdown { settle }).is_ok()
    }
}

/// Observer-side sender; the UI drains the matching receiver on its own loop
#[derive(Clone)]
pub struct Notifier {
    tx: Sender<Notification>,
}

impl Notifier {
    pub fn notify(&self, notification: Notification) {
        // The UI may already be gone during teardown
        let _ = self.tx.send(notification);
    }

    pub fn status(&self, text: impl Into<String>) {
        self.notify(Notification::status(text));
    }
}

pub fn notification_channel() -> (Notifier, Receiver<Notification>) {
    let (tx, rx) = unbounded();
    (Notifier { tx }, rx)
}

/// Why [`pump`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    Shutdown { settle: Duration },
    /// Every sender is gone; nothing more can arrive
    Disconnected,
}

/// Deliver mail to the registry in FIFO order until shutdown is requested.
/// An engine failure stops delivery and is returned to the caller.
pub fn pump<E: SoundEngine>(
    registry: &mut VoiceRegistry<E>,
    inbox: &Inbox,
    notifier: &Notifier,
) -> Result<PumpExit, EngineError> {
    while let Ok(mail) = inbox.mail.recv() {
        match mail {
            Mail::Command { seq, command } => {
                trace!(seq, "delivered");
                if let Some(notification) = registry.apply(command)? {
                    notifier.notify(notification);
                }
                trace!(seq, "applied");
            }
            Mail::Shutdown { settle } => return Ok(PumpExit::Shutdown { settle }),
        }
    }
    Ok(PumpExit::Disconnected)
}

/// Discard commands until shutdown is requested; used after an engine fault
pub fn drain_until_shutdown(inbox: &Inbox) -> PumpExit {
    while let Ok(mail) = inbox.mail.recv() {
        if let Mail::Shutdown { settle } = mail {
            return PumpExit::Shutdown { settle };
        }
    }
    PumpExit::Disconnected
}
