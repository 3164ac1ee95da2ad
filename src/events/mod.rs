//! Progress channel between the worker thread and the presentation thread
//!
//! Workers post [`WorkerMessage`]s in emission order; the single consumer
//! drains them whenever it likes. The channel never drops, merges or
//! reorders messages. Terminal values ([`SystemInfo`], [`RunOutcome`]) travel
//! on the same queue so they always arrive after the events of their run.

pub mod log;

use crate::detect::SystemInfo;
use crate::install::RunOutcome;
use std::fmt;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Overall progress moved; consumers may coalesce these
    Progress,
    /// A log line; consumers must show every one
    Log,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    /// Tag used in formatted log lines
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Success => "OK",
            Self::Warning => "WARN",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub kind: EventKind,
    /// Overall progress in percent, 0..=100
    pub fraction: f64,
    pub message: String,
    pub severity: Severity,
}

impl ProgressEvent {
    pub fn progress(fraction: f64, message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Progress,
            fraction: fraction.clamp(0.0, 100.0),
            message: message.into(),
            severity: Severity::Info,
        }
    }

    pub fn log(fraction: f64, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Log,
            fraction: fraction.clamp(0.0, 100.0),
            message: message.into(),
            severity,
        }
    }
}

/// Everything a worker hands to the presentation side
#[derive(Debug, Clone)]
pub enum WorkerMessage {
    Event(ProgressEvent),
    /// A probe run finished; the snapshot replaces any previous one
    ProbeFinished(SystemInfo),
    /// An install run reached a terminal state
    InstallFinished(RunOutcome),
}

/// Create a connected sender/receiver pair
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = channel();
    (ProgressSender { tx }, ProgressReceiver { rx })
}

/// Producer side, cloned into each worker
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: Sender<WorkerMessage>,
}

impl ProgressSender {
    /// Post a message; a consumer that went away is not an error for the worker
    pub fn send(&self, message: WorkerMessage) {
        let _ = self.tx.send(message);
    }
}

/// Consumer side, owned by the presentation thread
#[derive(Debug)]
pub struct ProgressReceiver {
    rx: Receiver<WorkerMessage>,
}

impl ProgressReceiver {
    /// Take every message queued so far without blocking
    pub fn drain(&self) -> Vec<WorkerMessage> {
        self.rx.try_iter().collect()
    }

    /// Wait up to `timeout` for the next message.
    ///
    /// Returns `None` on timeout or when every sender is gone.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<WorkerMessage> {
        match self.rx.recv_timeout(timeout) {
            Ok(msg) => Some(msg),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

/// Worker-side helper that remembers the current overall progress so log
/// events carry it too
#[derive(Debug, Clone)]
pub struct Reporter {
    sender: ProgressSender,
    fraction: f64,
}

impl Reporter {
    pub fn new(sender: ProgressSender) -> Self {
        Self {
            sender,
            fraction: 0.0,
        }
    }

    pub fn progress(&mut self, fraction: f64, message: impl Into<String>) {
        self.fraction = fraction.clamp(0.0, 100.0);
        self.sender.send(WorkerMessage::Event(ProgressEvent::progress(
            self.fraction,
            message,
        )));
    }

    pub fn log(&self, severity: Severity, message: impl Into<String>) {
        self.sender.send(WorkerMessage::Event(ProgressEvent::log(
            self.fraction,
            severity,
            message,
        )));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(Severity::Info, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.log(Severity::Success, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(Severity::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(Severity::Error, message);
    }

    pub fn finish(&self, message: WorkerMessage) {
        self.sender.send(message);
    }
}

/// Pull the events out of a batch of messages (test and rendering helper)
pub fn events_of(messages: &[WorkerMessage]) -> impl Iterator<Item = &ProgressEvent> {
    messages.iter().filter_map(|m| match m {
        WorkerMessage::Event(e) => Some(e),
        _ => None,
    })
}
