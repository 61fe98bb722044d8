// =============================================================================
// Shutdown Signal — one-shot cancellation flag with async notification
// =============================================================================
//
// Triggering only sets a flag, records the reason and wakes waiters.  The
// actual drain happens through the queues: the pipeline context closes the
// ingest queue alongside the trigger and each stage exits once it dequeues
// `Closed`.
// =============================================================================

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Why the pipeline began shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// External interrupt (Ctrl+C).
    Interrupt,
    /// The configured run-time limit elapsed.
    HourLimit,
    /// A worker hit a fatal I/O error.
    WorkerFailure,
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interrupt => write!(f, "interrupt"),
            Self::HourLimit => write!(f, "hour limit reached"),
            Self::WorkerFailure => write!(f, "worker failure"),
        }
    }
}

#[derive(Debug, Default)]
pub struct ShutdownSignal {
    triggered: AtomicBool,
    reason: Mutex<Option<ShutdownReason>>,
    notify: Notify,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag and wake every waiter.  Returns `true` for the first
    /// trigger only; later reasons are ignored.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let first = !self.triggered.swap(true, Ordering::AcqRel);
        if first {
            *self.reason.lock() = Some(reason);
        }
        self.notify.notify_waiters();
        first
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.reason.lock()
    }

    /// Resolve once the signal has been triggered.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}
