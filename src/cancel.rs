//! Cooperative cancellation for a sequencer run.
//!
//! A run owns a [`CancelToken`] and waits on it at every suspension point;
//! the controlling side keeps the matching [`CancelSource`]. Cancelling
//! drops the only sender, which disconnects every clone of the token's
//! receiver and wakes any wait in progress.

use crossbeam_channel::{after, select, unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// How a wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// The requested delay ran out
    Elapsed,
    /// The awaited signal arrived (or its sender went away)
    Completed,
    /// The bound expired before the signal arrived
    TimedOut,
    Cancelled,
}

#[derive(Debug)]
pub struct CancelSource {
    cancelled: Arc<AtomicBool>,
    wake: Mutex<Option<Sender<()>>>,
}

#[derive(Debug, Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    wake: Receiver<()>,
}

pub fn cancel_pair() -> (CancelSource, CancelToken) {
    let (tx, rx) = unbounded();
    let cancelled = Arc::new(AtomicBool::new(false));
    (
        CancelSource {
            cancelled: Arc::clone(&cancelled),
            wake: Mutex::new(Some(tx)),
        },
        CancelToken {
            cancelled,
            wake: rx,
        },
    )
}

impl CancelSource {
    /// Idempotent
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        drop(
            self.wake
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
    }
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sleep for `delay` unless cancelled first
    pub fn sleep(&self, delay: Duration) -> Wait {
        if self.is_cancelled() {
            return Wait::Cancelled;
        }
        select! {
            recv(self.wake) -> _ => Wait::Cancelled,
            recv(after(delay)) -> _ => self.settle(Wait::Elapsed),
        }
    }

    /// Wait for `done` to fire, giving up after `bound`
    pub fn wait_for(&self, done: &Receiver<()>, bound: Duration) -> Wait {
        if self.is_cancelled() {
            return Wait::Cancelled;
        }
        select! {
            recv(self.wake) -> _ => Wait::Cancelled,
            recv(done) -> _ => self.settle(Wait::Completed),
            recv(after(bound)) -> _ => self.settle(Wait::TimedOut),
        }
    }

    // select! picks randomly among ready operations, so a cancel racing a
    // timer must still win.
    fn settle(&self, outcome: Wait) -> Wait {
        if self.is_cancelled() {
            Wait::Cancelled
        } else {
            outcome
        }
    }
}
