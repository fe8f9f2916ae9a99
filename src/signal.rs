//! Cooperative stop signaling.
//!
//! Every long-lived suspension point in a flow races against its endpoint's
//! [`StopSignal`] so that shutdown is observed even while the flow is blocked
//! in a queue wait or a transport read.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// A set-once stop flag that blocked tasks can wait on.
///
/// Cloning yields another handle to the same signal.
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the signal and wakes every waiter. Idempotent.
    pub fn set(&self) {
        if !self.inner.stopped.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    /// Returns true once [`set`](Self::set) has been called.
    pub fn is_set(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Resolves once the signal is set. Resolves immediately if already set.
    pub async fn wait(&self) {
        // Register interest before checking the flag so a concurrent set()
        // between the check and the await cannot be missed.
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        loop {
            notified.as_mut().enable();
            if self.is_set() {
                return;
            }
            notified.as_mut().await;
            notified.set(self.inner.notify.notified());
        }
    }

    /// Runs `op` against the stop signal: `Some(output)` if the operation
    /// completes first, `None` if stop wins. On a stop win the pending
    /// operation is dropped (cancelled) so control returns promptly.
    pub async fn race<F: Future>(&self, op: F) -> Option<F::Output> {
        tokio::select! {
            // Prefer completed work over a simultaneous stop.
            biased;
            out = op => Some(out),
            _ = self.wait() => None,
        }
    }
}
