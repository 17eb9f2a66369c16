//! Cooperative cancellation shared between the coordinator and one writer.

use core::time::Duration;
use std::{
    sync::{Arc, Condvar, Mutex, PoisonError},
    time::Instant,
};

use portable_atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
struct Inner {
    stopped: AtomicBool,
    // Sleepers wait on this; the bool mirrors `stopped` under the lock.
    wake: Mutex<bool>,
    condvar: Condvar,
}

/// A one-way stop flag a writer polls at its loop boundaries.
///
/// Cloning shares the flag. Once stopped, a signal stays stopped.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<Inner>);

impl StopSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the writer to stop and wake it if it is sleeping.
    pub fn stop(&self) {
        self.0.stopped.store(true, Ordering::Release);
        let mut stopped = self.0.wake.lock().unwrap_or_else(PoisonError::into_inner);
        *stopped = true;
        self.0.condvar.notify_all();
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.stopped.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.is_stopped()
    }

    /// Sleep for `duration` or until stopped, whichever comes first.
    ///
    /// Returns `true` if the full duration elapsed while still running.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now().checked_add(duration);
        let mut stopped = self.0.wake.lock().unwrap_or_else(PoisonError::into_inner);
        while !*stopped {
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => duration,
            };
            if remaining.is_zero() {
                return true;
            }
            stopped = self
                .0
                .condvar
                .wait_timeout(stopped, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        false
    }
}
