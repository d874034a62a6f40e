//! Cooperative cancellation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::lock;

#[derive(Debug, Default)]
struct Inner {
    stopped: AtomicBool,
    gate: Mutex<()>,
    cond: Condvar,
}

/// Shared stop signal, polled by every loop once per iteration.
///
/// Clones observe the same signal. Sleeping through [`StopToken::sleep`]
/// returns early as soon as the token is stopped.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    inner: Arc<Inner>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request stop; idempotent
    pub fn stop(&self) {
        let _gate = lock(&self.inner.gate);
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.cond.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless stopped first.
    ///
    /// Returns `true` if the token is stopped.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut gate = lock(&self.inner.gate);
        while !self.is_stopped() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            gate = match self.inner.cond.wait_timeout(gate, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        self.is_stopped()
    }
}
