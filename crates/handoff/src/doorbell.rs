//! Wakeup counter shared between producers and a consumer

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::lock;

/// Monotonic ring counter with a blocking wait.
///
/// Producers call [`Doorbell::ring`] after publishing; a consumer remembers
/// the last count it handled and waits until the count moves past it. Several
/// slots may share one bell so a consumer can wait on "any input changed".
#[derive(Debug, Default)]
pub struct Doorbell {
    rings: Mutex<u64>,
    cond: Condvar,
}

impl Doorbell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the counter and wake all waiters
    pub fn ring(&self) {
        let mut rings = lock(&self.rings);
        *rings += 1;
        self.cond.notify_all();
    }

    /// Current ring count
    pub fn current(&self) -> u64 {
        *lock(&self.rings)
    }

    /// Block until the count exceeds `seen` or `timeout` elapses.
    ///
    /// Returns the count observed on wakeup (equal to `seen` on timeout).
    pub fn wait_past(&self, seen: u64, timeout: Duration) -> u64 {
        let deadline = Instant::now() + timeout;
        let mut rings = lock(&self.rings);
        while *rings <= seen {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            rings = match self.cond.wait_timeout(rings, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        *rings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_wait_times_out() {
        let bell = Doorbell::new();
        let start = Instant::now();
        assert_eq!(bell.wait_past(0, Duration::from_millis(20)), 0);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_wait_returns_immediately_when_already_past() {
        let bell = Doorbell::new();
        bell.ring();
        bell.ring();
        assert_eq!(bell.wait_past(1, Duration::from_secs(5)), 2);
    }

    #[test]
    fn test_ring_wakes_waiter() {
        let bell = Arc::new(Doorbell::new());
        let waiter = {
            let bell = bell.clone();
            thread::spawn(move || bell.wait_past(0, Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(10));
        bell.ring();
        assert_eq!(waiter.join().unwrap(), 1);
    }
}
