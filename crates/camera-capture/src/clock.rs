//! Monotonic capture clock
//!
//! All frame timestamps are nanoseconds since a single process-wide epoch so
//! that frames from independently clocked cameras can be compared for skew.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Nanoseconds elapsed since the first call in this process
pub fn monotonic_ns() -> u64 {
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_nanos() as u64
}

/// Absolute difference between two timestamps
pub fn skew(a_ns: u64, b_ns: u64) -> Duration {
    Duration::from_nanos(a_ns.abs_diff(b_ns))
}

/// Convert milliseconds to the clock's nanosecond unit
pub const fn ms_to_ns(ms: u64) -> u64 {
    ms * 1_000_000
}
