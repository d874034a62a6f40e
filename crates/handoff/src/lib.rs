//! Frame Hand-off Primitives
//!
//! Provides the coordination pieces shared by the capture, fusion and feeder
//! loops:
//! - [`LatestSlot`]: capacity-one cell where a publish replaces any unread value
//! - [`Doorbell`]: wakeup counter so consumers sleep until something new arrives
//! - [`StopToken`]: cooperative cancellation with interruptible sleeps

mod doorbell;
mod slot;
mod stop;

pub use doorbell::Doorbell;
pub use slot::{LatestSlot, Stamped};
pub use stop::StopToken;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a holder panicked.
///
/// Every critical section in this crate is a plain field swap, so a poisoned
/// lock never leaves the data half-updated.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
