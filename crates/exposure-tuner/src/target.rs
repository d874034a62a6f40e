//! The capture side of a sweep

use camera_capture::{CameraId, GrayFrame, SourceError};

/// A capture loop the tuner can pause and read from directly
pub trait TuningTarget {
    fn camera(&self) -> CameraId;

    /// Stop the loop pulling frames. A read already in flight may still land.
    ///
    /// Returns whether this call moved the loop from running to paused.
    fn pause(&self) -> bool;

    fn resume(&self) -> bool;

    /// Read one frame straight from the device while paused
    fn grab(&self) -> Result<GrayFrame, SourceError>;
}

/// Keeps a target paused for its lifetime.
///
/// Only the guard that actually paused the loop resumes it on drop, so a
/// loop paused by someone else stays paused.
pub struct PauseGuard<'a, T: TuningTarget + ?Sized> {
    target: &'a T,
    owned: bool,
}

impl<'a, T: TuningTarget + ?Sized> PauseGuard<'a, T> {
    pub fn new(target: &'a T) -> Self {
        let owned = target.pause();
        Self { target, owned }
    }

    /// Whether this guard made the pause and will undo it
    pub fn owns_pause(&self) -> bool {
        self.owned
    }
}

impl<T: TuningTarget + ?Sized> Drop for PauseGuard<'_, T> {
    fn drop(&mut self) {
        if self.owned {
            self.target.resume();
        }
    }
}
