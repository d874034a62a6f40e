//! Frame source abstraction

use crate::GrayFrame;
use thiserror::Error;

/// Frame source error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// A single bad read; the next call may succeed
    #[error("Transient capture failure: {0}")]
    Transient(String),

    /// The device is gone (removed, closed, exhausted)
    #[error("Frame source unavailable: {0}")]
    Unavailable(String),
}

/// Produces the next grayscale image and its capture timestamp.
///
/// Implementations block until a frame is available. Live devices and
/// synthetic generators are interchangeable behind this trait.
pub trait FrameSource: Send {
    /// Pull the next frame
    fn next_frame(&mut self) -> Result<GrayFrame, SourceError>;

    /// Short human-readable description for logs
    fn describe(&self) -> String;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<GrayFrame, SourceError> {
        (**self).next_frame()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
