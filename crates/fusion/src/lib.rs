//! Dual-Camera Fusion
//!
//! Pairs the latest annotated frames of two cameras and fuses them:
//! - synchronization by capture timestamp skew
//! - trim to the overlapping region under a fixed integer offset
//! - composite using cam1's saturation mask
//! - overlay of both contour sets, re-padded to cam1's resolution
//!
//! [`Fuser`] is the pure pairing/compositing step; [`FusionStage`] drives it
//! from the hand-off slots on its own thread.

pub mod composite;
pub mod config;
pub mod fuser;
pub mod geometry;
pub mod stage;

pub use composite::composite;
pub use config::{CompositeMode, FusionConfig};
pub use fuser::{FusionFrame, Fuser};
pub use geometry::{overlap, Overlap};
pub use stage::{FusionStage, FusionStats, Step};

use std::time::Duration;
use thiserror::Error;

/// Reasons a camera pair produces no fusion frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FusionError {
    #[error("Timestamp skew {skew:?} exceeds tolerance {tolerance:?}")]
    SkewExceeded { skew: Duration, tolerance: Duration },

    #[error("Resolution mismatch: cam1 {cam1:?}, cam2 {cam2:?}")]
    GeometryMismatch { cam1: (u32, u32), cam2: (u32, u32) },

    #[error("No overlap between cameras at offset ({dx}, {dy})")]
    NoOverlap { dx: i32, dy: i32 },
}

impl FusionError {
    /// Short label for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            FusionError::SkewExceeded { .. } => "skew",
            FusionError::GeometryMismatch { .. } => "geometry",
            FusionError::NoOverlap { .. } => "no_overlap",
        }
    }
}
