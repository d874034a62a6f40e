//! Camera Capture Library for Dual-Camera Fusion
//!
//! Provides the grayscale frame sources consumed by the capture loops:
//! - Live V4L2 devices (behind the `v4l2` feature)
//! - Deterministic synthetic generators for development without hardware
//! - Exposure control for the exposure tuner

pub mod clock;
pub mod exposure;
pub mod frame;
pub mod source;
pub mod synthetic;

#[cfg(feature = "v4l2")]
pub mod device;

pub use exposure::{ExposureControl, ExposureError, RecordingExposure, V4l2Exposure};
pub use frame::GrayFrame;
pub use source::{FrameSource, SourceError};
pub use synthetic::{DynamicBarSource, StaticSource};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Camera identity. The system fuses exactly two sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraId {
    /// Primary camera; its mask selects where cam2 pixels are used
    Cam1,
    /// Secondary camera; supplies detail in cam1's saturated regions
    Cam2,
}

impl CameraId {
    /// Both cameras in fusion order
    pub const ALL: [CameraId; 2] = [CameraId::Cam1, CameraId::Cam2];

    pub fn as_str(&self) -> &'static str {
        match self {
            CameraId::Cam1 => "cam1",
            CameraId::Cam2 => "cam2",
        }
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CameraId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cam1" => Ok(CameraId::Cam1),
            "cam2" => Ok(CameraId::Cam2),
            other => Err(format!("unknown camera '{}', expected cam1 or cam2", other)),
        }
    }
}

/// Camera configuration
#[derive(Debug, Clone)]
pub struct CameraConfig {
    /// Which fusion input this camera feeds
    pub id: CameraId,
    /// Device path (e.g., "/dev/video0")
    pub device: String,
    /// Capture width
    pub width: u32,
    /// Capture height
    pub height: u32,
    /// Target FPS
    pub fps: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_id_parse() {
        assert_eq!("cam1".parse::<CameraId>().unwrap(), CameraId::Cam1);
        assert_eq!("CAM2".parse::<CameraId>().unwrap(), CameraId::Cam2);
        assert!("cam3".parse::<CameraId>().is_err());
        assert_eq!(CameraId::Cam2.to_string(), "cam2");
    }
}
