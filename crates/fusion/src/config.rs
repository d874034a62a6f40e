//! Fusion configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How masked cam1 pixels are filled
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompositeMode {
    /// Take the cam2 pixel
    #[default]
    Replace,

    /// Weighted mix, `cam2_weight` in 0.0..=1.0
    Blend { cam2_weight: f32 },

    /// Fixed marker value
    Indicator { value: u8 },
}

/// Fusion configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Maximum capture time difference for a valid pair (ms)
    pub skew_tolerance_ms: u64,

    /// Horizontal offset: cam1 pixel x sees what cam2 sees at x - offset_x
    pub offset_x: i32,

    /// Vertical offset: cam1 pixel y sees what cam2 sees at y - offset_y
    pub offset_y: i32,

    pub mode: CompositeMode,

    /// Fill value outside the overlap
    pub pad_value: u8,

    /// Globally histogram-equalize the composite; off by default
    pub enhance: bool,

    pub cam1_color: [u8; 3],
    pub cam2_color: [u8; 3],

    /// Contour line width on the fused overlay
    pub line_width: u32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            skew_tolerance_ms: 50,
            offset_x: 0,
            offset_y: 0,
            mode: CompositeMode::Replace,
            pad_value: 128,
            enhance: false,
            cam1_color: saturation::CAM1_COLOR,
            cam2_color: saturation::CAM2_COLOR,
            line_width: 1,
        }
    }
}

impl FusionConfig {
    pub fn skew_tolerance(&self) -> Duration {
        Duration::from_millis(self.skew_tolerance_ms)
    }

    pub fn offset(&self) -> (i32, i32) {
        (self.offset_x, self.offset_y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FusionConfig::default();
        assert_eq!(config.skew_tolerance(), Duration::from_millis(50));
        assert_eq!(config.pad_value, 128);
        assert_eq!(config.mode, CompositeMode::Replace);
        assert_eq!(config.offset(), (0, 0));
    }
}
