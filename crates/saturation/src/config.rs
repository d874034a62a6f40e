//! Extractor configuration

use serde::{Deserialize, Serialize};

/// Extractor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Pixels at or above this value are saturated
    pub threshold: u8,

    /// Contour color on the overlay (RGB)
    pub overlay_color: [u8; 3],

    /// Contour line width on the overlay (pixels)
    pub line_width: u32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            threshold: 240,
            overlay_color: crate::CAM1_COLOR,
            line_width: 2,
        }
    }
}

impl ExtractorConfig {
    pub fn with_threshold(threshold: u8) -> Self {
        Self {
            threshold,
            ..Default::default()
        }
    }
}
