//! Saturation Analysis
//!
//! Turns a grayscale frame into:
//! - a binary saturation mask (pixels at or above a brightness threshold)
//! - the outer contours of the saturated regions
//! - an RGB overlay with the contours drawn on the frame

pub mod config;
pub mod contour;
pub mod extractor;
pub mod mask;

pub use config::ExtractorConfig;
pub use contour::{draw_contours, Contour};
pub use extractor::{AnnotatedFrame, Extraction, SaturationExtractor};
pub use mask::Mask;

/// Overlay color for cam1 contours (blue)
pub const CAM1_COLOR: [u8; 3] = [0, 0, 255];
/// Overlay color for cam2 contours (red)
pub const CAM2_COLOR: [u8; 3] = [255, 0, 0];
