//! Mask-guided compositing

use image::{GrayImage, Luma};
use saturation::Mask;

use crate::config::CompositeMode;

/// Fill cam1's saturated pixels from cam2.
///
/// All three inputs cover the same trimmed region. Unmasked pixels keep the
/// cam1 value.
pub fn composite(cam1: &GrayImage, mask: &Mask, cam2: &GrayImage, mode: CompositeMode) -> GrayImage {
    GrayImage::from_fn(cam1.width(), cam1.height(), |x, y| {
        let base = cam1.get_pixel(x, y).0[0];
        if !mask.get(x, y) {
            return Luma([base]);
        }
        let other = cam2.get_pixel_checked(x, y).map(|p| p.0[0]).unwrap_or(base);
        Luma([fill(base, other, mode)])
    })
}

fn fill(base: u8, other: u8, mode: CompositeMode) -> u8 {
    match mode {
        CompositeMode::Replace => other,
        CompositeMode::Blend { cam2_weight } => {
            let w = cam2_weight.clamp(0.0, 1.0);
            (base as f32 * (1.0 - w) + other as f32 * w).round().clamp(0.0, 255.0) as u8
        }
        CompositeMode::Indicator { value } => value,
    }
}
