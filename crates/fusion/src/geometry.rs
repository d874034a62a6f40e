//! Overlap between the two camera extents

use imageproc::rect::Rect;

use crate::FusionError;

/// The shared scene region in each camera's pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overlap {
    pub cam1: Rect,
    pub cam2: Rect,
}

impl Overlap {
    pub fn width(&self) -> u32 {
        self.cam1.width()
    }

    pub fn height(&self) -> u32 {
        self.cam1.height()
    }
}

/// Intersect cam1's extent with cam2's extent shifted by `offset`.
///
/// Scene point at cam1 pixel (x, y) is at cam2 pixel (x - dx, y - dy).
pub fn overlap(cam1: (u32, u32), cam2: (u32, u32), offset: (i32, i32)) -> Result<Overlap, FusionError> {
    if cam1 != cam2 {
        return Err(FusionError::GeometryMismatch { cam1, cam2 });
    }
    let (dx, dy) = offset;
    let (width, height) = cam1;
    if width == 0 || height == 0 || dx.unsigned_abs() >= width || dy.unsigned_abs() >= height {
        return Err(FusionError::NoOverlap { dx, dy });
    }

    let extent1 = Rect::at(0, 0).of_size(width, height);
    let extent2 = Rect::at(dx, dy).of_size(width, height);
    let shared = extent1
        .intersect(extent2)
        .ok_or(FusionError::NoOverlap { dx, dy })?;

    Ok(Overlap {
        cam1: shared,
        cam2: Rect::at(shared.left() - dx, shared.top() - dy).of_size(shared.width(), shared.height()),
    })
}
