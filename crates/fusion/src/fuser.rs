//! Pairing and compositing of one cam1/cam2 frame pair

use std::time::Duration;

use camera_capture::clock;
use image::imageops::{crop_imm, replace};
use image::{GrayImage, Luma, RgbImage};
use imageproc::contrast::equalize_histogram;
use imageproc::rect::Rect;
use saturation::extractor::promote;
use saturation::{draw_contours, AnnotatedFrame, Contour};

use crate::composite::composite;
use crate::config::FusionConfig;
use crate::geometry::overlap;
use crate::FusionError;

/// Fused result at cam1's full resolution
#[derive(Debug, Clone)]
pub struct FusionFrame {
    /// Composite inside the overlap, `pad_value` outside
    pub composite: GrayImage,
    /// Composite with both contour sets drawn
    pub overlay: RgbImage,
    /// cam1 contours clipped to the overlap (output coordinates)
    pub cam1_contours: Vec<Contour>,
    /// cam2 contours clipped to the overlap (output coordinates)
    pub cam2_contours: Vec<Contour>,
    /// Later of the two capture timestamps
    pub fused_at_ns: u64,
    pub cam1_timestamp_ns: u64,
    pub cam2_timestamp_ns: u64,
    pub skew: Duration,
    /// Overlap in output coordinates
    pub overlap: Rect,
}

impl FusionFrame {
    pub fn width(&self) -> u32 {
        self.composite.width()
    }

    pub fn height(&self) -> u32 {
        self.composite.height()
    }
}

/// Stateless frame-pair fuser
#[derive(Debug, Clone, Default)]
pub struct Fuser {
    config: FusionConfig,
}

impl Fuser {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Check the pair's timestamp skew against the tolerance
    pub fn check_sync(&self, cam1: &AnnotatedFrame, cam2: &AnnotatedFrame) -> Result<Duration, FusionError> {
        let skew = clock::skew(cam1.timestamp_ns(), cam2.timestamp_ns());
        let tolerance = self.config.skew_tolerance();
        if skew > tolerance {
            return Err(FusionError::SkewExceeded { skew, tolerance });
        }
        Ok(skew)
    }

    /// Fuse a synchronized pair
    pub fn fuse(&self, cam1: &AnnotatedFrame, cam2: &AnnotatedFrame) -> Result<FusionFrame, FusionError> {
        let skew = self.check_sync(cam1, cam2)?;

        let img1 = &cam1.frame.image;
        let img2 = &cam2.frame.image;
        let (dx, dy) = self.config.offset();
        let shared = overlap(img1.dimensions(), img2.dimensions(), (dx, dy))?;

        let trimmed1 = crop_rect(img1, shared.cam1);
        let trimmed2 = crop_rect(img2, shared.cam2);
        let mask1 = cam1
            .mask
            .crop(shared.cam1)
            .ok_or(FusionError::NoOverlap { dx, dy })?;

        let mut fused = composite(&trimmed1, &mask1, &trimmed2, self.config.mode);
        if self.config.enhance {
            fused = equalize_histogram(&fused);
        }

        let mut canvas = GrayImage::from_pixel(img1.width(), img1.height(), Luma([self.config.pad_value]));
        replace(&mut canvas, &fused, shared.cam1.left() as i64, shared.cam1.top() as i64);

        let cam1_contours: Vec<Contour> = cam1
            .contours
            .iter()
            .flat_map(|c| c.clip_to(shared.cam1))
            .collect();
        let cam2_contours: Vec<Contour> = cam2
            .contours
            .iter()
            .flat_map(|c| c.clip_to(shared.cam2))
            .map(|c| c.translate(dx, dy))
            .collect();

        let mut overlay = promote(&canvas);
        draw_contours(&mut overlay, &cam1_contours, self.config.cam1_color, self.config.line_width);
        draw_contours(&mut overlay, &cam2_contours, self.config.cam2_color, self.config.line_width);

        Ok(FusionFrame {
            composite: canvas,
            overlay,
            cam1_contours,
            cam2_contours,
            fused_at_ns: cam1.timestamp_ns().max(cam2.timestamp_ns()),
            cam1_timestamp_ns: cam1.timestamp_ns(),
            cam2_timestamp_ns: cam2.timestamp_ns(),
            skew,
            overlap: shared.cam1,
        })
    }
}

fn crop_rect(image: &GrayImage, rect: Rect) -> GrayImage {
    crop_imm(image, rect.left() as u32, rect.top() as u32, rect.width(), rect.height()).to_image()
}
