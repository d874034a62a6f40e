//! Frame → mask, contours and overlay

use camera_capture::{CameraId, GrayFrame};
use image::{DynamicImage, GrayImage, RgbImage};
use tracing::trace;

use crate::config::ExtractorConfig;
use crate::contour::{draw_contours, outer_contours, Contour};
use crate::mask::Mask;

/// Result of analysing one image
#[derive(Debug, Clone)]
pub struct Extraction {
    pub mask: Mask,
    /// Outer contours in raster order of their first point
    pub contours: Vec<Contour>,
    /// Input promoted to RGB with the contours drawn on top
    pub overlay: RgbImage,
}

/// A captured frame together with its analysis
#[derive(Debug, Clone)]
pub struct AnnotatedFrame {
    pub camera: CameraId,
    pub frame: GrayFrame,
    pub mask: Mask,
    pub contours: Vec<Contour>,
    pub overlay: RgbImage,
    /// Fraction of saturated pixels
    pub coverage: f64,
}

impl AnnotatedFrame {
    pub fn timestamp_ns(&self) -> u64 {
        self.frame.timestamp_ns
    }

    pub fn sequence(&self) -> u64 {
        self.frame.sequence
    }
}

/// Stateless saturation extractor
#[derive(Debug, Clone, Default)]
pub struct SaturationExtractor {
    config: ExtractorConfig,
}

impl SaturationExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Threshold, trace outer contours and draw the overlay
    pub fn extract(&self, image: &GrayImage) -> Extraction {
        let mask = Mask::from_threshold(image, self.config.threshold);
        let contours = outer_contours(mask.as_image());
        let mut overlay = promote(image);
        draw_contours(&mut overlay, &contours, self.config.overlay_color, self.config.line_width);

        Extraction {
            mask,
            contours,
            overlay,
        }
    }

    /// Analyse a captured frame from `camera`
    pub fn annotate(&self, camera: CameraId, frame: GrayFrame) -> AnnotatedFrame {
        let Extraction {
            mask,
            contours,
            overlay,
        } = self.extract(&frame.image);
        let coverage = mask.coverage();

        trace!(
            camera = %camera,
            sequence = frame.sequence,
            contours = contours.len(),
            coverage,
            "Frame annotated"
        );

        AnnotatedFrame {
            camera,
            frame,
            mask,
            contours,
            overlay,
            coverage,
        }
    }
}

/// Gray → RGB with all three channels equal
pub fn promote(image: &GrayImage) -> RgbImage {
    DynamicImage::ImageLuma8(image.clone()).to_rgb8()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};
    use imageproc::rect::Rect;
    use proptest::prelude::*;

    #[test]
    fn test_all_dark_frame() {
        let image = GrayImage::from_pixel(32, 24, Luma([30]));
        let out = SaturationExtractor::default().extract(&image);
        assert_eq!(out.mask.count_set(), 0);
        assert!(out.contours.is_empty());
        assert_eq!(out.overlay, promote(&image));
        assert_eq!(out.overlay.get_pixel(5, 5), &Rgb([30, 30, 30]));
    }

    #[test]
    fn test_all_saturated_frame() {
        let image = GrayImage::from_pixel(32, 24, Luma([250]));
        let out = SaturationExtractor::default().extract(&image);
        assert_eq!(out.mask.count_set(), 32 * 24);
        assert_eq!(out.contours.len(), 1);
        assert_eq!(out.contours[0].bounding_box(), Some(Rect::at(0, 0).of_size(32, 24)));
        assert_eq!(out.overlay.get_pixel(0, 10), &Rgb(crate::CAM1_COLOR));
    }

    #[test]
    fn test_glare_on_left_and_right_edges() {
        let image = GrayImage::from_fn(20, 10, |x, y| {
            let left = x < 5 && (3..7).contains(&y);
            let right = x >= 15 && (3..7).contains(&y);
            Luma([if left || right { 255 } else { 40 }])
        });
        let out = SaturationExtractor::default().extract(&image);
        assert_eq!(out.mask.count_set(), 40);
        assert_eq!(out.contours.len(), 2);
        let boxes: Vec<_> = out.contours.iter().filter_map(Contour::bounding_box).collect();
        assert!(boxes.contains(&Rect::at(0, 3).of_size(5, 4)));
        assert!(boxes.contains(&Rect::at(15, 3).of_size(5, 4)));
        assert_eq!(out.overlay.get_pixel(0, 4), &Rgb(crate::CAM1_COLOR));
    }

    #[test]
    fn test_ring_with_island_reports_outer_only() {
        let image = GrayImage::from_fn(40, 40, |x, y| {
            let ring = (5..35).contains(&x) && (5..35).contains(&y);
            let hole = (12..28).contains(&x) && (12..28).contains(&y);
            let island = (18..22).contains(&x) && (18..22).contains(&y);
            Luma([if (ring && !hole) || island { 255 } else { 0 }])
        });
        let out = SaturationExtractor::default().extract(&image);
        assert_eq!(out.contours.len(), 1);
        assert_eq!(out.contours[0].bounding_box(), Some(Rect::at(5, 5).of_size(30, 30)));
    }

    #[test]
    fn test_annotate_keeps_frame_metadata() {
        let frame = GrayFrame::new(GrayImage::from_pixel(8, 8, Luma([255])), 1_234, 7);
        let annotated = SaturationExtractor::default().annotate(CameraId::Cam2, frame);
        assert_eq!(annotated.camera, CameraId::Cam2);
        assert_eq!(annotated.timestamp_ns(), 1_234);
        assert_eq!(annotated.sequence(), 7);
        assert!((annotated.coverage - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_overlay_color_from_config() {
        let config = ExtractorConfig {
            overlay_color: crate::CAM2_COLOR,
            line_width: 1,
            ..Default::default()
        };
        let image = GrayImage::from_fn(16, 16, |x, y| {
            Luma([if (4..10).contains(&x) && (4..10).contains(&y) { 255 } else { 0 }])
        });
        let out = SaturationExtractor::new(config).extract(&image);
        assert_eq!(out.overlay.get_pixel(4, 6), &Rgb(crate::CAM2_COLOR));
        assert_eq!(out.overlay.get_pixel(6, 6), &Rgb([255, 255, 255]));
        assert_eq!(out.overlay.get_pixel(1, 1), &Rgb([0, 0, 0]));
    }

    proptest! {
        #[test]
        fn prop_mask_matches_threshold(
            data in proptest::collection::vec(any::<u8>(), 12 * 9),
            threshold in any::<u8>(),
        ) {
            let image = GrayImage::from_raw(12, 9, data.clone()).unwrap();
            let out = SaturationExtractor::new(ExtractorConfig::with_threshold(threshold)).extract(&image);
            let expected = data.iter().filter(|&&v| v >= threshold).count();
            prop_assert_eq!(out.mask.count_set(), expected);
        }

        #[test]
        fn prop_contour_points_lie_on_mask(
            data in proptest::collection::vec(any::<bool>(), 10 * 10),
        ) {
            let image = GrayImage::from_raw(10, 10, data.iter().map(|&b| if b { 255 } else { 0 }).collect()).unwrap();
            let out = SaturationExtractor::default().extract(&image);
            for contour in &out.contours {
                for p in contour.points() {
                    prop_assert!(out.mask.get(p.x as u32, p.y as u32));
                }
            }
        }
    }
}
