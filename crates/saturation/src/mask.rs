//! Binary saturation mask

use image::GrayImage;
use imageproc::rect::Rect;

/// Stored value for a set mask pixel
pub const MASK_ON: u8 = 255;

/// Binary mask, stored as a grayscale image holding 0 or [`MASK_ON`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    image: GrayImage,
}

impl Mask {
    /// Threshold `image`: set where `pixel >= threshold`
    pub fn from_threshold(image: &GrayImage, threshold: u8) -> Self {
        let (width, height) = image.dimensions();
        let data = image
            .as_raw()
            .iter()
            .map(|&v| if v >= threshold { MASK_ON } else { 0 })
            .collect();
        Self {
            image: GrayImage::from_raw(width, height, data).unwrap_or_else(|| GrayImage::new(width, height)),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Whether (x, y) is set; out-of-bounds reads as clear
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.image
            .get_pixel_checked(x, y)
            .map(|p| p.0[0] != 0)
            .unwrap_or(false)
    }

    /// Number of set pixels
    pub fn count_set(&self) -> usize {
        self.image.as_raw().iter().filter(|&&v| v != 0).count()
    }

    /// Fraction of set pixels (0.0 to 1.0)
    pub fn coverage(&self) -> f64 {
        let total = self.image.as_raw().len();
        if total == 0 {
            return 0.0;
        }
        self.count_set() as f64 / total as f64
    }

    /// Crop to `rect`, which must lie inside the mask
    pub fn crop(&self, rect: Rect) -> Option<Mask> {
        if rect.left() < 0
            || rect.top() < 0
            || rect.right() >= self.width() as i32
            || rect.bottom() >= self.height() as i32
        {
            return None;
        }
        let cropped = image::imageops::crop_imm(
            &self.image,
            rect.left() as u32,
            rect.top() as u32,
            rect.width(),
            rect.height(),
        )
        .to_image();
        Some(Mask { image: cropped })
    }

    /// Underlying 0/255 image
    pub fn as_image(&self) -> &GrayImage {
        &self.image
    }
}
