//! Grayscale video frame type

use image::GrayImage;

/// Decoded 8-bit grayscale frame
#[derive(Debug, Clone)]
pub struct GrayFrame {
    /// Luma pixels, row-major
    pub image: GrayImage,
    /// Capture timestamp (nanoseconds, see [`crate::clock`])
    pub timestamp_ns: u64,
    /// Frame sequence number assigned by the source
    pub sequence: u64,
}

impl GrayFrame {
    /// Wrap an existing grayscale image
    pub fn new(image: GrayImage, timestamp_ns: u64, sequence: u64) -> Self {
        Self {
            image,
            timestamp_ns,
            sequence,
        }
    }

    /// Create a frame from raw luma bytes (`width * height` long)
    pub fn from_raw(
        data: Vec<u8>,
        width: u32,
        height: u32,
        timestamp_ns: u64,
        sequence: u64,
    ) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        GrayImage::from_raw(width, height, data).map(|image| Self::new(image, timestamp_ns, sequence))
    }

    /// Create a frame from packed YUYV (4:2:2) bytes, keeping only luma
    pub fn from_yuyv(
        data: &[u8],
        width: u32,
        height: u32,
        timestamp_ns: u64,
        sequence: u64,
    ) -> Option<Self> {
        if data.len() < (width as usize) * (height as usize) * 2 {
            return None;
        }
        let luma: Vec<u8> = data
            .iter()
            .step_by(2)
            .take((width * height) as usize)
            .copied()
            .collect();
        Self::from_raw(luma, width, height, timestamp_ns, sequence)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}
