//! Synthetic frame sources for development without hardware
//!
//! Both generators are deterministic: the pixels of frame `n` depend only on
//! the generator parameters and `n`, never on wall-clock time.

use std::time::{Duration, Instant};

use image::{GrayImage, Luma};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

use crate::clock::monotonic_ns;
use crate::{FrameSource, GrayFrame, SourceError};

/// Background level of the tile grid
const GRID_BACKGROUND: u8 = 64;
/// Tile pitch of the tile grid (pixels)
const GRID_TILE: u32 = 64;
/// Gap around each bright tile (pixels)
const GRID_GAP: u32 = 10;

/// Sleeps so that consecutive frames are at least `interval` apart
#[derive(Debug)]
struct Pacer {
    interval: Option<Duration>,
    last: Option<Instant>,
}

impl Pacer {
    fn new(interval: Option<Duration>) -> Self {
        Self { interval, last: None }
    }

    fn wait(&mut self) {
        if let (Some(interval), Some(last)) = (self.interval, self.last) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.last = Some(Instant::now());
    }
}

fn interval_for_fps(fps: u32) -> Option<Duration> {
    (fps > 0).then(|| Duration::from_micros(1_000_000 / fps as u64))
}

/// Emits the same image on every call
#[derive(Debug)]
pub struct StaticSource {
    name: String,
    image: GrayImage,
    sequence: u64,
    pacer: Pacer,
}

impl StaticSource {
    /// Serve `image` as fast as the caller pulls
    pub fn new(name: impl Into<String>, image: GrayImage) -> Self {
        Self {
            name: name.into(),
            image,
            sequence: 0,
            pacer: Pacer::new(None),
        }
    }

    /// Limit the frame rate
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.pacer = Pacer::new(interval_for_fps(fps));
        self
    }

    /// Checkerboard of saturated tiles on a dark background
    pub fn tile_grid(width: u32, height: u32) -> Self {
        Self::new("synthetic-grid", tile_grid_image(width, height))
    }

    /// Single saturated rectangle in the middle of a black frame
    pub fn bright_rect(width: u32, height: u32) -> Self {
        let mut image = GrayImage::new(width, height);
        let x = width * 300 / 1280;
        let y = height * 300 / 720;
        let w = (width * 700 / 1280).max(1);
        let h = (height * 200 / 720).max(1);
        draw_filled_rect_mut(&mut image, Rect::at(x as i32, y as i32).of_size(w, h), Luma([255]));
        Self::new("synthetic-rect", image)
    }

    /// Uniform frame (useful for saturation tests)
    pub fn uniform(width: u32, height: u32, value: u8) -> Self {
        Self::new("synthetic-uniform", GrayImage::from_pixel(width, height, Luma([value])))
    }
}

impl FrameSource for StaticSource {
    fn next_frame(&mut self) -> Result<GrayFrame, SourceError> {
        self.pacer.wait();
        self.sequence += 1;
        Ok(GrayFrame::new(self.image.clone(), monotonic_ns(), self.sequence))
    }

    fn describe(&self) -> String {
        format!("{} ({}x{})", self.name, self.image.width(), self.image.height())
    }
}

/// Tile grid pattern: bright tiles on alternating cells
pub fn tile_grid_image(width: u32, height: u32) -> GrayImage {
    let mut image = GrayImage::from_pixel(width, height, Luma([GRID_BACKGROUND]));
    let rows = height / GRID_TILE;
    let cols = width / GRID_TILE;
    let tile = GRID_TILE - GRID_GAP;

    for r in 0..rows {
        for c in 0..cols {
            if (r + c) % 2 != 0 {
                continue;
            }
            let x = c * GRID_TILE + GRID_GAP / 2;
            let y = r * GRID_TILE + GRID_GAP / 2;
            draw_filled_rect_mut(&mut image, Rect::at(x as i32, y as i32).of_size(tile, tile), Luma([255]));
        }
    }
    image
}

/// A grey bar followed by a saturated bar, sliding right by `step` pixels per frame
#[derive(Debug)]
pub struct DynamicBarSource {
    width: u32,
    height: u32,
    bar_width: u32,
    step: u32,
    sequence: u64,
    pacer: Pacer,
}

impl DynamicBarSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bar_width: (width * 100 / 1280).max(1),
            step: 3,
            sequence: 0,
            pacer: Pacer::new(None),
        }
    }

    /// Pixels moved per frame
    pub fn with_step(mut self, step: u32) -> Self {
        self.step = step;
        self
    }

    /// Limit the frame rate
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.pacer = Pacer::new(interval_for_fps(fps));
        self
    }

    /// Render frame number `sequence` of the pattern
    pub fn render(&self, sequence: u64) -> GrayImage {
        let mut image = GrayImage::new(self.width, self.height);
        let x = ((sequence * self.step as u64) % self.width as u64) as i32;
        let y = (self.height * 300 / 720) as i32;
        let h = (self.height * 200 / 720).max(1);
        let w = self.bar_width;

        draw_filled_rect_mut(&mut image, Rect::at(x, y).of_size(w, h), Luma([128]));
        draw_filled_rect_mut(&mut image, Rect::at(x + w as i32, y).of_size(w, h), Luma([255]));
        image
    }
}

impl FrameSource for DynamicBarSource {
    fn next_frame(&mut self) -> Result<GrayFrame, SourceError> {
        self.pacer.wait();
        self.sequence += 1;
        let image = self.render(self.sequence);
        Ok(GrayFrame::new(image, monotonic_ns(), self.sequence))
    }

    fn describe(&self) -> String {
        format!("synthetic-bar ({}x{})", self.width, self.height)
    }
}
