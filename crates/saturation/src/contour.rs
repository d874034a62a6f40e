//! Contour polylines: extraction, clipping and drawing

use image::imageops::replace;
use image::{GrayImage, Rgb, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::drawing::draw_line_segment_mut;
use imageproc::point::Point;
use imageproc::rect::Rect;

/// Boundary polyline of a saturated region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contour {
    points: Vec<Point<i32>>,
    /// Whether the last point connects back to the first
    closed: bool,
}

impl Contour {
    /// Closed polygon through `points`
    pub fn closed(points: Vec<Point<i32>>) -> Self {
        Self { points, closed: true }
    }

    /// Open polyline through `points`
    pub fn open(points: Vec<Point<i32>>) -> Self {
        Self { points, closed: false }
    }

    pub fn points(&self) -> &[Point<i32>] {
        &self.points
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Smallest rectangle containing every vertex
    pub fn bounding_box(&self) -> Option<Rect> {
        let first = self.points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &self.points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Rect::at(min_x, min_y).of_size((max_x - min_x + 1) as u32, (max_y - min_y + 1) as u32))
    }

    /// Shift every vertex by (dx, dy)
    pub fn translate(&self, dx: i32, dy: i32) -> Contour {
        Contour {
            points: self.points.iter().map(|p| Point::new(p.x + dx, p.y + dy)).collect(),
            closed: self.closed,
        }
    }

    /// Segments as (start, end) pairs, including the closing edge
    fn segments(&self) -> impl Iterator<Item = (Point<i32>, Point<i32>)> + '_ {
        let closing = match (self.closed, self.points.first(), self.points.last()) {
            (true, Some(first), Some(last)) if self.points.len() > 2 => Some((*last, *first)),
            _ => None,
        };
        self.points
            .windows(2)
            .map(|w| (w[0], w[1]))
            .chain(closing)
    }

    /// Clip to `rect` (inclusive pixel bounds).
    ///
    /// A contour fully inside is returned unchanged. Otherwise the parts
    /// inside are returned as open polylines, split where the contour leaves
    /// the rectangle.
    pub fn clip_to(&self, rect: Rect) -> Vec<Contour> {
        if self.points.iter().all(|p| contains(rect, *p)) {
            return if self.points.is_empty() { Vec::new() } else { vec![self.clone()] };
        }
        if self.points.len() == 1 {
            return Vec::new();
        }

        let mut runs: Vec<Vec<Point<i32>>> = Vec::new();
        let mut current: Vec<Point<i32>> = Vec::new();
        for (a, b) in self.segments() {
            match clip_segment(rect, a, b) {
                Some((ca, cb)) => {
                    if current.last() != Some(&ca) {
                        if current.len() > 1 {
                            runs.push(std::mem::take(&mut current));
                        }
                        current.clear();
                        current.push(ca);
                    }
                    if cb != ca {
                        current.push(cb);
                    }
                }
                None => {
                    if current.len() > 1 {
                        runs.push(std::mem::take(&mut current));
                    }
                    current.clear();
                }
            }
        }
        if current.len() > 1 {
            runs.push(current);
        }

        // A closed contour may start inside: join the wrap-around run to the first one
        if self.closed && runs.len() > 1 {
            let first_start = runs[0][0];
            let last_end = runs[runs.len() - 1][runs[runs.len() - 1].len() - 1];
            if first_start == last_end {
                if let Some(mut tail) = runs.pop() {
                    tail.pop();
                    tail.extend(runs[0].iter().copied());
                    runs[0] = tail;
                }
            }
        }

        runs.into_iter().map(Contour::open).collect()
    }
}

fn contains(rect: Rect, p: Point<i32>) -> bool {
    p.x >= rect.left() && p.x <= rect.right() && p.y >= rect.top() && p.y <= rect.bottom()
}

/// Liang–Barsky clip of segment a→b against the inclusive pixel rectangle
fn clip_segment(rect: Rect, a: Point<i32>, b: Point<i32>) -> Option<(Point<i32>, Point<i32>)> {
    let (x0, y0) = (a.x as f64, a.y as f64);
    let (dx, dy) = ((b.x - a.x) as f64, (b.y - a.y) as f64);
    let edges = [
        (-dx, x0 - rect.left() as f64),
        (dx, rect.right() as f64 - x0),
        (-dy, y0 - rect.top() as f64),
        (dy, rect.bottom() as f64 - y0),
    ];

    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    for (p, q) in edges {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }

    let at = |t: f64| Point::new((x0 + t * dx).round() as i32, (y0 + t * dy).round() as i32);
    Some((at(t0), at(t1)))
}

/// Outer borders of the set regions of a 0/255 mask, in raster order.
///
/// Holes, and regions nested inside holes, are not reported.
pub(crate) fn outer_contours(mask: &GrayImage) -> Vec<Contour> {
    // The tracer only starts an outer border after a background pixel, so
    // regions touching the image edge need a one-pixel background frame.
    let mut framed = GrayImage::new(mask.width() + 2, mask.height() + 2);
    replace(&mut framed, mask, 1, 1);

    find_contours::<i32>(&framed)
        .into_iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .map(|c| Contour::closed(simplify_closed(&c.points)).translate(-1, -1))
        .collect()
}

/// Drop vertices where the chain continues in the same direction
fn simplify_closed(points: &[Point<i32>]) -> Vec<Point<i32>> {
    let n = points.len();
    if n < 3 {
        return points.to_vec();
    }
    let step = |from: Point<i32>, to: Point<i32>| (to.x - from.x, to.y - from.y);
    let kept: Vec<Point<i32>> = (0..n)
        .filter(|&i| {
            let prev = points[(i + n - 1) % n];
            let next = points[(i + 1) % n];
            step(prev, points[i]) != step(points[i], next)
        })
        .map(|i| points[i])
        .collect();

    if kept.is_empty() {
        vec![points[0]]
    } else {
        kept
    }
}

/// Draw contours onto an RGB canvas; lines outside the canvas are clipped
pub fn draw_contours(canvas: &mut RgbImage, contours: &[Contour], color: [u8; 3], line_width: u32) {
    let color = Rgb(color);
    let width = line_width.max(1) as i32;
    let lo = -(width - 1) / 2;
    let offsets: Vec<(f32, f32)> = (lo..lo + width)
        .flat_map(|ox| (lo..lo + width).map(move |oy| (ox as f32, oy as f32)))
        .collect();

    for contour in contours {
        if contour.len() == 1 {
            let p = contour.points[0];
            for &(ox, oy) in &offsets {
                let at = (p.x as f32 + ox, p.y as f32 + oy);
                draw_line_segment_mut(canvas, at, at, color);
            }
            continue;
        }
        for (a, b) in contour.segments() {
            for &(ox, oy) in &offsets {
                draw_line_segment_mut(
                    canvas,
                    (a.x as f32 + ox, a.y as f32 + oy),
                    (b.x as f32 + ox, b.y as f32 + oy),
                    color,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn square(x0: i32, y0: i32, x1: i32, y1: i32) -> Contour {
        Contour::closed(vec![
            Point::new(x0, y0),
            Point::new(x0, y1),
            Point::new(x1, y1),
            Point::new(x1, y0),
        ])
    }

    #[test]
    fn test_simplify_rectangle_to_corners() {
        let mut mask = GrayImage::new(10, 8);
        for y in 2..5 {
            for x in 3..8 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let contours = outer_contours(&mask);
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].len(), 4);
        assert_eq!(contours[0].bounding_box(), Some(Rect::at(3, 2).of_size(5, 3)));
    }

    #[test]
    fn test_holes_and_islands_excluded() {
        // Ring from (1,1) to (9,9) with a hole, and an island in the hole
        let mut mask = GrayImage::new(11, 11);
        for y in 1..10 {
            for x in 1..10 {
                let in_hole = (3..8).contains(&x) && (3..8).contains(&y);
                if !in_hole || (x == 5 && y == 5) {
                    mask.put_pixel(x, y, Luma([255]));
                }
            }
        }
        let contours = outer_contours(&mask);
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].bounding_box(), Some(Rect::at(1, 1).of_size(9, 9)));
    }

    #[test]
    fn test_full_mask_is_one_full_extent_contour() {
        for (w, h) in [(1, 1), (1, 5), (5, 1), (3, 3), (32, 24)] {
            let mask = GrayImage::from_pixel(w, h, Luma([255]));
            let contours = outer_contours(&mask);
            assert_eq!(contours.len(), 1, "{w}x{h}");
            assert_eq!(contours[0].bounding_box(), Some(Rect::at(0, 0).of_size(w, h)), "{w}x{h}");
        }
    }

    #[test]
    fn test_regions_on_every_edge_are_found() {
        let mut mask = GrayImage::new(20, 12);
        let blobs = [(0u32, 4u32), (15, 4), (8, 0), (8, 9)];
        for &(bx, by) in &blobs {
            for y in by..by + 3 {
                for x in bx..bx + 5 {
                    mask.put_pixel(x, y, Luma([255]));
                }
            }
        }
        let contours = outer_contours(&mask);
        assert_eq!(contours.len(), 4);
        let left = contours
            .iter()
            .find(|c| c.bounding_box().map(|r| r.left()) == Some(0))
            .unwrap();
        assert_eq!(left.bounding_box(), Some(Rect::at(0, 4).of_size(5, 3)));
    }

    #[test]
    fn test_raster_order_is_stable() {
        let mut mask = GrayImage::new(12, 6);
        mask.put_pixel(9, 1, Luma([255]));
        mask.put_pixel(2, 4, Luma([255]));
        let a = outer_contours(&mask);
        let b = outer_contours(&mask);
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].points()[0], Point::new(9, 1));
        assert_eq!(a[1].points()[0], Point::new(2, 4));
    }

    #[test]
    fn test_translate() {
        let moved = square(0, 0, 2, 2).translate(5, -1);
        assert_eq!(moved.bounding_box(), Some(Rect::at(5, -1).of_size(3, 3)));
        assert!(moved.is_closed());
    }

    #[test]
    fn test_clip_inside_is_unchanged() {
        let contour = square(2, 2, 4, 4);
        let clipped = contour.clip_to(Rect::at(0, 0).of_size(10, 10));
        assert_eq!(clipped, vec![contour]);
    }

    #[test]
    fn test_clip_outside_is_dropped() {
        let contour = square(20, 20, 24, 24);
        assert!(contour.clip_to(Rect::at(0, 0).of_size(10, 10)).is_empty());
    }

    #[test]
    fn test_clip_crossing_edge() {
        // Square straddling the right edge at x = 9
        let contour = square(6, 2, 14, 6);
        let clipped = contour.clip_to(Rect::at(0, 0).of_size(10, 10));
        assert_eq!(clipped.len(), 1);
        let piece = &clipped[0];
        assert!(!piece.is_closed());
        assert!(piece.points().iter().all(|p| p.x <= 9 && p.x >= 6));
        assert_eq!(piece.bounding_box(), Some(Rect::at(6, 2).of_size(4, 5)));
    }

    #[test]
    fn test_clip_wraparound_joins_runs() {
        // Starts inside, leaves through the right edge, comes back
        let contour = Contour::closed(vec![
            Point::new(2, 2),
            Point::new(2, 6),
            Point::new(14, 6),
            Point::new(14, 2),
        ]);
        let clipped = contour.clip_to(Rect::at(0, 0).of_size(10, 10));
        assert_eq!(clipped.len(), 1);
        assert_eq!(clipped[0].points().first(), Some(&Point::new(9, 2)));
        assert_eq!(clipped[0].points().last(), Some(&Point::new(9, 6)));
    }

    #[test]
    fn test_draw_closed_contour() {
        let mut canvas = RgbImage::new(8, 8);
        draw_contours(&mut canvas, &[square(1, 1, 5, 5)], [0, 0, 255], 1);
        assert_eq!(canvas.get_pixel(1, 3), &Rgb([0, 0, 255]));
        assert_eq!(canvas.get_pixel(3, 1), &Rgb([0, 0, 255]));
        assert_eq!(canvas.get_pixel(5, 3), &Rgb([0, 0, 255]));
        assert_eq!(canvas.get_pixel(3, 3), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_draw_thick_line() {
        let mut canvas = RgbImage::new(8, 8);
        draw_contours(&mut canvas, &[Contour::open(vec![Point::new(1, 4), Point::new(6, 4)])], [255, 0, 0], 2);
        assert_eq!(canvas.get_pixel(3, 4), &Rgb([255, 0, 0]));
        assert_eq!(canvas.get_pixel(3, 5), &Rgb([255, 0, 0]));
        assert_eq!(canvas.get_pixel(3, 2), &Rgb([0, 0, 0]));
    }
}
