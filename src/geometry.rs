//! Coordinate mapping from detector space to display space.
//!
//! Detectors report boxes normalized to 0..1 of the analysed buffer. The live
//! preview shows that buffer aspect-filled into the viewport, so whichever
//! dimension overflows is cropped symmetrically. Mapping has to go through the
//! visible sub-rectangle of the buffer, otherwise overlays drift away from the
//! subject as soon as buffer and viewport aspect ratios differ.

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// True for zero, negative or non-finite dimensions.
    pub fn is_degenerate(&self) -> bool {
        !(self.width.is_finite() && self.height.is_finite())
            || self.width <= 0.0
            || self.height <= 0.0
    }

    pub fn diagonal(&self) -> f64 {
        (self.width * self.width + self.height * self.height).sqrt()
    }

    pub fn center(&self) -> Point {
        Point::new(self.width / 2.0, self.height / 2.0)
    }
}

/// Axis-aligned rectangle, origin at `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const EMPTY: Rect = Rect {
        x: 0.0,
        y: 0.0,
        width: 0.0,
        height: 0.0,
    };

    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn area(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.width * self.height
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Mirror a normalized rectangle between bottom-left and top-left origin.
    pub fn flip_vertical(&self) -> Rect {
        Rect::new(self.x, 1.0 - self.y - self.height, self.width, self.height)
    }

    /// Scale a normalized rectangle to pixel units of `size`.
    pub fn scaled(&self, size: Size) -> Rect {
        Rect::new(
            self.x * size.width,
            self.y * size.height,
            self.width * size.width,
            self.height * size.height,
        )
    }

    pub fn intersection_over_union(&self, other: &Rect) -> f64 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);
        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        inter / (self.area() + other.area() - inter)
    }
}

/// Where the vertical axis of normalized detector output starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Origin {
    /// y grows upwards from the bottom edge.
    #[default]
    BottomLeft,
    /// y grows downwards from the top edge, like display space.
    TopLeft,
}

/// Visible part of the buffer under aspect-fill, in normalized top-left
/// buffer coordinates.
fn visible_region(buffer: Size, viewport: Size) -> Rect {
    let scale = (viewport.width / buffer.width).max(viewport.height / buffer.height);
    let visible_w = (viewport.width / (buffer.width * scale)).min(1.0);
    let visible_h = (viewport.height / (buffer.height * scale)).min(1.0);
    Rect::new(
        (1.0 - visible_w) / 2.0,
        (1.0 - visible_h) / 2.0,
        visible_w,
        visible_h,
    )
}

/// Maps normalized detector boxes onto an aspect-filled viewport.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoordinateMapper {
    pub source_origin: Origin,
}

impl CoordinateMapper {
    pub fn new(source_origin: Origin) -> Self {
        Self { source_origin }
    }

    pub fn map_to_display(&self, normalized: Rect, buffer: Size, viewport: Size) -> Rect {
        if buffer.is_degenerate() || viewport.is_degenerate() {
            return Rect::EMPTY;
        }

        let top_left = match self.source_origin {
            Origin::BottomLeft => normalized.flip_vertical(),
            Origin::TopLeft => normalized,
        };
        let visible = visible_region(buffer, viewport);

        Rect::new(
            (top_left.x - visible.x) / visible.width * viewport.width,
            (top_left.y - visible.y) / visible.height * viewport.height,
            top_left.width / visible.width * viewport.width,
            top_left.height / visible.height * viewport.height,
        )
    }

    /// Inverse of [`CoordinateMapper::map_to_display`].
    pub fn map_from_display(&self, display: Rect, buffer: Size, viewport: Size) -> Rect {
        if buffer.is_degenerate() || viewport.is_degenerate() {
            return Rect::EMPTY;
        }

        let visible = visible_region(buffer, viewport);
        let top_left = Rect::new(
            display.x / viewport.width * visible.width + visible.x,
            display.y / viewport.height * visible.height + visible.y,
            display.width / viewport.width * visible.width,
            display.height / viewport.height * visible.height,
        );

        match self.source_origin {
            Origin::BottomLeft => top_left.flip_vertical(),
            Origin::TopLeft => top_left,
        }
    }
}

/// Map with the default bottom-left detector origin.
pub fn map_to_display(normalized: Rect, buffer: Size, viewport: Size) -> Rect {
    CoordinateMapper::default().map_to_display(normalized, buffer, viewport)
}

pub fn map_from_display(display: Rect, buffer: Size, viewport: Size) -> Rect {
    CoordinateMapper::default().map_from_display(display, buffer, viewport)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn assert_rect_eq(a: Rect, b: Rect) {
        assert!((a.x - b.x).abs() < EPS, "x: {} vs {}", a.x, b.x);
        assert!((a.y - b.y).abs() < EPS, "y: {} vs {}", a.y, b.y);
        assert!((a.width - b.width).abs() < EPS, "w: {} vs {}", a.width, b.width);
        assert!((a.height - b.height).abs() < EPS, "h: {} vs {}", a.height, b.height);
    }

    #[test]
    fn same_aspect_is_plain_scale_with_flip() {
        let mapper = CoordinateMapper::new(Origin::BottomLeft);
        let out = mapper.map_to_display(
            Rect::new(0.1, 0.2, 0.3, 0.4),
            Size::new(1920.0, 1080.0),
            Size::new(960.0, 540.0),
        );
        // top-left y = 1 - 0.2 - 0.4 = 0.4
        assert_rect_eq(out, Rect::new(96.0, 216.0, 288.0, 216.0));
    }

    #[test]
    fn landscape_buffer_in_portrait_viewport_crops_sides() {
        let mapper = CoordinateMapper::new(Origin::TopLeft);
        // 1920x1080 filled into 1080x1080: scale 1.0, 420px cropped per side.
        let out = mapper.map_to_display(
            Rect::new(0.5, 0.5, 0.0, 0.0),
            Size::new(1920.0, 1080.0),
            Size::new(1080.0, 1080.0),
        );
        assert!((out.x - 540.0).abs() < EPS);
        assert!((out.y - 540.0).abs() < EPS);

        let left_edge = mapper.map_to_display(
            Rect::new(420.0 / 1920.0, 0.0, 0.0, 0.0),
            Size::new(1920.0, 1080.0),
            Size::new(1080.0, 1080.0),
        );
        assert!(left_edge.x.abs() < EPS);
    }

    #[test]
    fn portrait_buffer_in_landscape_viewport_crops_top_and_bottom() {
        let mapper = CoordinateMapper::new(Origin::TopLeft);
        // 1080x1920 into 1080x1080: scale 1.0, 420px cropped top and bottom.
        let out = mapper.map_to_display(
            Rect::new(0.0, 420.0 / 1920.0, 1.0, 1080.0 / 1920.0),
            Size::new(1080.0, 1920.0),
            Size::new(1080.0, 1080.0),
        );
        assert_rect_eq(out, Rect::new(0.0, 0.0, 1080.0, 1080.0));
    }

    #[test]
    fn zero_viewport_returns_empty() {
        let out = map_to_display(
            Rect::new(0.1, 0.1, 0.2, 0.2),
            Size::new(640.0, 480.0),
            Size::new(0.0, 480.0),
        );
        assert_eq!(out, Rect::EMPTY);
        assert!(out.is_empty());
    }

    #[test]
    fn zero_buffer_returns_empty() {
        let out = map_to_display(
            Rect::new(0.1, 0.1, 0.2, 0.2),
            Size::new(0.0, 0.0),
            Size::new(640.0, 480.0),
        );
        assert_eq!(out, Rect::EMPTY);
    }

    #[test]
    fn round_trip_when_viewport_contains_buffer() {
        let buffer = Size::new(640.0, 480.0);
        let viewports = [
            Size::new(640.0, 480.0),
            Size::new(1280.0, 960.0),
            Size::new(1920.0, 1080.0),
            Size::new(1080.0, 1920.0),
        ];
        let boxes = [
            Rect::new(0.0, 0.0, 1.0, 1.0),
            Rect::new(0.25, 0.1, 0.3, 0.6),
            Rect::new(0.9, 0.85, 0.05, 0.1),
        ];
        for viewport in viewports {
            for b in boxes {
                let display = map_to_display(b, buffer, viewport);
                let back = map_from_display(display, buffer, viewport);
                assert_rect_eq(back, b);
            }
        }
    }

    #[test]
    fn iou_of_disjoint_and_identical_boxes() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(20.0, 20.0, 10.0, 10.0);
        assert_eq!(a.intersection_over_union(&b), 0.0);
        assert!((a.intersection_over_union(&a) - 1.0).abs() < EPS);
    }
}
