//! Freehand stroke model: an append-only point sequence with fixed paint.

use kurbo::{BezPath, Rect};
use serde::{Deserialize, Serialize};

/// A canvas-space position, already scaled to backing-store resolution.
///
/// Serializes as a two-element `[x, y]` array to keep the high-frequency
/// point frames compact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Midpoint between two points, used for path smoothing.
    pub fn midpoint(self, other: Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [f64; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

impl From<Point> for kurbo::Point {
    fn from(p: Point) -> Self {
        kurbo::Point::new(p.x, p.y)
    }
}

/// One continuous freehand mark.
///
/// Color and width are fixed at creation; only the point sequence grows.
/// Points never reorder and never shrink, which is what makes incremental
/// replication (one point per frame) safe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    /// Hex color such as `"#aabbcc"`.
    pub color: String,
    /// Brush thickness in canvas pixels.
    pub width: f64,
    /// Ordered point sequence, oldest first.
    points: Vec<Point>,
}

impl Stroke {
    /// Create a stroke with its mandatory first point.
    pub fn new(color: impl Into<String>, width: f64, first: Point) -> Self {
        Self {
            color: color.into(),
            width,
            points: vec![first],
        }
    }

    /// Append a point to the mark.
    pub fn append(&mut self, point: Point) {
        self.points.push(point);
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Get the number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True only for wire-decoded strokes; local construction always
    /// starts with one point.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last_point(&self) -> Option<Point> {
        self.points.last().copied()
    }

    /// Straight polyline through the recorded points.
    pub fn to_path(&self) -> BezPath {
        let mut path = BezPath::new();

        if self.points.is_empty() {
            return path;
        }

        path.move_to(self.points[0]);
        for point in self.points.iter().skip(1) {
            path.line_to(*point);
        }

        path
    }

    /// Smoothed path: quadratics whose control points are the recorded
    /// points and whose endpoints are successive midpoints. Renderers
    /// stroke this with [`Stroke::width`] and [`Stroke::color`].
    pub fn to_smooth_path(&self) -> BezPath {
        let mut path = BezPath::new();

        if self.points.is_empty() {
            return path;
        }
        if self.points.len() < 3 {
            return self.to_path();
        }

        path.move_to(self.points[0]);
        for window in self.points.windows(2) {
            path.quad_to(window[0], window[0].midpoint(window[1]));
        }
        // Land on the true endpoint rather than the last midpoint.
        path.line_to(self.points[self.points.len() - 1]);

        path
    }

    /// Axis-aligned bounding box of the point sequence, ignoring width.
    pub fn bounds(&self) -> Rect {
        if self.points.is_empty() {
            return Rect::ZERO;
        }

        let mut min_x = f64::MAX;
        let mut min_y = f64::MAX;
        let mut max_x = f64::MIN;
        let mut max_y = f64::MIN;

        for point in &self.points {
            min_x = min_x.min(point.x);
            min_y = min_y.min(point.y);
            max_x = max_x.max(point.x);
            max_y = max_y.max(point.y);
        }

        Rect::new(min_x, min_y, max_x, max_y)
    }
}

/// Parse a `#rgb`, `#rrggbb` or `#rrggbbaa` hex color into RGBA bytes.
///
/// Anything else is `None`, multibyte input included: the length match is
/// over bytes, so the digit slices use `get`, which rejects a range that
/// would split a character.
pub fn parse_hex_color(color: &str) -> Option<[u8; 4]> {
    let hex = color.strip_prefix('#')?;

    match hex.len() {
        3 => {
            let r = u8::from_str_radix(hex.get(0..1)?, 16).ok()?;
            let g = u8::from_str_radix(hex.get(1..2)?, 16).ok()?;
            let b = u8::from_str_radix(hex.get(2..3)?, 16).ok()?;
            Some([r * 17, g * 17, b * 17, 255])
        }
        6 => {
            let r = u8::from_str_radix(hex.get(0..2)?, 16).ok()?;
            let g = u8::from_str_radix(hex.get(2..4)?, 16).ok()?;
            let b = u8::from_str_radix(hex.get(4..6)?, 16).ok()?;
            Some([r, g, b, 255])
        }
        8 => {
            let r = u8::from_str_radix(hex.get(0..2)?, 16).ok()?;
            let g = u8::from_str_radix(hex.get(2..4)?, 16).ok()?;
            let b = u8::from_str_radix(hex.get(4..6)?, 16).ok()?;
            let a = u8::from_str_radix(hex.get(6..8)?, 16).ok()?;
            Some([r, g, b, a])
        }
        _ => None,
    }
}
