//! Planar geometry on pixel coordinates.
//!
//! All functions are total: degenerate input (zero-area boxes, zero-length
//! segments) yields a defined fallback value instead of dividing by zero.

use serde::{Deserialize, Serialize};

/// A point in pixel coordinates. Serialises as `[x, y]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 2]", into = "[f32; 2]")]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl From<[f32; 2]> for Point {
    fn from(v: [f32; 2]) -> Self {
        Self::new(v[0], v[1])
    }
}

impl From<Point> for [f32; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

/// Axis-aligned box, left-top-right-bottom. Serialises as `[x1, y1, x2, y2]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    #[inline]
    pub const fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    #[inline(always)]
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    #[inline(always)]
    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    #[inline]
    pub fn center(&self) -> Point {
        center(self)
    }
}

impl From<[f32; 4]> for BBox {
    fn from(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [f32; 4] {
    fn from(b: BBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// Midpoint of the box diagonal.
pub fn center(bbox: &BBox) -> Point {
    Point::new((bbox.x1 + bbox.x2) / 2.0, (bbox.y1 + bbox.y2) / 2.0)
}

/// Intersection over union. 0.0 for disjoint boxes and for a zero union.
pub fn iou(a: &BBox, b: &BBox) -> f32 {
    let left = a.x1.max(b.x1);
    let top = a.y1.max(b.y1);
    let right = a.x2.min(b.x2);
    let bottom = a.y2.min(b.y2);

    if right < left || bottom < top {
        return 0.0;
    }

    let intersection = (right - left) * (bottom - top);
    let union = a.area() + b.area() - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Distance from `point` to the segment `start`-`end`.
///
/// Projections falling before `start` or past `end` measure to the nearer
/// endpoint. A zero-length segment measures to `start`.
pub fn point_to_segment_distance(point: Point, start: Point, end: Point) -> f32 {
    let (lx, ly) = (end.x - start.x, end.y - start.y);
    let (px, py) = (point.x - start.x, point.y - start.y);
    let len = lx.hypot(ly);

    if len == 0.0 {
        return px.hypot(py);
    }

    let t = (lx * px + ly * py) / (len * len);

    if t < 0.0 {
        px.hypot(py)
    } else if t > 1.0 {
        (px - lx).hypot(py - ly)
    } else {
        (px - lx * t).hypot(py - ly * t)
    }
}

#[inline]
fn ccw(a: Point, b: Point, c: Point) -> bool {
    (c.y - a.y) * (b.x - a.x) > (b.y - a.y) * (c.x - a.x)
}

/// Orientation test for segments `p1`-`p2` and `q1`-`q2`.
///
/// Collinear and endpoint-touching configurations are not special-cased; the
/// strict orientation comparison decides them.
pub fn segments_intersect(p1: Point, p2: Point, q1: Point, q2: Point) -> bool {
    ccw(p1, q1, q2) != ccw(p2, q1, q2) && ccw(p1, p2, q1) != ccw(p1, p2, q2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_box_with_itself_is_one() {
        let b = BBox::new(10.0, 20.0, 110.0, 220.0);
        assert!((iou(&b, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_is_symmetric() {
        let a = BBox::new(0.0, 0.0, 100.0, 100.0);
        let b = BBox::new(50.0, 25.0, 180.0, 140.0);
        assert_eq!(iou(&a, &b), iou(&b, &a));
        assert!(iou(&a, &b) > 0.0);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn iou_of_degenerate_boxes_is_zero() {
        let p = BBox::new(5.0, 5.0, 5.0, 5.0);
        assert_eq!(iou(&p, &p), 0.0);
    }

    #[test]
    fn iou_of_half_overlap() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(5.0, 0.0, 15.0, 10.0);
        // 50 / (100 + 100 - 50)
        assert!((iou(&a, &b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn center_is_midpoint() {
        let c = center(&BBox::new(10.0, 20.0, 30.0, 60.0));
        assert_eq!(c, Point::new(20.0, 40.0));
    }

    #[test]
    fn segment_distance_perpendicular_and_endpoints() {
        let s = Point::new(0.0, 0.0);
        let e = Point::new(10.0, 0.0);
        assert!((point_to_segment_distance(Point::new(5.0, 3.0), s, e) - 3.0).abs() < 1e-6);
        assert!((point_to_segment_distance(Point::new(-3.0, 4.0), s, e) - 5.0).abs() < 1e-6);
        assert!((point_to_segment_distance(Point::new(13.0, 4.0), s, e) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn segment_distance_to_zero_length_segment() {
        let s = Point::new(1.0, 1.0);
        assert_eq!(point_to_segment_distance(s, s, s), 0.0);
        assert!((point_to_segment_distance(Point::new(4.0, 5.0), s, s) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn crossing_segments_intersect() {
        assert!(segments_intersect(
            Point::new(50.0, 0.0),
            Point::new(50.0, 100.0),
            Point::new(0.0, 50.0),
            Point::new(100.0, 50.0),
        ));
    }

    #[test]
    fn parallel_segments_do_not_intersect() {
        assert!(!segments_intersect(
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(0.0, 50.0),
            Point::new(100.0, 50.0),
        ));
    }

    #[test]
    fn boxes_serialise_as_arrays() {
        let json = serde_json::to_string(&BBox::new(1.0, 2.0, 3.0, 4.0)).unwrap();
        assert_eq!(json, "[1.0,2.0,3.0,4.0]");
        let back: BBox = serde_json::from_str(&json).unwrap();
        assert_eq!(back, BBox::new(1.0, 2.0, 3.0, 4.0));
    }
}
