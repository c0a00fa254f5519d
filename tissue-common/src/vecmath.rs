use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Sub};

/// A simple 2D vector struct, also used for points in the tissue plane (um).
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    /// Creates a new Vec2.
    pub fn new(x: f64, y: f64) -> Self {
        Vec2 { x, y }
    }

    /// Creates a zero vector.
    pub fn zero() -> Self {
        Vec2 { x: 0.0, y: 0.0 }
    }

    /// Calculates the squared length (magnitude) of the vector.
    pub fn length_squared(&self) -> f64 {
        self.x * self.x + self.y * self.y
    }

    /// Calculates the length (magnitude) of the vector.
    pub fn length(&self) -> f64 {
        self.length_squared().sqrt()
    }

    /// Calculates the dot product with another vector.
    pub fn dot(&self, other: Vec2) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// z component of the 3D cross product (signed parallelogram area).
    pub fn cross(&self, other: Vec2) -> f64 {
        self.x * other.y - self.y * other.x
    }

    /// Calculates the squared distance to another vector (point).
    pub fn distance_squared(&self, other: Vec2) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Calculates the distance to another vector (point).
    pub fn distance(&self, other: Vec2) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Midpoint between this point and another.
    pub fn midpoint(&self, other: Vec2) -> Self {
        Vec2 { x: 0.5 * (self.x + other.x), y: 0.5 * (self.y + other.y) }
    }

    /// Perpendicular vector (rotated +90 degrees).
    pub fn perp(&self) -> Self {
        Vec2 { x: -self.y, y: self.x }
    }

    /// Checks whether two points coincide within `eps` in both coordinates.
    pub fn approx_eq(&self, other: Vec2, eps: f64) -> bool {
        (self.x - other.x).abs() <= eps && (self.y - other.y).abs() <= eps
    }
}

// Implement standard operators for convenience
impl Add for Vec2 {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self { x: self.x + other.x, y: self.y + other.y }
    }
}

impl Sub for Vec2 {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self { x: self.x - other.x, y: self.y - other.y }
    }
}

impl Mul<f64> for Vec2 {
    type Output = Self;
    fn mul(self, scalar: f64) -> Self {
        Self { x: self.x * scalar, y: self.y * scalar }
    }
}

impl Div<f64> for Vec2 {
    type Output = Self;
    fn div(self, scalar: f64) -> Self {
        Self { x: self.x / scalar, y: self.y / scalar }
    }
}

/// Clamps a value between a minimum and maximum.
pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}

/// Length of the overlap of the closed intervals `[min_a, max_a]` and `[min_b, max_b]`.
pub fn axis_overlap(min_a: f64, max_a: f64, min_b: f64, max_b: f64) -> f64 {
    (max_a.min(max_b) - min_a.max(min_b)).max(0.0)
}

/// Distance from point `p` to the segment `a`-`b`.
pub fn point_segment_distance(p: Vec2, a: Vec2, b: Vec2) -> f64 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq <= 1e-24 {
        return p.distance(a);
    }
    let t = clamp((p - a).dot(ab) / len_sq, 0.0, 1.0);
    p.distance(a + ab * t)
}

/// True when `p` lies on the closed segment `a`-`b` within `eps`.
pub fn point_on_segment(p: Vec2, a: Vec2, b: Vec2, eps: f64) -> bool {
    point_segment_distance(p, a, b) <= eps
}

/// Length of the part of segment `c`-`d` that lies along segment `a`-`b`.
/// Returns zero unless both segments sit on a common line (within `eps`).
pub fn collinear_overlap(a: Vec2, b: Vec2, c: Vec2, d: Vec2, eps: f64) -> f64 {
    let ab = b - a;
    let len = ab.length();
    if len <= eps {
        return 0.0;
    }
    let dir = ab / len;
    // Both endpoints of c-d must be on the infinite line through a-b.
    if dir.cross(c - a).abs() > eps || dir.cross(d - a).abs() > eps {
        return 0.0;
    }
    let tc = (c - a).dot(dir);
    let td = (d - a).dot(dir);
    axis_overlap(0.0, len, tc.min(td), tc.max(td))
}

/// Proper or touching intersection test between segments `p1`-`p2` and `q1`-`q2`.
pub fn segments_intersect(p1: Vec2, p2: Vec2, q1: Vec2, q2: Vec2, eps: f64) -> bool {
    let d1 = (p2 - p1).cross(q1 - p1);
    let d2 = (p2 - p1).cross(q2 - p1);
    let d3 = (q2 - q1).cross(p1 - q1);
    let d4 = (q2 - q1).cross(p2 - q1);

    if ((d1 > eps && d2 < -eps) || (d1 < -eps && d2 > eps))
        && ((d3 > eps && d4 < -eps) || (d3 < -eps && d4 > eps))
    {
        return true;
    }
    // Touching or collinear cases
    point_on_segment(q1, p1, p2, eps)
        || point_on_segment(q2, p1, p2, eps)
        || point_on_segment(p1, q1, q2, eps)
        || point_on_segment(p2, q1, q2, eps)
}

/// Intersection point of the segment `a`-`b` with the infinite line through `p` along `dir`.
pub fn segment_line_intersection(a: Vec2, b: Vec2, p: Vec2, dir: Vec2, eps: f64) -> Option<Vec2> {
    let ab = b - a;
    let denom = dir.cross(ab);
    if denom.abs() <= eps {
        return None;
    }
    let t = dir.cross(p - a) / denom;
    if t < -eps || t > 1.0 + eps {
        return None;
    }
    Some(a + ab * clamp(t, 0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_axis_overlap() {
        assert_relative_eq!(axis_overlap(0.0, 2.0, 1.0, 3.0), 1.0);
        assert_relative_eq!(axis_overlap(0.0, 1.0, 2.0, 3.0), 0.0);
        assert_relative_eq!(axis_overlap(0.0, 4.0, 1.0, 2.0), 1.0);
    }

    #[test]
    fn test_collinear_overlap_on_shared_line() {
        let a = Vec2::new(1.0, 0.0);
        let b = Vec2::new(1.0, 2.0);
        let c = Vec2::new(1.0, 0.5);
        let d = Vec2::new(1.0, 3.0);
        assert_relative_eq!(collinear_overlap(a, b, c, d, 1e-9), 1.5);
        // Parallel but offset segments do not overlap.
        let e = Vec2::new(1.5, 0.5);
        let f = Vec2::new(1.5, 3.0);
        assert_relative_eq!(collinear_overlap(a, b, e, f, 1e-9), 0.0);
    }

    #[test]
    fn test_segments_intersect() {
        let p1 = Vec2::new(0.0, 0.0);
        let p2 = Vec2::new(2.0, 2.0);
        assert!(segments_intersect(p1, p2, Vec2::new(0.0, 2.0), Vec2::new(2.0, 0.0), 1e-12));
        assert!(!segments_intersect(p1, p2, Vec2::new(3.0, 0.0), Vec2::new(4.0, 0.0), 1e-12));
    }

    #[test]
    fn test_segment_line_intersection() {
        let hit = segment_line_intersection(
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 4.0),
            Vec2::new(-1.0, 1.0),
            Vec2::new(1.0, 0.0),
            1e-12,
        );
        let hit = hit.expect("horizontal line must cross the vertical segment");
        assert_relative_eq!(hit.y, 1.0);
        assert!(segment_line_intersection(
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 4.0),
            Vec2::new(-1.0, 5.0),
            Vec2::new(1.0, 0.0),
            1e-12,
        )
        .is_none());
    }
}
