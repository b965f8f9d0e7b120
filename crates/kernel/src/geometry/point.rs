use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

use super::vector::{Vec2, Vec3};

/// A point in 3D Euclidean space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3d {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3d {
    pub const ORIGIN: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance_to(&self, other: &Self) -> f64 {
        self.distance_squared_to(other).sqrt()
    }

    pub fn distance_squared_to(&self, other: &Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    pub fn midpoint(&self, other: &Self) -> Self {
        self.lerp(other, 0.5)
    }

    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        Self {
            x: self.x + t * (other.x - self.x),
            y: self.y + t * (other.y - self.y),
            z: self.z + t * (other.z - self.z),
        }
    }

    pub fn to_vec3(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    /// Mean of `points` weighted by `weights`. Falls back to the plain
    /// centroid when every weight is zero.
    pub fn weighted_mean(points: &[Point3d], weights: &[f64]) -> Option<Point3d> {
        if points.is_empty() || points.len() != weights.len() {
            return None;
        }
        let total: f64 = weights.iter().sum();
        let (sum, norm) = if total > 0.0 {
            let mut acc = Vec3::ZERO;
            for (p, w) in points.iter().zip(weights) {
                acc = acc + p.to_vec3() * *w;
            }
            (acc, total)
        } else {
            let acc = points
                .iter()
                .fold(Vec3::ZERO, |acc, p| acc + p.to_vec3());
            (acc, points.len() as f64)
        };
        Some(Point3d::ORIGIN + sum / norm)
    }
}

impl Add<Vec3> for Point3d {
    type Output = Point3d;
    fn add(self, rhs: Vec3) -> Self::Output {
        Point3d::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Point3d {
    type Output = Vec3;
    fn sub(self, rhs: Self) -> Self::Output {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Sub<Vec3> for Point3d {
    type Output = Point3d;
    fn sub(self, rhs: Vec3) -> Self::Output {
        Point3d::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// A point in a surface's (u, v) parameter plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2d {
    pub x: f64,
    pub y: f64,
}

impl Point2d {
    pub const ORIGIN: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        Self {
            x: self.x + t * (other.x - self.x),
            y: self.y + t * (other.y - self.y),
        }
    }
}

impl Add<Vec2> for Point2d {
    type Output = Point2d;
    fn add(self, rhs: Vec2) -> Self::Output {
        Point2d::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point2d {
    type Output = Vec2;
    fn sub(self, rhs: Self) -> Self::Output {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Distance from `p` to the segment `a`-`b` in the parameter plane.
pub fn segment_distance_2d(p: &Point2d, a: &Point2d, b: &Point2d) -> f64 {
    let ab = *b - *a;
    let len2 = ab.length_squared();
    if len2 < 1e-30 {
        return p.distance_to(a);
    }
    let t = ((*p - *a).dot(&ab) / len2).clamp(0.0, 1.0);
    p.distance_to(&(*a + ab * t))
}

/// Signed area of a closed polygon (positive when counter-clockwise).
pub fn polygon_area(points: &[Point2d]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut area = 0.0;
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        area += a.x * b.y - b.x * a.y;
    }
    area * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_distance() {
        let a = Point3d::new(1.0, 0.0, 0.0);
        let b = Point3d::new(4.0, 0.0, 0.0);
        assert!((a.distance_to(&b) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_point_sub_gives_vector() {
        let a = Point3d::new(3.0, 4.0, 5.0);
        let b = Point3d::new(1.0, 1.0, 1.0);
        let v = a - b;
        assert!((v.x - 2.0).abs() < 1e-12);
        assert!((v.y - 3.0).abs() < 1e-12);
        assert!((v.z - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_mean_prefers_heavier_point() {
        let a = Point3d::new(0.0, 0.0, 0.0);
        let b = Point3d::new(4.0, 0.0, 0.0);
        let m = Point3d::weighted_mean(&[a, b], &[3.0, 1.0]).unwrap();
        assert!((m.x - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_mean_zero_weights() {
        let a = Point3d::new(0.0, 2.0, 0.0);
        let b = Point3d::new(2.0, 0.0, 0.0);
        let m = Point3d::weighted_mean(&[a, b], &[0.0, 0.0]).unwrap();
        assert!((m.x - 1.0).abs() < 1e-12);
        assert!((m.y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_polygon_area_sign() {
        let square = [
            Point2d::new(0.0, 0.0),
            Point2d::new(1.0, 0.0),
            Point2d::new(1.0, 1.0),
            Point2d::new(0.0, 1.0),
        ];
        assert!((polygon_area(&square) - 1.0).abs() < 1e-12);
        let mut cw = square;
        cw.reverse();
        assert!((polygon_area(&cw) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_segment_distance() {
        let d = segment_distance_2d(
            &Point2d::new(0.5, 1.0),
            &Point2d::new(0.0, 0.0),
            &Point2d::new(1.0, 0.0),
        );
        assert!((d - 1.0).abs() < 1e-12);
        let d = segment_distance_2d(
            &Point2d::new(2.0, 0.0),
            &Point2d::new(0.0, 0.0),
            &Point2d::new(1.0, 0.0),
        );
        assert!((d - 1.0).abs() < 1e-12);
    }
}
