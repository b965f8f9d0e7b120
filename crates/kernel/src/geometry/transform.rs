use nalgebra::{Matrix4, Rotation3, Unit, Vector3};
use serde::{Deserialize, Serialize};

use super::point::Point3d;
use super::vector::Vec3;

/// Affine placement applied when copying shapes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    matrix: Matrix4<f64>,
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
        }
    }

    pub fn translation(dx: f64, dy: f64, dz: f64) -> Self {
        Self {
            matrix: Matrix4::new_translation(&Vector3::new(dx, dy, dz)),
        }
    }

    pub fn uniform_scaling(s: f64) -> Self {
        Self {
            matrix: Matrix4::new_scaling(s),
        }
    }

    /// Rotation around an axis through the origin by `angle` radians.
    /// A zero axis yields the identity.
    pub fn rotation(axis: Vec3, angle: f64) -> Self {
        let axis = Vector3::new(axis.x, axis.y, axis.z);
        match Unit::try_new(axis, 1e-15) {
            Some(unit) => Self {
                matrix: Rotation3::from_axis_angle(&unit, angle).to_homogeneous(),
            },
            None => Self::identity(),
        }
    }

    /// `self` applied after `first`.
    pub fn after(&self, first: &Transform) -> Transform {
        Transform {
            matrix: self.matrix * first.matrix,
        }
    }

    pub fn inverse(&self) -> Option<Self> {
        self.matrix.try_inverse().map(|matrix| Self { matrix })
    }

    pub fn transform_point(&self, p: &Point3d) -> Point3d {
        let r = self
            .matrix
            .transform_point(&nalgebra::Point3::new(p.x, p.y, p.z));
        Point3d::new(r.x, r.y, r.z)
    }

    pub fn transform_vector(&self, v: &Vec3) -> Vec3 {
        let r = self.matrix.transform_vector(&Vector3::new(v.x, v.y, v.z));
        Vec3::new(r.x, r.y, r.z)
    }

    /// Scale factor applied to lengths (cube root of the linear determinant).
    pub fn scale_factor(&self) -> f64 {
        let linear = self.matrix.fixed_view::<3, 3>(0, 0);
        linear.determinant().abs().cbrt()
    }

    /// True when the linear part flips handedness.
    pub fn is_mirroring(&self) -> bool {
        self.matrix.fixed_view::<3, 3>(0, 0).determinant() < 0.0
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Point3d,
    pub max: Point3d,
}

impl BoundingBox {
    pub fn new(min: Point3d, max: Point3d) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self {
            min: Point3d::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3d::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    pub fn from_points(points: &[Point3d]) -> Self {
        let mut bb = Self::empty();
        for p in points {
            bb.expand_to_include(p);
        }
        bb
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn expand_to_include(&mut self, p: &Point3d) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
    }

    pub fn merge(&mut self, other: &Self) {
        if other.is_empty() {
            return;
        }
        self.expand_to_include(&other.min);
        self.expand_to_include(&other.max);
    }

    pub fn union(&self, other: &Self) -> Self {
        let mut out = *self;
        out.merge(other);
        out
    }

    pub fn intersects(&self, other: &Self) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn contains_point(&self, p: &Point3d) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    pub fn center(&self) -> Point3d {
        self.min.midpoint(&self.max)
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn diagonal(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.size().length()
        }
    }

    pub fn volume(&self) -> f64 {
        let s = self.size();
        s.x * s.y * s.z
    }

    pub fn expanded(&self, margin: f64) -> Self {
        if self.is_empty() {
            return *self;
        }
        let m = Vec3::new(margin, margin, margin);
        Self {
            min: self.min - m,
            max: self.max + m,
        }
    }

    /// Index of the longest axis (0 = x, 1 = y, 2 = z).
    pub fn longest_axis(&self) -> usize {
        let s = self.size();
        if s.x >= s.y && s.x >= s.z {
            0
        } else if s.y >= s.z {
            1
        } else {
            2
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_translation() {
        let t = Transform::translation(10.0, 20.0, 30.0);
        let result = t.transform_point(&Point3d::new(1.0, 2.0, 3.0));
        assert!((result.x - 11.0).abs() < 1e-12);
        assert!((result.y - 22.0).abs() < 1e-12);
        assert!((result.z - 33.0).abs() < 1e-12);
        let v = t.transform_vector(&Vec3::X);
        assert!((v.x - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_rotation_z_90() {
        let t = Transform::rotation(Vec3::Z, FRAC_PI_2);
        let result = t.transform_point(&Point3d::new(1.0, 0.0, 0.0));
        assert!(result.x.abs() < 1e-12);
        assert!((result.y - 1.0).abs() < 1e-12);
        assert!(!t.is_mirroring());
        assert!((t.scale_factor() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_compose_and_invert() {
        let t = Transform::translation(5.0, -3.0, 7.0).after(&Transform::uniform_scaling(2.0));
        let p = Point3d::new(1.0, 2.0, 3.0);
        let q = t.transform_point(&p);
        assert!((q.x - 7.0).abs() < 1e-12);
        let back = t.inverse().unwrap().transform_point(&q);
        assert!(back.distance_to(&p) < 1e-12);
        assert!((t.scale_factor() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_bounding_box_merge_and_overlap() {
        let mut a = BoundingBox::empty();
        assert!(a.is_empty());
        a.merge(&BoundingBox::new(Point3d::ORIGIN, Point3d::new(2.0, 2.0, 2.0)));
        let b = BoundingBox::new(Point3d::new(1.0, 1.0, 1.0), Point3d::new(3.0, 3.0, 3.0));
        let c = BoundingBox::new(Point3d::new(5.0, 5.0, 5.0), Point3d::new(6.0, 6.0, 6.0));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(!a.intersects(&BoundingBox::empty()));
        assert!(a.expanded(3.0).intersects(&c));
        assert_eq!(a.union(&c).longest_axis(), 0);
    }
}
