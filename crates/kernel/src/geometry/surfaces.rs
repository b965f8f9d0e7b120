use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, TAU};

use super::point::Point3d;
use super::transform::Transform;
use super::vector::{Vec2, Vec3};

/// All surface kinds supported by the kernel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Surface {
    Plane(Plane),
    Cylinder(Cylinder),
    Cone(Cone),
    Sphere(Sphere),
    Torus(Torus),
}

fn default_ref_dir(axis: &Vec3) -> Vec3 {
    if axis.x.abs() < 0.9 {
        Vec3::X.cross(axis).normalized_or(Vec3::Y)
    } else {
        Vec3::Y.cross(axis).normalized_or(Vec3::Z)
    }
}

/// Angle in `[0, 2π)` of `d` in the frame (`ref_dir`, `axis` x `ref_dir`).
fn frame_angle(d: &Vec3, axis: &Vec3, ref_dir: &Vec3) -> f64 {
    let y_dir = axis.cross(ref_dir);
    Vec2::new(d.dot(ref_dir), d.dot(&y_dir)).angle()
}

/// An infinite plane. `u_axis x v_axis == normal`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Plane {
    pub origin: Point3d,
    pub normal: Vec3,
    pub u_axis: Vec3,
    pub v_axis: Vec3,
}

impl Plane {
    pub fn new(origin: Point3d, normal: Vec3) -> Self {
        let normal = normal.normalized_or(Vec3::Z);
        let u_axis = default_ref_dir(&normal);
        let v_axis = normal.cross(&u_axis);
        Self {
            origin,
            normal,
            u_axis,
            v_axis,
        }
    }

    pub fn evaluate(&self, u: f64, v: f64) -> Point3d {
        self.origin + self.u_axis * u + self.v_axis * v
    }

    pub fn signed_distance(&self, p: &Point3d) -> f64 {
        (*p - self.origin).dot(&self.normal)
    }

    pub fn parameters_of(&self, p: &Point3d) -> (f64, f64) {
        let v = *p - self.origin;
        (v.dot(&self.u_axis), v.dot(&self.v_axis))
    }
}

/// A cylinder, infinite along its axis. `u` is the angle, `v` the height.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Cylinder {
    pub origin: Point3d,
    pub axis: Vec3,
    pub radius: f64,
    pub ref_dir: Vec3,
}

impl Cylinder {
    pub fn new(origin: Point3d, axis: Vec3, radius: f64) -> Self {
        let axis = axis.normalized_or(Vec3::Z);
        Self {
            origin,
            axis,
            radius,
            ref_dir: default_ref_dir(&axis),
        }
    }

    fn radial(&self, u: f64) -> Vec3 {
        let y_dir = self.axis.cross(&self.ref_dir);
        self.ref_dir * u.cos() + y_dir * u.sin()
    }

    pub fn evaluate(&self, u: f64, v: f64) -> Point3d {
        self.origin + self.radial(u) * self.radius + self.axis * v
    }

    fn split(&self, p: &Point3d) -> (Vec3, f64) {
        let d = *p - self.origin;
        let h = d.dot(&self.axis);
        (d - self.axis * h, h)
    }

    pub fn parameters_of(&self, p: &Point3d) -> (f64, f64) {
        let (radial, h) = self.split(p);
        (frame_angle(&radial, &self.axis, &self.ref_dir), h)
    }

    pub fn signed_distance(&self, p: &Point3d) -> f64 {
        self.split(p).0.length() - self.radius
    }
}

/// A cone with apex at `v = 0`; `v` is the distance along the axis.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Cone {
    pub apex: Point3d,
    pub axis: Vec3,
    pub half_angle: f64,
    pub ref_dir: Vec3,
}

impl Cone {
    pub fn new(apex: Point3d, axis: Vec3, half_angle: f64) -> Self {
        let axis = axis.normalized_or(Vec3::Z);
        Self {
            apex,
            axis,
            half_angle,
            ref_dir: default_ref_dir(&axis),
        }
    }

    fn radial(&self, u: f64) -> Vec3 {
        let y_dir = self.axis.cross(&self.ref_dir);
        self.ref_dir * u.cos() + y_dir * u.sin()
    }

    pub fn evaluate(&self, u: f64, v: f64) -> Point3d {
        let r = v * self.half_angle.tan();
        self.apex + self.axis * v + self.radial(u) * r
    }

    fn split(&self, p: &Point3d) -> (Vec3, f64) {
        let d = *p - self.apex;
        let h = d.dot(&self.axis);
        (d - self.axis * h, h)
    }

    pub fn parameters_of(&self, p: &Point3d) -> (f64, f64) {
        let (radial, h) = self.split(p);
        let (sin_a, cos_a) = self.half_angle.sin_cos();
        let along = radial.length() * sin_a + h * cos_a;
        (frame_angle(&radial, &self.axis, &self.ref_dir), along * cos_a)
    }

    pub fn signed_distance(&self, p: &Point3d) -> f64 {
        let (radial, h) = self.split(p);
        let (sin_a, cos_a) = self.half_angle.sin_cos();
        radial.length() * cos_a - h * sin_a
    }
}

/// A sphere. `u` is the longitude in `[0, 2π)`, `v` the latitude in `[-π/2, π/2]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Sphere {
    pub center: Point3d,
    pub radius: f64,
    pub axis: Vec3,
    pub ref_dir: Vec3,
}

impl Sphere {
    pub fn new(center: Point3d, radius: f64) -> Self {
        Self {
            center,
            radius,
            axis: Vec3::Z,
            ref_dir: Vec3::X,
        }
    }

    fn radial(&self, u: f64) -> Vec3 {
        let y_dir = self.axis.cross(&self.ref_dir);
        self.ref_dir * u.cos() + y_dir * u.sin()
    }

    pub fn evaluate(&self, u: f64, v: f64) -> Point3d {
        self.center
            + self.radial(u) * (self.radius * v.cos())
            + self.axis * (self.radius * v.sin())
    }

    pub fn parameters_of(&self, p: &Point3d) -> (f64, f64) {
        let d = *p - self.center;
        let len = d.length();
        if len < 1e-15 {
            return (0.0, 0.0);
        }
        let h = d.dot(&self.axis);
        let radial = d - self.axis * h;
        let u = if radial.length() < 1e-12 * len {
            0.0
        } else {
            frame_angle(&radial, &self.axis, &self.ref_dir)
        };
        (u, (h / len).clamp(-1.0, 1.0).asin())
    }

    pub fn signed_distance(&self, p: &Point3d) -> f64 {
        p.distance_to(&self.center) - self.radius
    }
}

/// A torus. `u` runs around the axis, `v` around the tube.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Torus {
    pub center: Point3d,
    pub axis: Vec3,
    pub major_radius: f64,
    pub minor_radius: f64,
    pub ref_dir: Vec3,
}

impl Torus {
    pub fn new(center: Point3d, axis: Vec3, major_radius: f64, minor_radius: f64) -> Self {
        let axis = axis.normalized_or(Vec3::Z);
        Self {
            center,
            axis,
            major_radius,
            minor_radius,
            ref_dir: default_ref_dir(&axis),
        }
    }

    fn radial(&self, u: f64) -> Vec3 {
        let y_dir = self.axis.cross(&self.ref_dir);
        self.ref_dir * u.cos() + y_dir * u.sin()
    }

    pub fn evaluate(&self, u: f64, v: f64) -> Point3d {
        let radial = self.radial(u);
        self.center
            + radial * (self.major_radius + self.minor_radius * v.cos())
            + self.axis * (self.minor_radius * v.sin())
    }

    fn split(&self, p: &Point3d) -> (Vec3, f64) {
        let d = *p - self.center;
        let h = d.dot(&self.axis);
        (d - self.axis * h, h)
    }

    pub fn parameters_of(&self, p: &Point3d) -> (f64, f64) {
        let (radial, h) = self.split(p);
        let u = frame_angle(&radial, &self.axis, &self.ref_dir);
        let v = Vec2::new(radial.length() - self.major_radius, h).angle();
        (u, v)
    }

    pub fn signed_distance(&self, p: &Point3d) -> f64 {
        let (radial, h) = self.split(p);
        let rho = radial.length() - self.major_radius;
        (rho * rho + h * h).sqrt() - self.minor_radius
    }
}

impl Surface {
    pub fn evaluate(&self, u: f64, v: f64) -> Point3d {
        match self {
            Surface::Plane(p) => p.evaluate(u, v),
            Surface::Cylinder(c) => c.evaluate(u, v),
            Surface::Cone(c) => c.evaluate(u, v),
            Surface::Sphere(s) => s.evaluate(u, v),
            Surface::Torus(t) => t.evaluate(u, v),
        }
    }

    /// First partial derivatives `(Su, Sv)`.
    pub fn derivatives(&self, u: f64, v: f64) -> (Vec3, Vec3) {
        match self {
            Surface::Plane(p) => (p.u_axis, p.v_axis),
            Surface::Cylinder(c) => {
                let du = c.axis.cross(&c.radial(u)) * c.radius;
                (du, c.axis)
            }
            Surface::Cone(c) => {
                let tan_a = c.half_angle.tan();
                let radial = c.radial(u);
                let du = c.axis.cross(&radial) * (v * tan_a);
                (du, c.axis + radial * tan_a)
            }
            Surface::Sphere(s) => {
                let radial = s.radial(u);
                let du = s.axis.cross(&radial) * (s.radius * v.cos());
                let dv = radial * (-s.radius * v.sin()) + s.axis * (s.radius * v.cos());
                (du, dv)
            }
            Surface::Torus(t) => {
                let radial = t.radial(u);
                let du = t.axis.cross(&radial) * (t.major_radius + t.minor_radius * v.cos());
                let dv = radial * (-t.minor_radius * v.sin()) + t.axis * (t.minor_radius * v.cos());
                (du, dv)
            }
        }
    }

    /// Unit normal `Su x Sv`, falling back to the implicit gradient at
    /// singular points (poles, apex).
    pub fn normal_at(&self, u: f64, v: f64) -> Vec3 {
        let (du, dv) = self.derivatives(u, v);
        match du.cross(&dv).normalized() {
            Some(n) => n,
            None => self.gradient(&self.evaluate(u, v)),
        }
    }

    /// Inverse mapping; periodic parameters land in `[0, 2π)`.
    pub fn parameters_of(&self, p: &Point3d) -> (f64, f64) {
        match self {
            Surface::Plane(s) => s.parameters_of(p),
            Surface::Cylinder(s) => s.parameters_of(p),
            Surface::Cone(s) => s.parameters_of(p),
            Surface::Sphere(s) => s.parameters_of(p),
            Surface::Torus(s) => s.parameters_of(p),
        }
    }

    pub fn u_period(&self) -> Option<f64> {
        match self {
            Surface::Plane(_) => None,
            Surface::Cylinder(_) | Surface::Cone(_) | Surface::Sphere(_) | Surface::Torus(_) => {
                Some(TAU)
            }
        }
    }

    pub fn v_period(&self) -> Option<f64> {
        match self {
            Surface::Torus(_) => Some(TAU),
            _ => None,
        }
    }

    /// Bounded v range for surfaces with poles.
    pub fn v_limits(&self) -> Option<(f64, f64)> {
        match self {
            Surface::Sphere(_) => Some((-FRAC_PI_2, FRAC_PI_2)),
            _ => None,
        }
    }

    /// Signed distance, positive on the side `normal_at` points to.
    pub fn signed_distance(&self, p: &Point3d) -> f64 {
        match self {
            Surface::Plane(s) => s.signed_distance(p),
            Surface::Cylinder(s) => s.signed_distance(p),
            Surface::Cone(s) => s.signed_distance(p),
            Surface::Sphere(s) => s.signed_distance(p),
            Surface::Torus(s) => s.signed_distance(p),
        }
    }

    /// Unit gradient of `signed_distance` at `p`.
    pub fn gradient(&self, p: &Point3d) -> Vec3 {
        match self {
            Surface::Plane(s) => s.normal,
            Surface::Cylinder(s) => s.split(p).0.normalized_or(s.ref_dir),
            Surface::Cone(s) => {
                let (radial, _) = s.split(p);
                let (sin_a, cos_a) = s.half_angle.sin_cos();
                let dir = radial.normalized_or(s.ref_dir);
                (dir * cos_a - s.axis * sin_a).normalized_or(dir)
            }
            Surface::Sphere(s) => (*p - s.center).normalized_or(s.axis),
            Surface::Torus(s) => {
                let (radial, h) = s.split(p);
                let dir = radial.normalized_or(s.ref_dir);
                let rho = radial.length() - s.major_radius;
                (dir * rho + s.axis * h).normalized_or(dir)
            }
        }
    }

    /// Foot point parameters and distance of `p`.
    pub fn project_point(&self, p: &Point3d) -> ((f64, f64), f64) {
        let (u, v) = self.parameters_of(p);
        ((u, v), p.distance_to(&self.evaluate(u, v)))
    }

    /// Same-domain test: identical kind and parameters within `tol`,
    /// confirmed on a few sample points.
    pub fn is_coincident(&self, other: &Surface, tol: f64, angular: f64) -> bool {
        let params_match = match (self, other) {
            (Surface::Plane(a), Surface::Plane(b)) => {
                a.normal.is_parallel_to(&b.normal, angular) && a.signed_distance(&b.origin).abs() <= tol
            }
            (Surface::Cylinder(a), Surface::Cylinder(b)) => {
                a.axis.is_parallel_to(&b.axis, angular)
                    && (a.radius - b.radius).abs() <= tol
                    && a.split(&b.origin).0.length() <= tol
            }
            (Surface::Cone(a), Surface::Cone(b)) => {
                a.apex.distance_to(&b.apex) <= tol
                    && a.axis.dot(&b.axis) > 0.0
                    && a.axis.is_parallel_to(&b.axis, angular)
                    && (a.half_angle - b.half_angle).abs() <= angular.max(1e-12)
            }
            (Surface::Sphere(a), Surface::Sphere(b)) => {
                a.center.distance_to(&b.center) <= tol && (a.radius - b.radius).abs() <= tol
            }
            (Surface::Torus(a), Surface::Torus(b)) => {
                a.center.distance_to(&b.center) <= tol
                    && a.axis.is_parallel_to(&b.axis, angular)
                    && (a.major_radius - b.major_radius).abs() <= tol
                    && (a.minor_radius - b.minor_radius).abs() <= tol
            }
            _ => false,
        };
        if !params_match {
            return false;
        }
        const SAMPLES: [(f64, f64); 4] = [(0.0, 0.0), (1.0, 0.5), (2.5, -0.5), (4.0, 1.0)];
        SAMPLES
            .iter()
            .all(|&(u, v)| other.signed_distance(&self.evaluate(u, v)).abs() <= tol * 10.0)
    }

    pub fn transformed(&self, t: &Transform) -> Surface {
        let s = t.scale_factor();
        let dir = |v: &Vec3| t.transform_vector(v).normalized_or(*v);
        match self {
            Surface::Plane(p) => {
                let u_axis = dir(&p.u_axis);
                let v_axis = dir(&p.v_axis);
                Surface::Plane(Plane {
                    origin: t.transform_point(&p.origin),
                    normal: u_axis.cross(&v_axis),
                    u_axis,
                    v_axis,
                })
            }
            Surface::Cylinder(c) => Surface::Cylinder(Cylinder {
                origin: t.transform_point(&c.origin),
                axis: dir(&c.axis),
                radius: c.radius * s,
                ref_dir: dir(&c.ref_dir),
            }),
            Surface::Cone(c) => Surface::Cone(Cone {
                apex: t.transform_point(&c.apex),
                axis: dir(&c.axis),
                half_angle: c.half_angle,
                ref_dir: dir(&c.ref_dir),
            }),
            Surface::Sphere(sp) => Surface::Sphere(Sphere {
                center: t.transform_point(&sp.center),
                radius: sp.radius * s,
                axis: dir(&sp.axis),
                ref_dir: dir(&sp.ref_dir),
            }),
            Surface::Torus(tr) => Surface::Torus(Torus {
                center: t.transform_point(&tr.center),
                axis: dir(&tr.axis),
                major_radius: tr.major_radius * s,
                minor_radius: tr.minor_radius * s,
                ref_dir: dir(&tr.ref_dir),
            }),
        }
    }

    pub fn surface_type_name(&self) -> &'static str {
        match self {
            Surface::Plane(_) => "Plane",
            Surface::Cylinder(_) => "Cylinder",
            Surface::Cone(_) => "Cone",
            Surface::Sphere(_) => "Sphere",
            Surface::Torus(_) => "Torus",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn all_surfaces() -> Vec<Surface> {
        vec![
            Surface::Plane(Plane::new(Point3d::new(0.0, 0.0, 1.0), Vec3::new(0.0, 1.0, 1.0))),
            Surface::Cylinder(Cylinder::new(Point3d::ORIGIN, Vec3::Z, 2.0)),
            Surface::Cone(Cone::new(Point3d::ORIGIN, Vec3::Z, 0.4)),
            Surface::Sphere(Sphere::new(Point3d::new(1.0, 2.0, 3.0), 1.5)),
            Surface::Torus(Torus::new(Point3d::ORIGIN, Vec3::Z, 5.0, 1.0)),
        ]
    }

    #[test]
    fn test_parameters_round_trip() {
        for s in all_surfaces() {
            for &(u, v) in &[(0.3, 0.7), (2.0, 1.2), (5.5, 0.4)] {
                let p = s.evaluate(u, v);
                let (pu, pv) = s.parameters_of(&p);
                let q = s.evaluate(pu, pv);
                assert!(p.distance_to(&q) < 1e-9, "{} at ({u}, {v})", s.surface_type_name());
                assert!(s.signed_distance(&p).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_normal_matches_gradient() {
        for s in all_surfaces() {
            let p = s.evaluate(0.9, 0.6);
            let n = s.normal_at(0.9, 0.6);
            let g = s.gradient(&p);
            assert!(n.dot(&g) > 1.0 - 1e-9, "{}", s.surface_type_name());
        }
    }

    #[test]
    fn test_sphere_normal_is_outward() {
        let s = Surface::Sphere(Sphere::new(Point3d::ORIGIN, 2.0));
        let p = s.evaluate(0.5, 0.3);
        let n = s.normal_at(0.5, 0.3);
        assert!((n.dot(&(p - Point3d::ORIGIN)) - 2.0).abs() < 1e-10);
        // pole falls back to the gradient
        let pole = s.normal_at(1.0, PI / 2.0);
        assert!((pole.z - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_signed_distance_sign() {
        let c = Surface::Cylinder(Cylinder::new(Point3d::ORIGIN, Vec3::Z, 1.0));
        assert!(c.signed_distance(&Point3d::new(3.0, 0.0, 5.0)) > 0.0);
        assert!(c.signed_distance(&Point3d::new(0.2, 0.0, 5.0)) < 0.0);
        let t = Surface::Torus(Torus::new(Point3d::ORIGIN, Vec3::Z, 5.0, 1.0));
        assert!((t.signed_distance(&Point3d::new(5.0, 0.0, 0.0)) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_coincident_planes_ignore_normal_sign() {
        let a = Surface::Plane(Plane::new(Point3d::ORIGIN, Vec3::Z));
        let b = Surface::Plane(Plane::new(Point3d::new(3.0, 1.0, 0.0), -Vec3::Z));
        let c = Surface::Plane(Plane::new(Point3d::new(0.0, 0.0, 0.1), Vec3::Z));
        assert!(a.is_coincident(&b, 1e-7, 1e-10));
        assert!(!a.is_coincident(&c, 1e-7, 1e-10));
        let s = Surface::Sphere(Sphere::new(Point3d::ORIGIN, 1.0));
        assert!(!a.is_coincident(&s, 1e-7, 1e-10));
    }

    #[test]
    fn test_transformed_sphere() {
        let s = Surface::Sphere(Sphere::new(Point3d::ORIGIN, 1.0));
        let moved = s.transformed(&Transform::translation(0.0, 0.0, 2.0));
        assert!(moved.signed_distance(&Point3d::new(0.0, 0.0, 3.0)).abs() < 1e-12);
    }
}
