use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

use super::point::{Point2d, Point3d};
use super::transform::{BoundingBox, Transform};
use super::vector::{Vec2, Vec3};

/// 3D curve kinds carried by edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Curve {
    Line(Line3d),
    Circle(Circle3d),
    Ellipse(Ellipse3d),
    /// Piecewise-linear approximation, parameterized by vertex index.
    Polyline(Polyline3d),
}

/// An infinite line with unit direction; parameter is arc length from `origin`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Line3d {
    pub origin: Point3d,
    pub direction: Vec3,
}

impl Line3d {
    pub fn new(origin: Point3d, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalized_or(Vec3::X),
        }
    }

    pub fn from_points(a: Point3d, b: Point3d) -> Self {
        Self::new(a, b - a)
    }

    pub fn evaluate(&self, t: f64) -> Point3d {
        self.origin + self.direction * t
    }

    pub fn parameter_of(&self, p: &Point3d) -> f64 {
        (*p - self.origin).dot(&self.direction)
    }

    pub fn distance_to_point(&self, p: &Point3d) -> f64 {
        p.distance_to(&self.evaluate(self.parameter_of(p)))
    }
}

/// A circle in 3D space.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Circle3d {
    pub center: Point3d,
    pub normal: Vec3,
    pub radius: f64,
    /// Direction of parameter zero.
    pub x_axis: Vec3,
}

impl Circle3d {
    pub fn new(center: Point3d, normal: Vec3, radius: f64) -> Self {
        let normal = normal.normalized_or(Vec3::Z);
        let x_axis = if normal.x.abs() < 0.9 {
            Vec3::X.cross(&normal).normalized_or(Vec3::Y)
        } else {
            Vec3::Y.cross(&normal).normalized_or(Vec3::Z)
        };
        Self {
            center,
            normal,
            radius,
            x_axis,
        }
    }

    pub fn with_axes(center: Point3d, normal: Vec3, x_axis: Vec3, radius: f64) -> Self {
        Self {
            center,
            normal: normal.normalized_or(Vec3::Z),
            x_axis: x_axis.normalized_or(Vec3::X),
            radius,
        }
    }

    pub fn y_axis(&self) -> Vec3 {
        self.normal.cross(&self.x_axis)
    }

    pub fn evaluate(&self, t: f64) -> Point3d {
        self.center
            + self.x_axis * (self.radius * t.cos())
            + self.y_axis() * (self.radius * t.sin())
    }

    pub fn derivative(&self, t: f64) -> Vec3 {
        self.x_axis * (-self.radius * t.sin()) + self.y_axis() * (self.radius * t.cos())
    }

    /// Angle of the projection of `p` onto the circle plane, in `[0, 2π)`.
    pub fn angle_of(&self, p: &Point3d) -> f64 {
        let d = *p - self.center;
        Vec2::new(d.dot(&self.x_axis), d.dot(&self.y_axis())).angle()
    }
}

/// An ellipse in 3D space.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Ellipse3d {
    pub center: Point3d,
    pub normal: Vec3,
    pub major_axis: Vec3,
    pub major_radius: f64,
    pub minor_radius: f64,
}

impl Ellipse3d {
    pub fn new(
        center: Point3d,
        normal: Vec3,
        major_axis: Vec3,
        major_radius: f64,
        minor_radius: f64,
    ) -> Self {
        Self {
            center,
            normal: normal.normalized_or(Vec3::Z),
            major_axis: major_axis.normalized_or(Vec3::X),
            major_radius,
            minor_radius,
        }
    }

    fn minor_axis(&self) -> Vec3 {
        self.normal.cross(&self.major_axis)
    }

    pub fn evaluate(&self, t: f64) -> Point3d {
        self.center
            + self.major_axis * (self.major_radius * t.cos())
            + self.minor_axis() * (self.minor_radius * t.sin())
    }

    pub fn derivative(&self, t: f64) -> Vec3 {
        self.major_axis * (-self.major_radius * t.sin())
            + self.minor_axis() * (self.minor_radius * t.cos())
    }
}

/// Chain of points; parameter `i + s` lies on segment `i` at fraction `s`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Polyline3d {
    pub points: Vec<Point3d>,
}

impl Polyline3d {
    pub fn new(points: Vec<Point3d>) -> Self {
        Self { points }
    }

    pub fn last_parameter(&self) -> f64 {
        self.points.len().saturating_sub(1) as f64
    }

    fn segment(&self, t: f64) -> (usize, f64) {
        let n = self.points.len();
        if n < 2 {
            return (0, 0.0);
        }
        let t = t.clamp(0.0, (n - 1) as f64);
        let i = (t.floor() as usize).min(n - 2);
        (i, t - i as f64)
    }

    pub fn evaluate(&self, t: f64) -> Point3d {
        match self.points.len() {
            0 => Point3d::ORIGIN,
            1 => self.points[0],
            _ => {
                let (i, s) = self.segment(t);
                self.points[i].lerp(&self.points[i + 1], s)
            }
        }
    }

    pub fn derivative(&self, t: f64) -> Vec3 {
        if self.points.len() < 2 {
            return Vec3::ZERO;
        }
        let (i, _) = self.segment(t);
        self.points[i + 1] - self.points[i]
    }

    fn is_closed(&self) -> bool {
        match (self.points.first(), self.points.last()) {
            (Some(a), Some(b)) => self.points.len() > 2 && a.distance_to(b) < 1e-12,
            _ => false,
        }
    }
}

/// Straight parameter-space curve; the parameter matches the owning
/// edge's 3D parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Line2d {
    pub origin: Point2d,
    pub direction: Vec2,
}

impl Line2d {
    pub fn new(origin: Point2d, direction: Vec2) -> Self {
        Self { origin, direction }
    }

    pub fn evaluate(&self, t: f64) -> Point2d {
        self.origin + self.direction * t
    }
}

impl Curve {
    pub fn evaluate(&self, t: f64) -> Point3d {
        match self {
            Curve::Line(l) => l.evaluate(t),
            Curve::Circle(c) => c.evaluate(t),
            Curve::Ellipse(e) => e.evaluate(t),
            Curve::Polyline(p) => p.evaluate(t),
        }
    }

    pub fn derivative(&self, t: f64) -> Vec3 {
        match self {
            Curve::Line(l) => l.direction,
            Curve::Circle(c) => c.derivative(t),
            Curve::Ellipse(e) => e.derivative(t),
            Curve::Polyline(p) => p.derivative(t),
        }
    }

    pub fn second_derivative(&self, t: f64) -> Vec3 {
        match self {
            Curve::Line(_) | Curve::Polyline(_) => Vec3::ZERO,
            Curve::Circle(c) => c.center - c.evaluate(t),
            Curve::Ellipse(e) => e.center - e.evaluate(t),
        }
    }

    /// Parameter period of closed analytic curves.
    pub fn period(&self) -> Option<f64> {
        match self {
            Curve::Circle(_) | Curve::Ellipse(_) => Some(TAU),
            Curve::Line(_) | Curve::Polyline(_) => None,
        }
    }

    /// Whether the curve returns to its start over `range`.
    pub fn is_closed_over(&self, range: (f64, f64)) -> bool {
        match self {
            Curve::Circle(_) | Curve::Ellipse(_) => (range.1 - range.0 - TAU).abs() < 1e-9,
            Curve::Line(_) => false,
            Curve::Polyline(p) => p.is_closed(),
        }
    }

    /// Parameter step along the curve corresponding to a 3D distance
    /// `tolerance` at `t`.
    pub fn parametric_tolerance(&self, t: f64, tolerance: f64) -> f64 {
        let speed = self.derivative(t).length();
        if speed < 1e-15 {
            tolerance
        } else {
            tolerance / speed
        }
    }

    /// Closest point of the curve restricted to `range`: `(parameter, distance)`.
    pub fn project_point(&self, p: &Point3d, range: (f64, f64)) -> (f64, f64) {
        let (t0, t1) = ordered(range);
        let t = match self {
            Curve::Line(l) => l.parameter_of(p).clamp(t0, t1),
            Curve::Circle(c) => fit_angle(c.angle_of(p), (t0, t1), |t| {
                p.distance_squared_to(&c.evaluate(t))
            }),
            Curve::Polyline(poly) => project_polyline(poly, p, (t0, t1)),
            Curve::Ellipse(_) => self.project_by_sampling(p, (t0, t1)),
        };
        (t, p.distance_to(&self.evaluate(t)))
    }

    fn project_by_sampling(&self, p: &Point3d, (t0, t1): (f64, f64)) -> f64 {
        const SAMPLES: usize = 64;
        let mut best = t0;
        let mut best_d = f64::INFINITY;
        for i in 0..=SAMPLES {
            let t = t0 + (t1 - t0) * i as f64 / SAMPLES as f64;
            let d = p.distance_squared_to(&self.evaluate(t));
            if d < best_d {
                best_d = d;
                best = t;
            }
        }
        // Newton on (C(t) - p) . C'(t) = 0
        let mut t = best;
        for _ in 0..20 {
            let diff = self.evaluate(t) - *p;
            let d1 = self.derivative(t);
            let f = diff.dot(&d1);
            let df = d1.length_squared() + diff.dot(&self.second_derivative(t));
            if df.abs() < 1e-18 {
                break;
            }
            let next = (t - f / df).clamp(t0, t1);
            if (next - t).abs() < 1e-14 {
                t = next;
                break;
            }
            t = next;
        }
        if p.distance_squared_to(&self.evaluate(t)) <= best_d {
            t
        } else {
            best
        }
    }

    /// Conservative bounds of the curve over `range`.
    pub fn bounding_box(&self, range: (f64, f64)) -> BoundingBox {
        let (t0, t1) = ordered(range);
        match self {
            Curve::Line(l) => BoundingBox::from_points(&[l.evaluate(t0), l.evaluate(t1)]),
            Curve::Polyline(poly) => {
                let mut bb =
                    BoundingBox::from_points(&[poly.evaluate(t0), poly.evaluate(t1)]);
                let first = t0.ceil().max(0.0) as usize;
                let last = (t1.floor().max(0.0) as usize).min(poly.points.len().saturating_sub(1));
                for p in poly.points.iter().take(last + 1).skip(first) {
                    bb.expand_to_include(p);
                }
                bb
            }
            Curve::Circle(_) | Curve::Ellipse(_) => {
                const SAMPLES: usize = 64;
                let points = self.sample((t0, t1), SAMPLES);
                let step = (t1 - t0) / SAMPLES as f64;
                let radius = match self {
                    Curve::Circle(c) => c.radius,
                    Curve::Ellipse(e) => e.major_radius,
                    _ => 0.0,
                };
                // chord sagitta bound
                let sag = radius * step * step / 8.0;
                BoundingBox::from_points(&points).expanded(sag)
            }
        }
    }

    /// `count + 1` evenly spaced points over `range`.
    pub fn sample(&self, range: (f64, f64), count: usize) -> Vec<Point3d> {
        let count = count.max(1);
        (0..=count)
            .map(|i| {
                let t = range.0 + (range.1 - range.0) * i as f64 / count as f64;
                self.evaluate(t)
            })
            .collect()
    }

    pub fn approximate_length(&self, range: (f64, f64), samples: usize) -> f64 {
        self.sample(range, samples)
            .windows(2)
            .map(|w| w[0].distance_to(&w[1]))
            .sum()
    }

    /// Copy of the curve under `t`. Parameterization is preserved for rigid
    /// motions; uniform scaling keeps angular parameters and rescales lines.
    pub fn transformed(&self, t: &Transform) -> Curve {
        match self {
            Curve::Line(l) => Curve::Line(Line3d {
                origin: t.transform_point(&l.origin),
                direction: t.transform_vector(&l.direction),
            }),
            Curve::Circle(c) => {
                let x_axis = t.transform_vector(&c.x_axis);
                let y_axis = t.transform_vector(&c.y_axis());
                Curve::Circle(Circle3d {
                    center: t.transform_point(&c.center),
                    normal: x_axis.cross(&y_axis).normalized_or(c.normal),
                    radius: c.radius * t.scale_factor(),
                    x_axis: x_axis.normalized_or(c.x_axis),
                })
            }
            Curve::Ellipse(e) => {
                let major = t.transform_vector(&e.major_axis);
                let minor = t.transform_vector(&e.normal.cross(&e.major_axis));
                let s = t.scale_factor();
                Curve::Ellipse(Ellipse3d {
                    center: t.transform_point(&e.center),
                    normal: major.cross(&minor).normalized_or(e.normal),
                    major_axis: major.normalized_or(e.major_axis),
                    major_radius: e.major_radius * s,
                    minor_radius: e.minor_radius * s,
                })
            }
            Curve::Polyline(p) => Curve::Polyline(Polyline3d::new(
                p.points.iter().map(|q| t.transform_point(q)).collect(),
            )),
        }
    }

    pub fn curve_type_name(&self) -> &'static str {
        match self {
            Curve::Line(_) => "Line",
            Curve::Circle(_) => "Circle",
            Curve::Ellipse(_) => "Ellipse",
            Curve::Polyline(_) => "Polyline",
        }
    }
}

fn ordered(range: (f64, f64)) -> (f64, f64) {
    if range.0 <= range.1 {
        range
    } else {
        (range.1, range.0)
    }
}

/// Place a periodic angle into `[t0, t1]`, or pick the nearer range end.
fn fit_angle(angle: f64, (t0, t1): (f64, f64), dist2: impl Fn(f64) -> f64) -> f64 {
    let k = ((t0 - angle) / TAU).ceil();
    let candidate = angle + k * TAU;
    if candidate <= t1 + 1e-12 {
        return candidate.min(t1);
    }
    if dist2(t0) <= dist2(t1) { t0 } else { t1 }
}

fn project_polyline(poly: &Polyline3d, p: &Point3d, (t0, t1): (f64, f64)) -> f64 {
    let n = poly.points.len();
    if n < 2 {
        return t0;
    }
    let mut best = t0;
    let mut best_d = f64::INFINITY;
    let first = t0.floor().max(0.0) as usize;
    let last = (t1.ceil() as usize).min(n - 1);
    for i in first..last.max(first + 1).min(n - 1) {
        let a = poly.points[i];
        let ab = poly.points[i + 1] - a;
        let len2 = ab.length_squared();
        let s = if len2 < 1e-30 {
            0.0
        } else {
            ((*p - a).dot(&ab) / len2).clamp(0.0, 1.0)
        };
        let t = (i as f64 + s).clamp(t0, t1);
        let d = p.distance_squared_to(&poly.evaluate(t));
        if d < best_d {
            best_d = d;
            best = t;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_line_projection_clamps() {
        let line = Curve::Line(Line3d::from_points(Point3d::ORIGIN, Point3d::new(2.0, 0.0, 0.0)));
        let (t, d) = line.project_point(&Point3d::new(1.0, 1.0, 0.0), (0.0, 2.0));
        assert!((t - 1.0).abs() < 1e-12);
        assert!((d - 1.0).abs() < 1e-12);
        let (t, _) = line.project_point(&Point3d::new(5.0, 0.0, 0.0), (0.0, 2.0));
        assert!((t - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_circle_projection_wraps_into_range() {
        let c = Curve::Circle(Circle3d::with_axes(Point3d::ORIGIN, Vec3::Z, Vec3::X, 1.0));
        // angle 0 lies at the end of [π, 2π]
        let (t, d) = c.project_point(&Point3d::new(2.0, 0.0, 0.0), (PI, 2.0 * PI));
        assert!((t - 2.0 * PI).abs() < 1e-9);
        assert!((d - 1.0).abs() < 1e-9);
        let (t, _) = c.project_point(&Point3d::new(0.0, 1.0, 0.0), (0.0, 2.0 * PI));
        assert!((t - FRAC_PI_2).abs() < 1e-9);
    }

    #[test]
    fn test_ellipse_projection_newton() {
        let e = Curve::Ellipse(Ellipse3d::new(Point3d::ORIGIN, Vec3::Z, Vec3::X, 2.0, 1.0));
        let (t, d) = e.project_point(&Point3d::new(0.0, 3.0, 0.0), (0.0, 2.0 * PI));
        assert!((t - FRAC_PI_2).abs() < 1e-6);
        assert!((d - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_polyline_evaluate_and_project() {
        let poly = Curve::Polyline(Polyline3d::new(vec![
            Point3d::ORIGIN,
            Point3d::new(1.0, 0.0, 0.0),
            Point3d::new(1.0, 1.0, 0.0),
        ]));
        let p = poly.evaluate(1.5);
        assert!((p.y - 0.5).abs() < 1e-12);
        let (t, d) = poly.project_point(&Point3d::new(1.2, 0.25, 0.0), (0.0, 2.0));
        assert!((t - 1.25).abs() < 1e-12);
        assert!((d - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_circle_bbox_contains_samples() {
        let c = Curve::Circle(Circle3d::new(Point3d::ORIGIN, Vec3::Z, 1.0));
        let bb = c.bounding_box((0.0, 2.0 * PI));
        for i in 0..100 {
            let p = c.evaluate(i as f64 * 0.0628);
            assert!(bb.contains_point(&p));
        }
        assert!(bb.max.x < 1.01 && bb.min.x > -1.01);
    }

    #[test]
    fn test_transformed_circle_keeps_parameter() {
        let c = Curve::Circle(Circle3d::new(Point3d::ORIGIN, Vec3::Z, 1.0));
        let t = Transform::translation(0.0, 0.0, 3.0);
        let moved = c.transformed(&t);
        let a = c.evaluate(0.7);
        let b = moved.evaluate(0.7);
        assert!((b.z - 3.0).abs() < 1e-12);
        assert!((a.x - b.x).abs() < 1e-12);
    }
}
