use crate::Tolerance;

use super::curves::{Circle3d, Curve, Ellipse3d, Line3d};
use super::point::Point3d;
use super::surfaces::{Cone, Cylinder, Plane, Sphere, Surface, Torus};

/// Result of intersecting two untrimmed surfaces.
#[derive(Debug, Clone)]
pub enum SurfaceIntersection {
    /// Surfaces do not meet.
    Empty,
    /// Surfaces touch at a single point.
    Point(Point3d),
    /// Closed-form intersection curves (lines are unbounded).
    Curves(Vec<Curve>),
    /// Identical geometric locus.
    Coincident,
    /// No closed form for this configuration; the caller must march.
    NeedsMarching,
}

/// Closed-form surface/surface intersection, dispatched on the kind pair.
pub fn intersect_surfaces(s1: &Surface, s2: &Surface, tol: &Tolerance) -> SurfaceIntersection {
    if s1.is_coincident(s2, tol.coincidence, tol.angular) {
        return SurfaceIntersection::Coincident;
    }
    match (s1, s2) {
        (Surface::Plane(a), Surface::Plane(b)) => plane_plane(a, b, tol),
        (Surface::Plane(p), Surface::Cylinder(c)) | (Surface::Cylinder(c), Surface::Plane(p)) => {
            plane_cylinder(p, c, tol)
        }
        (Surface::Plane(p), Surface::Sphere(s)) | (Surface::Sphere(s), Surface::Plane(p)) => {
            plane_sphere(p, s, tol)
        }
        (Surface::Plane(p), Surface::Cone(c)) | (Surface::Cone(c), Surface::Plane(p)) => {
            plane_cone(p, c, tol)
        }
        (Surface::Plane(p), Surface::Torus(t)) | (Surface::Torus(t), Surface::Plane(p)) => {
            plane_torus(p, t, tol)
        }
        (Surface::Sphere(a), Surface::Sphere(b)) => sphere_sphere(a, b, tol),
        (Surface::Sphere(s), Surface::Cylinder(c)) | (Surface::Cylinder(c), Surface::Sphere(s)) => {
            sphere_cylinder(s, c, tol)
        }
        (Surface::Cylinder(a), Surface::Cylinder(b)) => cylinder_cylinder(a, b, tol),
        (Surface::Sphere(_), Surface::Cone(_))
        | (Surface::Cone(_), Surface::Sphere(_))
        | (Surface::Sphere(_), Surface::Torus(_))
        | (Surface::Torus(_), Surface::Sphere(_))
        | (Surface::Cylinder(_), Surface::Cone(_))
        | (Surface::Cone(_), Surface::Cylinder(_))
        | (Surface::Cylinder(_), Surface::Torus(_))
        | (Surface::Torus(_), Surface::Cylinder(_))
        | (Surface::Cone(_), Surface::Cone(_))
        | (Surface::Cone(_), Surface::Torus(_))
        | (Surface::Torus(_), Surface::Cone(_))
        | (Surface::Torus(_), Surface::Torus(_)) => SurfaceIntersection::NeedsMarching,
    }
}

// ─── Plane–Plane ─────────────────────────────────────────────────────────────

pub fn plane_plane(p1: &Plane, p2: &Plane, tol: &Tolerance) -> SurfaceIntersection {
    let cross = p1.normal.cross(&p2.normal);
    let cross_len = cross.length();
    if cross_len < tol.angular.max(1e-12) {
        return if p1.signed_distance(&p2.origin).abs() <= tol.coincidence {
            SurfaceIntersection::Coincident
        } else {
            SurfaceIntersection::Empty
        };
    }
    let dir = cross / cross_len;
    // n_i . P = d_i for both planes, P = c1 n1 + c2 n2
    let d1 = p1.origin.to_vec3().dot(&p1.normal);
    let d2 = p2.origin.to_vec3().dot(&p2.normal);
    let n1n2 = p1.normal.dot(&p2.normal);
    let denom = 1.0 - n1n2 * n1n2;
    let c1 = (d1 - d2 * n1n2) / denom;
    let c2 = (d2 - d1 * n1n2) / denom;
    let origin = Point3d::ORIGIN + p1.normal * c1 + p2.normal * c2;
    SurfaceIntersection::Curves(vec![Curve::Line(Line3d::new(origin, dir))])
}

// ─── Plane–Cylinder ──────────────────────────────────────────────────────────

/// Perpendicular plane gives a circle, a parallel plane zero to two lines,
/// an oblique plane an ellipse.
pub fn plane_cylinder(plane: &Plane, cyl: &Cylinder, tol: &Tolerance) -> SurfaceIntersection {
    let cos_theta = plane.normal.dot(&cyl.axis);
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();

    if sin_theta < 1e-9 {
        let center = cyl.origin - plane.normal * plane.signed_distance(&cyl.origin);
        let circle = Circle3d::new(center, plane.normal, cyl.radius);
        return SurfaceIntersection::Curves(vec![Curve::Circle(circle)]);
    }

    if cos_theta.abs() < 1e-9 {
        let signed = plane.signed_distance(&cyl.origin);
        let dist = signed.abs();
        if dist > cyl.radius + tol.coincidence {
            return SurfaceIntersection::Empty;
        }
        let foot = cyl.origin - plane.normal * signed;
        if (dist - cyl.radius).abs() <= tol.coincidence {
            return SurfaceIntersection::Curves(vec![Curve::Line(Line3d::new(foot, cyl.axis))]);
        }
        let half_chord = (cyl.radius * cyl.radius - dist * dist).max(0.0).sqrt();
        let lateral = cyl.axis.cross(&plane.normal).normalized_or(cyl.ref_dir);
        return SurfaceIntersection::Curves(vec![
            Curve::Line(Line3d::new(foot + lateral * half_chord, cyl.axis)),
            Curve::Line(Line3d::new(foot - lateral * half_chord, cyl.axis)),
        ]);
    }

    let t = (plane.origin - cyl.origin).dot(&plane.normal) / cos_theta;
    let center = cyl.origin + cyl.axis * t;
    let axis_in_plane = cyl.axis - plane.normal * cos_theta;
    let Some(major_axis) = axis_in_plane.normalized() else {
        return SurfaceIntersection::NeedsMarching;
    };
    let ellipse = Ellipse3d::new(
        center,
        plane.normal,
        major_axis,
        cyl.radius / cos_theta.abs(),
        cyl.radius,
    );
    SurfaceIntersection::Curves(vec![Curve::Ellipse(ellipse)])
}

// ─── Plane–Sphere ────────────────────────────────────────────────────────────

pub fn plane_sphere(plane: &Plane, sphere: &Sphere, tol: &Tolerance) -> SurfaceIntersection {
    let signed = plane.signed_distance(&sphere.center);
    let dist = signed.abs();
    if dist > sphere.radius + tol.coincidence {
        return SurfaceIntersection::Empty;
    }
    let center = sphere.center - plane.normal * signed;
    if (dist - sphere.radius).abs() <= tol.coincidence {
        return SurfaceIntersection::Point(center);
    }
    let r = (sphere.radius * sphere.radius - dist * dist).max(0.0).sqrt();
    SurfaceIntersection::Curves(vec![Curve::Circle(Circle3d::new(center, plane.normal, r))])
}

// ─── Plane–Cone ──────────────────────────────────────────────────────────────

/// Only the perpendicular configuration (a circle) has a closed form here.
pub fn plane_cone(plane: &Plane, cone: &Cone, tol: &Tolerance) -> SurfaceIntersection {
    let cos_theta = plane.normal.dot(&cone.axis);
    if (1.0 - cos_theta.abs()) > 1e-12 {
        return SurfaceIntersection::NeedsMarching;
    }
    let h = (plane.origin - cone.apex).dot(&cone.axis);
    if h < -tol.coincidence {
        return SurfaceIntersection::Empty;
    }
    let center = cone.apex + cone.axis * h;
    if h.abs() <= tol.coincidence {
        return SurfaceIntersection::Point(center);
    }
    let r = h * cone.half_angle.tan();
    SurfaceIntersection::Curves(vec![Curve::Circle(Circle3d::new(center, plane.normal, r))])
}

// ─── Plane–Torus ─────────────────────────────────────────────────────────────

/// Perpendicular planes through the tube give one or two circles.
pub fn plane_torus(plane: &Plane, torus: &Torus, tol: &Tolerance) -> SurfaceIntersection {
    let cos_theta = plane.normal.dot(&torus.axis);
    if (1.0 - cos_theta.abs()) > 1e-12 {
        return SurfaceIntersection::NeedsMarching;
    }
    let h = (plane.origin - torus.center).dot(&torus.axis);
    let r = torus.minor_radius;
    if h.abs() > r + tol.coincidence {
        return SurfaceIntersection::Empty;
    }
    let center = torus.center + torus.axis * h;
    let half = (r * r - h * h).max(0.0).sqrt();
    if half <= tol.coincidence {
        return SurfaceIntersection::Curves(vec![Curve::Circle(Circle3d::new(
            center,
            plane.normal,
            torus.major_radius,
        ))]);
    }
    let mut curves = vec![Curve::Circle(Circle3d::new(
        center,
        plane.normal,
        torus.major_radius + half,
    ))];
    if torus.major_radius - half > tol.coincidence {
        curves.push(Curve::Circle(Circle3d::new(
            center,
            plane.normal,
            torus.major_radius - half,
        )));
    }
    SurfaceIntersection::Curves(curves)
}

// ─── Sphere–Sphere ───────────────────────────────────────────────────────────

pub fn sphere_sphere(a: &Sphere, b: &Sphere, tol: &Tolerance) -> SurfaceIntersection {
    let d_vec = b.center - a.center;
    let d = d_vec.length();
    if d < tol.coincidence {
        return if (a.radius - b.radius).abs() <= tol.coincidence {
            SurfaceIntersection::Coincident
        } else {
            SurfaceIntersection::Empty
        };
    }
    if d > a.radius + b.radius + tol.coincidence || d < (a.radius - b.radius).abs() - tol.coincidence {
        return SurfaceIntersection::Empty;
    }
    let axis = d_vec / d;
    // distance from a.center to the radical plane
    let x = (d * d + a.radius * a.radius - b.radius * b.radius) / (2.0 * d);
    let r2 = a.radius * a.radius - x * x;
    let center = a.center + axis * x;
    if r2 <= tol.coincidence * tol.coincidence {
        return SurfaceIntersection::Point(center);
    }
    SurfaceIntersection::Curves(vec![Curve::Circle(Circle3d::new(center, axis, r2.sqrt()))])
}

// ─── Sphere–Cylinder ─────────────────────────────────────────────────────────

/// Coaxial configurations only (sphere center on the cylinder axis).
pub fn sphere_cylinder(sphere: &Sphere, cyl: &Cylinder, tol: &Tolerance) -> SurfaceIntersection {
    let d = sphere.center - cyl.origin;
    let h = d.dot(&cyl.axis);
    let off_axis = (d - cyl.axis * h).length();
    if off_axis > tol.coincidence {
        return SurfaceIntersection::NeedsMarching;
    }
    if cyl.radius > sphere.radius + tol.coincidence {
        return SurfaceIntersection::Empty;
    }
    let center = cyl.origin + cyl.axis * h;
    let dh2 = sphere.radius * sphere.radius - cyl.radius * cyl.radius;
    if dh2 <= tol.coincidence * tol.coincidence {
        return SurfaceIntersection::Curves(vec![Curve::Circle(Circle3d::new(
            center,
            cyl.axis,
            cyl.radius,
        ))]);
    }
    let dh = dh2.sqrt();
    SurfaceIntersection::Curves(vec![
        Curve::Circle(Circle3d::new(center + cyl.axis * dh, cyl.axis, cyl.radius)),
        Curve::Circle(Circle3d::new(center - cyl.axis * dh, cyl.axis, cyl.radius)),
    ])
}

// ─── Cylinder–Cylinder ───────────────────────────────────────────────────────

/// Parallel axes give zero to two lines; anything else needs marching.
pub fn cylinder_cylinder(a: &Cylinder, b: &Cylinder, tol: &Tolerance) -> SurfaceIntersection {
    if !a.axis.is_parallel_to(&b.axis, 1e-9) {
        return SurfaceIntersection::NeedsMarching;
    }
    let offset = b.origin - a.origin;
    let radial = offset - a.axis * offset.dot(&a.axis);
    let d = radial.length();
    if d < tol.coincidence {
        return SurfaceIntersection::Empty;
    }
    if d > a.radius + b.radius + tol.coincidence || d < (a.radius - b.radius).abs() - tol.coincidence {
        return SurfaceIntersection::Empty;
    }
    let dir = radial / d;
    let x = (d * d + a.radius * a.radius - b.radius * b.radius) / (2.0 * d);
    let half = (a.radius * a.radius - x * x).max(0.0).sqrt();
    let base = a.origin + dir * x;
    if half <= tol.coincidence {
        return SurfaceIntersection::Curves(vec![Curve::Line(Line3d::new(base, a.axis))]);
    }
    let lateral = a.axis.cross(&dir);
    SurfaceIntersection::Curves(vec![
        Curve::Line(Line3d::new(base + lateral * half, a.axis)),
        Curve::Line(Line3d::new(base - lateral * half, a.axis)),
    ])
}
