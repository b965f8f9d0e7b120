use nalgebra::{Matrix2, Vector2};

use super::curves::Polyline3d;
use super::intersection::bisect;
use super::point::Point3d;
use super::surfaces::Surface;
use super::transform::BoundingBox;
use super::vector::Vec3;

/// Parameters for tracing a surface/surface intersection.
#[derive(Debug, Clone, Copy)]
pub struct MarchOptions {
    /// Maximum chord length between consecutive points.
    pub step: f64,
    /// Distance to both surfaces accepted for a curve point.
    pub tol: f64,
    /// Tracing stops where the curve leaves this box.
    pub bounds: BoundingBox,
    pub max_points: usize,
}

impl MarchOptions {
    pub fn new(bounds: BoundingBox, tol: f64) -> Self {
        Self {
            step: (bounds.diagonal() / 64.0).max(tol * 10.0),
            tol,
            bounds,
            max_points: 4096,
        }
    }
}

/// Newton projection onto the common locus of two surfaces, using the
/// minimum-norm step of the linearized pair of distance equations.
pub fn project_to_both(s1: &Surface, s2: &Surface, p: &Point3d, tol: f64) -> Option<Point3d> {
    let target = (tol * 1e-2).max(1e-13);
    let mut q = *p;
    for _ in 0..40 {
        let f1 = s1.signed_distance(&q);
        let f2 = s2.signed_distance(&q);
        if f1.abs() <= target && f2.abs() <= target {
            return Some(q);
        }
        let g1 = s1.gradient(&q);
        let g2 = s2.gradient(&q);
        let gram = Matrix2::new(g1.dot(&g1), g1.dot(&g2), g2.dot(&g1), g2.dot(&g2));
        let lambda = gram.lu().solve(&Vector2::new(f1, f2))?;
        q = q - (g1 * lambda[0] + g2 * lambda[1]);
    }
    let converged = s1.signed_distance(&q).abs() <= tol && s2.signed_distance(&q).abs() <= tol;
    converged.then_some(q)
}

fn tangent(s1: &Surface, s2: &Surface, p: &Point3d) -> Option<Vec3> {
    s1.gradient(p).cross(&s2.gradient(p)).normalized()
}

fn point_segment_distance(p: &Point3d, a: &Point3d, b: &Point3d) -> f64 {
    let ab = *b - *a;
    let len2 = ab.length_squared();
    if len2 < 1e-30 {
        return p.distance_to(a);
    }
    let s = ((*p - *a).dot(&ab) / len2).clamp(0.0, 1.0);
    p.distance_to(&(*a + ab * s))
}

// ─── Seeding ─────────────────────────────────────────────────────────────────

/// Starting points for tracing: sign changes of the distance to `s2`
/// along iso-lines of `s1` over the given parameter box.
pub fn seed_points(
    s1: &Surface,
    u_range: (f64, f64),
    v_range: (f64, f64),
    s2: &Surface,
    grid: usize,
    tol: f64,
) -> Vec<Point3d> {
    let n = grid.max(2);
    let u_at = |i: usize| u_range.0 + (u_range.1 - u_range.0) * i as f64 / n as f64;
    let v_at = |j: usize| v_range.0 + (v_range.1 - v_range.0) * j as f64 / n as f64;
    let mut seeds = Vec::new();
    let mut scan = |eval: &dyn Fn(f64) -> Point3d| {
        let f = |s: f64| s2.signed_distance(&eval(s));
        let mut prev = f(0.0);
        for k in 1..=n {
            let s_hi = k as f64 / n as f64;
            let cur = f(s_hi);
            if prev * cur < 0.0 || cur == 0.0 {
                let s = bisect(&f, (k - 1) as f64 / n as f64, s_hi);
                seeds.push(eval(s));
            }
            prev = cur;
        }
    };
    for i in 0..=n {
        let u = u_at(i);
        scan(&|s| s1.evaluate(u, v_range.0 + (v_range.1 - v_range.0) * s));
    }
    for j in 0..=n {
        let v = v_at(j);
        scan(&|s| s1.evaluate(u_range.0 + (u_range.1 - u_range.0) * s, v));
    }
    seeds
        .into_iter()
        .filter_map(|p| project_to_both(s1, s2, &p, tol))
        .collect()
}

// ─── Tracing ─────────────────────────────────────────────────────────────────

struct Trace {
    points: Vec<Point3d>,
    closed: bool,
}

fn trace(s1: &Surface, s2: &Surface, start: Point3d, forward: bool, opts: &MarchOptions) -> Trace {
    let mut points = vec![start];
    let Some(t0) = tangent(s1, s2, &start) else {
        return Trace { points, closed: false };
    };
    let mut prev_t = if forward { t0 } else { -t0 };
    let mut p = start;
    let mut h = opts.step;
    let min_step = opts.step * 1e-3;

    while points.len() < opts.max_points {
        let Some(mut t) = tangent(s1, s2, &p) else { break };
        if t.dot(&prev_t) < 0.0 {
            t = -t;
        }
        let accepted = project_to_both(s1, s2, &(p + t * h), opts.tol).filter(|q| {
            let chord = q.distance_to(&p);
            let bend_ok = tangent(s1, s2, q).is_some_and(|tq| tq.dot(&t).abs() > 0.95);
            chord > min_step * 0.5 && chord < 2.0 * h && bend_ok
        });
        let Some(q) = accepted else {
            h *= 0.5;
            if h < min_step {
                break;
            }
            continue;
        };

        if points.len() > 2 && point_segment_distance(&start, &p, &q) < h * 0.5 {
            points.push(start);
            return Trace { points, closed: true };
        }

        if !opts.bounds.contains_point(&q) {
            let on_curve = |s: f64| {
                let x = p.lerp(&q, s);
                project_to_both(s1, s2, &x, opts.tol).unwrap_or(x)
            };
            let inside = |s: f64| {
                if opts.bounds.contains_point(&on_curve(s)) { 1.0 } else { -1.0 }
            };
            let s = bisect(&inside, 0.0, 1.0);
            let exit = on_curve(s);
            if exit.distance_to(&p) > min_step {
                points.push(exit);
            }
            break;
        }

        points.push(q);
        prev_t = t;
        p = q;
        h = (h * 1.5).min(opts.step);
    }
    Trace { points, closed: false }
}

/// Trace intersection branches through each seed. Seeds already lying on
/// a traced branch are skipped.
pub fn march(s1: &Surface, s2: &Surface, seeds: &[Point3d], opts: &MarchOptions) -> Vec<Polyline3d> {
    let mut branches: Vec<Polyline3d> = Vec::new();
    for seed in seeds {
        if !opts.bounds.contains_point(seed) {
            continue;
        }
        let covered = branches.iter().any(|b| {
            b.points
                .windows(2)
                .any(|w| point_segment_distance(seed, &w[0], &w[1]) < opts.step * 0.5)
        });
        if covered {
            continue;
        }
        let fwd = trace(s1, s2, *seed, true, opts);
        let points = if fwd.closed {
            fwd.points
        } else {
            let mut back = trace(s1, s2, *seed, false, opts).points;
            back.reverse();
            back.pop();
            back.extend(fwd.points);
            back
        };
        if points.len() >= 2 {
            branches.push(Polyline3d::new(points));
        }
    }
    branches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::surfaces::{Cylinder, Plane, Sphere};
    use std::f64::consts::{FRAC_PI_2, TAU};

    fn unit_box(half: f64) -> BoundingBox {
        BoundingBox::new(
            Point3d::new(-half, -half, -half),
            Point3d::new(half, half, half),
        )
    }

    #[test]
    fn test_project_to_both() {
        let s1 = Surface::Sphere(Sphere::new(Point3d::ORIGIN, 1.0));
        let s2 = Surface::Plane(Plane::new(Point3d::new(0.0, 0.0, 0.5), Vec3::Z));
        let q = project_to_both(&s1, &s2, &Point3d::new(0.9, 0.1, 0.3), 1e-7).unwrap();
        assert!(s1.signed_distance(&q).abs() < 1e-9);
        assert!((q.z - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_march_closed_circle() {
        let s1 = Surface::Sphere(Sphere::new(Point3d::ORIGIN, 1.0));
        let s2 = Surface::Plane(Plane::new(Point3d::new(0.0, 0.0, 0.5), Vec3::Z));
        let seeds = seed_points(&s1, (0.0, TAU), (-FRAC_PI_2, FRAC_PI_2), &s2, 16, 1e-7);
        assert!(!seeds.is_empty());
        let branches = march(&s1, &s2, &seeds, &MarchOptions::new(unit_box(2.0), 1e-7));
        assert_eq!(branches.len(), 1);
        let pts = &branches[0].points;
        assert!(pts.first().unwrap().distance_to(pts.last().unwrap()) < 1e-12);
        for p in pts {
            assert!(s1.signed_distance(p).abs() < 1e-6);
            assert!((p.z - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_march_clipped_by_bounds() {
        let s1 = Surface::Cylinder(Cylinder::new(Point3d::ORIGIN, Vec3::Z, 1.0));
        let s2 = Surface::Cylinder(Cylinder::new(Point3d::ORIGIN, Vec3::X, 0.5));
        let bounds = BoundingBox::new(Point3d::new(-2.0, 0.0, -2.0), Point3d::new(2.0, 2.0, 2.0));
        let seeds = seed_points(&s2, (0.0, TAU), (-2.0, 2.0), &s1, 24, 1e-7);
        let branches = march(&s1, &s2, &seeds, &MarchOptions::new(bounds, 1e-7));
        assert!(!branches.is_empty());
        for b in &branches {
            for p in &b.points {
                assert!(s1.signed_distance(p).abs() < 1e-6);
                assert!(s2.signed_distance(p).abs() < 1e-6);
                assert!(p.y > -1e-6);
            }
        }
    }
}
