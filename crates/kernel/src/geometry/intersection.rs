use nalgebra::{Matrix2, Vector2};

use super::curves::{Circle3d, Curve, Line3d};
use super::point::Point3d;
use super::surfaces::Surface;
use super::vector::Vec3;

/// A half-line used for point-in-solid classification.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Point3d,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Point3d, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalized_or(Vec3::Z),
        }
    }

    pub fn at(&self, t: f64) -> Point3d {
        self.origin + self.direction * t
    }
}

/// One crossing point of two curves.
#[derive(Debug, Clone, Copy)]
pub struct CurveCurveHit {
    pub point: Point3d,
    pub t1: f64,
    pub t2: f64,
}

/// Sub-ranges along which two curves coincide.
#[derive(Debug, Clone, Copy)]
pub struct CurveOverlap {
    pub range1: (f64, f64),
    pub range2: (f64, f64),
}

#[derive(Debug, Clone, Default)]
pub struct CurveCurveIntersection {
    pub points: Vec<CurveCurveHit>,
    pub overlaps: Vec<CurveOverlap>,
    /// False when a Newton refinement stalled near a candidate.
    pub converged: bool,
}

/// One crossing of a curve with a surface.
#[derive(Debug, Clone, Copy)]
pub struct CurveSurfaceHit {
    pub point: Point3d,
    pub t: f64,
}

#[derive(Debug, Clone, Default)]
pub struct CurveSurfaceIntersection {
    pub hits: Vec<CurveSurfaceHit>,
    /// Parameter ranges along which the curve lies on the surface.
    pub on_surface: Vec<(f64, f64)>,
}

const CURVE_SAMPLES: usize = 32;
const SURFACE_SAMPLES: usize = 64;

// ─── Ray / Surface ───────────────────────────────────────────────────────────

/// Ray parameters `t >= 0` where the ray meets the (untrimmed) surface.
pub fn ray_surface(ray: &Ray, surface: &Surface, t_max: f64) -> Vec<f64> {
    let mut hits = match surface {
        Surface::Plane(p) => {
            let denom = ray.direction.dot(&p.normal);
            if denom.abs() < 1e-15 {
                vec![]
            } else {
                vec![(p.origin - ray.origin).dot(&p.normal) / denom]
            }
        }
        Surface::Sphere(s) => {
            let oc = ray.origin - s.center;
            solve_quadratic(1.0, 2.0 * oc.dot(&ray.direction), oc.length_squared() - s.radius * s.radius)
        }
        Surface::Cylinder(c) => {
            let d = ray.direction - c.axis * ray.direction.dot(&c.axis);
            let oc = ray.origin - c.origin;
            let o = oc - c.axis * oc.dot(&c.axis);
            solve_quadratic(d.length_squared(), 2.0 * d.dot(&o), o.length_squared() - c.radius * c.radius)
        }
        Surface::Cone(c) => {
            let cos2 = c.half_angle.cos().powi(2);
            let oc = ray.origin - c.apex;
            let da = ray.direction.dot(&c.axis);
            let oa = oc.dot(&c.axis);
            let a = da * da - cos2;
            let b = 2.0 * (da * oa - cos2 * ray.direction.dot(&oc));
            let cc = oa * oa - cos2 * oc.length_squared();
            solve_quadratic(a, b, cc)
                .into_iter()
                .filter(|t| (ray.at(*t) - c.apex).dot(&c.axis) >= 0.0)
                .collect()
        }
        Surface::Torus(t) => {
            let step = t.minor_radius / 8.0;
            march_ray(ray, surface, step, t_max)
        }
    };
    hits.retain(|t| *t >= 0.0 && *t <= t_max);
    hits.sort_by(f64::total_cmp);
    hits
}

fn march_ray(ray: &Ray, surface: &Surface, step: f64, t_max: f64) -> Vec<f64> {
    let f = |t: f64| surface.signed_distance(&ray.at(t));
    let steps = ((t_max / step.max(1e-9)).ceil() as usize).min(100_000);
    let mut roots = Vec::new();
    let mut prev = f(0.0);
    for i in 1..=steps {
        let t1 = i as f64 * step;
        let cur = f(t1);
        if cur == 0.0 {
            roots.push(t1);
        } else if prev * cur < 0.0 {
            roots.push(bisect(&f, t1 - step, t1));
        }
        prev = cur;
    }
    roots
}

pub(crate) fn solve_quadratic(a: f64, b: f64, c: f64) -> Vec<f64> {
    if a.abs() < 1e-15 {
        if b.abs() < 1e-15 {
            return vec![];
        }
        return vec![-c / b];
    }
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return vec![];
    }
    let sq = disc.sqrt();
    // numerically stable form
    let q = -0.5 * (b + b.signum() * sq);
    if q.abs() < 1e-300 {
        return vec![0.0];
    }
    let mut roots = vec![q / a, c / q];
    roots.sort_by(f64::total_cmp);
    roots
}

pub(crate) fn bisect(f: &impl Fn(f64) -> f64, mut a: f64, mut b: f64) -> f64 {
    let mut fa = f(a);
    for _ in 0..80 {
        let m = 0.5 * (a + b);
        let fm = f(m);
        if fm == 0.0 || (b - a).abs() < 1e-15 {
            return m;
        }
        if fa * fm < 0.0 {
            b = m;
        } else {
            a = m;
            fa = fm;
        }
    }
    0.5 * (a + b)
}

/// Golden-section minimum of `f` on `[a, b]`.
fn minimize(f: &impl Fn(f64) -> f64, mut a: f64, mut b: f64) -> f64 {
    let g = 0.5 * (5f64.sqrt() - 1.0);
    let mut c = b - g * (b - a);
    let mut d = a + g * (b - a);
    for _ in 0..100 {
        if (b - a).abs() < 1e-14 {
            break;
        }
        if f(c) < f(d) {
            b = d;
        } else {
            a = c;
        }
        c = b - g * (b - a);
        d = a + g * (b - a);
    }
    0.5 * (a + b)
}

// ─── Curve / Curve ───────────────────────────────────────────────────────────

/// Intersect two bounded curves. Coincident stretches are reported as
/// overlaps; isolated crossings as points.
pub fn intersect_curves(
    c1: &Curve,
    r1: (f64, f64),
    c2: &Curve,
    r2: (f64, f64),
    tol: f64,
) -> CurveCurveIntersection {
    let overlaps = coincident_ranges(c1, r1, c2, r2, tol);
    let (candidates, converged) = match (c1, c2) {
        (Curve::Line(a), Curve::Line(b)) => (line_line(a, b, tol), true),
        (Curve::Line(l), Curve::Circle(c)) => (line_circle(l, c, tol), true),
        (Curve::Circle(c), Curve::Line(l)) => (
            line_circle(l, c, tol)
                .into_iter()
                .map(|(t2, t1)| (t1, t2))
                .collect(),
            true,
        ),
        _ => generic_points(c1, r1, c2, r2, tol),
    };
    // stalls along a coincident stretch are expected
    let converged = converged || !overlaps.is_empty();

    let mut points: Vec<CurveCurveHit> = Vec::new();
    for (t1, t2) in candidates {
        let Some(t1) = fit_parameter(c1, t1, r1, tol) else {
            continue;
        };
        let Some(t2) = fit_parameter(c2, t2, r2, tol) else {
            continue;
        };
        let p1 = c1.evaluate(t1);
        let p2 = c2.evaluate(t2);
        if p1.distance_to(&p2) > tol {
            continue;
        }
        let inside_overlap = overlaps.iter().any(|o| {
            let pt = c1.parametric_tolerance(t1, tol);
            t1 >= o.range1.0 - pt && t1 <= o.range1.1 + pt
        });
        let duplicate = points
            .iter()
            .any(|h| (h.t1 - t1).abs() <= c1.parametric_tolerance(t1, tol));
        if !inside_overlap && !duplicate {
            points.push(CurveCurveHit {
                point: p1.midpoint(&p2),
                t1,
                t2,
            });
        }
    }
    points.sort_by(|a, b| a.t1.total_cmp(&b.t1));
    CurveCurveIntersection {
        points,
        overlaps,
        converged,
    }
}

/// Map `t` into `range`, allowing periodic shifts and a tolerance margin.
fn fit_parameter(curve: &Curve, t: f64, range: (f64, f64), tol: f64) -> Option<f64> {
    let pt = curve.parametric_tolerance(t, tol);
    let mut t = t;
    if let Some(period) = curve.period() {
        let k = ((range.0 - pt - t) / period).ceil();
        t += k * period;
    }
    if t < range.0 - pt || t > range.1 + pt {
        return None;
    }
    Some(t.clamp(range.0, range.1))
}

fn line_line(a: &Line3d, b: &Line3d, tol: f64) -> Vec<(f64, f64)> {
    let w = a.origin - b.origin;
    let bb = a.direction.dot(&b.direction);
    let d = a.direction.dot(&w);
    let e = b.direction.dot(&w);
    let denom = 1.0 - bb * bb;
    if denom.abs() < 1e-14 {
        return vec![];
    }
    let t1 = (bb * e - d) / denom;
    let t2 = (e - bb * d) / denom;
    if a.evaluate(t1).distance_to(&b.evaluate(t2)) <= tol {
        vec![(t1, t2)]
    } else {
        vec![]
    }
}

/// Crossings of a line and a circle as `(line parameter, circle angle)`.
fn line_circle(l: &Line3d, c: &Circle3d, tol: f64) -> Vec<(f64, f64)> {
    let denom = l.direction.dot(&c.normal);
    let offset = (l.origin - c.center).dot(&c.normal);
    let mut ts = Vec::new();
    if denom.abs() < 1e-12 {
        if offset.abs() > tol {
            return vec![];
        }
        // in-plane: |L(t) - center| = r
        let oc = l.origin - c.center;
        let b = 2.0 * oc.dot(&l.direction);
        let cc = oc.length_squared() - c.radius * c.radius;
        ts = solve_quadratic(1.0, b, cc);
        if ts.is_empty() {
            // tangent within tolerance
            let t = -oc.dot(&l.direction);
            if (l.evaluate(t).distance_to(&c.center) - c.radius).abs() <= tol {
                ts.push(t);
            }
        }
    } else {
        let t = -offset / denom;
        if (l.evaluate(t).distance_to(&c.center) - c.radius).abs() <= tol {
            ts.push(t);
        }
    }
    ts.into_iter().map(|t| (t, c.angle_of(&l.evaluate(t)))).collect()
}

/// Sampling + Newton crossing search for arbitrary curve pairs.
fn generic_points(
    c1: &Curve,
    r1: (f64, f64),
    c2: &Curve,
    r2: (f64, f64),
    tol: f64,
) -> (Vec<(f64, f64)>, bool) {
    let n1 = sample_count(c1, r1);
    let n2 = sample_count(c2, r2);
    let s1 = c1.sample(r1, n1);
    let s2 = c2.sample(r2, n2);
    let step1 = (r1.1 - r1.0) / n1 as f64;
    let step2 = (r2.1 - r2.0) / n2 as f64;

    let mut out = Vec::new();
    let mut converged = true;
    for i in 0..n1 {
        let len1 = s1[i].distance_to(&s1[i + 1]);
        for j in 0..n2 {
            let len2 = s2[j].distance_to(&s2[j + 1]);
            let (a, b, dist) = segment_segment_closest(&s1[i], &s1[i + 1], &s2[j], &s2[j + 1]);
            if dist > tol + 0.25 * (len1 + len2) {
                continue;
            }
            let t1 = r1.0 + (i as f64 + a) * step1;
            let t2 = r2.0 + (j as f64 + b) * step2;
            match newton_curve_curve(c1, r1, c2, r2, t1, t2) {
                Some((t1, t2, d)) if d <= tol => out.push((t1, t2)),
                Some(_) => {}
                None => {
                    if dist <= tol * 10.0 {
                        converged = false;
                    }
                }
            }
        }
    }
    (out, converged)
}

fn sample_count(c: &Curve, range: (f64, f64)) -> usize {
    match c {
        Curve::Line(_) => 1,
        Curve::Polyline(_) => ((range.1 - range.0).abs().ceil() as usize).clamp(1, 4096),
        Curve::Circle(_) | Curve::Ellipse(_) => CURVE_SAMPLES,
    }
}

/// Gauss-Newton on `C1(t1) - C2(t2)`. Returns `None` when the step never
/// settles.
fn newton_curve_curve(
    c1: &Curve,
    r1: (f64, f64),
    c2: &Curve,
    r2: (f64, f64),
    mut t1: f64,
    mut t2: f64,
) -> Option<(f64, f64, f64)> {
    let slack1 = (r1.1 - r1.0).abs() * 1e-3;
    let slack2 = (r2.1 - r2.0).abs() * 1e-3;
    for _ in 0..40 {
        let f = c1.evaluate(t1) - c2.evaluate(t2);
        let d1 = c1.derivative(t1);
        let d2 = -c2.derivative(t2);
        let jtj = Matrix2::new(d1.dot(&d1), d1.dot(&d2), d2.dot(&d1), d2.dot(&d2));
        let jtf = Vector2::new(d1.dot(&f), d2.dot(&f));
        let delta = jtj.lu().solve(&(-jtf))?;
        t1 = (t1 + delta[0]).clamp(r1.0 - slack1, r1.1 + slack1);
        t2 = (t2 + delta[1]).clamp(r2.0 - slack2, r2.1 + slack2);
        if delta.norm() < 1e-13 {
            let d = c1.evaluate(t1).distance_to(&c2.evaluate(t2));
            return Some((t1, t2, d));
        }
    }
    let d = c1.evaluate(t1).distance_to(&c2.evaluate(t2));
    if d < 1e-9 { Some((t1, t2, d)) } else { None }
}

/// Closest points of segments `a0-a1` and `b0-b1`: `(s, t, distance)` with
/// `s, t` in `[0, 1]`.
pub fn segment_segment_closest(
    a0: &Point3d,
    a1: &Point3d,
    b0: &Point3d,
    b1: &Point3d,
) -> (f64, f64, f64) {
    let d1 = *a1 - *a0;
    let d2 = *b1 - *b0;
    let r = *a0 - *b0;
    let a = d1.length_squared();
    let e = d2.length_squared();
    let f = d2.dot(&r);
    let (s, t) = if a < 1e-30 && e < 1e-30 {
        (0.0, 0.0)
    } else if a < 1e-30 {
        (0.0, (f / e).clamp(0.0, 1.0))
    } else {
        let c = d1.dot(&r);
        if e < 1e-30 {
            ((-c / a).clamp(0.0, 1.0), 0.0)
        } else {
            let b = d1.dot(&d2);
            let denom = a * e - b * b;
            let mut s = if denom > 1e-30 {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let mut t = (b * s + f) / e;
            if t < 0.0 {
                t = 0.0;
                s = (-c / a).clamp(0.0, 1.0);
            } else if t > 1.0 {
                t = 1.0;
                s = ((b - c) / a).clamp(0.0, 1.0);
            }
            (s, t)
        }
    };
    let p = a0.lerp(a1, s);
    let q = b0.lerp(b1, t);
    (s, t, p.distance_to(&q))
}

/// Coincident stretches of two curves, found analytically for lines and by
/// sampled projection otherwise.
pub fn coincident_ranges(
    c1: &Curve,
    r1: (f64, f64),
    c2: &Curve,
    r2: (f64, f64),
    tol: f64,
) -> Vec<CurveOverlap> {
    if let (Curve::Line(a), Curve::Line(b)) = (c1, c2) {
        return line_overlap(a, r1, b, r2, tol).into_iter().collect();
    }
    let mut overlaps = Vec::new();
    for (lo, hi) in sampled_runs(c1, r1, c2, r2, tol) {
        let (a2, _) = c2.project_point(&c1.evaluate(lo), r2);
        let (b2, _) = c2.project_point(&c1.evaluate(hi), r2);
        overlaps.push(CurveOverlap {
            range1: (lo, hi),
            range2: (a2.min(b2), a2.max(b2)),
        });
    }
    for (lo, hi) in sampled_runs(c2, r2, c1, r1, tol) {
        let (a1, _) = c1.project_point(&c2.evaluate(lo), r1);
        let (b1, _) = c1.project_point(&c2.evaluate(hi), r1);
        let range1 = (a1.min(b1), a1.max(b1));
        let known = overlaps.iter().any(|o| {
            range1.0 <= o.range1.1 && range1.1 >= o.range1.0
        });
        if !known {
            overlaps.push(CurveOverlap {
                range1,
                range2: (lo, hi),
            });
        }
    }
    overlaps.retain(|o| {
        c1.evaluate(o.range1.0).distance_to(&c1.evaluate(o.range1.1)) > tol
            || c1.is_closed_over(o.range1)
    });
    overlaps.sort_by(|a, b| a.range1.0.total_cmp(&b.range1.0));
    overlaps
}

fn line_overlap(
    a: &Line3d,
    r1: (f64, f64),
    b: &Line3d,
    r2: (f64, f64),
    tol: f64,
) -> Option<CurveOverlap> {
    if !a.direction.is_parallel_to(&b.direction, 1e-9) {
        return None;
    }
    if a.distance_to_point(&b.origin) > tol {
        return None;
    }
    let p = a.parameter_of(&b.evaluate(r2.0));
    let q = a.parameter_of(&b.evaluate(r2.1));
    let lo = r1.0.max(p.min(q));
    let hi = r1.1.min(p.max(q));
    if hi - lo <= tol {
        return None;
    }
    let u = b.parameter_of(&a.evaluate(lo));
    let v = b.parameter_of(&a.evaluate(hi));
    Some(CurveOverlap {
        range1: (lo, hi),
        range2: (u.min(v).max(r2.0), u.max(v).min(r2.1)),
    })
}

/// Maximal parameter runs of `c1` whose points lie within `tol` of `c2`.
fn sampled_runs(
    c1: &Curve,
    r1: (f64, f64),
    c2: &Curve,
    r2: (f64, f64),
    tol: f64,
) -> Vec<(f64, f64)> {
    let on = |t: f64| c2.project_point(&c1.evaluate(t), r2).1 <= tol;
    let n = CURVE_SAMPLES;
    let ts: Vec<f64> = (0..=n)
        .map(|i| r1.0 + (r1.1 - r1.0) * i as f64 / n as f64)
        .collect();
    let flags: Vec<bool> = ts.iter().map(|t| on(*t)).collect();
    let mut runs = Vec::new();
    let mut i = 0;
    while i <= n {
        if !flags[i] {
            i += 1;
            continue;
        }
        let start = i;
        while i < n && flags[i + 1] {
            i += 1;
        }
        let end = i;
        i += 1;
        if end == start {
            continue;
        }
        let lo = if start == 0 {
            ts[0]
        } else {
            refine_edge(&on, ts[start - 1], ts[start])
        };
        let hi = if end == n {
            ts[n]
        } else {
            refine_edge(&on, ts[end + 1], ts[end])
        };
        runs.push((lo, hi));
    }
    runs
}

/// Boundary between an `off` and an `on` parameter, returned on the `on` side.
fn refine_edge(on: &impl Fn(f64) -> bool, mut off: f64, mut inside: f64) -> f64 {
    for _ in 0..50 {
        let m = 0.5 * (off + inside);
        if on(m) {
            inside = m;
        } else {
            off = m;
        }
    }
    inside
}

// ─── Curve / Surface ─────────────────────────────────────────────────────────

/// Intersect a bounded curve with an untrimmed surface.
pub fn intersect_curve_surface(
    curve: &Curve,
    range: (f64, f64),
    surface: &Surface,
    tol: f64,
) -> CurveSurfaceIntersection {
    if let (Curve::Line(l), Surface::Plane(p)) = (curve, surface) {
        let denom = l.direction.dot(&p.normal);
        let d0 = p.signed_distance(&l.origin);
        if denom.abs() < 1e-12 {
            let on = if d0.abs() <= tol { vec![range] } else { vec![] };
            return CurveSurfaceIntersection {
                hits: vec![],
                on_surface: on,
            };
        }
        let t = -d0 / denom;
        let hits = fit_parameter(curve, t, range, tol)
            .map(|t| CurveSurfaceHit {
                point: curve.evaluate(t),
                t,
            })
            .into_iter()
            .collect();
        return CurveSurfaceIntersection {
            hits,
            on_surface: vec![],
        };
    }
    sampled_curve_surface(curve, range, surface, tol)
}

fn sampled_curve_surface(
    curve: &Curve,
    range: (f64, f64),
    surface: &Surface,
    tol: f64,
) -> CurveSurfaceIntersection {
    let f = |t: f64| surface.signed_distance(&curve.evaluate(t));
    let abs_f = |t: f64| f(t).abs();
    let on = |t: f64| abs_f(t) <= tol;
    let n = match curve {
        Curve::Polyline(p) => (p.points.len() * 2).max(SURFACE_SAMPLES),
        _ => SURFACE_SAMPLES,
    };
    let ts: Vec<f64> = (0..=n)
        .map(|i| range.0 + (range.1 - range.0) * i as f64 / n as f64)
        .collect();
    let fs: Vec<f64> = ts.iter().map(|t| f(*t)).collect();
    let flags: Vec<bool> = fs.iter().map(|v| v.abs() <= tol).collect();

    let mut result = CurveSurfaceIntersection::default();
    let mut in_run = vec![false; n + 1];
    let mut i = 0;
    while i <= n {
        if !flags[i] {
            i += 1;
            continue;
        }
        let start = i;
        while i < n && flags[i + 1] {
            i += 1;
        }
        let end = i;
        i += 1;
        if end > start {
            let lo = if start == 0 { ts[0] } else { refine_edge(&on, ts[start - 1], ts[start]) };
            let hi = if end == n { ts[n] } else { refine_edge(&on, ts[end + 1], ts[end]) };
            for flag in in_run.iter_mut().take(end + 1).skip(start) {
                *flag = true;
            }
            result.on_surface.push((lo, hi));
        }
    }

    let push = |t: f64, result: &mut CurveSurfaceIntersection| {
        let pt = curve.parametric_tolerance(t, tol);
        if result.hits.iter().any(|h| (h.t - t).abs() <= pt) {
            return;
        }
        if result
            .on_surface
            .iter()
            .any(|(lo, hi)| t >= lo - pt && t <= hi + pt)
        {
            return;
        }
        result.hits.push(CurveSurfaceHit {
            point: curve.evaluate(t),
            t,
        });
    };

    for i in 0..=n {
        if in_run[i] {
            continue;
        }
        if i < n && !in_run[i + 1] && fs[i] * fs[i + 1] < 0.0 && !flags[i] && !flags[i + 1] {
            push(bisect(&f, ts[i], ts[i + 1]), &mut result);
        }
        let lo = ts[i.saturating_sub(1)];
        let hi = ts[(i + 1).min(n)];
        if flags[i] {
            // isolated touch or crossing exactly on a sample
            let before = fs[i.saturating_sub(1)];
            let after = fs[(i + 1).min(n)];
            let t = if before * after < 0.0 {
                bisect(&f, lo, hi)
            } else {
                minimize(&abs_f, lo, hi)
            };
            push(t, &mut result);
        } else if i > 0 && i < n && fs[i].abs() < fs[i - 1].abs() && fs[i].abs() <= fs[i + 1].abs()
            && fs[i - 1] * fs[i + 1] > 0.0
        {
            // tangential approach without a sign change
            let t = minimize(&abs_f, lo, hi);
            if abs_f(t) <= tol {
                push(t, &mut result);
            }
        }
    }
    result.hits.sort_by(|a, b| a.t.total_cmp(&b.t));
    result
}
