use std::f64::consts::PI;

use crate::geometry::point::{Point2d, Point3d};
use crate::geometry::surfaces::Surface;
use crate::geometry::transform::BoundingBox;

use super::explorer::{unique_subshapes, Explorer};
use super::pcurve::{face_uv_window, FaceUv};
use super::shape::{Shape, ShapeId, ShapeKind, ShapeStore, TopologyError};

// ─── Quadrature ──────────────────────────────────────────────────────────────

const GAUSS_NODES: [f64; 8] = [
    -0.960_289_856_497_536_2,
    -0.796_666_477_413_626_7,
    -0.525_532_409_916_329_0,
    -0.183_434_642_495_649_8,
    0.183_434_642_495_649_8,
    0.525_532_409_916_329_0,
    0.796_666_477_413_626_7,
    0.960_289_856_497_536_2,
];

const GAUSS_WEIGHTS: [f64; 8] = [
    0.101_228_536_290_376_3,
    0.222_381_034_453_374_5,
    0.313_706_645_877_887_3,
    0.362_683_783_378_362_0,
    0.362_683_783_378_362_0,
    0.313_706_645_877_887_3,
    0.222_381_034_453_374_5,
    0.101_228_536_290_376_3,
];

fn gauss(a: f64, b: f64, f: impl Fn(f64) -> f64) -> f64 {
    let half = 0.5 * (b - a);
    let mid = 0.5 * (a + b);
    GAUSS_NODES
        .iter()
        .zip(GAUSS_WEIGHTS.iter())
        .map(|(x, w)| w * f(mid + half * x))
        .sum::<f64>()
        * half
}

/// Composite Gauss–Legendre over panels no wider than `panel`.
fn composite(a: f64, b: f64, panel: f64, f: &impl Fn(f64) -> f64) -> f64 {
    let n = ((b - a).abs() / panel).ceil().max(1.0) as usize;
    let h = (b - a) / n as f64;
    (0..n)
        .map(|i| gauss(a + h * i as f64, a + h * (i + 1) as f64, f))
        .sum()
}

/// `∫∫ g du dv` over a face domain, as the boundary integral `∮ G dv` with
/// `G(u, v) = ∫_{u0}^{u} g(s, v) ds`.
fn face_integral(fuv: &FaceUv, g: impl Fn(&Surface, f64, f64) -> f64) -> f64 {
    let (lo, _) = fuv.uv_bounds();
    let u0 = if lo.x.is_finite() { lo.x } else { 0.0 };
    let surface = &fuv.surface;
    let big_g = |u: f64, v: f64| composite(u0, u, PI / 8.0, &|s| g(surface, s, v));

    let mut total = 0.0;
    for lp in &fuv.loops {
        for e in lp {
            let sign = if e.is_reversed() { -1.0 } else { 1.0 };
            let breaks = e.quadrature_breaks();
            for w in breaks.windows(2) {
                total += sign
                    * gauss(w[0], w[1], |t| {
                        let uv = e.uv_at(t);
                        let dv = e.derivative_at(t).y;
                        if dv == 0.0 { 0.0 } else { big_g(uv.x, uv.y) * dv }
                    });
            }
        }
    }
    total
}

// ─── Mass Properties ─────────────────────────────────────────────────────────

/// Surface area of one face (its orientation does not matter).
pub fn face_area(store: &ShapeStore, face: ShapeId) -> Result<f64, TopologyError> {
    let fuv = FaceUv::new(store, face)?;
    Ok(face_integral(&fuv, |s, u, v| {
        let (du, dv) = s.derivatives(u, v);
        du.cross(&dv).length()
    })
    .abs())
}

/// Total area of every unique face under `shape`.
pub fn total_area(store: &ShapeStore, shape: Shape) -> Result<f64, TopologyError> {
    unique_subshapes(store, shape, ShapeKind::Face)
        .iter()
        .map(|f| face_area(store, f.id))
        .sum()
}

/// Signed volume enclosed by the faces under `shape`, by the divergence
/// theorem. Positive for outward-oriented closed shells.
pub fn solid_volume(store: &ShapeStore, shape: Shape) -> Result<f64, TopologyError> {
    let mut volume = 0.0;
    for face in Explorer::new(store, shape, ShapeKind::Face) {
        let sign = face.orientation.sign();
        if sign == 0.0 {
            continue;
        }
        let fuv = FaceUv::new(store, face.id)?;
        volume += sign
            * face_integral(&fuv, |s, u, v| {
                let (du, dv) = s.derivatives(u, v);
                s.evaluate(u, v).to_vec3().dot(&du.cross(&dv)) / 3.0
            });
    }
    Ok(volume)
}

/// Conservative axis-aligned bounds of `shape`.
pub fn bounding_box(store: &ShapeStore, shape: Shape) -> Result<BoundingBox, TopologyError> {
    let mut bb = BoundingBox::empty();
    let mut tol: f64 = 0.0;
    for v in unique_subshapes(store, shape, ShapeKind::Vertex) {
        let data = store.vertex(v.id)?;
        bb.expand_to_include(&data.point);
        tol = tol.max(data.tolerance);
    }
    for e in unique_subshapes(store, shape, ShapeKind::Edge) {
        let data = store.edge(e.id)?;
        tol = tol.max(data.tolerance);
        if data.degenerate {
            continue;
        }
        bb.merge(&store.curve(data.curve)?.bounding_box(data.range));
    }
    for f in unique_subshapes(store, shape, ShapeKind::Face) {
        let surface = store.face_surface(f.id)?;
        tol = tol.max(store.tolerance(f.id)?);
        if matches!(surface, Surface::Plane(_)) {
            continue;
        }
        bb.merge(&surface_patch_box(surface, face_uv_window(store, f.id)?));
    }
    Ok(bb.expanded(tol))
}

const PATCH_SAMPLES: usize = 16;
const GOLDEN_STEPS: usize = 40;

fn coord(p: &Point3d, axis: usize) -> f64 {
    match axis {
        0 => p.x,
        1 => p.y,
        _ => p.z,
    }
}

/// Maximum of `f` on `[a, b]` for a function unimodal there.
fn golden_max(a: f64, b: f64, f: impl Fn(f64) -> f64) -> (f64, f64) {
    let r = 0.5 * (5f64.sqrt() - 1.0);
    let (mut a, mut b) = (a, b);
    let mut c = b - r * (b - a);
    let mut d = a + r * (b - a);
    let (mut fc, mut fd) = (f(c), f(d));
    for _ in 0..GOLDEN_STEPS {
        if fc > fd {
            b = d;
            d = c;
            fd = fc;
            c = b - r * (b - a);
            fc = f(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + r * (b - a);
            fd = f(d);
        }
    }
    // the ends are candidates too
    [(a, f(a)), (b, f(b)), (c, fc), (d, fd)]
        .into_iter()
        .fold((a, f64::NEG_INFINITY), |best, x| if x.1 > best.1 { x } else { best })
}

/// Bounds of a surface patch: extremes of each coordinate found on a grid,
/// then refined by coordinate ascent inside every cell that could still
/// beat the grid value by more than its sag.
fn surface_patch_box(surface: &Surface, (lo, hi): (Point2d, Point2d)) -> BoundingBox {
    let n = PATCH_SAMPLES;
    let us: Vec<f64> = (0..=n).map(|i| lo.x + (hi.x - lo.x) * i as f64 / n as f64).collect();
    let vs: Vec<f64> = (0..=n).map(|j| lo.y + (hi.y - lo.y) * j as f64 / n as f64).collect();
    let grid: Vec<Vec<Point3d>> = us.iter().map(|&u| vs.iter().map(|&v| surface.evaluate(u, v)).collect()).collect();

    // deviation of the surface from its sample grid, from second differences
    let mut second: f64 = 0.0;
    for i in 0..=n {
        for j in 0..=n {
            let p = grid[i][j].to_vec3();
            if i > 0 && i < n {
                let d = grid[i - 1][j].to_vec3() + grid[i + 1][j].to_vec3() - p * 2.0;
                second = second.max(d.length());
            }
            if j > 0 && j < n {
                let d = grid[i][j - 1].to_vec3() + grid[i][j + 1].to_vec3() - p * 2.0;
                second = second.max(d.length());
            }
        }
    }
    let sag = 0.25 * second + 1e-12;

    let mut bb = BoundingBox::empty();
    for axis in 0..3 {
        for sign in [1.0, -1.0] {
            let f = |u: f64, v: f64| sign * coord(&surface.evaluate(u, v), axis);
            let mut best = grid
                .iter()
                .flatten()
                .map(|p| sign * coord(p, axis))
                .fold(f64::NEG_INFINITY, f64::max);
            let mut best_point = None;
            for i in 0..n {
                for j in 0..n {
                    let corners = [grid[i][j], grid[i + 1][j], grid[i][j + 1], grid[i + 1][j + 1]];
                    let top = corners.iter().map(|p| sign * coord(p, axis)).fold(f64::NEG_INFINITY, f64::max);
                    if top + sag < best {
                        continue;
                    }
                    let mut v = 0.5 * (vs[j] + vs[j + 1]);
                    let (mut u, _) = golden_max(us[i], us[i + 1], |x| f(x, v));
                    let mut value;
                    (v, value) = golden_max(vs[j], vs[j + 1], |y| f(u, y));
                    for _ in 0..3 {
                        (u, _) = golden_max(us[i], us[i + 1], |x| f(x, v));
                        (v, value) = golden_max(vs[j], vs[j + 1], |y| f(u, y));
                    }
                    if value > best {
                        best = value;
                        best_point = Some(surface.evaluate(u, v));
                    }
                }
            }
            if let Some(p) = best_point {
                bb.expand_to_include(&p);
            }
        }
    }
    for p in grid.iter().flatten() {
        bb.expand_to_include(p);
    }
    bb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::vector::Vec3;
    use crate::topology::primitives::{make_box, make_cylinder, make_sphere};

    #[test]
    fn test_gauss_is_exact_for_polynomials() {
        let r = gauss(0.0, 2.0, |x| x.powi(7) - 3.0 * x * x);
        assert!((r - (256.0 / 8.0 - 8.0)).abs() < 1e-10);
    }

    #[test]
    fn test_box_area_volume() {
        let mut store = ShapeStore::new();
        let b = make_box(&mut store, Point3d::new(-1.0, 0.0, 2.0), Point3d::new(1.0, 1.0, 5.0)).unwrap();
        assert!((total_area(&store, b).unwrap() - 2.0 * (2.0 + 6.0 + 3.0)).abs() < 1e-9);
        assert!((solid_volume(&store, b).unwrap() - 6.0).abs() < 1e-9);
        assert!((solid_volume(&store, b.reversed()).unwrap() + 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_cylinder_area() {
        let mut store = ShapeStore::new();
        let c = make_cylinder(&mut store, Point3d::new(1.0, 1.0, 1.0), Vec3::Y, 2.0, 1.0).unwrap();
        let expected = 2.0 * PI * 2.0 * 1.0 + 2.0 * PI * 4.0;
        assert!((total_area(&store, c).unwrap() - expected).abs() < 1e-6);
    }

    #[test]
    fn test_sphere_box_is_tight() {
        let mut store = ShapeStore::new();
        let s = make_sphere(&mut store, Point3d::ORIGIN, 1.0).unwrap();
        let bb = bounding_box(&store, s).unwrap();
        assert!(bb.contains_point(&Point3d::new(0.0, 1.0, 0.0)));
        assert!(bb.contains_point(&Point3d::new(-1.0, 0.0, 0.0)));
        assert!(bb.max.y < 1.1 && bb.min.x > -1.1);
    }

    #[test]
    fn test_curved_patch_box_has_no_sag_padding() {
        let surface = Surface::Sphere(crate::geometry::surfaces::Sphere::new(Point3d::ORIGIN, 1.0));
        // lower hemisphere
        let bb = surface_patch_box(&surface, (Point2d::new(0.0, -PI / 2.0), Point2d::new(2.0 * PI, 0.0)));
        assert!(bb.max.z.abs() < 1e-9, "max z {}", bb.max.z);
        assert!((bb.min.z + 1.0).abs() < 1e-9);
        assert!((bb.max.x - 1.0).abs() < 1e-9 && (bb.min.y + 1.0).abs() < 1e-9);

        // extremes between grid samples
        let shifted = surface_patch_box(&surface, (Point2d::new(0.1, -PI / 2.0), Point2d::new(0.1 + 2.0 * PI, 0.0)));
        assert!((shifted.max.x - 1.0).abs() < 1e-9, "max x {}", shifted.max.x);
        assert!((shifted.max.y - 1.0).abs() < 1e-9 && (shifted.min.x + 1.0).abs() < 1e-9);
    }
}
