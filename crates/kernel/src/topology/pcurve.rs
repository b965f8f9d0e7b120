use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};

use crate::geometry::curves::{Curve, Line2d};
use crate::geometry::point::{polygon_area, segment_distance_2d, Point2d};
use crate::geometry::surfaces::Surface;
use crate::geometry::vector::Vec2;

use super::explorer::Explorer;
use super::shape::{Orientation, Shape, ShapeId, ShapeKind, ShapeStore, SurfaceId, TopologyError};

/// Explicit parameter-space image of an edge on one surface. The edge
/// parameter maps linearly to `(u, v)`. A seam edge, used twice by the
/// same face, carries a second line for its reversed occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PCurve {
    pub surface: SurfaceId,
    pub curve: Line2d,
    pub seam: Option<Line2d>,
}

impl PCurve {
    pub fn new(surface: SurfaceId, curve: Line2d) -> Self {
        Self {
            surface,
            curve,
            seam: None,
        }
    }

    pub fn seam(surface: SurfaceId, forward: Line2d, reversed: Line2d) -> Self {
        Self {
            surface,
            curve: forward,
            seam: Some(reversed),
        }
    }

    /// Line used by an occurrence with the given orientation.
    pub fn for_orientation(&self, orientation: Orientation) -> Line2d {
        match (orientation, self.seam) {
            (Orientation::Reversed, Some(seam)) => seam,
            _ => self.curve,
        }
    }
}

const ANGLE_STEP: f64 = PI / 32.0;

fn nearest_periodic(value: f64, anchor: f64, period: f64) -> f64 {
    value + period * ((anchor - value) / period).round()
}

fn is_singular(surface: &Surface, u: f64, v: f64) -> bool {
    let (du, dv) = surface.derivatives(u, v);
    du.length() < 1e-9 || dv.length() < 1e-9
}

/// 3D distance to parameter-space distance around `uv`.
pub fn uv_tolerance(surface: &Surface, uv: Point2d, tol: f64) -> f64 {
    let (du, dv) = surface.derivatives(uv.x, uv.y);
    let scale = du.length().max(dv.length());
    if scale < 1e-12 { tol } else { tol / scale }
}

// ─── Edge Occurrence in (u, v) ───────────────────────────────────────────────

#[derive(Debug, Clone)]
enum UvMap {
    Explicit(Line2d),
    Sampled {
        curve: Curve,
        ts: Vec<f64>,
        uvs: Vec<Point2d>,
    },
}

/// One occurrence of an edge on a face, mapped into the face's parameter
/// plane. Points and tangents follow the occurrence direction.
#[derive(Debug, Clone)]
pub struct EdgeUv {
    pub edge: Shape,
    range: (f64, f64),
    surface: Surface,
    map: UvMap,
}

impl EdgeUv {
    /// Map `edge` (oriented as it occurs in the face) onto `face`'s surface.
    pub fn new(store: &ShapeStore, edge: Shape, face: ShapeId) -> Result<Self, TopologyError> {
        let surface_id = store.face(face)?.surface;
        let data = store.edge(edge.id)?;
        let surface = store.surface(surface_id)?.clone();
        if let Some(pc) = data.pcurve_on(surface_id) {
            return Ok(Self {
                edge,
                range: data.range,
                surface,
                map: UvMap::Explicit(pc.for_orientation(edge.orientation)),
            });
        }
        let curve = store.curve(data.curve)?.clone();
        let (ts, uvs) = sample_projection(&curve, &surface, data.range);
        Ok(Self {
            edge,
            range: data.range,
            surface,
            map: UvMap::Sampled { curve, ts, uvs },
        })
    }

    pub fn is_reversed(&self) -> bool {
        self.edge.orientation == Orientation::Reversed
    }

    pub fn range(&self) -> (f64, f64) {
        self.range
    }

    pub fn first_param(&self) -> f64 {
        if self.is_reversed() { self.range.1 } else { self.range.0 }
    }

    pub fn last_param(&self) -> f64 {
        if self.is_reversed() { self.range.0 } else { self.range.1 }
    }

    fn interpolate(ts: &[f64], uvs: &[Point2d], t: f64) -> Point2d {
        match ts.len() {
            0 => Point2d::ORIGIN,
            1 => uvs[0],
            n => {
                let i = ts.partition_point(|x| *x <= t).clamp(1, n - 1);
                let (a, b) = (ts[i - 1], ts[i]);
                let s = if (b - a).abs() < 1e-300 { 0.0 } else { (t - a) / (b - a) };
                uvs[i - 1].lerp(&uvs[i], s)
            }
        }
    }

    /// Parameter-plane point at edge parameter `t`.
    pub fn uv_at(&self, t: f64) -> Point2d {
        match &self.map {
            UvMap::Explicit(line) => line.evaluate(t),
            UvMap::Sampled { curve, ts, uvs } => {
                let approx = Self::interpolate(ts, uvs, t);
                let (u, v) = self.surface.parameters_of(&curve.evaluate(t));
                if is_singular(&self.surface, u, v) {
                    return Point2d::new(approx.x, v);
                }
                let u = match self.surface.u_period() {
                    Some(period) => nearest_periodic(u, approx.x, period),
                    None => u,
                };
                let v = match self.surface.v_period() {
                    Some(period) => nearest_periodic(v, approx.y, period),
                    None => v,
                };
                Point2d::new(u, v)
            }
        }
    }

    /// `d(u, v)/dt` along the underlying edge parameter (not the occurrence).
    pub fn derivative_at(&self, t: f64) -> Vec2 {
        match &self.map {
            UvMap::Explicit(line) => line.direction,
            UvMap::Sampled { curve, .. } => {
                let uv = self.uv_at(t);
                let (su, sv) = self.surface.derivatives(uv.x, uv.y);
                let c1 = curve.derivative(t);
                let (a, b, c) = (su.dot(&su), su.dot(&sv), sv.dot(&sv));
                let det = a * c - b * b;
                if det.abs() > 1e-18 {
                    let (r1, r2) = (su.dot(&c1), sv.dot(&c1));
                    Vec2::new((c * r1 - b * r2) / det, (a * r2 - b * r1) / det)
                } else {
                    let h = (self.range.1 - self.range.0).abs() * 1e-4;
                    let (lo, hi) = (
                        (t - h).max(self.range.0),
                        (t + h).min(self.range.1),
                    );
                    let d = self.uv_at(hi) - self.uv_at(lo);
                    if hi - lo > 0.0 { d * (1.0 / (hi - lo)) } else { Vec2::ZERO }
                }
            }
        }
    }

    pub fn start(&self) -> Point2d {
        self.uv_at(self.first_param())
    }

    pub fn end(&self) -> Point2d {
        self.uv_at(self.last_param())
    }

    fn travel_direction(&self, t: f64, toward: f64) -> Vec2 {
        let sign = if self.is_reversed() { -1.0 } else { 1.0 };
        let d = self.derivative_at(t) * sign;
        if d.length() > 1e-12 {
            return d;
        }
        let step = (toward - t) * 1e-3;
        self.uv_at(t + step) - self.uv_at(t)
    }

    /// Direction of travel leaving the start point.
    pub fn start_tangent(&self) -> Vec2 {
        self.travel_direction(self.first_param(), self.last_param())
    }

    /// Direction of travel arriving at the end point.
    pub fn end_tangent(&self) -> Vec2 {
        let t = self.last_param();
        let sign = if self.is_reversed() { -1.0 } else { 1.0 };
        let d = self.derivative_at(t) * sign;
        if d.length() > 1e-12 {
            return d;
        }
        let back = (self.first_param() - t) * 1e-3;
        self.uv_at(t) - self.uv_at(t + back)
    }

    /// Polyline in occurrence direction.
    pub fn polyline(&self) -> Vec<Point2d> {
        let mut pts = match &self.map {
            UvMap::Explicit(line) => vec![line.evaluate(self.range.0), line.evaluate(self.range.1)],
            UvMap::Sampled { uvs, .. } => uvs.clone(),
        };
        if self.is_reversed() {
            pts.reverse();
        }
        pts
    }

    /// Sub-interval breaks for quadrature along the edge parameter.
    pub fn quadrature_breaks(&self) -> Vec<f64> {
        match &self.map {
            UvMap::Explicit(_) => (0..=4)
                .map(|i| self.range.0 + (self.range.1 - self.range.0) * i as f64 / 4.0)
                .collect(),
            UvMap::Sampled { ts, .. } => ts.clone(),
        }
    }

    /// Same occurrence traversed the other way.
    pub fn reversed(&self) -> Self {
        let mut out = self.clone();
        out.edge = self.edge.reversed();
        out
    }

    pub fn shifted_u(&self, du: f64) -> Self {
        let mut out = self.clone();
        match &mut out.map {
            UvMap::Explicit(line) => line.origin.x += du,
            UvMap::Sampled { uvs, .. } => uvs.iter_mut().for_each(|p| p.x += du),
        }
        out
    }
}

fn sample_params(curve: &Curve, surface: &Surface, (t0, t1): (f64, f64)) -> Vec<f64> {
    let n = match (curve, surface) {
        (Curve::Line(_), Surface::Plane(_)) => 1,
        (Curve::Line(_), _) => 16,
        (Curve::Circle(_) | Curve::Ellipse(_), _) => ((t1 - t0).abs() / ANGLE_STEP).ceil().max(8.0) as usize,
        (Curve::Polyline(_), _) => {
            let mut ts = vec![t0];
            let mut k = t0.floor() + 1.0;
            while k < t1 - 1e-9 {
                ts.push(k);
                k += 1.0;
            }
            ts.push(t1);
            return ts;
        }
    };
    (0..=n).map(|i| t0 + (t1 - t0) * i as f64 / n as f64).collect()
}

/// Sampled projection with periodic unwrapping. The sample farthest from
/// the u seam keeps its raw parameter; the others follow continuously.
fn sample_projection(curve: &Curve, surface: &Surface, range: (f64, f64)) -> (Vec<f64>, Vec<Point2d>) {
    let ts = sample_params(curve, surface, range);
    let mut uvs: Vec<Point2d> = Vec::with_capacity(ts.len());
    let mut defined = Vec::with_capacity(ts.len());
    for &t in &ts {
        let (u, v) = surface.parameters_of(&curve.evaluate(t));
        defined.push(!is_singular(surface, u, v));
        uvs.push(Point2d::new(u, v));
    }

    let reference = (0..ts.len())
        .filter(|&i| defined[i])
        .min_by(|&a, &b| (uvs[a].x - PI).abs().total_cmp(&(uvs[b].x - PI).abs()));
    let Some(r) = reference else {
        return (ts, uvs);
    };

    let periods = (surface.u_period(), surface.v_period());
    let follow = |p: Point2d, anchor: Point2d| {
        Point2d::new(
            periods.0.map_or(p.x, |per| nearest_periodic(p.x, anchor.x, per)),
            periods.1.map_or(p.y, |per| nearest_periodic(p.y, anchor.y, per)),
        )
    };
    let mut anchor = uvs[r];
    for i in r + 1..uvs.len() {
        if defined[i] {
            uvs[i] = follow(uvs[i], anchor);
            anchor = uvs[i];
        }
    }
    anchor = uvs[r];
    for i in (0..r).rev() {
        if defined[i] {
            uvs[i] = follow(uvs[i], anchor);
            anchor = uvs[i];
        }
    }
    // singular samples (poles) take u from a defined neighbour
    for i in 0..uvs.len() {
        if !defined[i] {
            let neighbour = (i + 1..uvs.len())
                .find(|&j| defined[j])
                .or_else(|| (0..i).rev().find(|&j| defined[j]));
            if let Some(j) = neighbour {
                uvs[i].x = uvs[j].x;
            }
        }
    }
    (ts, uvs)
}

// ─── Face in (u, v) ──────────────────────────────────────────────────────────

/// Position of a parameter-plane point relative to a face domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UvState {
    Inside,
    Boundary,
    Outside,
}

/// A face's wires mapped into its parameter plane, read with the face
/// taken forward.
#[derive(Debug, Clone)]
pub struct FaceUv {
    pub face: ShapeId,
    pub surface: Surface,
    pub loops: Vec<Vec<EdgeUv>>,
}

impl FaceUv {
    pub fn new(store: &ShapeStore, face: ShapeId) -> Result<Self, TopologyError> {
        let surface = store.face_surface(face)?.clone();
        let mut loops = Vec::new();
        for wire in store.children(Shape::new(face)) {
            let mut edges = Vec::new();
            for edge in Explorer::new(store, wire, ShapeKind::Edge) {
                edges.push(EdgeUv::new(store, edge, face)?);
            }
            if !edges.is_empty() {
                loops.push(edges);
            }
        }
        Ok(Self {
            face,
            surface,
            loops,
        })
    }

    pub fn loop_polygon(edges: &[EdgeUv]) -> Vec<Point2d> {
        let mut pts: Vec<Point2d> = Vec::new();
        for e in edges {
            for p in e.polyline() {
                if pts.last().is_none_or(|q| q.distance_to(&p) > 1e-12) {
                    pts.push(p);
                }
            }
        }
        if pts.len() > 1 && pts[0].distance_to(&pts[pts.len() - 1]) < 1e-12 {
            pts.pop();
        }
        pts
    }

    pub fn polygons(&self) -> Vec<Vec<Point2d>> {
        self.loops.iter().map(|l| Self::loop_polygon(l)).collect()
    }

    /// Signed parameter-plane area of the domain (positive for a forward
    /// face with counter-clockwise outer loops).
    pub fn uv_area(&self) -> f64 {
        self.polygons().iter().map(|p| polygon_area(p)).sum()
    }

    pub fn uv_bounds(&self) -> (Point2d, Point2d) {
        let mut lo = Point2d::new(f64::INFINITY, f64::INFINITY);
        let mut hi = Point2d::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        for poly in self.polygons() {
            for p in poly {
                lo.x = lo.x.min(p.x);
                lo.y = lo.y.min(p.y);
                hi.x = hi.x.max(p.x);
                hi.y = hi.y.max(p.y);
            }
        }
        (lo, hi)
    }

    /// Shift periodic parameters of `uv` into the face's domain window.
    pub fn normalize_uv(&self, uv: Point2d) -> Point2d {
        let (lo, _) = self.uv_bounds();
        let wrap = |x: f64, start: f64, period: Option<f64>| match period {
            Some(per) if start.is_finite() => {
                let base = start - 1e-9;
                x - per * ((x - base) / per).floor()
            }
            _ => x,
        };
        Point2d::new(
            wrap(uv.x, lo.x, self.surface.u_period()),
            wrap(uv.y, lo.y, self.surface.v_period()),
        )
    }

    /// Even-odd classification against every loop, with a boundary band of
    /// width `tol` in parameter units.
    pub fn classify(&self, uv: Point2d, tol: f64) -> UvState {
        let p = self.normalize_uv(uv);
        let polys = self.polygons();
        let mut inside = false;
        for poly in &polys {
            let n = poly.len();
            for i in 0..n {
                let a = poly[i];
                let b = poly[(i + 1) % n];
                if segment_distance_2d(&p, &a, &b) <= tol {
                    return UvState::Boundary;
                }
                if (a.y > p.y) != (b.y > p.y) {
                    let x = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
                    if x > p.x {
                        inside = !inside;
                    }
                }
            }
        }
        if inside { UvState::Inside } else { UvState::Outside }
    }

    /// A point well inside the domain: the middle of the widest interior
    /// span over a set of horizontal scan lines.
    pub fn interior_point(&self) -> Option<Point2d> {
        let polys = self.polygons();
        let (lo, hi) = self.uv_bounds();
        if !lo.y.is_finite() || hi.y <= lo.y {
            return None;
        }
        const LINES: usize = 15;
        let mut best: Option<(f64, Point2d)> = None;
        for k in 1..=LINES {
            // irrational offset keeps scan lines off polygon vertices
            let y = lo.y + (hi.y - lo.y) * (k as f64 - 0.5 + 0.0137) / LINES as f64;
            let mut xs = Vec::new();
            for poly in &polys {
                let n = poly.len();
                for i in 0..n {
                    let (a, b) = (poly[i], poly[(i + 1) % n]);
                    if (a.y > y) != (b.y > y) {
                        xs.push(a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y));
                    }
                }
            }
            xs.sort_by(f64::total_cmp);
            for pair in xs.chunks_exact(2) {
                let width = pair[1] - pair[0];
                if best.is_none_or(|(w, _)| width > w) {
                    best = Some((width, Point2d::new(0.5 * (pair[0] + pair[1]), y)));
                }
            }
        }
        best.map(|(_, p)| p)
    }
}

/// Parameter window of every face-adjacent occurrence; used for
/// conservative surface sampling.
pub fn face_uv_window(store: &ShapeStore, face: ShapeId) -> Result<(Point2d, Point2d), TopologyError> {
    let fuv = FaceUv::new(store, face)?;
    let (lo, hi) = fuv.uv_bounds();
    let full_u = fuv.surface.u_period().is_some() && hi.x - lo.x > TAU - 1e-6;
    Ok(if full_u {
        (Point2d::new(lo.x, lo.y), Point2d::new(lo.x + TAU, hi.y))
    } else {
        (lo, hi)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::point::Point3d;
    use crate::geometry::vector::Vec3;
    use crate::topology::primitives::{make_box, make_cylinder, make_sphere};
    use std::f64::consts::FRAC_PI_2;

    fn faces(store: &ShapeStore, root: Shape) -> Vec<ShapeId> {
        Explorer::new(store, root, ShapeKind::Face).map(|f| f.id).collect()
    }

    #[test]
    fn test_box_faces_are_ccw_unit_squares() {
        let mut store = ShapeStore::new();
        let b = make_box(&mut store, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0)).unwrap();
        for f in faces(&store, b) {
            let fuv = FaceUv::new(&store, f).unwrap();
            assert_eq!(fuv.loops.len(), 1);
            assert!((fuv.uv_area() - 1.0).abs() < 1e-12);
            let c = fuv.interior_point().unwrap();
            assert_eq!(fuv.classify(c, 1e-9), UvState::Inside);
        }
    }

    #[test]
    fn test_loops_are_connected() {
        let mut store = ShapeStore::new();
        let c = make_cylinder(&mut store, Point3d::ORIGIN, Vec3::Z, 1.0, 2.0).unwrap();
        for f in faces(&store, c) {
            let fuv = FaceUv::new(&store, f).unwrap();
            for lp in &fuv.loops {
                for i in 0..lp.len() {
                    let next = &lp[(i + 1) % lp.len()];
                    assert!(lp[i].end().distance_to(&next.start()) < 1e-9);
                }
            }
            assert!(fuv.uv_area() > 0.0);
        }
    }

    #[test]
    fn test_sphere_domain() {
        let mut store = ShapeStore::new();
        let s = make_sphere(&mut store, Point3d::ORIGIN, 1.0).unwrap();
        let f = faces(&store, s)[0];
        let fuv = FaceUv::new(&store, f).unwrap();
        assert!((fuv.uv_area() - TAU * PI).abs() < 1e-9);
        assert_eq!(fuv.classify(Point2d::new(1.0, 0.2), 1e-9), UvState::Inside);
        assert_eq!(fuv.classify(Point2d::new(1.0 + TAU, 0.2), 1e-9), UvState::Inside);
        assert_eq!(fuv.classify(Point2d::new(1.0, FRAC_PI_2), 1e-9), UvState::Boundary);
    }

    #[test]
    fn test_projected_circle_crosses_seam_continuously() {
        let mut store = ShapeStore::new();
        let s = make_sphere(&mut store, Point3d::ORIGIN, 1.0).unwrap();
        let f = faces(&store, s)[0];
        let circle = store.add_curve(Curve::Circle(crate::geometry::curves::Circle3d::new(
            Point3d::ORIGIN,
            Vec3::Z,
            1.0,
        )));
        let (ts, uvs) = sample_projection(
            store.curve(circle).unwrap(),
            store.face_surface(f).unwrap(),
            (0.0, TAU),
        );
        assert_eq!(ts.len(), uvs.len());
        for w in uvs.windows(2) {
            assert!((w[1].x - w[0].x).abs() < 0.2);
            assert!(w[0].y.abs() < 1e-9);
        }
        assert!(((uvs[uvs.len() - 1].x - uvs[0].x).abs() - TAU).abs() < 1e-9);
    }
}
