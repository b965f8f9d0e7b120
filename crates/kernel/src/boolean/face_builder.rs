//! Rebuild every argument face from its split boundary, the edges lying
//! inside it and the section edges crossing it.
//!
//! Faces with new inner edges are retraced in their parameter plane:
//! boundary pieces are used once, inner edges once in each direction, and
//! at every node the walk takes the sharpest turn to the left.

use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::TAU;

use tracing::{debug, info, instrument, warn};

use crate::geometry::point::{polygon_area, Point2d, Point3d};
use crate::geometry::vector::{Vec2, Vec3};
use crate::topology::pcurve::{EdgeUv, FaceUv};
use crate::topology::{Explorer, Shape, ShapeId, ShapeKind, ShapeStore};

use super::ds::DataStructure;
use super::filler::{collect_parallel, FaceDomains};
use super::options::BooleanOptions;
use super::report::{AlertCode, BooleanError, Report, Stage};
use super::split::SplitImages;

/// Nodes closer than this in the parameter plane are one node.
const NODE_TOL: f64 = 1e-4;
/// Loops smaller than this share of the face's parameter area are dropped.
const MICRO_AREA: f64 = 1e-9;

/// Pieces of the argument faces.
#[derive(Debug, Clone, Default)]
pub struct FaceImages {
    /// Every argument face by data-structure index: itself when untouched,
    /// else its pieces, forward on its surface.
    pub pieces: BTreeMap<usize, Vec<ShapeId>>,
    /// Pieces lying on another argument's piece, with the partner and
    /// whether the two normals agree.
    pub same_domain: BTreeMap<ShapeId, (ShapeId, bool)>,
}

impl FaceImages {
    pub fn is_modified(&self, ds: &DataStructure, f: usize) -> bool {
        self.pieces.get(&f).is_some_and(|p| p.as_slice() != [ds.id(f)])
    }
}

#[derive(Debug, Clone)]
enum FacePlan {
    Unchanged,
    /// Same wires with edges swapped for their images.
    Substituted(Vec<Vec<Shape>>),
    /// New faces, each a list of wires (outer first).
    Split {
        faces: Vec<Vec<Vec<Shape>>>,
        micro: usize,
        orphans: usize,
    },
}

#[derive(Debug, Clone)]
struct HalfEdge {
    uv: EdgeUv,
    from: usize,
    to: usize,
    twin: Option<usize>,
}

#[derive(Debug, Default)]
struct Graph {
    halves: Vec<HalfEdge>,
    nodes: Vec<(ShapeId, Point2d)>,
}

impl Graph {
    fn node(&mut self, vertex: ShapeId, uv: Point2d) -> usize {
        if let Some(i) = self
            .nodes
            .iter()
            .position(|(v, p)| *v == vertex && p.distance_to(&uv) <= NODE_TOL)
        {
            return i;
        }
        self.nodes.push((vertex, uv));
        self.nodes.len() - 1
    }

    fn push(&mut self, store: &ShapeStore, uv: EdgeUv) -> Result<usize, BooleanError> {
        let (v1, v2) = store.edge_vertices(uv.edge)?;
        let from = self.node(v1, uv.start());
        let to = self.node(v2, uv.end());
        self.halves.push(HalfEdge {
            uv,
            from,
            to,
            twin: None,
        });
        Ok(self.halves.len() - 1)
    }

    fn push_pair(&mut self, store: &ShapeStore, uv: EdgeUv) -> Result<(), BooleanError> {
        let a = self.push(store, uv.reversed())?;
        let b = self.push(store, uv)?;
        self.halves[a].twin = Some(b);
        self.halves[b].twin = Some(a);
        Ok(())
    }

    /// Drop inner edges with a free end.
    fn prune(&self) -> Vec<bool> {
        let mut alive = vec![true; self.halves.len()];
        loop {
            let mut degree = vec![0usize; self.nodes.len()];
            for (h, _) in self.halves.iter().zip(&alive).filter(|(_, a)| **a) {
                degree[h.from] += 1;
                degree[h.to] += 1;
            }
            let dangling = (0..self.halves.len()).find(|&i| {
                let h = &self.halves[i];
                alive[i] && h.twin.is_some() && h.from != h.to && (degree[h.from] == 2 || degree[h.to] == 2)
            });
            match dangling {
                Some(i) => {
                    alive[i] = false;
                    if let Some(t) = self.halves[i].twin {
                        alive[t] = false;
                    }
                }
                None => return alive,
            }
        }
    }

    /// Clockwise turn from the reversed arrival direction of `cur` to the
    /// departure of `next`; going back along the twin comes last.
    fn turn(&self, cur: usize, next: usize) -> f64 {
        if self.halves[cur].twin == Some(next) {
            return TAU;
        }
        let back = -self.halves[cur].uv.end_tangent();
        let angle = (back.angle() - self.halves[next].uv.start_tangent().angle()).rem_euclid(TAU);
        if angle <= 1e-12 { TAU } else { angle }
    }

    fn loops(&self, alive: &[bool]) -> (Vec<Vec<usize>>, usize) {
        let n = self.halves.len();
        let mut used = vec![false; n];
        let mut loops = Vec::new();
        let mut open = 0;
        for start in 0..n {
            if !alive[start] || used[start] {
                continue;
            }
            used[start] = true;
            let mut path = vec![start];
            let mut cur = start;
            let closed = loop {
                let node = self.halves[cur].to;
                let next = (0..n)
                    .filter(|&c| alive[c] && self.halves[c].from == node && (!used[c] || c == start))
                    .min_by(|&a, &b| self.turn(cur, a).total_cmp(&self.turn(cur, b)).then(a.cmp(&b)));
                match next {
                    Some(c) if c == start => break true,
                    Some(c) if path.len() <= n => {
                        used[c] = true;
                        path.push(c);
                        cur = c;
                    }
                    _ => break false,
                }
            };
            if closed {
                loops.push(path);
            } else {
                open += 1;
            }
        }
        (loops, open)
    }

    fn polygon(&self, path: &[usize]) -> Vec<Point2d> {
        let uvs: Vec<EdgeUv> = path.iter().map(|&i| self.halves[i].uv.clone()).collect();
        FaceUv::loop_polygon(&uvs)
    }
}

fn contains(poly: &[Point2d], p: &Point2d) -> bool {
    let mut inside = false;
    for i in 0..poly.len() {
        let (a, b) = (poly[i], poly[(i + 1) % poly.len()]);
        if (a.y > p.y) != (b.y > p.y) && a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y) > p.x {
            inside = !inside;
        }
    }
    inside
}

/// A point just left of a loop's first edge, on the material side.
fn probe(uv: &EdgeUv, offset: f64) -> Point2d {
    let (t0, t1) = uv.range();
    let mid = 0.5 * (t0 + t1);
    let sign = if uv.is_reversed() { -1.0 } else { 1.0 };
    let left = (uv.derivative_at(mid) * sign).perp().normalized().unwrap_or(Vec2::ZERO);
    uv.uv_at(mid) + left * offset
}

fn plan_face(
    store: &ShapeStore,
    ds: &DataStructure,
    images: &SplitImages,
    domain: &FaceUv,
    f: usize,
) -> Result<FacePlan, BooleanError> {
    let face = ds.id(f);
    let mut wires: Vec<Vec<Shape>> = Vec::new();
    let mut changed = false;
    for wire in store.children(Shape::new(face)) {
        let mut pieces = Vec::new();
        for occurrence in Explorer::new(store, wire, ShapeKind::Edge) {
            let replaced = match ds.index_of(occurrence.id) {
                Some(e) => images.edge_pieces(ds, e, occurrence.orientation),
                None => vec![occurrence],
            };
            changed |= replaced.as_slice() != [occurrence];
            pieces.extend(replaced);
        }
        wires.push(pieces);
    }

    let boundary: BTreeSet<ShapeId> = wires.iter().flatten().map(|s| s.id).collect();
    let inner: BTreeSet<ShapeId> = ds
        .face_info
        .get(&f)
        .map(|fi| {
            fi.in_blocks
                .iter()
                .chain(&fi.section)
                .filter_map(|&b| ds.blocks[ds.real_block(b)].image)
                .map(|img| img.edge)
                .filter(|e| !boundary.contains(e))
                .collect()
        })
        .unwrap_or_default();
    if inner.is_empty() {
        return Ok(if changed { FacePlan::Substituted(wires) } else { FacePlan::Unchanged });
    }

    let mut graph = Graph::default();
    for &piece in wires.iter().flatten() {
        graph.push(store, EdgeUv::new(store, piece, face)?)?;
    }
    for &edge in &inner {
        let mut uv = EdgeUv::new(store, Shape::new(edge), face)?;
        let (t0, t1) = uv.range();
        let mid = uv.uv_at(0.5 * (t0 + t1));
        let du = domain.normalize_uv(mid).x - mid.x;
        if du.abs() > 1e-9 {
            uv = uv.shifted_u(du);
        }
        graph.push_pair(store, uv)?;
    }

    let alive = graph.prune();
    let (loops, open) = graph.loops(&alive);
    if open > 0 {
        warn!(face = f, open, "unclosed loops while retracing face");
    }

    let domain_area = domain.uv_area().abs();
    let (lo, hi) = domain.uv_bounds();
    let offset = 1e-6 * lo.distance_to(&hi).max(1e-9);
    let mut outers: Vec<(Vec<usize>, Vec<Point2d>, f64)> = Vec::new();
    let mut holes: Vec<Vec<usize>> = Vec::new();
    let mut micro = 0;
    for path in loops {
        let poly = graph.polygon(&path);
        let area = polygon_area(&poly);
        if area.abs() <= MICRO_AREA * domain_area {
            micro += 1;
        } else if area > 0.0 {
            outers.push((path, poly, area));
        } else {
            holes.push(path);
        }
    }

    let mut assigned: Vec<Vec<Vec<usize>>> = vec![Vec::new(); outers.len()];
    let mut orphans = 0;
    for hole in holes {
        let p = probe(&graph.halves[hole[0]].uv, offset);
        let host = outers
            .iter()
            .enumerate()
            .filter(|(_, (_, poly, _))| contains(poly, &p))
            .min_by(|(_, x), (_, y)| x.2.total_cmp(&y.2))
            .map(|(i, _)| i);
        match host {
            Some(i) => assigned[i].push(hole),
            None => orphans += 1,
        }
    }

    let to_edges = |path: &[usize]| path.iter().map(|&i| graph.halves[i].uv.edge).collect::<Vec<Shape>>();
    let faces = outers
        .iter()
        .zip(assigned)
        .map(|((outer, _, _), inner)| {
            std::iter::once(to_edges(outer))
                .chain(inner.iter().map(|h| to_edges(h)))
                .collect()
        })
        .collect();
    Ok(FacePlan::Split { faces, micro, orphans })
}

fn make_face(store: &mut ShapeStore, surface_of: ShapeId, wires: Vec<Vec<Shape>>) -> Result<ShapeId, BooleanError> {
    let data = store.face(surface_of)?.clone();
    let mut made = Vec::with_capacity(wires.len());
    for edges in wires {
        made.push(store.make_wire(edges)?);
    }
    Ok(store.make_face(data.surface, made, data.tolerance)?.id)
}

/// Split every argument face. Planning runs on the pool; faces are then
/// made in index order.
#[instrument(skip_all)]
pub fn build_faces(
    store: &mut ShapeStore,
    ds: &DataStructure,
    images: &SplitImages,
    domains: &FaceDomains,
    options: &BooleanOptions,
    report: &mut Report,
) -> Result<FaceImages, BooleanError> {
    let faces: Vec<usize> = ds.indices_of(ShapeKind::Face).collect();
    let plans = {
        let store = &*store;
        collect_parallel(options, &faces, |&f| {
            let plan = match domains.get(&f) {
                Some(domain) => plan_face(store, ds, images, domain, f),
                None => Ok(FacePlan::Unchanged),
            };
            Some((f, plan))
        })
    };
    options.check_cancel(Stage::BuildFaces)?;

    let mut out = FaceImages::default();
    let mut split = 0;
    for (f, plan) in plans {
        let face = ds.id(f);
        let pieces = match plan? {
            FacePlan::Unchanged => vec![face],
            FacePlan::Substituted(wires) => vec![make_face(store, face, wires)?],
            FacePlan::Split { faces, micro, orphans } => {
                if micro > 0 {
                    report.warning(
                        AlertCode::MicroFaceDropped,
                        Stage::BuildFaces,
                        vec![face],
                        format!("{micro} loop(s) below the area threshold dropped"),
                    );
                }
                if orphans > 0 {
                    report.local_failure(
                        AlertCode::OrphanHole,
                        Stage::BuildFaces,
                        vec![face],
                        format!("{orphans} hole loop(s) with no enclosing outer loop"),
                    );
                }
                split += 1;
                let mut made = Vec::with_capacity(faces.len());
                for wires in faces {
                    made.push(make_face(store, face, wires)?);
                }
                debug!(face = f, pieces = made.len(), "face split");
                made
            }
        };
        out.pieces.insert(f, pieces);
    }
    out.same_domain = same_domain_pieces(store, ds, &out)?;
    info!(faces = faces.len(), split, same_domain = out.same_domain.len() / 2, "built faces");
    Ok(out)
}

fn edge_set(store: &ShapeStore, face: ShapeId) -> BTreeSet<ShapeId> {
    Explorer::new(store, Shape::new(face), ShapeKind::Edge)
        .filter(|e| !store.is_degenerate(e.id))
        .map(|e| e.id)
        .collect()
}

/// Normal of an oriented face occurrence at a point well inside it.
fn occurrence_normal(store: &ShapeStore, face: Shape) -> Result<Option<(Point3d, Vec3)>, BooleanError> {
    let domain = FaceUv::new(store, face.id)?;
    Ok(domain.interior_point().map(|uv| {
        let p = domain.surface.evaluate(uv.x, uv.y);
        (p, domain.surface.normal_at(uv.x, uv.y) * face.orientation.sign())
    }))
}

/// Pair up pieces of same-domain faces that have the same edges.
fn same_domain_pieces(
    store: &ShapeStore,
    ds: &DataStructure,
    images: &FaceImages,
) -> Result<BTreeMap<ShapeId, (ShapeId, bool)>, BooleanError> {
    let mut out = BTreeMap::new();
    for (f1, f2) in ds.same_domain_pairs() {
        let (Some(p1), Some(p2)) = (images.pieces.get(&f1), images.pieces.get(&f2)) else {
            continue;
        };
        for &a in p1 {
            let edges = edge_set(store, a);
            for &b in p2 {
                if out.contains_key(&b) || edge_set(store, b) != edges {
                    continue;
                }
                let na = occurrence_normal(store, Shape::oriented(a, ds.shape(f1).orientation))?;
                let Some((point, na)) = na else {
                    continue;
                };
                let surface_b = store.face_surface(b)?;
                let (uv, _) = surface_b.project_point(&point);
                let nb = surface_b.normal_at(uv.0, uv.1) * ds.shape(f2).orientation.sign();
                let agree = na.dot(&nb) > 0.0;
                out.insert(a, (b, agree));
                out.insert(b, (a, agree));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boolean::filler::PaveFiller;
    use crate::boolean::split::split_edges;
    use crate::topology::primitives::{make_box, make_sphere};
    use crate::topology::properties::face_area;

    struct Built {
        store: ShapeStore,
        ds: DataStructure,
        faces: FaceImages,
        report: Report,
    }

    fn build(object: impl Fn(&mut ShapeStore) -> Shape, tool: impl Fn(&mut ShapeStore) -> Shape) -> Built {
        let mut store = ShapeStore::new();
        let a = object(&mut store);
        let b = tool(&mut store);
        let opts = BooleanOptions::sequential();
        let mut filler = PaveFiller::new(&mut store, &[a, b], &opts).unwrap();
        filler.perform().unwrap();
        let (mut ds, domains, mut report) = (filler.ds, filler.faces, filler.report);
        let images = split_edges(&mut store, &mut ds, &opts).unwrap();
        let faces = build_faces(&mut store, &ds, &images, &domains, &opts, &mut report).unwrap();
        Built { store, ds, faces, report }
    }

    fn unit_box(store: &mut ShapeStore) -> Shape {
        make_box(store, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0)).unwrap()
    }

    #[test]
    fn test_half_overlap_splits_shared_side_faces() {
        let built = build(unit_box, |s| make_box(s, Point3d::new(0.5, 0.0, 0.0), Point3d::new(1.5, 1.0, 1.0)).unwrap());
        let total: usize = built.faces.pieces.values().map(Vec::len).sum();
        // four side faces of each box are cut in two
        assert_eq!(total, 12 + 8);
        assert_eq!(built.faces.same_domain.len(), 2 * 4);
        assert!(built.faces.same_domain.values().all(|(_, agree)| *agree));
        for pieces in built.faces.pieces.values().filter(|p| p.len() == 2) {
            let area: f64 = pieces.iter().map(|&p| face_area(&built.store, p).unwrap()).sum();
            assert!((area - 1.0).abs() < 1e-9);
        }
        assert!(!built.report.has_local_failures());
    }

    #[test]
    fn test_shared_face_pieces_have_opposite_normals() {
        let built = build(unit_box, |s| make_box(s, Point3d::new(1.0, 0.0, 0.0), Point3d::new(2.0, 1.0, 1.0)).unwrap());
        let opposite = built.faces.same_domain.values().filter(|(_, agree)| !*agree).count();
        assert_eq!(opposite, 2);
        // the tool's copy of the shared face is rebuilt on the object's edges
        let rebuilt = built
            .ds
            .indices_of(ShapeKind::Face)
            .filter(|&f| built.faces.is_modified(&built.ds, f))
            .count();
        assert!(rebuilt >= 1);
    }

    #[test]
    fn test_plane_through_sphere_gives_two_caps_and_a_ring() {
        let built = build(
            |s| make_sphere(s, Point3d::ORIGIN, 1.0).unwrap(),
            |s| make_box(s, Point3d::new(-2.0, -2.0, 0.0), Point3d::new(2.0, 2.0, 2.0)).unwrap(),
        );
        let sphere_face = built.ds.indices_of(ShapeKind::Face).next().unwrap();
        let halves = &built.faces.pieces[&sphere_face];
        assert_eq!(halves.len(), 2);
        for &h in halves {
            let area = face_area(&built.store, h).unwrap();
            assert!((area - std::f64::consts::TAU).abs() < 1e-2, "hemisphere area {area}");
        }
        // the slab's bottom face becomes a disk and a square with a hole
        let bottom = built
            .faces
            .pieces
            .iter()
            .filter(|&(&f, _)| built.ds.rank(f) == Some(1))
            .find(|(_, p)| p.len() == 2)
            .map(|(_, p)| p.clone())
            .unwrap();
        let mut areas: Vec<f64> = bottom.iter().map(|&p| face_area(&built.store, p).unwrap().abs()).collect();
        areas.sort_by(f64::total_cmp);
        assert!((areas[0] - std::f64::consts::PI).abs() < 1e-2);
        assert!((areas[1] - (16.0 - std::f64::consts::PI)).abs() < 1e-2);
    }
}
