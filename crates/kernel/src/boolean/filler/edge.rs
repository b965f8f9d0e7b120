//! Edge/edge and edge/face interferences, then the split of every edge
//! into pave blocks and the detection of common blocks.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::geometry::intersection::{intersect_curve_surface, intersect_curves, CurveCurveIntersection};
use crate::geometry::point::{Point2d, Point3d};
use crate::topology::pcurve::{uv_tolerance, UvState};
use crate::topology::{ShapeKind, ShapeStore};

use super::super::ds::{BlockOwner, DataStructure, EdgeEdgeKind, EdgeFaceKind, Interference, PaveBlock};
use super::super::pave::{merge_paves, MergedPave, Pave, PaveSource};
use super::super::report::{AlertCode, BooleanError, Stage};
use super::{collect_parallel, FaceDomains, PaveFiller};

/// Crossings and overlaps of two non-degenerate edges, if there are any.
pub(crate) fn edge_edge(
    store: &ShapeStore,
    ds: &DataStructure,
    e1: usize,
    e2: usize,
    fuzzy: f64,
) -> Option<CurveCurveIntersection> {
    let d1 = store.edge(ds.id(e1)).ok()?;
    let d2 = store.edge(ds.id(e2)).ok()?;
    if d1.degenerate || d2.degenerate {
        return None;
    }
    let c1 = store.curve(d1.curve).ok()?;
    let c2 = store.curve(d2.curve).ok()?;
    let tol = d1.tolerance + d2.tolerance + fuzzy;
    let found = intersect_curves(c1, d1.range, c2, d2.range, tol);
    (!found.points.is_empty() || !found.overlaps.is_empty() || !found.converged).then_some(found)
}

/// Edge/face result restricted to the face domain.
#[derive(Debug, Clone, Default)]
pub(crate) struct EdgeFaceHits {
    /// `(edge parameter, point)` of crossings strictly inside the face.
    pub points: Vec<(f64, Point3d)>,
    /// Edge ranges lying on the face's surface.
    pub on_surface: Vec<(f64, f64)>,
}

/// Classify a point against a face domain, `None` when it is off the surface.
pub(crate) fn point_state(domains: &FaceDomains, f: usize, p: &Point3d, tol: f64) -> Option<UvState> {
    let domain = domains.get(&f)?;
    let ((u, v), d) = domain.surface.project_point(p);
    if d > tol {
        return None;
    }
    let uv = Point2d::new(u, v);
    Some(domain.classify(uv, uv_tolerance(&domain.surface, uv, tol)))
}

pub(crate) fn edge_face(
    store: &ShapeStore,
    ds: &DataStructure,
    domains: &FaceDomains,
    e: usize,
    f: usize,
    fuzzy: f64,
) -> Option<EdgeFaceHits> {
    let data = store.edge(ds.id(e)).ok()?;
    if data.degenerate {
        return None;
    }
    let curve = store.curve(data.curve).ok()?;
    let domain = domains.get(&f)?;
    let tol = data.tolerance + store.tolerance(ds.id(f)).ok()? + fuzzy;
    let found = intersect_curve_surface(curve, data.range, &domain.surface, tol);
    let points: Vec<(f64, Point3d)> = found
        .hits
        .iter()
        .filter(|h| point_state(domains, f, &h.point, tol) == Some(UvState::Inside))
        .map(|h| (h.t, h.point))
        .collect();
    if points.is_empty() && found.on_surface.is_empty() {
        return None;
    }
    Some(EdgeFaceHits {
        points,
        on_surface: found.on_surface,
    })
}

fn within(t: f64, range: (f64, f64), margin: f64) -> bool {
    t >= range.0 - margin && t <= range.1 + margin
}

impl PaveFiller<'_> {
    /// An existing vertex near `p`: a pave vertex of one of `edges`, or one
    /// of `extra`. Otherwise a new vertex is made.
    pub(super) fn vertex_near(&mut self, p: Point3d, tolerance: f64, edges: &[usize], extra: &[usize]) -> Result<usize, BooleanError> {
        let mut best: Option<(f64, usize)> = None;
        let candidates = edges
            .iter()
            .flat_map(|&e| self.ds.paves.raw(e))
            .map(|pave| pave.vertex)
            .chain(extra.iter().copied());
        for v in candidates {
            let rep = self.ds.real_vertex(v);
            let (q, tv) = self.ds.vertex_data(self.store, rep)?;
            let d = q.distance_to(&p);
            if d <= tv + tolerance && best.is_none_or(|(bd, _)| d < bd) {
                best = Some((d, rep));
            }
        }
        Ok(match best {
            Some((_, v)) => v,
            None => self.ds.add_vertex(self.store, p, tolerance),
        })
    }

    pub(super) fn perform_ee(&mut self) -> Result<(), BooleanError> {
        let pairs = self.pairs(ShapeKind::Edge, ShapeKind::Edge);
        let (store, ds, fuzzy) = (&*self.store, &self.ds, self.fuzzy());
        let found = collect_parallel(self.options(), &pairs, |&(e1, e2)| {
            edge_edge(store, ds, e1, e2, fuzzy).map(|hit| (e1, e2, hit))
        });
        let mut points = 0;
        for (e1, e2, hit) in found {
            if !hit.converged {
                self.report.warning(
                    AlertCode::IntersectionNotConverged,
                    Stage::EdgeEdge,
                    vec![self.ds.id(e1), self.ds.id(e2)],
                    "curve/curve refinement stalled",
                );
            }
            for o in &hit.overlaps {
                self.ds.interferences.push(Interference::EdgeEdge {
                    e1,
                    e2,
                    kind: EdgeEdgeKind::Overlap {
                        range1: o.range1,
                        range2: o.range2,
                    },
                });
            }
            let tol = self.store.tolerance(self.ds.id(e1))?.max(self.store.tolerance(self.ds.id(e2))?);
            for h in &hit.points {
                let v = self.vertex_near(h.point, tol + self.fuzzy(), &[e1, e2], &[])?;
                self.ds.paves.add_pave(e1, Pave::new(v, h.t1, PaveSource::EdgeEdge));
                self.ds.paves.add_pave(e2, Pave::new(v, h.t2, PaveSource::EdgeEdge));
                self.ds.interferences.push(Interference::EdgeEdge {
                    e1,
                    e2,
                    kind: EdgeEdgeKind::Point {
                        vertex: v,
                        t1: h.t1,
                        t2: h.t2,
                    },
                });
                points += 1;
            }
        }
        info!(pairs = pairs.len(), points, "edge/edge");
        Ok(())
    }

    pub(super) fn perform_ef(&mut self) -> Result<(), BooleanError> {
        let pairs = self.pairs(ShapeKind::Edge, ShapeKind::Face);
        let (store, ds, faces, fuzzy) = (&*self.store, &self.ds, &self.faces, self.fuzzy());
        let found = collect_parallel(self.options(), &pairs, |&(e, f)| {
            edge_face(store, ds, faces, e, f, fuzzy).map(|hit| (e, f, hit))
        });
        let mut points = 0;
        for (e, f, hit) in found {
            let tol = self.store.tolerance(self.ds.id(e))?.max(self.store.tolerance(self.ds.id(f))?);
            for &(t, p) in &hit.points {
                let inside: Vec<usize> = self
                    .ds
                    .face_info
                    .get(&f)
                    .map(|fi| fi.vertices_in.iter().copied().collect())
                    .unwrap_or_default();
                let v = self.vertex_near(p, tol + self.fuzzy(), &[e], &inside)?;
                self.ds.paves.add_pave(e, Pave::new(v, t, PaveSource::EdgeFace));
                self.ds.face_info_mut(f).vertices_in.insert(v);
                self.ds.interferences.push(Interference::EdgeFace {
                    edge: e,
                    face: f,
                    kind: EdgeFaceKind::Point { vertex: v, t },
                });
                points += 1;
            }
            for &range in &hit.on_surface {
                self.ds.interferences.push(Interference::EdgeFace {
                    edge: e,
                    face: f,
                    kind: EdgeFaceKind::Overlap { range },
                });
            }
        }
        info!(pairs = pairs.len(), points, "edge/face");
        Ok(())
    }

    // ─── Pave Blocks ─────────────────────────────────────────────────────────

    fn merged_paves(&self, edges: &[usize]) -> Vec<(usize, Vec<MergedPave>)> {
        let (store, ds) = (&*self.store, &self.ds);
        collect_parallel(self.options(), edges, |&e| {
            let data = store.edge(ds.id(e)).ok()?;
            let curve = store.curve(data.curve).ok()?;
            let merged = merge_paves(&ds.paves.raw(e), curve, data.tolerance, |v| {
                let rep = ds.real_vertex(v);
                (rep, store.tolerance(ds.id(rep)).unwrap_or(0.0))
            });
            Some((e, merged))
        })
    }

    pub(super) fn perform_pave_blocks(&mut self) -> Result<(), BooleanError> {
        let edges: Vec<usize> = self.ds.paves.owners().collect();

        // clusters of paves are one vertex from here on
        for (_, merged) in self.merged_paves(&edges) {
            for m in merged.iter().filter(|m| m.members.len() > 1) {
                for &other in &m.members {
                    self.ds.union(self.store, m.vertex, other);
                }
            }
        }
        self.options().check_cancel(Stage::PaveBlocks)?;

        for (e, merged) in self.merged_paves(&edges) {
            let data = self.store.edge(self.ds.id(e))?;
            let curve = self.store.curve(data.curve)?.clone();
            let tol = data.tolerance;
            for w in merged.windows(2) {
                let (a, b) = (&w[0], &w[1]);
                if curve.approximate_length((a.param, b.param), 8) <= tol {
                    warn!(edge = e, from = a.param, to = b.param, "dropping micro block");
                    self.report.warning(
                        AlertCode::MicroEdgeDropped,
                        Stage::PaveBlocks,
                        vec![self.ds.id(e)],
                        format!("block [{:.6}, {:.6}] is shorter than the edge tolerance", a.param, b.param),
                    );
                    continue;
                }
                self.ds.add_block(PaveBlock {
                    owner: BlockOwner::Edge(e),
                    v1: self.ds.real_vertex(a.vertex),
                    t1: a.param,
                    v2: self.ds.real_vertex(b.vertex),
                    t2: b.param,
                    common: None,
                    image: None,
                });
            }
        }

        self.fill_face_boundaries();
        self.find_common_blocks()?;
        self.find_in_blocks();
        info!(
            blocks = self.ds.blocks.len(),
            common_blocks = self.ds.common_blocks.len(),
            "pave blocks"
        );
        Ok(())
    }

    fn fill_face_boundaries(&mut self) {
        let faces: Vec<usize> = self.ds.indices_of(ShapeKind::Face).collect();
        for f in faces {
            let mut on = Vec::new();
            let mut vertices = Vec::new();
            for &s in &self.ds.info(f).subs {
                match self.ds.info(s).kind {
                    ShapeKind::Edge => on.extend_from_slice(self.ds.blocks_of_edge(s)),
                    ShapeKind::Vertex => vertices.push(self.ds.real_vertex(s)),
                    _ => {}
                }
            }
            for &b in &on {
                vertices.push(self.ds.real_vertex(self.ds.blocks[b].v1));
                vertices.push(self.ds.real_vertex(self.ds.blocks[b].v2));
            }
            let inside: BTreeSet<usize> = self
                .ds
                .face_info
                .get(&f)
                .map(|fi| fi.vertices_in.iter().map(|&v| self.ds.real_vertex(v)).collect())
                .unwrap_or_default();
            let info = self.ds.face_info_mut(f);
            info.on.extend(on);
            info.vertices_on.extend(vertices);
            info.vertices_in = inside;
        }
    }

    /// Pair up blocks of overlapping edges that span the same vertices.
    fn find_common_blocks(&mut self) -> Result<(), BooleanError> {
        let overlaps: Vec<(usize, usize, (f64, f64))> = self
            .ds
            .interferences
            .iter()
            .filter_map(|i| match i {
                Interference::EdgeEdge {
                    e1,
                    e2,
                    kind: EdgeEdgeKind::Overlap { range1, .. },
                } => Some((*e1, *e2, *range1)),
                _ => None,
            })
            .collect();
        for (e1, e2, range1) in overlaps {
            let (c1, _) = self.store.edge_curve(self.ds.id(e1))?;
            let (c2, r2) = self.store.edge_curve(self.ds.id(e2))?;
            let tol = self.store.tolerance(self.ds.id(e1))? + self.store.tolerance(self.ds.id(e2))? + self.fuzzy();
            let mut pairs = Vec::new();
            for &b1 in self.ds.blocks_of_edge(e1) {
                let pb1 = &self.ds.blocks[b1];
                let mid = pb1.mid_param();
                if !within(mid, range1, c1.parametric_tolerance(mid, tol)) {
                    continue;
                }
                let (t2, d) = c2.project_point(&c1.evaluate(mid), r2);
                if d > tol {
                    continue;
                }
                let (a, b) = (self.ds.real_vertex(pb1.v1), self.ds.real_vertex(pb1.v2));
                let partner = self.ds.blocks_of_edge(e2).iter().copied().find(|&b2| {
                    let pb2 = &self.ds.blocks[b2];
                    let ends = (self.ds.real_vertex(pb2.v1), self.ds.real_vertex(pb2.v2));
                    within(t2, pb2.range(), c2.parametric_tolerance(t2, tol)) && (ends == (a, b) || ends == (b, a))
                });
                if let Some(b2) = partner {
                    pairs.push((b1, b2));
                }
            }
            for (b1, b2) in pairs {
                self.ds.add_common_block(self.store, b1, b2)?;
            }
        }
        Ok(())
    }

    /// Blocks lying on another argument's face, strictly inside it.
    fn find_in_blocks(&mut self) {
        let overlaps: Vec<(usize, usize, (f64, f64))> = self
            .ds
            .interferences
            .iter()
            .filter_map(|i| match i {
                Interference::EdgeFace {
                    edge,
                    face,
                    kind: EdgeFaceKind::Overlap { range },
                } => Some((*edge, *face, *range)),
                _ => None,
            })
            .collect();
        for (e, f, range) in overlaps {
            let Ok((curve, _)) = self.store.edge_curve(self.ds.id(e)) else {
                continue;
            };
            let tol = self.store.tolerance(self.ds.id(e)).unwrap_or(0.0)
                + self.store.tolerance(self.ds.id(f)).unwrap_or(0.0)
                + self.fuzzy();
            let inside: Vec<usize> = self
                .ds
                .blocks_of_edge(e)
                .iter()
                .copied()
                .filter(|&b| {
                    let mid = self.ds.blocks[b].mid_param();
                    within(mid, range, curve.parametric_tolerance(mid, tol))
                        && point_state(&self.faces, f, &curve.evaluate(mid), tol) == Some(UvState::Inside)
                })
                .collect();
            for b in inside {
                debug!(block = b, face = f, "block inside face");
                if let Some(c) = self.ds.blocks[b].common {
                    self.ds.common_blocks[c].faces.insert(f);
                }
                self.ds.face_info_mut(f).in_blocks.insert(b);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boolean::options::BooleanOptions;
    use crate::topology::primitives::make_box;

    fn run(b_min: Point3d, b_max: Point3d) -> (usize, usize, usize) {
        let mut store = ShapeStore::new();
        let a = make_box(&mut store, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0)).unwrap();
        let b = make_box(&mut store, b_min, b_max).unwrap();
        let opts = BooleanOptions::sequential();
        let mut filler = PaveFiller::new(&mut store, &[a, b], &opts).unwrap();
        filler.perform_vv().unwrap();
        filler.perform_ve().unwrap();
        filler.perform_ee().unwrap();
        filler.perform_vf().unwrap();
        filler.perform_ef().unwrap();
        filler.perform_pave_blocks().unwrap();
        let in_blocks = filler.ds.face_info.values().map(|fi| fi.in_blocks.len()).sum();
        (filler.ds.blocks.len(), filler.ds.common_blocks.len(), in_blocks)
    }

    #[test]
    fn test_shared_face_gives_four_common_blocks() {
        let (blocks, common, _) = run(Point3d::new(1.0, 0.0, 0.0), Point3d::new(2.0, 1.0, 1.0));
        assert_eq!(blocks, 24);
        assert_eq!(common, 4);
    }

    #[test]
    fn test_half_overlap_splits_edges() {
        let (blocks, common, in_blocks) = run(Point3d::new(0.5, 0.0, 0.0), Point3d::new(1.5, 1.0, 1.0));
        // four x-edges of each box are cut in two
        assert_eq!(blocks, 24 + 8);
        assert_eq!(common, 4);
        // b's x = 0.5 edges lie in a's faces, a's x = 1 edges in b's
        assert_eq!(in_blocks, 8);
    }

    #[test]
    fn test_crossing_edges_get_a_new_vertex() {
        let mut store = ShapeStore::new();
        let a = make_box(&mut store, Point3d::ORIGIN, Point3d::new(2.0, 2.0, 2.0)).unwrap();
        let b = make_box(&mut store, Point3d::new(1.0, -1.0, 0.0), Point3d::new(3.0, 1.0, 2.0)).unwrap();
        let opts = BooleanOptions::sequential();
        let mut filler = PaveFiller::new(&mut store, &[a, b], &opts).unwrap();
        filler.perform_ee().unwrap();
        let crossings = filler
            .ds
            .interferences
            .iter()
            .filter(|i| matches!(i, Interference::EdgeEdge { kind: EdgeEdgeKind::Point { .. }, .. }))
            .count();
        assert!(crossings > 0);
        assert!(filler.ds.len() > 52);
    }
}
