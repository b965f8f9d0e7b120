//! Vertex/vertex, vertex/edge and vertex/face interferences.

use tracing::info;

use crate::topology::pcurve::{uv_tolerance, UvState};
use crate::topology::{ShapeKind, ShapeStore};

use super::super::ds::{DataStructure, Interference};
use super::super::pave::{Pave, PaveSource};
use super::super::report::BooleanError;
use super::{collect_parallel, FaceDomains, PaveFiller};

/// Whether two vertices are within their summed tolerances.
pub(crate) fn vertices_coincide(store: &ShapeStore, ds: &DataStructure, a: usize, b: usize, fuzzy: f64) -> bool {
    match (ds.vertex_data(store, a), ds.vertex_data(store, b)) {
        (Ok((pa, ta)), Ok((pb, tb))) => pa.distance_to(&pb) <= ta + tb + fuzzy,
        _ => false,
    }
}

/// Parameter of the foot of vertex `v` on edge `e`, if the vertex lies on it.
pub(crate) fn vertex_on_edge(store: &ShapeStore, ds: &DataStructure, v: usize, e: usize, fuzzy: f64) -> Option<f64> {
    let (p, tv) = ds.vertex_data(store, v).ok()?;
    let data = store.edge(ds.id(e)).ok()?;
    if data.degenerate {
        return None;
    }
    let curve = store.curve(data.curve).ok()?;
    let (t, d) = curve.project_point(&p, data.range);
    (d <= tv + data.tolerance + fuzzy).then_some(t)
}

/// Whether vertex `v` lies strictly inside face `f`.
pub(crate) fn vertex_in_face(
    store: &ShapeStore,
    ds: &DataStructure,
    faces: &FaceDomains,
    v: usize,
    f: usize,
    fuzzy: f64,
) -> bool {
    let (Ok((p, tv)), Ok(tf), Some(domain)) = (ds.vertex_data(store, v), store.tolerance(ds.id(f)), faces.get(&f))
    else {
        return false;
    };
    let tol = tv + tf + fuzzy;
    let ((u, w), d) = domain.surface.project_point(&p);
    if d > tol {
        return false;
    }
    let uv = crate::geometry::point::Point2d::new(u, w);
    domain.classify(uv, uv_tolerance(&domain.surface, uv, tol)) == UvState::Inside
}

impl PaveFiller<'_> {
    pub(super) fn perform_vv(&mut self) -> Result<(), BooleanError> {
        let pairs = self.pairs(ShapeKind::Vertex, ShapeKind::Vertex);
        let (store, ds, fuzzy) = (&*self.store, &self.ds, self.fuzzy());
        let hits = collect_parallel(self.options(), &pairs, |&(a, b)| {
            vertices_coincide(store, ds, a, b, fuzzy).then_some((a, b))
        });
        for &(a, b) in &hits {
            self.ds.union(self.store, a, b);
            self.ds.interferences.push(Interference::VertexVertex { v1: a, v2: b });
        }
        info!(pairs = pairs.len(), hits = hits.len(), "vertex/vertex");
        Ok(())
    }

    pub(super) fn perform_ve(&mut self) -> Result<(), BooleanError> {
        let pairs = self.pairs(ShapeKind::Vertex, ShapeKind::Edge);
        let (store, ds, fuzzy) = (&*self.store, &self.ds, self.fuzzy());
        // paves go straight into the per-edge shards
        let hits = collect_parallel(self.options(), &pairs, |&(v, e)| {
            let rep = ds.real_vertex(v);
            if ds.info(e).subs.iter().any(|&end| ds.real_vertex(end) == rep) {
                return None;
            }
            let t = vertex_on_edge(store, ds, v, e, fuzzy)?;
            ds.paves.add_pave(e, Pave::new(v, t, PaveSource::VertexEdge));
            Some(Interference::VertexEdge { vertex: v, edge: e, t })
        });
        info!(pairs = pairs.len(), hits = hits.len(), "vertex/edge");
        self.ds.interferences.extend(hits);
        Ok(())
    }

    pub(super) fn perform_vf(&mut self) -> Result<(), BooleanError> {
        let pairs = self.pairs(ShapeKind::Vertex, ShapeKind::Face);
        let (store, ds, faces, fuzzy) = (&*self.store, &self.ds, &self.faces, self.fuzzy());
        let hits = collect_parallel(self.options(), &pairs, |&(v, f)| {
            vertex_in_face(store, ds, faces, v, f, fuzzy).then_some((v, f))
        });
        for &(v, f) in &hits {
            let rep = self.ds.real_vertex(v);
            self.ds.face_info_mut(f).vertices_in.insert(rep);
            self.ds.interferences.push(Interference::VertexFace { vertex: v, face: f });
        }
        info!(pairs = pairs.len(), hits = hits.len(), "vertex/face");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boolean::options::BooleanOptions;
    use crate::geometry::point::Point3d;
    use crate::topology::primitives::make_box;

    #[test]
    fn test_touching_boxes_merge_shared_corners() {
        let mut store = ShapeStore::new();
        let a = make_box(&mut store, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0)).unwrap();
        let b = make_box(&mut store, Point3d::new(1.0, 0.0, 0.0), Point3d::new(2.0, 1.0, 1.0)).unwrap();
        let opts = BooleanOptions::sequential();
        let mut filler = PaveFiller::new(&mut store, &[a, b], &opts).unwrap();
        filler.perform_vv().unwrap();
        assert_eq!(filler.ds.vertex_groups().len(), 4);
        for members in filler.ds.vertex_groups().values() {
            assert_eq!(members.len(), 2);
        }
    }

    #[test]
    fn test_vertex_on_edge_and_in_face() {
        let mut store = ShapeStore::new();
        let a = make_box(&mut store, Point3d::ORIGIN, Point3d::new(2.0, 2.0, 2.0)).unwrap();
        // corner (1, 0, 0) sits on an edge of `a`, corner (1, 1, 0) inside its bottom face
        let b = make_box(&mut store, Point3d::new(1.0, 0.0, 0.0), Point3d::new(1.0 + 1e-1, 1.0, -1.0)).unwrap();
        let opts = BooleanOptions::sequential();
        let mut filler = PaveFiller::new(&mut store, &[a, b], &opts).unwrap();
        filler.perform_ve().unwrap();
        filler.perform_vf().unwrap();
        let ve = filler
            .ds
            .interferences
            .iter()
            .filter(|i| matches!(i, Interference::VertexEdge { .. }))
            .count();
        let vf = filler
            .ds
            .interferences
            .iter()
            .filter(|i| matches!(i, Interference::VertexFace { .. }))
            .count();
        assert!(ve >= 1);
        assert!(vf >= 1);
    }
}
