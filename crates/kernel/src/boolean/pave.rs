//! Split points on edges and their tolerance merge.
//!
//! Paves arrive from many pair tests, possibly on many threads, in any
//! order. Storage is append-only; the merge runs afterwards on a sorted
//! copy so its outcome depends only on the pave set.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::geometry::curves::Curve;

/// Which interference produced a pave. Also the tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PaveSource {
    Endpoint,
    VertexEdge,
    EdgeEdge,
    EdgeFace,
    Section,
}

/// A split point: data-structure index of the vertex and its parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pave {
    pub vertex: usize,
    pub param: f64,
    pub source: PaveSource,
}

impl Pave {
    pub fn new(vertex: usize, param: f64, source: PaveSource) -> Self {
        Self { vertex, param, source }
    }

    pub fn is_endpoint(&self) -> bool {
        self.source == PaveSource::Endpoint
    }

    fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.param
            .total_cmp(&other.param)
            .then(self.vertex.cmp(&other.vertex))
            .then(self.source.cmp(&other.source))
    }
}

/// Paves within tolerance of each other collapsed to one.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedPave {
    pub param: f64,
    /// Surviving vertex.
    pub vertex: usize,
    /// Every distinct vertex of the cluster, survivor included, ascending.
    pub members: Vec<usize>,
    pub endpoint: bool,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// Per-owner pave lists, one lock per owner. Owners (edges or section
/// curves) are registered up front; adds may then come from any thread.
#[derive(Debug, Default)]
pub struct PaveStore {
    shards: BTreeMap<usize, Mutex<Vec<Pave>>>,
}

impl PaveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, owner: usize) {
        self.shards.entry(owner).or_default();
    }

    pub fn owners(&self) -> impl Iterator<Item = usize> + '_ {
        self.shards.keys().copied()
    }

    /// Append `pave`; an exact duplicate is ignored. Returns false when
    /// the owner was never registered.
    pub fn add_pave(&self, owner: usize, pave: Pave) -> bool {
        let Some(shard) = self.shards.get(&owner) else {
            return false;
        };
        let mut paves = shard.lock();
        let duplicate = paves
            .iter()
            .any(|p| p.vertex == pave.vertex && p.param == pave.param && p.source == pave.source);
        if !duplicate {
            paves.push(pave);
        }
        true
    }

    /// Raw paves in canonical order.
    pub fn raw(&self, owner: usize) -> Vec<Pave> {
        let mut out = self
            .shards
            .get(&owner)
            .map(|s| s.lock().clone())
            .unwrap_or_default();
        out.sort_by(Pave::canonical_cmp);
        out
    }

    pub fn count(&self, owner: usize) -> usize {
        self.shards.get(&owner).map_or(0, |s| s.lock().len())
    }
}

// ─── Merge ───────────────────────────────────────────────────────────────────

/// Canonical merge of `paves` on `curve`.
///
/// Paves are sorted by `(param, vertex)` and chained into clusters while
/// neighbours are closer than the larger of the edge and vertex tolerances,
/// measured along the curve. The survivor of a cluster is an original
/// endpoint if there is one, else the vertex with the largest tolerance,
/// else the smallest index. `vertex` maps a vertex index to its current
/// representative and its tolerance.
pub fn merge_paves(
    paves: &[Pave],
    curve: &Curve,
    edge_tolerance: f64,
    vertex: impl Fn(usize) -> (usize, f64),
) -> Vec<MergedPave> {
    let mut sorted: Vec<Pave> = paves
        .iter()
        .map(|p| Pave {
            vertex: vertex(p.vertex).0,
            ..*p
        })
        .collect();
    sorted.sort_by(Pave::canonical_cmp);
    sorted.dedup_by(|next, kept| next.vertex == kept.vertex && next.param == kept.param);

    let mut clusters: Vec<Vec<Pave>> = Vec::new();
    for p in sorted {
        let joins = clusters.last().and_then(|c| c.last()).is_some_and(|last| {
            let tol = edge_tolerance.max(vertex(last.vertex).1).max(vertex(p.vertex).1);
            let ptol = curve.parametric_tolerance(last.param, tol);
            // two ends of a closed edge never fold into each other
            let both_ends = last.is_endpoint() && p.is_endpoint() && last.vertex == p.vertex;
            !both_ends && (p.param - last.param).abs() <= ptol
        });
        match clusters.last_mut() {
            Some(c) if joins => c.push(p),
            _ => clusters.push(vec![p]),
        }
    }

    clusters
        .into_iter()
        .map(|members| {
            let rank = |p: &Pave| (p.is_endpoint(), vertex(p.vertex).1);
            let survivor = members
                .iter()
                .copied()
                .max_by(|a, b| {
                    let (ea, ta) = rank(a);
                    let (eb, tb) = rank(b);
                    ea.cmp(&eb)
                        .then(ta.total_cmp(&tb))
                        .then(b.vertex.cmp(&a.vertex))
                        .then(b.param.total_cmp(&a.param))
                })
                .unwrap_or(members[0]);
            let endpoint = members.iter().any(Pave::is_endpoint);
            let mut ids: Vec<usize> = members.iter().map(|p| p.vertex).collect();
            ids.sort_unstable();
            ids.dedup();
            MergedPave {
                param: survivor.param,
                vertex: survivor.vertex,
                members: ids,
                endpoint,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::curves::Line3d;
    use crate::geometry::point::Point3d;
    use crate::geometry::vector::Vec3;

    fn x_axis() -> Curve {
        Curve::Line(Line3d::new(Point3d::ORIGIN, Vec3::X))
    }

    fn tol_of(v: usize) -> (usize, f64) {
        (v, if v == 7 { 1e-3 } else { 1e-7 })
    }

    #[test]
    fn test_close_paves_merge_to_one() {
        let paves = [
            Pave::new(0, 0.0, PaveSource::Endpoint),
            Pave::new(5, 0.5, PaveSource::EdgeEdge),
            Pave::new(6, 0.5 + 1e-8, PaveSource::VertexEdge),
            Pave::new(1, 1.0, PaveSource::Endpoint),
        ];
        let merged = merge_paves(&paves, &x_axis(), 1e-7, tol_of);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[1].members, vec![5, 6]);
        assert_eq!(merged[1].vertex, 5);
    }

    #[test]
    fn test_endpoint_survives_and_keeps_its_parameter() {
        let paves = [
            Pave::new(7, 2e-4, PaveSource::EdgeFace),
            Pave::new(0, 0.0, PaveSource::Endpoint),
            Pave::new(1, 1.0, PaveSource::Endpoint),
        ];
        let merged = merge_paves(&paves, &x_axis(), 1e-7, tol_of);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].vertex, 0);
        assert_eq!(merged[0].param, 0.0);
        assert_eq!(merged[0].members, vec![0, 7]);
        assert!(merged[0].endpoint);
    }

    #[test]
    fn test_larger_tolerance_wins_among_interior_paves() {
        let paves = [
            Pave::new(3, 0.5, PaveSource::EdgeEdge),
            Pave::new(7, 0.5002, PaveSource::EdgeFace),
        ];
        let merged = merge_paves(&paves, &x_axis(), 1e-7, tol_of);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].vertex, 7);
        assert_eq!(merged[0].param, 0.5002);
    }

    #[test]
    fn test_closed_edge_keeps_both_ends() {
        let circle = Curve::Circle(crate::geometry::curves::Circle3d::new(Point3d::ORIGIN, Vec3::Z, 1.0));
        let paves = [
            Pave::new(0, 0.0, PaveSource::Endpoint),
            Pave::new(0, std::f64::consts::TAU, PaveSource::Endpoint),
        ];
        assert_eq!(merge_paves(&paves, &circle, 1e-7, tol_of).len(), 2);
    }

    #[test]
    fn test_store_ignores_duplicates_and_unknown_owners() {
        let mut store = PaveStore::new();
        store.register(4);
        let p = Pave::new(1, 0.25, PaveSource::VertexEdge);
        assert!(store.add_pave(4, p));
        assert!(store.add_pave(4, p));
        assert!(!store.add_pave(9, p));
        assert_eq!(store.count(4), 1);
    }

    #[test]
    fn test_concurrent_adds() {
        use rayon::prelude::*;
        let mut store = PaveStore::new();
        store.register(0);
        (0..200usize).into_par_iter().for_each(|i| {
            store.add_pave(0, Pave::new(i, i as f64 / 200.0, PaveSource::EdgeEdge));
        });
        let raw = store.raw(0);
        assert_eq!(raw.len(), 200);
        assert!(raw.windows(2).all(|w| w[0].param <= w[1].param));
    }
}
