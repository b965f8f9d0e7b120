//! Provenance of result sub-shapes: what every argument sub-shape was
//! modified into, what it generated, and whether it is gone.

use std::collections::{BTreeMap, BTreeSet};

use crate::topology::{Shape, ShapeId, ShapeKind, ShapeStore};

use super::ds::{DataStructure, EdgeEdgeKind, EdgeFaceKind, Interference};
use super::face_builder::FaceImages;
use super::split::SplitImages;

#[derive(Debug, Clone, Default)]
pub struct History {
    modified: BTreeMap<ShapeId, Vec<ShapeId>>,
    generated: BTreeMap<ShapeId, Vec<ShapeId>>,
    /// Every shape reachable from the result.
    present: BTreeSet<ShapeId>,
    /// Every sub-shape of the arguments.
    tracked: BTreeSet<ShapeId>,
}

fn reachable(store: &ShapeStore, root: Shape) -> BTreeSet<ShapeId> {
    let mut seen = BTreeSet::new();
    let mut stack = vec![root.id];
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        if let Ok(record) = store.record(id) {
            stack.extend(record.children.iter().map(|c| c.id));
        }
    }
    seen
}

fn push_unique(list: &mut Vec<ShapeId>, id: ShapeId) {
    if !list.contains(&id) {
        list.push(id);
    }
}

impl History {
    /// History of a run that split edges and faces. `faces` is `None` for
    /// a section, which builds no faces.
    pub fn build(
        store: &ShapeStore,
        ds: &DataStructure,
        split: &SplitImages,
        faces: Option<&FaceImages>,
        result: Shape,
    ) -> Self {
        let present = reachable(store, result);
        let mut history = Self {
            present,
            ..Self::default()
        };
        for arg in &ds.arguments {
            history.tracked.extend(reachable(store, *arg));
        }

        for i in 0..ds.len() {
            if ds.rank(i).is_none() {
                continue;
            }
            let id = ds.id(i);
            let images: Vec<ShapeId> = match ds.info(i).kind {
                ShapeKind::Vertex => vec![split.vertex(ds, i)],
                ShapeKind::Edge => split.edge_images(ds, i),
                ShapeKind::Face => match faces {
                    Some(faces) => faces
                        .pieces
                        .get(&i)
                        .map(|pieces| {
                            pieces
                                .iter()
                                .map(|p| match faces.same_domain.get(p) {
                                    // a dropped same-domain piece lives on in its partner
                                    Some(&(partner, _)) if !history.present.contains(p) => partner,
                                    _ => *p,
                                })
                                .collect()
                        })
                        .unwrap_or_default(),
                    None => Vec::new(),
                },
                _ => Vec::new(),
            };
            let kept: Vec<ShapeId> = images
                .into_iter()
                .filter(|&im| im != id && history.present.contains(&im))
                .fold(Vec::new(), |mut acc, im| {
                    push_unique(&mut acc, im);
                    acc
                });
            if !kept.is_empty() {
                history.modified.insert(id, kept);
            }
        }

        for s in &ds.sections {
            let edges: Vec<ShapeId> = s
                .blocks
                .iter()
                .filter_map(|&b| ds.blocks[ds.real_block(b)].image)
                .map(|im| im.edge)
                .filter(|e| history.present.contains(e))
                .collect();
            for f in [s.faces.0, s.faces.1] {
                for &e in &edges {
                    push_unique(history.generated.entry(ds.id(f)).or_default(), e);
                }
            }
        }
        for i in &ds.interferences {
            let (edges, vertex) = match *i {
                Interference::EdgeFace { edge, kind: EdgeFaceKind::Point { vertex, .. }, .. } => (vec![edge], vertex),
                Interference::EdgeEdge { e1, e2, kind: EdgeEdgeKind::Point { vertex, .. } } => (vec![e1, e2], vertex),
                _ => continue,
            };
            if ds.is_original(ds.real_vertex(vertex)) {
                continue;
            }
            let image = split.vertex(ds, vertex);
            if !history.present.contains(&image) {
                continue;
            }
            for e in edges {
                push_unique(history.generated.entry(ds.id(e)).or_default(), image);
            }
        }
        history.generated.retain(|_, v| !v.is_empty());
        history
    }

    /// History of a result that is one of the arguments, unchanged.
    pub fn identity(store: &ShapeStore, arguments: &[Shape], result: Shape) -> Self {
        let mut history = Self {
            present: reachable(store, result),
            ..Self::default()
        };
        for arg in arguments {
            history.tracked.extend(reachable(store, *arg));
        }
        history
    }

    /// Result images of `s`; never `s` itself.
    pub fn modified(&self, s: ShapeId) -> &[ShapeId] {
        self.modified.get(&s).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Result shapes created from `s`: section edges of faces, crossing
    /// vertices of edges.
    pub fn generated(&self, s: ShapeId) -> &[ShapeId] {
        self.generated.get(&s).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `s` is in the result unchanged.
    pub fn is_present(&self, s: ShapeId) -> bool {
        self.present.contains(&s)
    }

    pub fn is_deleted(&self, s: ShapeId) -> bool {
        self.modified(s).is_empty() && self.generated(s).is_empty() && !self.is_present(s)
    }

    /// Every argument sub-shape the history answers for.
    pub fn tracked(&self) -> impl Iterator<Item = ShapeId> + '_ {
        self.tracked.iter().copied()
    }

    pub fn has_modified(&self) -> bool {
        !self.modified.is_empty()
    }

    pub fn has_generated(&self) -> bool {
        !self.generated.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::point::Point3d;
    use crate::topology::primitives::make_box;

    #[test]
    fn test_identity_history_keeps_everything() {
        let mut store = ShapeStore::new();
        let b = make_box(&mut store, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0)).unwrap();
        let h = History::identity(&store, &[b], b);
        assert_eq!(h.tracked().count(), 1 + 1 + 6 + 6 + 12 + 8);
        for s in h.tracked() {
            assert!(h.is_present(s));
            assert!(!h.is_deleted(s));
            assert!(h.modified(s).is_empty());
        }
    }

    #[test]
    fn test_missing_shapes_are_deleted() {
        let mut store = ShapeStore::new();
        let a = make_box(&mut store, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0)).unwrap();
        let b = make_box(&mut store, Point3d::new(3.0, 0.0, 0.0), Point3d::new(4.0, 1.0, 1.0)).unwrap();
        let h = History::identity(&store, &[a, b], a);
        assert!(h.is_deleted(b.id));
        assert!(!h.is_deleted(a.id));
    }
}
