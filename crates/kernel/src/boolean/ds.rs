//! Shared state of one Boolean run: the flat index of argument
//! sub-shapes, vertex merging, paves and pave blocks, common blocks,
//! per-face bookkeeping, section curves and interference records.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::geometry::curves::Curve;
use crate::geometry::point::Point3d;
use crate::geometry::transform::BoundingBox;
use crate::topology::explorer::unique_subshapes;
use crate::topology::properties;
use crate::topology::{Shape, ShapeId, ShapeKind, ShapeStore};

use super::bvh::Bvh;
use super::pave::{Pave, PaveSource, PaveStore};
use super::report::{BooleanError, Stage};

pub const OBJECT: usize = 0;
pub const TOOL: usize = 1;

// ─── Records ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ShapeInfo {
    pub shape: Shape,
    pub kind: ShapeKind,
    /// Argument the shape comes from; `None` for vertices made by the run.
    pub rank: Option<usize>,
    pub bbox: BoundingBox,
    /// Indices of every unique sub-shape (edges and vertices of a face,
    /// vertices of an edge).
    pub subs: Vec<usize>,
}

/// Who a pave block cuts: an argument edge or a section curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BlockOwner {
    Edge(usize),
    Section(usize),
}

/// The output edge standing for a pave block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeImage {
    pub edge: ShapeId,
    /// False when the output edge runs against the block's own curve.
    pub same_direction: bool,
}

#[derive(Debug, Clone)]
pub struct PaveBlock {
    pub owner: BlockOwner,
    pub v1: usize,
    pub t1: f64,
    pub v2: usize,
    pub t2: f64,
    pub common: Option<usize>,
    pub image: Option<EdgeImage>,
}

impl PaveBlock {
    pub fn mid_param(&self) -> f64 {
        0.5 * (self.t1 + self.t2)
    }

    pub fn range(&self) -> (f64, f64) {
        (self.t1, self.t2)
    }

    pub fn has_vertices(&self, a: usize, b: usize) -> bool {
        (self.v1 == a && self.v2 == b) || (self.v1 == b && self.v2 == a)
    }
}

/// Pave blocks of different arguments that are the same piece of curve.
#[derive(Debug, Clone, Default)]
pub struct CommonBlock {
    pub blocks: Vec<usize>,
    /// Faces the shared piece lies inside of.
    pub faces: BTreeSet<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct FaceInfo {
    /// Blocks of the face's own boundary edges.
    pub on: BTreeSet<usize>,
    /// Blocks of other edges lying inside the face.
    pub in_blocks: BTreeSet<usize>,
    /// Blocks of section curves crossing the face.
    pub section: BTreeSet<usize>,
    pub vertices_on: BTreeSet<usize>,
    pub vertices_in: BTreeSet<usize>,
}

/// An intersection curve of two faces.
#[derive(Debug, Clone)]
pub struct SectionCurve {
    pub curve: Curve,
    pub range: (f64, f64),
    pub faces: (usize, usize),
    pub tolerance: f64,
    pub blocks: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EdgeEdgeKind {
    Point { vertex: usize, t1: f64, t2: f64 },
    Overlap { range1: (f64, f64), range2: (f64, f64) },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EdgeFaceKind {
    Point { vertex: usize, t: f64 },
    Overlap { range: (f64, f64) },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Interference {
    VertexVertex { v1: usize, v2: usize },
    VertexEdge { vertex: usize, edge: usize, t: f64 },
    EdgeEdge { e1: usize, e2: usize, kind: EdgeEdgeKind },
    VertexFace { vertex: usize, face: usize },
    EdgeFace { edge: usize, face: usize, kind: EdgeFaceKind },
    FaceFace { f1: usize, f2: usize, sections: Vec<usize>, same_domain: bool },
}

// ─── Data Structure ──────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct DataStructure {
    pub arguments: Vec<Shape>,
    shapes: Vec<ShapeInfo>,
    index: HashMap<ShapeId, usize>,
    /// Union-find over vertex indices; other kinds point at themselves.
    parent: Vec<usize>,
    pub paves: PaveStore,
    pub section_paves: PaveStore,
    pub blocks: Vec<PaveBlock>,
    pub edge_blocks: BTreeMap<usize, Vec<usize>>,
    pub common_blocks: Vec<CommonBlock>,
    pub face_info: BTreeMap<usize, FaceInfo>,
    pub sections: Vec<SectionCurve>,
    pub interferences: Vec<Interference>,
    bvh: Bvh,
    fuzzy: f64,
}

impl DataStructure {
    /// Index every unique face, edge and vertex of `arguments`; argument
    /// `i` gets rank `i`. A sub-shape shared by two arguments keeps the
    /// first rank.
    pub fn new(store: &ShapeStore, arguments: &[Shape], fuzzy: f64) -> Result<Self, BooleanError> {
        let mut ds = Self {
            arguments: arguments.to_vec(),
            shapes: Vec::new(),
            index: HashMap::new(),
            parent: Vec::new(),
            paves: PaveStore::new(),
            section_paves: PaveStore::new(),
            blocks: Vec::new(),
            edge_blocks: BTreeMap::new(),
            common_blocks: Vec::new(),
            face_info: BTreeMap::new(),
            sections: Vec::new(),
            interferences: Vec::new(),
            bvh: Bvh::default(),
            fuzzy,
        };
        for (rank, arg) in arguments.iter().enumerate() {
            for kind in [ShapeKind::Vertex, ShapeKind::Edge, ShapeKind::Face] {
                for s in unique_subshapes(store, *arg, kind) {
                    if !ds.index.contains_key(&s.id) {
                        ds.push(store, s, kind, Some(rank))?;
                    }
                }
            }
        }
        // sub-shape lists need every shape indexed first
        for i in 0..ds.shapes.len() {
            let shape = ds.shapes[i].shape;
            let subs: Vec<usize> = match ds.shapes[i].kind {
                ShapeKind::Face => [ShapeKind::Edge, ShapeKind::Vertex]
                    .iter()
                    .flat_map(|k| unique_subshapes(store, shape, *k))
                    .filter_map(|s| ds.index_of(s.id))
                    .collect(),
                ShapeKind::Edge => unique_subshapes(store, shape, ShapeKind::Vertex)
                    .iter()
                    .filter_map(|s| ds.index_of(s.id))
                    .collect(),
                _ => Vec::new(),
            };
            ds.shapes[i].subs = subs;
        }
        for i in 0..ds.shapes.len() {
            match ds.shapes[i].kind {
                ShapeKind::Edge if !store.is_degenerate(ds.shapes[i].shape.id) => {
                    ds.paves.register(i);
                    let (a, b) = ds.edge_vertex_indices(store, i)?;
                    let range = store.edge(ds.shapes[i].shape.id)?.range;
                    ds.paves.add_pave(i, Pave::new(a, range.0, PaveSource::Endpoint));
                    ds.paves.add_pave(i, Pave::new(b, range.1, PaveSource::Endpoint));
                }
                ShapeKind::Face => {
                    ds.face_info.insert(i, FaceInfo::default());
                }
                _ => {}
            }
        }
        ds.bvh = Bvh::build(ds.shapes.iter().enumerate().map(|(i, s)| (i, s.bbox)).collect());
        Ok(ds)
    }

    fn push(&mut self, store: &ShapeStore, shape: Shape, kind: ShapeKind, rank: Option<usize>) -> Result<usize, BooleanError> {
        let bbox = match kind {
            ShapeKind::Vertex => {
                let v = store.vertex(shape.id)?;
                BoundingBox::from_points(&[v.point]).expanded(v.tolerance)
            }
            ShapeKind::Edge => {
                let e = store.edge(shape.id)?;
                let bb = if e.degenerate {
                    let (a, _) = store.edge_vertices(shape)?;
                    BoundingBox::from_points(&[store.vertex_point(a)?])
                } else {
                    store.curve(e.curve)?.bounding_box(e.range)
                };
                bb.expanded(e.tolerance)
            }
            _ => properties::bounding_box(store, shape)?,
        };
        let i = self.shapes.len();
        // faces keep the orientation they have inside their argument
        let shape = if kind == ShapeKind::Face { shape } else { Shape::new(shape.id) };
        self.shapes.push(ShapeInfo {
            shape,
            kind,
            rank,
            bbox: bbox.expanded(self.fuzzy),
            subs: Vec::new(),
        });
        self.index.insert(shape.id, i);
        self.parent.push(i);
        Ok(i)
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn info(&self, i: usize) -> &ShapeInfo {
        &self.shapes[i]
    }

    pub fn shape(&self, i: usize) -> Shape {
        self.shapes[i].shape
    }

    pub fn id(&self, i: usize) -> ShapeId {
        self.shapes[i].shape.id
    }

    pub fn rank(&self, i: usize) -> Option<usize> {
        self.shapes[i].rank
    }

    pub fn index_of(&self, id: ShapeId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn fuzzy(&self) -> f64 {
        self.fuzzy
    }

    pub fn indices_of(&self, kind: ShapeKind) -> impl Iterator<Item = usize> + '_ {
        (0..self.shapes.len()).filter(move |&i| self.shapes[i].kind == kind)
    }

    pub fn has_sub(&self, i: usize, sub: usize) -> bool {
        self.shapes[i].subs.contains(&sub)
    }

    /// Start and end vertex indices of an indexed edge.
    pub fn edge_vertex_indices(&self, store: &ShapeStore, edge: usize) -> Result<(usize, usize), BooleanError> {
        let (a, b) = store.edge_vertices(self.shape(edge))?;
        let missing = |id| BooleanError::InvariantViolation {
            stage: Stage::Init,
            detail: format!("edge vertex {id:?} is not indexed"),
        };
        Ok((
            self.index_of(a).ok_or_else(|| missing(a))?,
            self.index_of(b).ok_or_else(|| missing(b))?,
        ))
    }

    /// Overlapping pairs of indexed shapes with kinds `(k1, k2)`, ordered
    /// so the first index has kind `k1`.
    pub fn candidate_pairs(&self, k1: ShapeKind, k2: ShapeKind) -> Vec<(usize, usize)> {
        let mut out: Vec<(usize, usize)> = self
            .bvh
            .overlapping_pairs()
            .into_iter()
            .filter_map(|(a, b)| {
                let (ka, kb) = (self.shapes[a].kind, self.shapes[b].kind);
                if ka == k1 && kb == k2 {
                    Some((a, b))
                } else if ka == k2 && kb == k1 {
                    Some((b, a))
                } else {
                    None
                }
            })
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    // ─── Vertices ────────────────────────────────────────────────────────────

    /// Register a vertex created by the run.
    pub fn add_vertex(&mut self, store: &mut ShapeStore, point: Point3d, tolerance: f64) -> usize {
        let v = store.make_vertex(point, tolerance);
        let i = self.shapes.len();
        self.shapes.push(ShapeInfo {
            shape: v,
            kind: ShapeKind::Vertex,
            rank: None,
            bbox: BoundingBox::from_points(&[point]).expanded(tolerance),
            subs: Vec::new(),
        });
        self.index.insert(v.id, i);
        self.parent.push(i);
        i
    }

    /// Representative of a vertex's merge group.
    pub fn real_vertex(&self, mut v: usize) -> usize {
        while self.parent[v] != v {
            v = self.parent[v];
        }
        v
    }

    pub fn is_original(&self, v: usize) -> bool {
        self.shapes[v].rank.is_some()
    }

    /// Merge the groups of `a` and `b`. Argument vertices outrank new
    /// ones, then larger tolerance, then smaller index.
    pub fn union(&mut self, store: &ShapeStore, a: usize, b: usize) {
        let (ra, rb) = (self.real_vertex(a), self.real_vertex(b));
        if ra == rb {
            return;
        }
        let tol = |v: usize| store.tolerance(self.id(v)).unwrap_or(0.0);
        let a_wins = self
            .is_original(ra)
            .cmp(&self.is_original(rb))
            .then(tol(ra).total_cmp(&tol(rb)))
            .then(rb.cmp(&ra))
            .is_gt();
        if a_wins {
            self.parent[rb] = ra;
        } else {
            self.parent[ra] = rb;
        }
    }

    /// Current point and tolerance of a vertex record.
    pub fn vertex_data(&self, store: &ShapeStore, v: usize) -> Result<(Point3d, f64), BooleanError> {
        let data = store.vertex(self.id(v))?;
        Ok((data.point, data.tolerance))
    }

    /// Merge groups with more than one member, keyed by representative.
    pub fn vertex_groups(&self) -> BTreeMap<usize, Vec<usize>> {
        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for v in self.indices_of(ShapeKind::Vertex) {
            groups.entry(self.real_vertex(v)).or_default().push(v);
        }
        groups.retain(|_, members| members.len() > 1);
        groups
    }

    // ─── Pave Blocks ─────────────────────────────────────────────────────────

    pub fn add_block(&mut self, block: PaveBlock) -> usize {
        let i = self.blocks.len();
        match block.owner {
            BlockOwner::Edge(e) => self.edge_blocks.entry(e).or_default().push(i),
            BlockOwner::Section(s) => self.sections[s].blocks.push(i),
        }
        self.blocks.push(block);
        i
    }

    pub fn blocks_of_edge(&self, edge: usize) -> &[usize] {
        self.edge_blocks.get(&edge).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Curve and tolerance a block lies on.
    pub fn block_curve<'a>(&'a self, store: &'a ShapeStore, block: usize) -> Result<(&'a Curve, f64), BooleanError> {
        Ok(match self.blocks[block].owner {
            BlockOwner::Edge(e) => {
                let data = store.edge(self.id(e))?;
                (store.curve(data.curve)?, data.tolerance)
            }
            BlockOwner::Section(s) => (&self.sections[s].curve, self.sections[s].tolerance),
        })
    }

    /// Record that two blocks are the same piece of curve. Their ranges must
    /// overlap: each block's midpoint has to project inside the other.
    pub fn add_common_block(&mut self, store: &ShapeStore, b1: usize, b2: usize) -> Result<usize, BooleanError> {
        for (a, b) in [(b1, b2), (b2, b1)] {
            let (ca, ta) = self.block_curve(store, a)?;
            let (cb, tb) = self.block_curve(store, b)?;
            let mid = ca.evaluate(self.blocks[a].mid_param());
            let (_, dist) = cb.project_point(&mid, self.blocks[b].range());
            if dist > ta + tb + self.fuzzy {
                return Err(BooleanError::InvariantViolation {
                    stage: Stage::PaveBlocks,
                    detail: format!("pave blocks {a} and {b} do not overlap (gap {dist:.3e})"),
                });
            }
        }
        let cb = match (self.blocks[b1].common, self.blocks[b2].common) {
            (Some(c), None) | (None, Some(c)) => c,
            (Some(c1), Some(c2)) if c1 == c2 => c1,
            (Some(c1), Some(c2)) => {
                let absorbed = std::mem::take(&mut self.common_blocks[c2]);
                for &b in &absorbed.blocks {
                    self.blocks[b].common = Some(c1);
                }
                self.common_blocks[c1].blocks.extend(absorbed.blocks);
                self.common_blocks[c1].faces.extend(absorbed.faces);
                c1
            }
            (None, None) => {
                self.common_blocks.push(CommonBlock::default());
                self.common_blocks.len() - 1
            }
        };
        for b in [b1, b2] {
            if !self.common_blocks[cb].blocks.contains(&b) {
                self.common_blocks[cb].blocks.push(b);
            }
            self.blocks[b].common = Some(cb);
        }
        Ok(cb)
    }

    /// The block that stands for `block` in the output: the first member of
    /// its common block, else itself.
    pub fn real_block(&self, block: usize) -> usize {
        match self.blocks[block].common {
            Some(c) => self.common_blocks[c].blocks.iter().copied().min().unwrap_or(block),
            None => block,
        }
    }

    pub fn face_info_mut(&mut self, face: usize) -> &mut FaceInfo {
        self.face_info.entry(face).or_default()
    }

    /// Every block touching a face (boundary, inside, section), as real blocks.
    pub fn face_blocks(&self, face: usize) -> BTreeSet<usize> {
        self.face_info
            .get(&face)
            .map(|fi| {
                fi.on
                    .iter()
                    .chain(&fi.in_blocks)
                    .chain(&fi.section)
                    .map(|&b| self.real_block(b))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Face pairs recorded as same-domain.
    pub fn same_domain_pairs(&self) -> Vec<(usize, usize)> {
        self.interferences
            .iter()
            .filter_map(|i| match i {
                Interference::FaceFace {
                    f1,
                    f2,
                    same_domain: true,
                    ..
                } => Some((*f1, *f2)),
                _ => None,
            })
            .collect()
    }
}
