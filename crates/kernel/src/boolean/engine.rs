//! The Boolean driver: intersect, split, classify, select, rebuild.
//!
//! Every run works on a clone of the caller's store. The clone replaces the
//! store only when the run succeeds, so a failed or cancelled run leaves no
//! trace behind.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, instrument, warn};

use crate::topology::{Explorer, Shape, ShapeId, ShapeKind, ShapeStore};

use super::checker;
use super::classify::{FaceState, classify_pieces};
use super::ds::{DataStructure, EdgeEdgeKind, EdgeFaceKind, Interference};
use super::face_builder::{FaceImages, build_faces};
use super::filler::PaveFiller;
use super::history::History;
use super::options::BooleanOptions;
use super::report::{AlertCode, BooleanError, Report, Stage};
use super::solid_builder::{build_shells, build_solids};
use super::split::{SplitImages, split_edges};

/// Boolean operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanOp {
    /// Union of object and tool.
    Fuse,
    /// Object minus tool.
    Cut,
    /// Tool minus object.
    Cut21,
    /// Intersection of object and tool.
    Common,
    /// Edges and vertices where the arguments meet.
    Section,
}

/// Output of a successful run.
#[derive(Debug, Clone)]
pub struct BooleanResult {
    /// Always a compound: solids, plus bare shells that failed to close.
    /// Edges and vertices for a section.
    pub shape: Shape,
    pub history: History,
    pub report: Report,
}

impl BooleanResult {
    /// Whether the result holds no vertex at all.
    pub fn is_empty(&self, store: &ShapeStore) -> bool {
        is_void(store, self.shape)
    }
}

fn is_void(store: &ShapeStore, shape: Shape) -> bool {
    Explorer::new(store, shape, ShapeKind::Vertex).next().is_none()
}

// ─── Selection ───────────────────────────────────────────────────────────────

/// Which states of a piece of argument `rank` survive `op`, and whether the
/// kept piece is flipped.
fn keeps(op: BooleanOp, rank: usize, state: FaceState) -> Option<bool> {
    use FaceState::*;
    let object = rank == 0;
    let kept = match (op, object) {
        (BooleanOp::Fuse, true) => matches!(state, Out | OnSame),
        (BooleanOp::Fuse, false) => state == Out,
        (BooleanOp::Common, true) => matches!(state, In | OnSame),
        (BooleanOp::Common, false) => state == In,
        (BooleanOp::Cut, true) | (BooleanOp::Cut21, false) => matches!(state, Out | OnOpposite),
        (BooleanOp::Cut, false) | (BooleanOp::Cut21, true) => return (state == In).then_some(true),
        (BooleanOp::Section, _) => false,
    };
    kept.then_some(false)
}

fn select_faces(
    ds: &DataStructure,
    faces: &FaceImages,
    states: &BTreeMap<ShapeId, FaceState>,
    op: BooleanOp,
) -> Vec<Shape> {
    let mut out = Vec::new();
    for (&f, pieces) in &faces.pieces {
        let Some(rank) = ds.rank(f) else { continue };
        let orientation = ds.shape(f).orientation;
        for &piece in pieces {
            let Some(&state) = states.get(&piece) else { continue };
            if let Some(flip) = keeps(op, rank, state) {
                let occurrence = Shape::oriented(piece, orientation);
                out.push(if flip { occurrence.reversed() } else { occurrence });
            }
        }
    }
    debug!(selected = out.len(), ?op, "selected faces");
    out
}

// ─── Section ─────────────────────────────────────────────────────────────────

fn block_edge(ds: &DataStructure, block: usize) -> Option<ShapeId> {
    ds.blocks[ds.real_block(block)].image.map(|im| im.edge)
}

/// Section edges, shared edge pieces, edge pieces lying in the other
/// argument's faces, and isolated contact vertices.
fn section_shapes(store: &ShapeStore, ds: &DataStructure, split: &SplitImages) -> Result<Vec<Shape>, BooleanError> {
    let mut edges = BTreeSet::new();
    for s in &ds.sections {
        edges.extend(s.blocks.iter().filter_map(|&b| block_edge(ds, b)));
    }
    for cb in &ds.common_blocks {
        if let Some(&b) = cb.blocks.first() {
            edges.extend(block_edge(ds, b));
        }
    }
    for fi in ds.face_info.values() {
        edges.extend(fi.in_blocks.iter().filter_map(|&b| block_edge(ds, b)));
    }

    let mut on_edges = BTreeSet::new();
    for &e in &edges {
        let (a, b) = store.edge_vertices(Shape::new(e))?;
        on_edges.insert(a);
        on_edges.insert(b);
    }
    let mut vertices = BTreeSet::new();
    for i in &ds.interferences {
        let contact = match *i {
            Interference::VertexVertex { v1, .. } => v1,
            Interference::VertexEdge { vertex, .. } | Interference::VertexFace { vertex, .. } => vertex,
            Interference::EdgeEdge { kind: EdgeEdgeKind::Point { vertex, .. }, .. } => vertex,
            Interference::EdgeFace { kind: EdgeFaceKind::Point { vertex, .. }, .. } => vertex,
            _ => continue,
        };
        let image = split.vertex(ds, contact);
        if !on_edges.contains(&image) {
            vertices.insert(image);
        }
    }
    debug!(edges = edges.len(), vertices = vertices.len(), "section shapes");
    Ok(edges.into_iter().chain(vertices).map(Shape::new).collect())
}

// ─── Driver ──────────────────────────────────────────────────────────────────

/// Run `op` on `object` and `tool`. On success the store holds the result
/// and every intermediate shape; on failure it is unchanged.
#[instrument(skip(store, options), fields(parallel = options.parallel))]
pub fn boolean_op(
    store: &mut ShapeStore,
    object: Shape,
    tool: Shape,
    op: BooleanOp,
    options: &BooleanOptions,
) -> Result<BooleanResult, BooleanError> {
    options.validate()?;
    let mut work = store.clone();
    let mut report = Report::new();

    checker::validate_arguments(&work, &[object, tool], op)?;
    let tool = if object.id == tool.id {
        let copy = work.deep_copy(tool)?;
        report.info(
            AlertCode::IdenticalArguments,
            Stage::Init,
            vec![object.id],
            "object and tool are the same shape; tool replaced by a copy",
        );
        copy
    } else {
        tool
    };
    let arguments = [object, tool];

    let mut filler = PaveFiller::new(&mut work, &arguments, options)?;
    filler.perform()?;
    let PaveFiller { mut ds, report: fill_report, faces: domains, .. } = filler;
    report.merge(fill_report);

    let split = split_edges(&mut work, &mut ds, options)?;
    options.check_cancel(Stage::SplitEdges)?;

    let (result, face_images) = if op == BooleanOp::Section {
        let shapes = section_shapes(&work, &ds, &split)?;
        (work.make_compound(shapes)?, None)
    } else {
        let faces = build_faces(&mut work, &ds, &split, &domains, options, &mut report)?;
        options.check_cancel(Stage::BuildFaces)?;
        if !faces.same_domain.is_empty() {
            report.info(
                AlertCode::SameDomainResolved,
                Stage::BuildFaces,
                faces.same_domain.keys().copied().collect(),
                format!("{} coincident face piece pairs", faces.same_domain.len() / 2),
            );
        }

        let states = classify_pieces(&work, &ds, &faces, options, &mut report)?;
        let selected = select_faces(&ds, &faces, &states, op);
        options.check_cancel(Stage::Select)?;

        let shells = build_shells(&work, &selected)?;
        options.check_cancel(Stage::BuildShells)?;
        let solids = build_solids(&mut work, shells, options, &mut report)?;
        options.check_cancel(Stage::BuildSolids)?;
        (work.make_compound(solids)?, Some(faces))
    };

    let empty = is_void(&work, result);
    if empty {
        if op == BooleanOp::Common && !ds.interferences.is_empty() {
            warn!("arguments only touch");
            report.warning(
                AlertCode::OperandsTouchOnly,
                Stage::Select,
                vec![object.id, tool.id],
                "arguments share boundary but no volume",
            );
        } else {
            report.info(AlertCode::EmptyResult, Stage::Select, vec![], format!("{op:?} result is empty"));
        }
    }

    if options.check_result && !empty && op != BooleanOp::Section {
        checker::check_result(&work, result, &mut report);
        options.check_cancel(Stage::Check)?;
    }

    let history = History::build(&work, &ds, &split, face_images.as_ref(), result);
    info!(
        ?op,
        alerts = report.len(),
        faces = Explorer::new(&work, result, ShapeKind::Face).count(),
        "boolean finished"
    );
    *store = work;
    Ok(BooleanResult { shape: result, history, report })
}
