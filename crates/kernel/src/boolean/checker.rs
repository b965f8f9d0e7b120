//! Checks around a Boolean run: argument analysis before filling, result
//! validity after building, and the unary self-interference check.

use tracing::{info, instrument, warn};

use crate::topology::explorer::check_references;
use crate::topology::{Explorer, Shape, ShapeId, ShapeKind, ShapeStore};
use crate::validation::{ShapeValidator, ValidationConfig};

use super::ds::{DataStructure, EdgeEdgeKind, EdgeFaceKind, Interference};
use super::engine::BooleanOp;
use super::filler::PaveFiller;
use super::options::BooleanOptions;
use super::report::{AlertCode, BooleanError, Report, Stage};

/// Reject arguments no Boolean run can use: missing records, dangling
/// children, and arguments with nothing to operate on.
pub fn validate_arguments(store: &ShapeStore, arguments: &[Shape], op: BooleanOp) -> Result<(), BooleanError> {
    for (argument, shape) in arguments.iter().enumerate() {
        if !store.contains(shape.id) {
            return Err(BooleanError::NullShape { argument, id: shape.id });
        }
        if let Some(&id) = check_references(store, *shape).first() {
            return Err(BooleanError::NullShape { argument, id });
        }
        let needed = if op == BooleanOp::Section { ShapeKind::Face } else { ShapeKind::Solid };
        if Explorer::new(store, *shape, needed).next().is_none() {
            return Err(BooleanError::InvalidArgument(format!(
                "argument {argument} holds no {needed:?} for {op:?}"
            )));
        }
    }
    Ok(())
}

/// Validate a result and turn every finding into a `ResultInvalid` warning.
/// Shells are allowed to be open only when the result holds no solid.
#[instrument(skip(store, report))]
pub fn check_result(store: &ShapeStore, result: Shape, report: &mut Report) {
    let has_solid = Explorer::new(store, result, ShapeKind::Solid).next().is_some();
    let config = ValidationConfig {
        require_closed_shells: has_solid,
        ..ValidationConfig::topology()
    };
    let validation = ShapeValidator::new(config).validate(store, result);
    for e in &validation.errors {
        warn!(code = %e.code, "result check");
        report.warning(AlertCode::ResultInvalid, Stage::Check, vec![e.shape], e.to_string());
    }
    info!(valid = validation.valid, errors = validation.error_count(), "checked result");
}

fn interference_shapes(ds: &DataStructure, i: &Interference) -> Vec<ShapeId> {
    match *i {
        Interference::VertexVertex { v1, v2 } => vec![ds.id(v1), ds.id(v2)],
        Interference::VertexEdge { vertex, edge, .. } => vec![ds.id(vertex), ds.id(edge)],
        Interference::VertexFace { vertex, face } => vec![ds.id(vertex), ds.id(face)],
        Interference::EdgeEdge { e1, e2, .. } => vec![ds.id(e1), ds.id(e2)],
        Interference::EdgeFace { edge, face, .. } => vec![ds.id(edge), ds.id(face)],
        Interference::FaceFace { f1, f2, .. } => vec![ds.id(f1), ds.id(f2)],
    }
}

fn describe(i: &Interference) -> &'static str {
    match i {
        Interference::VertexVertex { .. } => "vertices coincide",
        Interference::VertexEdge { .. } => "vertex lies on a non-adjacent edge",
        Interference::VertexFace { .. } => "vertex lies inside a non-adjacent face",
        Interference::EdgeEdge { kind: EdgeEdgeKind::Point { .. }, .. } => "edges cross",
        Interference::EdgeEdge { kind: EdgeEdgeKind::Overlap { .. }, .. } => "edges overlap",
        Interference::EdgeFace { kind: EdgeFaceKind::Point { .. }, .. } => "edge pierces a face",
        Interference::EdgeFace { kind: EdgeFaceKind::Overlap { .. }, .. } => "edge runs inside a face",
        Interference::FaceFace { .. } => "faces intersect",
    }
}

/// Contacts between sub-shapes of `shape` that share no sub-shape. The
/// caller's store is left untouched.
#[instrument(skip(store, options))]
pub fn check_self_interference(
    store: &ShapeStore,
    shape: Shape,
    options: &BooleanOptions,
) -> Result<Report, BooleanError> {
    options.validate()?;
    if !store.contains(shape.id) {
        return Err(BooleanError::NullShape { argument: 0, id: shape.id });
    }
    let mut work = store.clone();
    let mut filler = PaveFiller::self_check(&mut work, shape, options)?;
    filler.perform_contacts()?;
    let mut report = std::mem::take(&mut filler.report);
    for i in &filler.ds.interferences {
        report.warning(
            AlertCode::SelfInterference,
            Stage::Check,
            interference_shapes(&filler.ds, i),
            describe(i),
        );
    }
    info!(contacts = filler.ds.interferences.len(), "self-interference check");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::point::Point3d;
    use crate::topology::primitives::{make_box, make_sphere};

    #[test]
    fn test_clean_primitives_do_not_self_interfere() {
        let mut store = ShapeStore::new();
        let b = make_box(&mut store, Point3d::ORIGIN, Point3d::new(1.0, 2.0, 3.0)).unwrap();
        let s = make_sphere(&mut store, Point3d::new(5.0, 0.0, 0.0), 1.0).unwrap();
        let opts = BooleanOptions::sequential();
        for shape in [b, s] {
            let report = check_self_interference(&store, shape, &opts).unwrap();
            assert!(!report.has_code(AlertCode::SelfInterference), "{report}");
        }
    }

    #[test]
    fn test_overlapping_boxes_in_one_compound_interfere() {
        let mut store = ShapeStore::new();
        let a = make_box(&mut store, Point3d::ORIGIN, Point3d::new(2.0, 2.0, 2.0)).unwrap();
        let b = make_box(&mut store, Point3d::new(1.0, 1.0, 1.0), Point3d::new(3.0, 3.0, 3.0)).unwrap();
        let both = store.make_compound(vec![a, b]).unwrap();
        let before = store.len();
        let report = check_self_interference(&store, both, &BooleanOptions::sequential()).unwrap();
        assert!(report.has_code(AlertCode::SelfInterference));
        assert_eq!(store.len(), before);
    }

    #[test]
    fn test_argument_validation() {
        let mut store = ShapeStore::new();
        let b = make_box(&mut store, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0)).unwrap();
        let face = Explorer::new(&store, b, ShapeKind::Face).next().unwrap();
        assert!(validate_arguments(&store, &[b, b], BooleanOp::Fuse).is_ok());
        assert!(matches!(
            validate_arguments(&store, &[b, face], BooleanOp::Cut),
            Err(BooleanError::InvalidArgument(_))
        ));
        assert!(validate_arguments(&store, &[b, face], BooleanOp::Section).is_ok());

        let mut broken = store.clone();
        broken.remove(face.id);
        assert!(matches!(
            validate_arguments(&broken, &[b, b], BooleanOp::Fuse),
            Err(BooleanError::NullShape { argument: 0, .. })
        ));
    }

    #[test]
    fn test_open_result_is_reported() {
        let mut store = ShapeStore::new();
        let b = make_box(&mut store, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0)).unwrap();
        let mut faces: Vec<Shape> = Explorer::new(&store, b, ShapeKind::Face).collect();
        faces.pop();
        let shell = store.make_shell(faces).unwrap();
        let solid = store.make_solid(vec![shell]).unwrap();
        let mut report = Report::new();
        check_result(&store, solid, &mut report);
        assert!(report.has_code(AlertCode::ResultInvalid));

        let mut report = Report::new();
        check_result(&store, b, &mut report);
        assert!(report.is_empty());
    }
}
