pub mod types;
pub mod config;

pub use types::*;
pub use config::*;

use std::collections::BTreeMap;

use tracing::{info, instrument};

use crate::topology::explorer::{check_references, unique_subshapes};
use crate::topology::properties::{face_area, solid_volume};
use crate::topology::{Explorer, Orientation, Shape, ShapeId, ShapeKind, ShapeStore};

/// Shape validation engine.
///
/// - **Topology**: dangling references, wire closure, edge use in shells
///   (free, non-manifold, same-direction).
/// - **Geometry**: vertex-on-curve, zero-length edges, zero-area faces,
///   tolerance hierarchy and limits, solid volume sign.
pub struct ShapeValidator {
    config: ValidationConfig,
}

impl ShapeValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    #[instrument(skip(self, store))]
    pub fn validate(&self, store: &ShapeStore, shape: Shape) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut metrics = ValidationMetrics {
            entity_counts: compute_entity_counts(store, shape),
            ..ValidationMetrics::default()
        };

        let root_kind = store.kind(shape.id).unwrap_or(ShapeKind::Compound);
        for id in check_references(store, shape) {
            errors.push(ValidationError::new(
                root_kind,
                id,
                ErrorCode::DanglingReference,
                Severity::Error,
                "referenced shape is not in the store",
            ).in_parent(shape.id));
        }
        self.check_wires(store, shape, &mut errors);
        self.check_shells(store, shape, &mut errors, &mut warnings);
        let mut level_completed = ValidationLevel::Topology;

        if self.config.level >= ValidationLevel::Geometry {
            self.check_geometry(store, shape, &mut errors, &mut warnings, &mut metrics);
            level_completed = ValidationLevel::Geometry;
        }

        let valid = errors.is_empty();
        info!(
            valid,
            level = ?level_completed,
            error_count = errors.len(),
            warning_count = warnings.len(),
            "validation complete"
        );
        ValidationReport {
            valid,
            level_completed,
            errors,
            warnings,
            metrics,
        }
    }

    /// Consecutive edges of every wire must meet, and the last must end
    /// where the first starts.
    fn check_wires(&self, store: &ShapeStore, root: Shape, errors: &mut Vec<ValidationError>) {
        for wire in unique_subshapes(store, root, ShapeKind::Wire) {
            let ends: Vec<(ShapeId, ShapeId)> = Explorer::new(store, Shape::new(wire.id), ShapeKind::Edge)
                .filter_map(|e| store.edge_vertices(e).ok())
                .collect();
            let n = ends.len();
            let open = n == 0 || (0..n).any(|i| ends[i].1 != ends[(i + 1) % n].0);
            if open {
                errors.push(ValidationError::new(
                    ShapeKind::Wire,
                    wire.id,
                    ErrorCode::WireNotClosed,
                    Severity::Error,
                    format!("wire of {n} edge(s) does not close"),
                ));
            }
        }
    }

    fn check_shells(
        &self,
        store: &ShapeStore,
        root: Shape,
        errors: &mut Vec<ValidationError>,
        warnings: &mut Vec<ValidationError>,
    ) {
        for shell in unique_subshapes(store, root, ShapeKind::Shell) {
            let mut uses: BTreeMap<ShapeId, (usize, usize)> = BTreeMap::new();
            for e in Explorer::new(store, Shape::new(shell.id), ShapeKind::Edge) {
                if store.is_degenerate(e.id) {
                    continue;
                }
                let entry = uses.entry(e.id).or_default();
                match e.orientation {
                    Orientation::Reversed => entry.1 += 1,
                    _ => entry.0 += 1,
                }
            }
            let mut free = 0;
            for (&edge, &(fwd, rev)) in &uses {
                let finding = match fwd + rev {
                    1 => {
                        free += 1;
                        let severity = if self.config.require_closed_shells { Severity::Error } else { Severity::Warning };
                        Some((ErrorCode::FreeEdge, severity, "edge used by one face only".to_string()))
                    }
                    2 if fwd == 1 => None,
                    2 => Some((
                        ErrorCode::BadOrientationOfFaces,
                        Severity::Error,
                        "edge used twice in the same direction".to_string(),
                    )),
                    n => Some((ErrorCode::InvalidMultiConnexity, Severity::Error, format!("edge used by {n} faces"))),
                };
                if let Some((code, severity, message)) = finding {
                    let err = ValidationError::new(ShapeKind::Edge, edge, code, severity, message).in_parent(shell.id);
                    match severity {
                        Severity::Error => errors.push(err),
                        Severity::Warning => warnings.push(err),
                    }
                }
            }
            if free > 0 && self.config.require_closed_shells {
                errors.push(ValidationError::new(
                    ShapeKind::Shell,
                    shell.id,
                    ErrorCode::ShellNotClosed,
                    Severity::Error,
                    format!("{free} free edge(s)"),
                ));
            }
        }
    }

    fn check_geometry(
        &self,
        store: &ShapeStore,
        root: Shape,
        errors: &mut Vec<ValidationError>,
        warnings: &mut Vec<ValidationError>,
        metrics: &mut ValidationMetrics,
    ) {
        let limits = self.config.tolerance;
        for v in unique_subshapes(store, root, ShapeKind::Vertex) {
            let Ok(data) = store.vertex(v.id) else { continue };
            metrics.tolerance_stats.max_vertex_tolerance = metrics.tolerance_stats.max_vertex_tolerance.max(data.tolerance);
            if data.tolerance > limits.max_vertex_tol {
                warnings.push(
                    ValidationError::new(ShapeKind::Vertex, v.id, ErrorCode::ExcessiveTolerance, Severity::Warning, "vertex tolerance above limit")
                        .measured(data.tolerance, limits.max_vertex_tol),
                );
            }
        }

        for e in unique_subshapes(store, root, ShapeKind::Edge) {
            let Ok(data) = store.edge(e.id) else { continue };
            metrics.tolerance_stats.max_edge_tolerance = metrics.tolerance_stats.max_edge_tolerance.max(data.tolerance);
            if data.tolerance > limits.max_edge_tol {
                warnings.push(
                    ValidationError::new(ShapeKind::Edge, e.id, ErrorCode::ExcessiveTolerance, Severity::Warning, "edge tolerance above limit")
                        .measured(data.tolerance, limits.max_edge_tol),
                );
            }
            if data.degenerate {
                continue;
            }
            let (Ok(curve), Ok((first, last))) = (store.curve(data.curve), store.edge_vertices(Shape::new(e.id))) else {
                continue;
            };
            for (vertex, t) in [(first, data.range.0), (last, data.range.1)] {
                let Ok(v) = store.vertex(vertex) else { continue };
                if v.tolerance < data.tolerance {
                    warnings.push(
                        ValidationError::new(
                            ShapeKind::Vertex,
                            vertex,
                            ErrorCode::ToleranceHierarchyViolation,
                            Severity::Warning,
                            "vertex tolerance below its edge's",
                        )
                        .in_parent(e.id)
                        .measured(v.tolerance, data.tolerance),
                    );
                }
                let gap = curve.evaluate(t).distance_to(&v.point);
                metrics.tolerance_stats.max_vertex_gap = metrics.tolerance_stats.max_vertex_gap.max(gap);
                let allowed = v.tolerance + data.tolerance + limits.resolution;
                if gap > allowed {
                    errors.push(
                        ValidationError::new(
                            ShapeKind::Vertex,
                            vertex,
                            ErrorCode::InvalidPointOnCurve,
                            Severity::Error,
                            format!("vertex off its curve end (gap={gap:.2e})"),
                        )
                        .in_parent(e.id)
                        .measured(gap, allowed),
                    );
                }
            }
            const SAMPLES: usize = 8;
            let (t0, t1) = data.range;
            let length: f64 = (0..SAMPLES)
                .map(|i| {
                    let a = t0 + (t1 - t0) * i as f64 / SAMPLES as f64;
                    let b = t0 + (t1 - t0) * (i + 1) as f64 / SAMPLES as f64;
                    curve.evaluate(a).distance_to(&curve.evaluate(b))
                })
                .sum();
            if length < limits.resolution {
                errors.push(
                    ValidationError::new(ShapeKind::Edge, e.id, ErrorCode::ZeroLengthEdge, Severity::Error, "edge has no length")
                        .measured(length, limits.resolution),
                );
            }
        }

        for f in unique_subshapes(store, root, ShapeKind::Face) {
            let Ok(area) = face_area(store, f.id) else { continue };
            if area < limits.resolution * limits.resolution {
                errors.push(
                    ValidationError::new(ShapeKind::Face, f.id, ErrorCode::ZeroAreaFace, Severity::Error, "face has no area")
                        .measured(area, limits.resolution * limits.resolution),
                );
            }
        }

        for s in unique_subshapes(store, root, ShapeKind::Solid) {
            let Ok(volume) = solid_volume(store, s) else { continue };
            if volume < 0.0 {
                errors.push(
                    ValidationError::new(ShapeKind::Solid, s.id, ErrorCode::NegativeVolume, Severity::Error, "solid is inside out")
                        .measured(volume, 0.0),
                );
            }
        }
    }
}

/// Count unique sub-shapes of every kind.
fn compute_entity_counts(store: &ShapeStore, root: Shape) -> EntityCounts {
    let count = |kind| unique_subshapes(store, root, kind).len();
    EntityCounts {
        vertices: count(ShapeKind::Vertex),
        edges: count(ShapeKind::Edge),
        wires: count(ShapeKind::Wire),
        faces: count(ShapeKind::Face),
        shells: count(ShapeKind::Shell),
        solids: count(ShapeKind::Solid),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::point::Point3d;
    use crate::geometry::vector::Vec3;
    use crate::topology::primitives::{make_box, make_cylinder, make_sphere};

    fn faces_of(store: &ShapeStore, shape: Shape) -> Vec<Shape> {
        Explorer::new(store, shape, ShapeKind::Face).collect()
    }

    #[test]
    fn test_box_passes_validation() {
        let mut store = ShapeStore::new();
        let b = make_box(&mut store, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0)).unwrap();
        let report = ShapeValidator::new(ValidationConfig::default()).validate(&store, b);
        assert!(report.valid, "box should validate: {report}");
        assert_eq!(report.metrics.entity_counts.vertices, 8);
        assert_eq!(report.metrics.entity_counts.edges, 12);
        assert_eq!(report.metrics.entity_counts.faces, 6);
        assert_eq!(report.metrics.entity_counts.shells, 1);
        assert_eq!(report.metrics.entity_counts.solids, 1);
    }

    #[test]
    fn test_curved_primitives_pass_validation() {
        let mut store = ShapeStore::new();
        let s = make_sphere(&mut store, Point3d::ORIGIN, 1.0).unwrap();
        let c = make_cylinder(&mut store, Point3d::ORIGIN, Vec3::Z, 1.0, 2.0).unwrap();
        let validator = ShapeValidator::new(ValidationConfig::default());
        for shape in [s, c] {
            let report = validator.validate(&store, shape);
            assert!(report.valid, "primitive should validate: {report}");
        }
    }

    #[test]
    fn test_missing_face_leaves_free_edges() {
        let mut store = ShapeStore::new();
        let b = make_box(&mut store, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0)).unwrap();
        let mut faces = faces_of(&store, b);
        faces.pop();
        let shell = store.make_shell(faces).unwrap();
        let report = ShapeValidator::new(ValidationConfig::topology()).validate(&store, shell);
        assert!(!report.valid);
        assert_eq!(report.errors_of(ErrorCode::FreeEdge).len(), 4);
        assert!(!report.no_errors_of(ErrorCode::ShellNotClosed));

        let lenient = ValidationConfig {
            require_closed_shells: false,
            ..ValidationConfig::topology()
        };
        let report = ShapeValidator::new(lenient).validate(&store, shell);
        assert!(report.valid);
        assert_eq!(report.warning_count(), 4);
    }

    #[test]
    fn test_flipped_face_breaks_orientation() {
        let mut store = ShapeStore::new();
        let b = make_box(&mut store, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0)).unwrap();
        let mut faces = faces_of(&store, b);
        faces[0] = faces[0].reversed();
        let shell = store.make_shell(faces).unwrap();
        let report = ShapeValidator::new(ValidationConfig::topology()).validate(&store, shell);
        assert_eq!(report.errors_of(ErrorCode::BadOrientationOfFaces).len(), 4);
    }

    #[test]
    fn test_inside_out_solid_has_negative_volume() {
        let mut store = ShapeStore::new();
        let b = make_box(&mut store, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0)).unwrap();
        let faces: Vec<Shape> = faces_of(&store, b).into_iter().map(Shape::reversed).collect();
        let shell = store.make_shell(faces).unwrap();
        let solid = store.make_solid(vec![shell]).unwrap();
        let report = ShapeValidator::new(ValidationConfig::default()).validate(&store, solid);
        assert!(!report.no_errors_of(ErrorCode::NegativeVolume));
        assert!(report.no_errors_of(ErrorCode::BadOrientationOfFaces));
    }

    #[test]
    fn test_removed_edge_is_a_dangling_reference() {
        let mut store = ShapeStore::new();
        let b = make_box(&mut store, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0)).unwrap();
        let edge = Explorer::new(&store, b, ShapeKind::Edge).next().unwrap();
        store.remove(edge.id);
        let report = ShapeValidator::new(ValidationConfig::topology()).validate(&store, b);
        assert_eq!(report.errors_of(ErrorCode::DanglingReference).len(), 1);
        assert!(!report.no_errors_of(ErrorCode::WireNotClosed));
    }
}
