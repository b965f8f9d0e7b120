//! Shared types for shape validation.
//!
//! Defines error codes, severity levels, findings, metrics, and the
//! unified `ValidationReport`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::topology::{ShapeId, ShapeKind};

/// Which validation levels to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValidationLevel {
    /// References, wire closure, edge use in shells.
    Topology,
    /// Vertex-on-curve, degenerate edges and faces, tolerances, volume sign.
    Geometry,
}

/// Severity of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Must be fixed for a valid shape.
    Error,
    /// Informational; may be intentional.
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    // --- Topology ---
    /// A child reference points at no record.
    DanglingReference,
    /// Consecutive edges of a wire do not share a vertex.
    WireNotClosed,
    /// Edge used by only one face of a shell.
    FreeEdge,
    /// Edge used by more than two faces of a shell.
    InvalidMultiConnexity,
    /// Edge used twice in the same direction by a shell.
    BadOrientationOfFaces,
    /// Shell boundary is not closed.
    ShellNotClosed,

    // --- Geometry ---
    /// Vertex does not lie on its edge's curve end.
    InvalidPointOnCurve,
    /// Edge has zero or near-zero length.
    ZeroLengthEdge,
    /// Face has zero or near-zero area.
    ZeroAreaFace,
    /// Solid has negative volume (inverted faces).
    NegativeVolume,
    /// Vertex tolerance below the tolerance of an edge using it.
    ToleranceHierarchyViolation,
    /// A tolerance value exceeds the configured maximum.
    ExcessiveTolerance,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A single validation finding (error or warning).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    pub kind: ShapeKind,
    pub shape: ShapeId,
    /// Containing shape (e.g. the face owning a wire), if applicable.
    pub parent: Option<ShapeId>,
    pub code: ErrorCode,
    pub message: String,
    pub severity: Severity,
    /// Measured value (e.g. the gap for a vertex off its curve).
    pub numeric_value: Option<f64>,
    /// The threshold that was exceeded.
    pub tolerance: Option<f64>,
}

impl ValidationError {
    pub fn new(kind: ShapeKind, shape: ShapeId, code: ErrorCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            shape,
            parent: None,
            code,
            message: message.into(),
            severity,
            numeric_value: None,
            tolerance: None,
        }
    }

    pub fn in_parent(mut self, parent: ShapeId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn measured(mut self, value: f64, tolerance: f64) -> Self {
        self.numeric_value = Some(value);
        self.tolerance = Some(tolerance);
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sev = match self.severity {
            Severity::Error => "ERROR",
            Severity::Warning => "WARN",
        };
        write!(f, "[{}] {:?} {:?}: {} (code: {})", sev, self.kind, self.shape, self.message, self.code)?;
        if let Some(val) = self.numeric_value {
            write!(f, " value={val:.2e}")?;
        }
        if let Some(tol) = self.tolerance {
            write!(f, " tol={tol:.2e}")?;
        }
        Ok(())
    }
}

/// Counts of unique sub-shapes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCounts {
    pub vertices: usize,
    pub edges: usize,
    pub wires: usize,
    pub faces: usize,
    pub shells: usize,
    pub solids: usize,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ToleranceStats {
    pub max_vertex_tolerance: f64,
    pub max_edge_tolerance: f64,
    /// Largest distance between a vertex and its edge's curve end.
    pub max_vertex_gap: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationMetrics {
    pub entity_counts: EntityCounts,
    pub tolerance_stats: ToleranceStats,
}

/// The unified report produced by `ShapeValidator`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Whether the shape passed every check at the requested level.
    pub valid: bool,
    pub level_completed: ValidationLevel,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationError>,
    pub metrics: ValidationMetrics,
}

impl ValidationReport {
    pub fn errors_of(&self, code: ErrorCode) -> Vec<&ValidationError> {
        self.errors.iter().filter(|e| e.code == code).collect()
    }

    pub fn no_errors_of(&self, code: ErrorCode) -> bool {
        !self.errors.iter().any(|e| e.code == code)
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ValidationReport: valid={}, level={:?}, errors={}, warnings={}",
            self.valid, self.level_completed, self.errors.len(), self.warnings.len())?;
        for e in &self.errors {
            writeln!(f, "  {e}")?;
        }
        for w in &self.warnings {
            writeln!(f, "  {w}")?;
        }
        Ok(())
    }
}
