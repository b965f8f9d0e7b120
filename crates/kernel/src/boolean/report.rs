use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::topology::{ShapeId, TopologyError};

/// Pipeline stage, used to locate alerts and failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Init,
    VertexVertex,
    VertexEdge,
    EdgeEdge,
    VertexFace,
    EdgeFace,
    PaveBlocks,
    FaceFace,
    SplitEdges,
    BuildFaces,
    BuildShells,
    BuildSolids,
    Select,
    Check,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    /// One output piece is missing; the rest of the result stands.
    LocalFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertCode {
    DanglingReference,
    IntersectionNotConverged,
    MarchingNotConverged,
    SameDomainResolved,
    MicroEdgeDropped,
    MicroFaceDropped,
    OrphanHole,
    OpenShell,
    OrphanVoid,
    OperandsTouchOnly,
    EmptyResult,
    IdenticalArguments,
    ClassificationAmbiguous,
    ResultInvalid,
    SelfInterference,
}

impl fmt::Display for AlertCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One non-fatal finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub severity: Severity,
    pub code: AlertCode,
    pub stage: Stage,
    pub shapes: Vec<ShapeId>,
    pub message: String,
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sev = match self.severity {
            Severity::Info => "INFO",
            Severity::Warning => "WARN",
            Severity::LocalFailure => "FAIL",
        };
        write!(f, "[{sev}] {} at {}: {}", self.code, self.stage, self.message)?;
        if !self.shapes.is_empty() {
            write!(f, " ({} shapes)", self.shapes.len())?;
        }
        Ok(())
    }
}

/// Diagnostics returned next to every result, successful or not.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    alerts: Vec<Alert>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, alert: Alert) {
        self.alerts.push(alert);
    }

    fn push(&mut self, severity: Severity, code: AlertCode, stage: Stage, shapes: Vec<ShapeId>, message: String) {
        self.add(Alert {
            severity,
            code,
            stage,
            shapes,
            message,
        });
    }

    pub fn info(&mut self, code: AlertCode, stage: Stage, shapes: Vec<ShapeId>, message: impl Into<String>) {
        self.push(Severity::Info, code, stage, shapes, message.into());
    }

    pub fn warning(&mut self, code: AlertCode, stage: Stage, shapes: Vec<ShapeId>, message: impl Into<String>) {
        self.push(Severity::Warning, code, stage, shapes, message.into());
    }

    pub fn local_failure(&mut self, code: AlertCode, stage: Stage, shapes: Vec<ShapeId>, message: impl Into<String>) {
        self.push(Severity::LocalFailure, code, stage, shapes, message.into());
    }

    pub fn merge(&mut self, other: Report) {
        self.alerts.extend(other.alerts);
    }

    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn has_code(&self, code: AlertCode) -> bool {
        self.alerts.iter().any(|a| a.code == code)
    }

    pub fn of_severity(&self, severity: Severity) -> impl Iterator<Item = &Alert> {
        self.alerts.iter().filter(move |a| a.severity == severity)
    }

    /// Anything above `Info`.
    pub fn has_warnings(&self) -> bool {
        self.alerts.iter().any(|a| a.severity > Severity::Info)
    }

    pub fn has_local_failures(&self) -> bool {
        self.alerts.iter().any(|a| a.severity == Severity::LocalFailure)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Report: {} alerts", self.alerts.len())?;
        for a in &self.alerts {
            writeln!(f, "  {a}")?;
        }
        Ok(())
    }
}

/// Failures that leave no result at all.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BooleanError {
    #[error("argument {argument} refers to a shape that is not in the store")]
    NullShape { argument: usize, id: ShapeId },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("operation cancelled during {stage}")]
    Cancelled { stage: Stage },

    #[error("internal invariant violated during {stage}: {detail}")]
    InvariantViolation { stage: Stage, detail: String },

    #[error(transparent)]
    Topology(#[from] TopologyError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_filters() {
        let mut report = Report::new();
        report.info(AlertCode::EmptyResult, Stage::Select, vec![], "nothing left");
        assert!(!report.has_warnings());
        report.local_failure(AlertCode::OpenShell, Stage::BuildSolids, vec![], "gap");
        assert!(report.has_warnings());
        assert!(report.has_local_failures());
        assert_eq!(report.of_severity(Severity::Info).count(), 1);
        assert!(report.has_code(AlertCode::OpenShell));
    }

    #[test]
    fn test_json_round_trip() {
        let mut report = Report::new();
        report.warning(AlertCode::OperandsTouchOnly, Stage::Select, vec![], "touching");
        let json = report.to_json().unwrap();
        assert!(json.contains("OperandsTouchOnly"));
        let back: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn test_display_lists_alerts() {
        let mut report = Report::new();
        report.warning(AlertCode::MicroEdgeDropped, Stage::PaveBlocks, vec![], "tiny");
        let text = report.to_string();
        assert!(text.contains("[WARN] MicroEdgeDropped at PaveBlocks: tiny"));
    }
}
