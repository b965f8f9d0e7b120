//! Configuration for shape validation.

use serde::{Deserialize, Serialize};

use super::types::ValidationLevel;

/// Tolerance thresholds for validation checks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ToleranceConfig {
    /// Points closer than this are coincident.
    pub resolution: f64,
    /// Largest vertex tolerance accepted without a warning.
    pub max_vertex_tol: f64,
    /// Largest edge tolerance accepted without a warning.
    pub max_edge_tol: f64,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            resolution: 1e-7,
            max_vertex_tol: 1e-3,
            max_edge_tol: 1e-4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    pub level: ValidationLevel,
    pub tolerance: ToleranceConfig,
    /// Report shells with free edges. Off for results expected to be open.
    pub require_closed_shells: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            level: ValidationLevel::Geometry,
            tolerance: ToleranceConfig::default(),
            require_closed_shells: true,
        }
    }
}

impl ValidationConfig {
    /// Topology-only validation (fastest).
    pub fn topology() -> Self {
        Self {
            level: ValidationLevel::Topology,
            ..Self::default()
        }
    }

    /// Topology plus geometric consistency.
    pub fn geometry() -> Self {
        Self::default()
    }

    /// Geometry level with looser thresholds, for shapes built from
    /// marched intersection curves.
    pub fn relaxed() -> Self {
        Self {
            tolerance: ToleranceConfig {
                max_vertex_tol: 1e-2,
                max_edge_tol: 1e-2,
                ..ToleranceConfig::default()
            },
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert_eq!(ValidationConfig::topology().level, ValidationLevel::Topology);
        assert_eq!(ValidationConfig::geometry().level, ValidationLevel::Geometry);
        assert!(ValidationConfig::relaxed().tolerance.max_edge_tol > ToleranceConfig::default().max_edge_tol);
    }
}
