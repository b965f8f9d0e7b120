//! B-Rep modeling kernel with General Fuse style Boolean operations.

pub mod geometry;
pub mod topology;
pub mod boolean;
pub mod validation;

pub use boolean::{BooleanEngine, BooleanOp, BooleanOptions, BooleanResult, DefaultBooleanEngine, boolean_op};
pub use topology::{Shape, ShapeKind, ShapeStore};

/// Tolerances for analytic geometric comparisons.
#[derive(Debug, Clone, Copy)]
pub struct Tolerance {
    /// Points closer than this are considered coincident (meters).
    pub coincidence: f64,
    /// Angles smaller than this (radians) are considered zero.
    pub angular: f64,
    /// Parameter-space tolerance for curve and surface evaluations.
    pub parametric: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            coincidence: 1e-7,
            angular: 1e-10,
            parametric: 1e-9,
        }
    }
}
