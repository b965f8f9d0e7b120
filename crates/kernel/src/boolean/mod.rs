//! General Fuse style Boolean operations on B-Rep shapes.
//!
//! A run intersects the arguments ([`filler`]), splits their edges and
//! faces ([`split`], [`face_builder`]), classifies every piece against the
//! other argument ([`classify`]) and rebuilds shells and solids from the
//! pieces the operation keeps ([`solid_builder`]).

pub mod bvh;
pub mod checker;
pub mod classify;
pub mod ds;
pub mod engine;
pub mod face_builder;
pub mod filler;
pub mod history;
pub mod options;
pub mod pave;
pub mod report;
pub mod solid_builder;
pub mod split;

pub use checker::check_self_interference;
pub use engine::{BooleanOp, BooleanResult, boolean_op};
pub use history::History;
pub use options::{BooleanOptions, CancellationToken};
pub use report::{Alert, AlertCode, BooleanError, Report, Severity, Stage};

use crate::topology::{Shape, ShapeStore};

/// Trait for Boolean operations on B-Rep shapes.
///
/// Implement this trait to provide alternative Boolean backends or mock
/// implementations.
pub trait BooleanEngine {
    /// Union of `a` and `b`.
    fn fuse(&self, store: &mut ShapeStore, a: Shape, b: Shape) -> Result<BooleanResult, BooleanError>;

    /// `a` minus `b`.
    fn cut(&self, store: &mut ShapeStore, a: Shape, b: Shape) -> Result<BooleanResult, BooleanError>;

    /// Intersection of `a` and `b`.
    fn common(&self, store: &mut ShapeStore, a: Shape, b: Shape) -> Result<BooleanResult, BooleanError>;

    /// Where the boundaries of `a` and `b` meet.
    fn section(&self, store: &mut ShapeStore, a: Shape, b: Shape) -> Result<BooleanResult, BooleanError>;
}

/// Default Boolean engine backed by [`boolean_op`].
#[derive(Debug, Clone, Default)]
pub struct DefaultBooleanEngine {
    pub options: BooleanOptions,
}

impl BooleanEngine for DefaultBooleanEngine {
    fn fuse(&self, store: &mut ShapeStore, a: Shape, b: Shape) -> Result<BooleanResult, BooleanError> {
        boolean_op(store, a, b, BooleanOp::Fuse, &self.options)
    }

    fn cut(&self, store: &mut ShapeStore, a: Shape, b: Shape) -> Result<BooleanResult, BooleanError> {
        boolean_op(store, a, b, BooleanOp::Cut, &self.options)
    }

    fn common(&self, store: &mut ShapeStore, a: Shape, b: Shape) -> Result<BooleanResult, BooleanError> {
        boolean_op(store, a, b, BooleanOp::Common, &self.options)
    }

    fn section(&self, store: &mut ShapeStore, a: Shape, b: Shape) -> Result<BooleanResult, BooleanError> {
        boolean_op(store, a, b, BooleanOp::Section, &self.options)
    }
}

#[cfg(test)]
mod trait_tests {
    use super::*;
    use crate::geometry::point::Point3d;
    use crate::topology::primitives::make_box;
    use crate::topology::properties::solid_volume;
    use approx::assert_relative_eq;

    fn boxes(store: &mut ShapeStore) -> (Shape, Shape) {
        let a = make_box(store, Point3d::ORIGIN, Point3d::new(2.0, 2.0, 2.0)).unwrap();
        let b = make_box(store, Point3d::new(1.0, 1.0, 1.0), Point3d::new(3.0, 3.0, 3.0)).unwrap();
        (a, b)
    }

    #[test]
    fn test_boolean_engine_trait_fuse() {
        let engine = DefaultBooleanEngine::default();
        let mut store = ShapeStore::new();
        let (a, b) = boxes(&mut store);
        let r = engine.fuse(&mut store, a, b).unwrap();
        assert_relative_eq!(solid_volume(&store, r.shape).unwrap(), 15.0, epsilon = 1e-6);
    }

    #[test]
    fn test_boolean_engine_trait_cut() {
        let engine = DefaultBooleanEngine::default();
        let mut store = ShapeStore::new();
        let (a, b) = boxes(&mut store);
        let r = engine.cut(&mut store, a, b).unwrap();
        assert_relative_eq!(solid_volume(&store, r.shape).unwrap(), 7.0, epsilon = 1e-6);
    }

    #[test]
    fn test_boolean_engine_trait_common() {
        let engine = DefaultBooleanEngine::default();
        let mut store = ShapeStore::new();
        let (a, b) = boxes(&mut store);
        let r = engine.common(&mut store, a, b).unwrap();
        assert_relative_eq!(solid_volume(&store, r.shape).unwrap(), 1.0, epsilon = 1e-6);
    }
}
