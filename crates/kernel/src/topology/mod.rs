pub mod shape;
pub mod explorer;
pub mod builder;
pub mod primitives;
pub mod pcurve;
pub mod properties;

pub use explorer::{AncestorMap, Explorer, IndexedShapeMap};
pub use shape::{Orientation, Shape, ShapeId, ShapeKind, ShapeStore, TopologyError};
