use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};
use thiserror::Error;

use crate::geometry::curves::Curve;
use crate::geometry::point::Point3d;
use crate::geometry::surfaces::Surface;

use super::pcurve::PCurve;

// ─── Entity Keys ─────────────────────────────────────────────────────────────

new_key_type! {
    pub struct ShapeId;
    pub struct CurveId;
    pub struct SurfaceId;
}

// ─── Kinds and Orientation ───────────────────────────────────────────────────

/// Shape kinds, ordered from the top of the hierarchy down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShapeKind {
    Compound,
    CompSolid,
    Solid,
    Shell,
    Face,
    Wire,
    Edge,
    Vertex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Orientation {
    Forward,
    Reversed,
    Internal,
    External,
}

impl Orientation {
    pub fn reversed(self) -> Self {
        match self {
            Orientation::Forward => Orientation::Reversed,
            Orientation::Reversed => Orientation::Forward,
            other => other,
        }
    }

    /// Orientation of a child reached through a parent with orientation `self`.
    pub fn compose(self, child: Orientation) -> Orientation {
        match self {
            Orientation::Forward => child,
            Orientation::Reversed => child.reversed(),
            Orientation::Internal => Orientation::Internal,
            Orientation::External => Orientation::External,
        }
    }

    /// +1 for forward, -1 for reversed, 0 otherwise.
    pub fn sign(self) -> f64 {
        match self {
            Orientation::Forward => 1.0,
            Orientation::Reversed => -1.0,
            Orientation::Internal | Orientation::External => 0.0,
        }
    }
}

/// An oriented reference to a stored shape. Two references to the same
/// record with different orientations are the "same" shape but not equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Shape {
    pub id: ShapeId,
    pub orientation: Orientation,
}

impl Shape {
    pub fn new(id: ShapeId) -> Self {
        Self {
            id,
            orientation: Orientation::Forward,
        }
    }

    pub fn oriented(id: ShapeId, orientation: Orientation) -> Self {
        Self { id, orientation }
    }

    pub fn reversed(self) -> Self {
        Self {
            id: self.id,
            orientation: self.orientation.reversed(),
        }
    }

    pub fn with_orientation(self, orientation: Orientation) -> Self {
        Self {
            id: self.id,
            orientation,
        }
    }

    /// Child reference as seen through `self`.
    pub fn compose(self, child: Shape) -> Shape {
        Shape {
            id: child.id,
            orientation: self.orientation.compose(child.orientation),
        }
    }

    pub fn is_same(&self, other: &Shape) -> bool {
        self.id == other.id
    }
}

// ─── Records ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VertexData {
    pub point: Point3d,
    pub tolerance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeData {
    pub curve: CurveId,
    pub range: (f64, f64),
    pub tolerance: f64,
    /// Collapsed to a point in 3D (sphere poles); only its p-curve matters.
    pub degenerate: bool,
    pub pcurves: Vec<PCurve>,
}

impl EdgeData {
    pub fn pcurve_on(&self, surface: SurfaceId) -> Option<&PCurve> {
        self.pcurves.iter().find(|pc| pc.surface == surface)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceData {
    pub surface: SurfaceId,
    pub tolerance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ShapeData {
    Vertex(VertexData),
    Edge(EdgeData),
    Wire,
    Face(FaceData),
    Shell,
    Solid,
    CompSolid,
    Compound,
}

impl ShapeData {
    pub fn kind(&self) -> ShapeKind {
        match self {
            ShapeData::Vertex(_) => ShapeKind::Vertex,
            ShapeData::Edge(_) => ShapeKind::Edge,
            ShapeData::Wire => ShapeKind::Wire,
            ShapeData::Face(_) => ShapeKind::Face,
            ShapeData::Shell => ShapeKind::Shell,
            ShapeData::Solid => ShapeKind::Solid,
            ShapeData::CompSolid => ShapeKind::CompSolid,
            ShapeData::Compound => ShapeKind::Compound,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapeRecord {
    pub data: ShapeData,
    pub children: Vec<Shape>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TopologyError {
    #[error("shape {0:?} is not in the store")]
    Dangling(ShapeId),

    #[error("expected a {expected:?}, found a {found:?}")]
    WrongKind { expected: ShapeKind, found: ShapeKind },

    #[error("curve {0:?} is not in the store")]
    MissingCurve(CurveId),

    #[error("surface {0:?} is not in the store")]
    MissingSurface(SurfaceId),

    #[error("only rigid motions can be applied to shapes")]
    NonRigidTransform,
}

// ─── Shape Store ─────────────────────────────────────────────────────────────

/// Arena holding every shape record and the geometry they reference.
/// Records are never mutated once shared, except for tolerance growth.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShapeStore {
    shapes: SlotMap<ShapeId, ShapeRecord>,
    curves: SlotMap<CurveId, Curve>,
    surfaces: SlotMap<SurfaceId, Surface>,
}

impl ShapeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn add_curve(&mut self, curve: Curve) -> CurveId {
        self.curves.insert(curve)
    }

    pub fn add_surface(&mut self, surface: Surface) -> SurfaceId {
        self.surfaces.insert(surface)
    }

    pub fn curve(&self, id: CurveId) -> Result<&Curve, TopologyError> {
        self.curves.get(id).ok_or(TopologyError::MissingCurve(id))
    }

    pub fn surface(&self, id: SurfaceId) -> Result<&Surface, TopologyError> {
        self.surfaces.get(id).ok_or(TopologyError::MissingSurface(id))
    }

    pub(crate) fn insert(&mut self, data: ShapeData, children: Vec<Shape>) -> ShapeId {
        self.shapes.insert(ShapeRecord { data, children })
    }

    /// Drop a record; references to it become dangling.
    pub fn remove(&mut self, id: ShapeId) -> Option<ShapeRecord> {
        self.shapes.remove(id)
    }

    pub fn contains(&self, id: ShapeId) -> bool {
        self.shapes.contains_key(id)
    }

    pub fn record(&self, id: ShapeId) -> Result<&ShapeRecord, TopologyError> {
        self.shapes.get(id).ok_or(TopologyError::Dangling(id))
    }

    pub fn kind(&self, id: ShapeId) -> Result<ShapeKind, TopologyError> {
        Ok(self.record(id)?.data.kind())
    }

    /// Direct children of `shape` with orientations composed through it.
    /// A dangling shape has no children.
    pub fn children(&self, shape: Shape) -> impl Iterator<Item = Shape> + '_ {
        self.shapes
            .get(shape.id)
            .into_iter()
            .flat_map(move |r| r.children.iter().map(move |c| shape.compose(*c)))
    }

    pub fn expect_kind(&self, id: ShapeId, expected: ShapeKind) -> Result<(), TopologyError> {
        let found = self.kind(id)?;
        if found == expected {
            Ok(())
        } else {
            Err(TopologyError::WrongKind { expected, found })
        }
    }

    pub fn vertex(&self, id: ShapeId) -> Result<&VertexData, TopologyError> {
        match &self.record(id)?.data {
            ShapeData::Vertex(v) => Ok(v),
            other => Err(TopologyError::WrongKind {
                expected: ShapeKind::Vertex,
                found: other.kind(),
            }),
        }
    }

    pub fn edge(&self, id: ShapeId) -> Result<&EdgeData, TopologyError> {
        match &self.record(id)?.data {
            ShapeData::Edge(e) => Ok(e),
            other => Err(TopologyError::WrongKind {
                expected: ShapeKind::Edge,
                found: other.kind(),
            }),
        }
    }

    pub fn face(&self, id: ShapeId) -> Result<&FaceData, TopologyError> {
        match &self.record(id)?.data {
            ShapeData::Face(f) => Ok(f),
            other => Err(TopologyError::WrongKind {
                expected: ShapeKind::Face,
                found: other.kind(),
            }),
        }
    }

    pub(crate) fn edge_mut(&mut self, id: ShapeId) -> Result<&mut EdgeData, TopologyError> {
        match self.shapes.get_mut(id).map(|r| &mut r.data) {
            Some(ShapeData::Edge(e)) => Ok(e),
            Some(other) => Err(TopologyError::WrongKind {
                expected: ShapeKind::Edge,
                found: other.kind(),
            }),
            None => Err(TopologyError::Dangling(id)),
        }
    }

    /// Tolerances only grow.
    pub fn raise_tolerance(&mut self, id: ShapeId, tolerance: f64) -> Result<(), TopologyError> {
        let record = self.shapes.get_mut(id).ok_or(TopologyError::Dangling(id))?;
        let slot = match &mut record.data {
            ShapeData::Vertex(v) => &mut v.tolerance,
            ShapeData::Edge(e) => &mut e.tolerance,
            ShapeData::Face(f) => &mut f.tolerance,
            _ => return Ok(()),
        };
        *slot = slot.max(tolerance);
        Ok(())
    }

    pub fn vertex_point(&self, id: ShapeId) -> Result<Point3d, TopologyError> {
        Ok(self.vertex(id)?.point)
    }

    pub fn tolerance(&self, id: ShapeId) -> Result<f64, TopologyError> {
        Ok(match &self.record(id)?.data {
            ShapeData::Vertex(v) => v.tolerance,
            ShapeData::Edge(e) => e.tolerance,
            ShapeData::Face(f) => f.tolerance,
            _ => 0.0,
        })
    }

    /// First and last vertex of an edge as traversed through `edge`.
    pub fn edge_vertices(&self, edge: Shape) -> Result<(ShapeId, ShapeId), TopologyError> {
        let record = self.record(edge.id)?;
        self.expect_kind(edge.id, ShapeKind::Edge)?;
        let first = record.children.first().ok_or(TopologyError::Dangling(edge.id))?;
        let last = record.children.last().ok_or(TopologyError::Dangling(edge.id))?;
        Ok(match edge.orientation {
            Orientation::Reversed => (last.id, first.id),
            _ => (first.id, last.id),
        })
    }

    /// Curve and parameter range of an edge.
    pub fn edge_curve(&self, id: ShapeId) -> Result<(&Curve, (f64, f64)), TopologyError> {
        let e = self.edge(id)?;
        Ok((self.curve(e.curve)?, e.range))
    }

    pub fn face_surface(&self, id: ShapeId) -> Result<&Surface, TopologyError> {
        self.surface(self.face(id)?.surface)
    }

    pub fn is_degenerate(&self, id: ShapeId) -> bool {
        self.edge(id).map(|e| e.degenerate).unwrap_or(false)
    }

    /// Edges whose first and last vertex coincide (full circles, seams
    /// that close on themselves).
    pub fn is_closed_edge(&self, id: ShapeId) -> bool {
        self.edge_vertices(Shape::new(id))
            .map(|(a, b)| a == b)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orientation_compose() {
        use Orientation::*;
        assert_eq!(Forward.compose(Reversed), Reversed);
        assert_eq!(Reversed.compose(Reversed), Forward);
        assert_eq!(Reversed.compose(Internal), Internal);
        assert_eq!(Internal.compose(Forward), Internal);
        assert_eq!(External.compose(Reversed), External);
        assert_eq!(Forward.reversed().reversed(), Forward);
    }

    #[test]
    fn test_vertex_insertion() {
        let mut store = ShapeStore::new();
        let v = store.insert(
            ShapeData::Vertex(VertexData {
                point: Point3d::new(1.0, 2.0, 3.0),
                tolerance: 1e-7,
            }),
            vec![],
        );
        assert_eq!(store.vertex_point(v).unwrap().x, 1.0);
        assert_eq!(store.kind(v).unwrap(), ShapeKind::Vertex);
        assert!(matches!(store.edge(v), Err(TopologyError::WrongKind { .. })));
        store.raise_tolerance(v, 1e-3).unwrap();
        store.raise_tolerance(v, 1e-5).unwrap();
        assert_eq!(store.tolerance(v).unwrap(), 1e-3);
    }

    #[test]
    fn test_dangling_lookup() {
        let mut store = ShapeStore::new();
        let v = store.insert(ShapeData::Wire, vec![]);
        store.remove(v);
        assert_eq!(store.record(v).err(), Some(TopologyError::Dangling(v)));
        assert_eq!(store.children(Shape::new(v)).count(), 0);
    }
}
