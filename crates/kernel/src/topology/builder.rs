use std::collections::HashMap;

use tracing::debug;

use crate::geometry::point::Point3d;
use crate::geometry::transform::Transform;

use super::pcurve::PCurve;
use super::shape::{
    CurveId, EdgeData, FaceData, Orientation, Shape, ShapeData, ShapeId, ShapeKind, ShapeStore,
    SurfaceId, TopologyError, VertexData,
};

// ─── Construction ────────────────────────────────────────────────────────────

impl ShapeStore {
    pub fn make_vertex(&mut self, point: Point3d, tolerance: f64) -> Shape {
        Shape::new(self.insert(ShapeData::Vertex(VertexData { point, tolerance }), vec![]))
    }

    /// Edge over `range` (ascending) of a stored curve. The first vertex is
    /// stored forward, the last reversed.
    pub fn make_edge(
        &mut self,
        curve: CurveId,
        range: (f64, f64),
        first: ShapeId,
        last: ShapeId,
        tolerance: f64,
    ) -> Result<Shape, TopologyError> {
        self.curve(curve)?;
        self.expect_kind(first, ShapeKind::Vertex)?;
        self.expect_kind(last, ShapeKind::Vertex)?;
        let tolerance = tolerance
            .max(self.tolerance(first)?)
            .max(self.tolerance(last)?);
        let data = EdgeData {
            curve,
            range: (range.0.min(range.1), range.0.max(range.1)),
            tolerance,
            degenerate: false,
            pcurves: Vec::new(),
        };
        let children = vec![
            Shape::oriented(first, Orientation::Forward),
            Shape::oriented(last, Orientation::Reversed),
        ];
        Ok(Shape::new(self.insert(ShapeData::Edge(data), children)))
    }

    /// Edge collapsed onto `vertex` that only exists in parameter space.
    pub fn make_degenerate_edge(
        &mut self,
        curve: CurveId,
        range: (f64, f64),
        vertex: ShapeId,
        pcurve: PCurve,
    ) -> Result<Shape, TopologyError> {
        let edge = self.make_edge(curve, range, vertex, vertex, 0.0)?;
        let data = self.edge_mut(edge.id)?;
        data.degenerate = true;
        data.pcurves.push(pcurve);
        Ok(edge)
    }

    /// Attach or replace the p-curve of an edge on one surface.
    pub fn set_pcurve(&mut self, edge: ShapeId, pcurve: PCurve) -> Result<(), TopologyError> {
        let data = self.edge_mut(edge)?;
        data.pcurves.retain(|pc| pc.surface != pcurve.surface);
        data.pcurves.push(pcurve);
        Ok(())
    }

    fn make_container(
        &mut self,
        data: ShapeData,
        child_kind: &[ShapeKind],
        children: Vec<Shape>,
    ) -> Result<Shape, TopologyError> {
        for c in &children {
            let found = self.kind(c.id)?;
            if !child_kind.contains(&found) {
                return Err(TopologyError::WrongKind {
                    expected: child_kind[0],
                    found,
                });
            }
        }
        Ok(Shape::new(self.insert(data, children)))
    }

    pub fn make_wire(&mut self, edges: Vec<Shape>) -> Result<Shape, TopologyError> {
        self.make_container(ShapeData::Wire, &[ShapeKind::Edge], edges)
    }

    /// Face on a stored surface. The outer wire runs counter-clockwise in
    /// `(u, v)` around the material, holes clockwise.
    pub fn make_face(
        &mut self,
        surface: SurfaceId,
        wires: Vec<Shape>,
        tolerance: f64,
    ) -> Result<Shape, TopologyError> {
        self.surface(surface)?;
        self.make_container(
            ShapeData::Face(FaceData { surface, tolerance }),
            &[ShapeKind::Wire],
            wires,
        )
    }

    pub fn make_shell(&mut self, faces: Vec<Shape>) -> Result<Shape, TopologyError> {
        self.make_container(ShapeData::Shell, &[ShapeKind::Face], faces)
    }

    pub fn make_solid(&mut self, shells: Vec<Shape>) -> Result<Shape, TopologyError> {
        self.make_container(ShapeData::Solid, &[ShapeKind::Shell], shells)
    }

    pub fn make_compsolid(&mut self, solids: Vec<Shape>) -> Result<Shape, TopologyError> {
        self.make_container(ShapeData::CompSolid, &[ShapeKind::Solid], solids)
    }

    pub fn make_compound(&mut self, children: Vec<Shape>) -> Result<Shape, TopologyError> {
        const ANY: [ShapeKind; 8] = [
            ShapeKind::Compound,
            ShapeKind::CompSolid,
            ShapeKind::Solid,
            ShapeKind::Shell,
            ShapeKind::Face,
            ShapeKind::Wire,
            ShapeKind::Edge,
            ShapeKind::Vertex,
        ];
        self.make_container(ShapeData::Compound, &ANY, children)
    }

    // ─── Copies ──────────────────────────────────────────────────────────────

    /// Deep copy of `shape` moved by a rigid motion. Shared sub-shapes stay
    /// shared inside the copy; nothing is shared with the original.
    pub fn transformed(&mut self, shape: Shape, t: &Transform) -> Result<Shape, TopologyError> {
        if t.is_mirroring() || (t.scale_factor() - 1.0).abs() > 1e-12 {
            return Err(TopologyError::NonRigidTransform);
        }
        let mut copies = HashMap::new();
        let mut curves = HashMap::new();
        let mut surfaces = HashMap::new();
        let id = self.copy_record(shape.id, t, &mut copies, &mut curves, &mut surfaces)?;
        debug!(shapes = copies.len(), "deep-copied shape");
        Ok(Shape::oriented(id, shape.orientation))
    }

    /// Deep copy without moving.
    pub fn deep_copy(&mut self, shape: Shape) -> Result<Shape, TopologyError> {
        self.transformed(shape, &Transform::identity())
    }

    fn copy_record(
        &mut self,
        id: ShapeId,
        t: &Transform,
        copies: &mut HashMap<ShapeId, ShapeId>,
        curves: &mut HashMap<CurveId, CurveId>,
        surfaces: &mut HashMap<SurfaceId, SurfaceId>,
    ) -> Result<ShapeId, TopologyError> {
        if let Some(&done) = copies.get(&id) {
            return Ok(done);
        }
        let record = self.record(id)?.clone();
        let mut children = Vec::with_capacity(record.children.len());
        for c in &record.children {
            let cid = self.copy_record(c.id, t, copies, curves, surfaces)?;
            children.push(Shape::oriented(cid, c.orientation));
        }
        let data = match record.data {
            ShapeData::Vertex(v) => ShapeData::Vertex(VertexData {
                point: t.transform_point(&v.point),
                tolerance: v.tolerance,
            }),
            ShapeData::Edge(mut e) => {
                e.curve = self.copy_curve(e.curve, t, curves)?;
                for pc in &mut e.pcurves {
                    pc.surface = self.copy_surface(pc.surface, t, surfaces)?;
                }
                ShapeData::Edge(e)
            }
            ShapeData::Face(mut f) => {
                f.surface = self.copy_surface(f.surface, t, surfaces)?;
                ShapeData::Face(f)
            }
            other => other,
        };
        let new_id = self.insert(data, children);
        copies.insert(id, new_id);
        Ok(new_id)
    }

    fn copy_curve(
        &mut self,
        id: CurveId,
        t: &Transform,
        done: &mut HashMap<CurveId, CurveId>,
    ) -> Result<CurveId, TopologyError> {
        if let Some(&c) = done.get(&id) {
            return Ok(c);
        }
        let moved = self.curve(id)?.transformed(t);
        let c = self.add_curve(moved);
        done.insert(id, c);
        Ok(c)
    }

    fn copy_surface(
        &mut self,
        id: SurfaceId,
        t: &Transform,
        done: &mut HashMap<SurfaceId, SurfaceId>,
    ) -> Result<SurfaceId, TopologyError> {
        if let Some(&s) = done.get(&id) {
            return Ok(s);
        }
        let moved = self.surface(id)?.transformed(t);
        let s = self.add_surface(moved);
        done.insert(id, s);
        Ok(s)
    }
}
