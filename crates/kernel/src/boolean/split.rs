//! Output vertices and edges: one image per merged vertex group and one
//! per pave block. Common blocks share a single image edge.

use std::collections::BTreeMap;

use tracing::{debug, info, instrument};

use crate::geometry::curves::Line2d;
use crate::geometry::point::Point3d;
use crate::topology::pcurve::PCurve;
use crate::topology::{Orientation, Shape, ShapeId, ShapeKind, ShapeStore};

use super::ds::{BlockOwner, DataStructure, EdgeImage};
use super::options::BooleanOptions;
use super::report::{BooleanError, Stage};

/// Vertex and degenerate-edge images. Pave-block images live on the blocks.
#[derive(Debug, Clone, Default)]
pub struct SplitImages {
    vertices: BTreeMap<usize, ShapeId>,
    degenerate: BTreeMap<usize, ShapeId>,
}

impl SplitImages {
    /// Output vertex standing for data-structure vertex `v`.
    pub fn vertex(&self, ds: &DataStructure, v: usize) -> ShapeId {
        let rep = ds.real_vertex(v);
        self.vertices.get(&rep).copied().unwrap_or_else(|| ds.id(rep))
    }

    /// Output occurrences replacing one occurrence of argument edge `e`,
    /// in traversal order.
    pub fn edge_pieces(&self, ds: &DataStructure, e: usize, orientation: Orientation) -> Vec<Shape> {
        if let Some(&d) = self.degenerate.get(&e) {
            return vec![Shape::oriented(d, orientation)];
        }
        let blocks = ds.blocks_of_edge(e);
        if blocks.is_empty() {
            return vec![Shape::oriented(ds.id(e), orientation)];
        }
        let mut out: Vec<Shape> = blocks
            .iter()
            .filter_map(|&b| ds.blocks[b].image)
            .map(|img| {
                let o = if img.same_direction { orientation } else { orientation.reversed() };
                Shape::oriented(img.edge, o)
            })
            .collect();
        if orientation == Orientation::Reversed {
            out.reverse();
        }
        out
    }

    /// Whether edge `e` comes out as itself.
    pub fn is_unchanged(&self, ds: &DataStructure, e: usize) -> bool {
        self.edge_pieces(ds, e, Orientation::Forward) == [Shape::new(ds.id(e))]
    }

    /// Every output edge standing for argument edge `e`.
    pub fn edge_images(&self, ds: &DataStructure, e: usize) -> Vec<ShapeId> {
        self.edge_pieces(ds, e, Orientation::Forward).iter().map(|s| s.id).collect()
    }
}

/// P-curve of a block of another edge, re-expressed in the parameter of
/// the image edge: image parameter `s1` maps to member parameter `t_at_s1`,
/// with slope `k`.
fn reparametrized(pc: &PCurve, s1: f64, t_at_s1: f64, k: f64) -> PCurve {
    let map = |line: Line2d| {
        let shift = t_at_s1 - k * s1;
        Line2d::new(line.origin + line.direction * shift, line.direction * k)
    };
    PCurve {
        surface: pc.surface,
        curve: map(pc.curve),
        seam: pc.seam.map(map),
    }
}

fn vertex_images(store: &mut ShapeStore, ds: &DataStructure) -> Result<BTreeMap<usize, ShapeId>, BooleanError> {
    let mut out = BTreeMap::new();
    for (rep, members) in ds.vertex_groups() {
        let data = members
            .iter()
            .map(|&m| ds.vertex_data(store, m))
            .collect::<Result<Vec<_>, _>>()?;
        let (p_rep, t_rep) = ds.vertex_data(store, rep)?;
        let reach = |c: &Point3d| data.iter().map(|(p, t)| c.distance_to(p) + t).fold(0.0, f64::max);
        let image = if !ds.is_original(rep) {
            store.raise_tolerance(ds.id(rep), reach(&p_rep))?;
            ds.id(rep)
        } else if reach(&p_rep) <= t_rep {
            ds.id(rep)
        } else {
            let points: Vec<Point3d> = data.iter().map(|(p, _)| *p).collect();
            let weights: Vec<f64> = data.iter().map(|(_, t)| *t).collect();
            let center = Point3d::weighted_mean(&points, &weights).unwrap_or(p_rep);
            debug!(rep, members = members.len(), "new vertex for merge group");
            store.make_vertex(center, reach(&center)).id
        };
        out.insert(rep, image);
    }
    Ok(out)
}

/// Make the image of every vertex group and pave block.
#[instrument(skip_all)]
pub fn split_edges(store: &mut ShapeStore, ds: &mut DataStructure, options: &BooleanOptions) -> Result<SplitImages, BooleanError> {
    let mut images = SplitImages {
        vertices: vertex_images(store, ds)?,
        degenerate: BTreeMap::new(),
    };
    options.check_cancel(Stage::SplitEdges)?;

    let edges: Vec<usize> = ds.edge_blocks.keys().copied().collect();
    for e in edges {
        split_edge(store, ds, &images, e)?;
    }
    for s in 0..ds.sections.len() {
        split_section(store, ds, &images, s)?;
    }

    let degenerate: Vec<usize> = ds
        .indices_of(ShapeKind::Edge)
        .filter(|&e| store.is_degenerate(ds.id(e)))
        .collect();
    for e in degenerate {
        let (v, _) = ds.edge_vertex_indices(store, e)?;
        let image = images.vertex(ds, v);
        if image == ds.id(v) {
            continue;
        }
        let data = store.edge(ds.id(e))?.clone();
        let Some((first, rest)) = data.pcurves.split_first() else {
            continue;
        };
        let edge = store.make_degenerate_edge(data.curve, data.range, image, *first)?;
        for pc in rest {
            store.set_pcurve(edge.id, *pc)?;
        }
        images.degenerate.insert(e, edge.id);
    }

    let new_edges = ds.blocks.iter().filter_map(|pb| pb.image).filter(|img| ds.index_of(img.edge).is_none()).count();
    info!(
        vertex_groups = images.vertices.len(),
        blocks = ds.blocks.len(),
        new_edges,
        "split edges"
    );
    Ok(images)
}

fn split_edge(store: &mut ShapeStore, ds: &mut DataStructure, images: &SplitImages, e: usize) -> Result<(), BooleanError> {
    let id = ds.id(e);
    let data = store.edge(id)?.clone();
    let (a, b) = store.edge_vertices(Shape::new(id))?;
    let blocks = ds.blocks_of_edge(e).to_vec();
    for &block in &blocks {
        let pb = ds.blocks[block].clone();
        if pb.image.is_some() {
            continue;
        }
        if let Some(c) = pb.common {
            materialize_common(store, ds, images, c)?;
            continue;
        }
        let (v1, v2) = (images.vertex(ds, pb.v1), images.vertex(ds, pb.v2));
        let whole = blocks.len() == 1 && pb.range() == data.range && v1 == a && v2 == b;
        let edge = if whole {
            id
        } else {
            let new = store.make_edge(data.curve, pb.range(), v1, v2, data.tolerance)?.id;
            for pc in &data.pcurves {
                store.set_pcurve(new, *pc)?;
            }
            new
        };
        ds.blocks[block].image = Some(EdgeImage {
            edge,
            same_direction: true,
        });
    }
    Ok(())
}

/// One edge for all members of a common block, on the curve of its
/// chief block (the object's, when there is one). The other members'
/// p-curves are carried over.
fn materialize_common(store: &mut ShapeStore, ds: &mut DataStructure, images: &SplitImages, c: usize) -> Result<(), BooleanError> {
    let members = ds.common_blocks[c].blocks.clone();
    let Some(&first) = members.first() else {
        return Ok(());
    };
    let chief = ds.real_block(first);
    let pb = ds.blocks[chief].clone();
    let BlockOwner::Edge(e) = pb.owner else {
        return Err(BooleanError::InvariantViolation {
            stage: Stage::SplitEdges,
            detail: format!("common block {c} is led by a section block"),
        });
    };
    let id = ds.id(e);
    let data = store.edge(id)?.clone();
    let curve = store.curve(data.curve)?.clone();
    let (a, b) = store.edge_vertices(Shape::new(id))?;
    let (v1, v2) = (images.vertex(ds, pb.v1), images.vertex(ds, pb.v2));

    let mut tolerance = data.tolerance;
    for &m in members.iter().filter(|&&m| m != chief) {
        let (cm, tm) = ds.block_curve(store, m)?;
        let (_, d) = curve.project_point(&cm.evaluate(ds.blocks[m].mid_param()), pb.range());
        tolerance = tolerance.max(d + tm);
    }

    let whole = ds.blocks_of_edge(e).len() == 1 && pb.range() == data.range && v1 == a && v2 == b;
    let image = if whole {
        store.raise_tolerance(id, tolerance)?;
        id
    } else {
        let new = store.make_edge(data.curve, pb.range(), v1, v2, tolerance)?.id;
        for pc in &data.pcurves {
            store.set_pcurve(new, *pc)?;
        }
        new
    };
    ds.blocks[chief].image = Some(EdgeImage {
        edge: image,
        same_direction: true,
    });

    let mid = curve.evaluate(pb.mid_param());
    for &m in members.iter().filter(|&&m| m != chief) {
        let pm = ds.blocks[m].clone();
        let BlockOwner::Edge(em) = pm.owner else {
            continue;
        };
        let mdata = store.edge(ds.id(em))?.clone();
        let mcurve = store.curve(mdata.curve)?;
        let (t_mid, _) = mcurve.project_point(&mid, pm.range());
        let same_direction = curve.derivative(pb.mid_param()).dot(&mcurve.derivative(t_mid)) >= 0.0;
        let (ta, tb) = if same_direction { (pm.t1, pm.t2) } else { (pm.t2, pm.t1) };
        let k = (tb - ta) / (pb.t2 - pb.t1);
        for pc in &mdata.pcurves {
            if store.edge(image)?.pcurve_on(pc.surface).is_none() {
                store.set_pcurve(image, reparametrized(pc, pb.t1, ta, k))?;
            }
        }
        ds.blocks[m].image = Some(EdgeImage { edge: image, same_direction });
    }
    Ok(())
}

fn split_section(store: &mut ShapeStore, ds: &mut DataStructure, images: &SplitImages, s: usize) -> Result<(), BooleanError> {
    let blocks = ds.sections[s].blocks.clone();
    if blocks.is_empty() {
        return Ok(());
    }
    let curve = store.add_curve(ds.sections[s].curve.clone());
    let tolerance = ds.sections[s].tolerance;
    for block in blocks {
        let pb = ds.blocks[block].clone();
        let (v1, v2) = (images.vertex(ds, pb.v1), images.vertex(ds, pb.v2));
        let edge = store.make_edge(curve, pb.range(), v1, v2, tolerance)?.id;
        ds.blocks[block].image = Some(EdgeImage {
            edge,
            same_direction: true,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boolean::filler::PaveFiller;
    use crate::geometry::point::Point2d;
    use crate::geometry::vector::Vec2;
    use crate::topology::primitives::make_box;

    fn split(b_min: Point3d, b_max: Point3d) -> (ShapeStore, DataStructure, SplitImages) {
        let mut store = ShapeStore::new();
        let a = make_box(&mut store, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0)).unwrap();
        let b = make_box(&mut store, b_min, b_max).unwrap();
        let opts = BooleanOptions::sequential();
        let mut filler = PaveFiller::new(&mut store, &[a, b], &opts).unwrap();
        filler.perform().unwrap();
        let mut ds = filler.ds;
        let images = split_edges(&mut store, &mut ds, &opts).unwrap();
        (store, ds, images)
    }

    #[test]
    fn test_shared_face_reuses_object_edges() {
        let (_, ds, images) = split(Point3d::new(1.0, 0.0, 0.0), Point3d::new(2.0, 1.0, 1.0));
        // touching corners resolve to the object's vertices
        for (rep, _) in ds.vertex_groups() {
            assert_eq!(images.vertex(&ds, rep), ds.id(rep));
            assert_eq!(ds.rank(rep), Some(0));
        }
        for cb in &ds.common_blocks {
            let first = ds.blocks[cb.blocks[0]].image.unwrap().edge;
            assert!(cb.blocks.iter().all(|&b| ds.blocks[b].image.unwrap().edge == first));
            assert_eq!(ds.rank(ds.index_of(first).unwrap()), Some(0));
        }
        let unchanged = ds.indices_of(ShapeKind::Edge).filter(|&e| images.is_unchanged(&ds, e)).count();
        // every object edge plus the tool edges of its far face
        assert_eq!(unchanged, 12 + 4);
    }

    #[test]
    fn test_half_overlap_edges_get_two_pieces() {
        let (store, ds, images) = split(Point3d::new(0.5, 0.0, 0.0), Point3d::new(1.5, 1.0, 1.0));
        let cut: Vec<usize> = ds
            .indices_of(ShapeKind::Edge)
            .filter(|&e| ds.blocks_of_edge(e).len() == 2)
            .collect();
        assert_eq!(cut.len(), 8);
        for e in cut {
            let pieces = images.edge_pieces(&ds, e, Orientation::Forward);
            assert_eq!(pieces.len(), 2);
            let (_, end_first) = store.edge_vertices(pieces[0]).unwrap();
            let (start_second, _) = store.edge_vertices(pieces[1]).unwrap();
            assert_eq!(end_first, start_second);
        }
    }

    #[test]
    fn test_reparametrized_pcurve_follows_member() {
        let mut store = ShapeStore::new();
        let surface = store.add_surface(crate::geometry::surfaces::Surface::Plane(
            crate::geometry::surfaces::Plane::new(Point3d::ORIGIN, crate::geometry::vector::Vec3::Z),
        ));
        // member runs t in [2, 4] while the image runs s in [0, 1], reversed
        let pc = PCurve::new(surface, Line2d::new(Point2d::new(0.0, 0.0), Vec2::new(1.0, 0.0)));
        let out = reparametrized(&pc, 0.0, 4.0, -2.0);
        assert!(out.curve.evaluate(0.0).distance_to(&Point2d::new(4.0, 0.0)) < 1e-12);
        assert!(out.curve.evaluate(1.0).distance_to(&Point2d::new(2.0, 0.0)) < 1e-12);
    }
}
