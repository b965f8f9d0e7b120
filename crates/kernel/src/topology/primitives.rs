use std::collections::HashMap;
use std::f64::consts::{FRAC_PI_2, TAU};

use tracing::{info, instrument};

use super::pcurve::PCurve;
use super::shape::{Shape, ShapeId, ShapeStore, TopologyError};
use crate::geometry::curves::{Circle3d, Curve, Line2d, Line3d};
use crate::geometry::point::{Point2d, Point3d};
use crate::geometry::surfaces::{Cylinder, Plane, Sphere, Surface};
use crate::geometry::vector::{Vec2, Vec3};

fn default_tol() -> f64 {
    crate::Tolerance::default().coincidence
}

/// Build an axis-aligned box solid between two opposite corners.
#[instrument(skip(store))]
pub fn make_box(store: &mut ShapeStore, min: Point3d, max: Point3d) -> Result<Shape, TopologyError> {
    let (x0, x1) = (min.x.min(max.x), min.x.max(max.x));
    let (y0, y1) = (min.y.min(max.y), min.y.max(max.y));
    let (z0, z1) = (min.z.min(max.z), min.z.max(max.z));
    info!(min = ?[x0, y0, z0], max = ?[x1, y1, z1], "creating box primitive");
    let v = [
        Point3d::new(x0, y0, z0), // 0
        Point3d::new(x1, y0, z0), // 1
        Point3d::new(x1, y1, z0), // 2
        Point3d::new(x0, y1, z0), // 3
        Point3d::new(x0, y0, z1), // 4
        Point3d::new(x1, y0, z1), // 5
        Point3d::new(x1, y1, z1), // 6
        Point3d::new(x0, y1, z1), // 7
    ];
    let tol = default_tol();
    let vertex_ids: Vec<ShapeId> = v.iter().map(|p| store.make_vertex(*p, tol).id).collect();

    // Each face lists its corners counter-clockwise about the outward normal.
    let face_defs: [([usize; 4], Vec3); 6] = [
        ([0, 3, 2, 1], -Vec3::Z),
        ([6, 7, 4, 5], Vec3::Z),
        ([4, 7, 3, 0], -Vec3::X),
        ([2, 6, 5, 1], Vec3::X),
        ([1, 5, 4, 0], -Vec3::Y),
        ([7, 6, 2, 3], Vec3::Y),
    ];

    let mut edges: HashMap<(usize, usize), Shape> = HashMap::new();
    let mut faces = Vec::with_capacity(6);
    for (corners, normal) in &face_defs {
        let mut wire_edges = Vec::with_capacity(4);
        for k in 0..4 {
            let (i, j) = (corners[k], corners[(k + 1) % 4]);
            let key = (i.min(j), i.max(j));
            let edge = match edges.get(&key) {
                Some(e) => *e,
                None => {
                    let (a, b) = key;
                    let curve = store.add_curve(Curve::Line(Line3d::from_points(v[a], v[b])));
                    let e = store.make_edge(
                        curve,
                        (0.0, v[a].distance_to(&v[b])),
                        vertex_ids[a],
                        vertex_ids[b],
                        tol,
                    )?;
                    edges.insert(key, e);
                    e
                }
            };
            wire_edges.push(if i < j { edge } else { edge.reversed() });
        }
        let surface = store.add_surface(Surface::Plane(Plane::new(v[corners[0]], *normal)));
        let wire = store.make_wire(wire_edges)?;
        faces.push(store.make_face(surface, vec![wire], tol)?);
    }
    let shell = store.make_shell(faces)?;
    store.make_solid(vec![shell])
}

/// Build a sphere solid: one face bounded by a seam meridian and two
/// degenerate pole edges.
#[instrument(skip(store))]
pub fn make_sphere(store: &mut ShapeStore, center: Point3d, radius: f64) -> Result<Shape, TopologyError> {
    info!(radius, "creating sphere primitive");
    let tol = default_tol();
    let sphere = Sphere::new(center, radius);
    let surface = store.add_surface(Surface::Sphere(sphere));
    let south = store.make_vertex(center - sphere.axis * radius, tol);
    let north = store.make_vertex(center + sphere.axis * radius, tol);

    // meridian at u = 0, running south to north with t = latitude
    let seam_normal = sphere.ref_dir.cross(&sphere.axis);
    let seam_curve = store.add_curve(Curve::Circle(Circle3d::with_axes(
        center,
        seam_normal,
        sphere.ref_dir,
        radius,
    )));
    let seam = store.make_edge(seam_curve, (-FRAC_PI_2, FRAC_PI_2), south.id, north.id, tol)?;
    store.set_pcurve(
        seam.id,
        PCurve::seam(
            surface,
            Line2d::new(Point2d::new(TAU, 0.0), Vec2::new(0.0, 1.0)),
            Line2d::new(Point2d::new(0.0, 0.0), Vec2::new(0.0, 1.0)),
        ),
    )?;

    let pole = |store: &mut ShapeStore, vertex: Shape, v: f64| -> Result<Shape, TopologyError> {
        let p = store.vertex_point(vertex.id)?;
        let curve = store.add_curve(Curve::Circle(Circle3d::new(p, sphere.axis, 0.0)));
        let pc = PCurve::new(surface, Line2d::new(Point2d::new(0.0, v), Vec2::new(1.0, 0.0)));
        store.make_degenerate_edge(curve, (0.0, TAU), vertex.id, pc)
    };
    let deg_south = pole(store, south, -FRAC_PI_2)?;
    let deg_north = pole(store, north, FRAC_PI_2)?;

    let wire = store.make_wire(vec![deg_south, seam, deg_north.reversed(), seam.reversed()])?;
    let face = store.make_face(surface, vec![wire], tol)?;
    let shell = store.make_shell(vec![face])?;
    store.make_solid(vec![shell])
}

/// Build a cylinder solid standing on `base` along `axis`: one lateral
/// face with a seam line and two planar caps.
#[instrument(skip(store))]
pub fn make_cylinder(
    store: &mut ShapeStore,
    base: Point3d,
    axis: Vec3,
    radius: f64,
    height: f64,
) -> Result<Shape, TopologyError> {
    info!(radius, height, "creating cylinder primitive");
    let tol = default_tol();
    let cyl = Cylinder::new(base, axis, radius);
    let lateral = store.add_surface(Surface::Cylinder(cyl));
    let top_center = base + cyl.axis * height;
    let seam_start = base + cyl.ref_dir * radius;
    let vb = store.make_vertex(seam_start, tol);
    let vt = store.make_vertex(seam_start + cyl.axis * height, tol);

    let seam_curve = store.add_curve(Curve::Line(Line3d::new(seam_start, cyl.axis)));
    let seam = store.make_edge(seam_curve, (0.0, height), vb.id, vt.id, tol)?;
    store.set_pcurve(
        seam.id,
        PCurve::seam(
            lateral,
            Line2d::new(Point2d::new(TAU, 0.0), Vec2::new(0.0, 1.0)),
            Line2d::new(Point2d::new(0.0, 0.0), Vec2::new(0.0, 1.0)),
        ),
    )?;

    let rim = |store: &mut ShapeStore, center: Point3d, vertex: Shape, v: f64| -> Result<Shape, TopologyError> {
        let curve = store.add_curve(Curve::Circle(Circle3d::with_axes(
            center,
            cyl.axis,
            cyl.ref_dir,
            radius,
        )));
        let edge = store.make_edge(curve, (0.0, TAU), vertex.id, vertex.id, tol)?;
        store.set_pcurve(
            edge.id,
            PCurve::new(lateral, Line2d::new(Point2d::new(0.0, v), Vec2::new(1.0, 0.0))),
        )?;
        Ok(edge)
    };
    let bottom = rim(store, base, vb, 0.0)?;
    let top = rim(store, top_center, vt, height)?;

    let lateral_wire = store.make_wire(vec![bottom, seam, top.reversed(), seam.reversed()])?;
    let lateral_face = store.make_face(lateral, vec![lateral_wire], tol)?;

    let bottom_plane = store.add_surface(Surface::Plane(Plane::new(base, -cyl.axis)));
    let bottom_wire = store.make_wire(vec![bottom.reversed()])?;
    let bottom_face = store.make_face(bottom_plane, vec![bottom_wire], tol)?;

    let top_plane = store.add_surface(Surface::Plane(Plane::new(top_center, cyl.axis)));
    let top_wire = store.make_wire(vec![top])?;
    let top_face = store.make_face(top_plane, vec![top_wire], tol)?;

    let shell = store.make_shell(vec![lateral_face, bottom_face, top_face])?;
    store.make_solid(vec![shell])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::explorer::{unique_subshapes, Explorer};
    use crate::topology::properties::{face_area, solid_volume};
    use crate::topology::shape::ShapeKind;
    use std::f64::consts::PI;

    #[test]
    fn test_box_topology() {
        let mut store = ShapeStore::new();
        let b = make_box(&mut store, Point3d::ORIGIN, Point3d::new(2.0, 3.0, 4.0)).unwrap();
        assert_eq!(store.kind(b.id).unwrap(), ShapeKind::Solid);
        assert_eq!(unique_subshapes(&store, b, ShapeKind::Face).len(), 6);
        assert_eq!(unique_subshapes(&store, b, ShapeKind::Edge).len(), 12);
        assert!((solid_volume(&store, b).unwrap() - 24.0).abs() < 1e-9);
    }

    #[test]
    fn test_primitives_use_default_coincidence_tolerance() {
        let mut store = ShapeStore::new();
        let c = make_cylinder(&mut store, Point3d::ORIGIN, Vec3::Z, 1.0, 1.0).unwrap();
        let tol = crate::Tolerance::default().coincidence;
        for kind in [ShapeKind::Vertex, ShapeKind::Edge, ShapeKind::Face] {
            for s in Explorer::new(&store, c, kind) {
                assert_eq!(store.tolerance(s.id).unwrap(), tol);
            }
        }
    }

    #[test]
    fn test_box_corner_order_is_normalized() {
        let mut store = ShapeStore::new();
        let b = make_box(&mut store, Point3d::new(1.0, 1.0, 1.0), Point3d::ORIGIN).unwrap();
        assert!((solid_volume(&store, b).unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_sphere_area_and_volume() {
        let mut store = ShapeStore::new();
        let s = make_sphere(&mut store, Point3d::new(1.0, 2.0, 3.0), 2.0).unwrap();
        let face = Explorer::new(&store, s, ShapeKind::Face).next().unwrap();
        assert!((face_area(&store, face.id).unwrap() - 16.0 * PI).abs() < 1e-6);
        assert!((solid_volume(&store, s).unwrap() - 32.0 / 3.0 * PI).abs() < 1e-6);
        let edges = unique_subshapes(&store, s, ShapeKind::Edge);
        assert_eq!(edges.len(), 3);
        assert_eq!(edges.iter().filter(|e| store.is_degenerate(e.id)).count(), 2);
    }

    #[test]
    fn test_cylinder_volume() {
        let mut store = ShapeStore::new();
        let c = make_cylinder(&mut store, Point3d::ORIGIN, Vec3::X, 0.5, 3.0).unwrap();
        assert!((solid_volume(&store, c).unwrap() - PI * 0.25 * 3.0).abs() < 1e-6);
        assert_eq!(unique_subshapes(&store, c, ShapeKind::Face).len(), 3);
    }
}
