//! Property-based tests for kernel invariants using the `proptest` crate.

use proptest::prelude::*;

use brep_kernel::boolean::pave::{Pave, PaveSource, merge_paves};
use brep_kernel::boolean::{AlertCode, BooleanOp, BooleanOptions, BooleanResult, boolean_op};
use brep_kernel::geometry::curves::{Curve, Line3d};
use brep_kernel::geometry::point::Point3d;
use brep_kernel::geometry::transform::{BoundingBox, Transform};
use brep_kernel::geometry::vector::Vec3;
use brep_kernel::topology::primitives::{make_box, make_cylinder};
use brep_kernel::topology::properties::solid_volume;
use brep_kernel::topology::{Explorer, IndexedShapeMap, Shape, ShapeKind, ShapeStore};

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

fn arb_pave() -> impl Strategy<Value = Pave> {
    (0usize..12, 0.0f64..1.0, 1usize..4).prop_map(|(vertex, param, source)| {
        let source = [PaveSource::VertexEdge, PaveSource::EdgeEdge, PaveSource::EdgeFace][source - 1];
        Pave::new(vertex, param, source)
    })
}

fn arb_translation() -> impl Strategy<Value = (f64, f64, f64)> {
    (-100.0f64..100.0, -100.0f64..100.0, -100.0f64..100.0)
}

/// Box corners on a half-unit grid, so faces either coincide exactly or
/// stay half a unit apart.
fn arb_grid_box() -> impl Strategy<Value = (Point3d, Point3d)> {
    ((-3i32..3, -3i32..3, -3i32..3), (1i32..5, 1i32..5, 1i32..5)).prop_map(|((x, y, z), (w, d, h))| {
        let min = Point3d::new(x as f64 * 0.5, y as f64 * 0.5, z as f64 * 0.5);
        let max = Point3d::new(min.x + w as f64 * 0.5, min.y + d as f64 * 0.5, min.z + h as f64 * 0.5);
        (min, max)
    })
}

fn x_axis() -> Curve {
    Curve::Line(Line3d::new(Point3d::ORIGIN, Vec3::X))
}

fn tolerance_of(v: usize) -> (usize, f64) {
    (v, if v % 5 == 0 { 1e-3 } else { 1e-7 })
}

const TOL: f64 = 1e-6;

// ---------------------------------------------------------------------------
// 1. Pave merge depends only on the pave set, not on arrival order
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn pave_merge_is_order_independent(
        paves in prop::collection::vec(arb_pave(), 0..20),
        rotate in 0usize..20,
    ) {
        let forward = merge_paves(&paves, &x_axis(), 1e-7, tolerance_of);
        let mut shuffled = paves.clone();
        shuffled.reverse();
        if !shuffled.is_empty() {
            let k = rotate % shuffled.len();
            shuffled.rotate_left(k);
        }
        let other = merge_paves(&shuffled, &x_axis(), 1e-7, tolerance_of);
        prop_assert_eq!(forward, other);
    }
}

// ---------------------------------------------------------------------------
// 2. Merging merged paves changes nothing
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn pave_merge_is_idempotent(paves in prop::collection::vec(arb_pave(), 0..20)) {
        let uniform = |v: usize| (v, 1e-4);
        let once = merge_paves(&paves, &x_axis(), 1e-7, uniform);
        let again_input: Vec<Pave> = once
            .iter()
            .map(|m| Pave::new(m.vertex, m.param, PaveSource::EdgeEdge))
            .collect();
        let twice = merge_paves(&again_input, &x_axis(), 1e-7, uniform);
        prop_assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(&twice) {
            prop_assert_eq!(a.vertex, b.vertex);
            prop_assert!((a.param - b.param).abs() < TOL);
        }
        prop_assert!(once.windows(2).all(|w| w[0].param <= w[1].param));
    }
}

// ---------------------------------------------------------------------------
// 3. Boxes have the expected unique sub-shapes, wherever they are
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn box_sub_shape_counts((min, max) in arb_grid_box(), (dx, dy, dz) in arb_translation()) {
        let mut store = ShapeStore::new();
        let b = make_box(&mut store, min, max).unwrap();
        let moved = store.transformed(b, &Transform::translation(dx, dy, dz)).unwrap();
        for shape in [b, moved] {
            let vertices = IndexedShapeMap::from_shape(&store, shape, ShapeKind::Vertex);
            let edges = IndexedShapeMap::from_shape(&store, shape, ShapeKind::Edge);
            let faces = IndexedShapeMap::from_shape(&store, shape, ShapeKind::Face);
            prop_assert_eq!(vertices.len(), 8);
            prop_assert_eq!(edges.len(), 12);
            prop_assert_eq!(faces.len(), 6);
            // V - E + F = 2
            prop_assert_eq!(vertices.len() as i64 - edges.len() as i64 + faces.len() as i64, 2);
            for (i, s) in edges.iter() {
                prop_assert_eq!(edges.index_of(s.id), Some(i));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// 4. Bounding box covers every vertex
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn bounding_box_contains_vertices((min, max) in arb_grid_box(), angle in -3.0f64..3.0) {
        let mut store = ShapeStore::new();
        let b = make_box(&mut store, min, max).unwrap();
        let turned = store.transformed(b, &Transform::rotation(Vec3::Z, angle)).unwrap();
        let bb: BoundingBox = brep_kernel::topology::properties::bounding_box(&store, turned).unwrap();
        for v in Explorer::new(&store, turned, ShapeKind::Vertex) {
            let p = store.vertex(v.id).unwrap().point;
            prop_assert!(bb.contains_point(&p));
        }
    }
}

// ---------------------------------------------------------------------------
// 5. Boolean volumes add up: |A ∪ B| = |A| + |B| - |A ∩ B|, |A - B| = |A| - |A ∩ B|
// ---------------------------------------------------------------------------

/// Run `op` and return the result volume, failing on an invalid result.
fn checked_volume(store: &mut ShapeStore, a: Shape, b: Shape, op: BooleanOp) -> Result<f64, TestCaseError> {
    let r: BooleanResult = boolean_op(store, a, b, op, &BooleanOptions::sequential()).unwrap();
    prop_assert!(!r.report.has_code(AlertCode::ResultInvalid), "{:?}: {}", op, r.report);
    prop_assert!(!r.report.has_local_failures(), "{:?}: {}", op, r.report);
    Ok(solid_volume(store, r.shape).unwrap())
}

fn box_volume((lo, hi): (Point3d, Point3d)) -> f64 {
    (hi.x - lo.x) * (hi.y - lo.y) * (hi.z - lo.z)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]
    #[test]
    fn boolean_volumes_are_complementary(a in arb_grid_box(), b in arb_grid_box()) {
        let volume = |op: BooleanOp| -> Result<f64, TestCaseError> {
            let mut store = ShapeStore::new();
            let sa = make_box(&mut store, a.0, a.1).unwrap();
            let sb = make_box(&mut store, b.0, b.1).unwrap();
            checked_volume(&mut store, sa, sb, op)
        };
        let (va, vb) = (box_volume(a), box_volume(b));
        let common = volume(BooleanOp::Common)?;
        let fuse = volume(BooleanOp::Fuse)?;
        let cut = volume(BooleanOp::Cut)?;
        prop_assert!(common >= -TOL && common <= va.min(vb) + TOL);
        prop_assert!((fuse - (va + vb - common)).abs() < 1e-6, "fuse {} vs {}", fuse, va + vb - common);
        prop_assert!((cut - (va - common)).abs() < 1e-6, "cut {} vs {}", cut, va - common);
    }
}

// ---------------------------------------------------------------------------
// 6. Same identities with a non-convex operand: an L-shaped fuse result
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]
    #[test]
    fn l_shaped_operand_volumes_are_complementary(c in arb_grid_box()) {
        let leg = (Point3d::new(0.0, 0.0, 0.0), Point3d::new(2.0, 0.5, 1.0));
        let foot = (Point3d::new(0.0, 0.5, 0.0), Point3d::new(0.5, 2.0, 1.0));
        let volume = |op: BooleanOp| -> Result<f64, TestCaseError> {
            let mut store = ShapeStore::new();
            let l1 = make_box(&mut store, leg.0, leg.1).unwrap();
            let l2 = make_box(&mut store, foot.0, foot.1).unwrap();
            let l = boolean_op(&mut store, l1, l2, BooleanOp::Fuse, &BooleanOptions::sequential()).unwrap().shape;
            let sc = make_box(&mut store, c.0, c.1).unwrap();
            checked_volume(&mut store, l, sc, op)
        };
        let (vl, vc) = (box_volume(leg) + box_volume(foot), box_volume(c));
        let common = volume(BooleanOp::Common)?;
        let fuse = volume(BooleanOp::Fuse)?;
        let cut = volume(BooleanOp::Cut)?;
        prop_assert!(common >= -TOL && common <= vl.min(vc) + TOL);
        prop_assert!((fuse - (vl + vc - common)).abs() < 1e-6, "fuse {} vs {}", fuse, vl + vc - common);
        prop_assert!((cut - (vl - common)).abs() < 1e-6, "cut {} vs {}", cut, vl - common);
    }
}

// ---------------------------------------------------------------------------
// 7. Crossing cylinders, whose section curves are traced
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(4))]
    #[test]
    fn crossing_cylinder_volumes_are_complementary(offset in -0.15f64..0.15, radius in 0.2f64..0.35) {
        let volume = |op: BooleanOp| -> Result<f64, TestCaseError> {
            let mut store = ShapeStore::new();
            let a = make_cylinder(&mut store, Point3d::new(0.0, 0.0, -1.0), Vec3::Z, 0.5, 2.0).unwrap();
            let b = make_cylinder(&mut store, Point3d::new(-1.0, offset, 0.0), Vec3::X, radius, 2.0).unwrap();
            checked_volume(&mut store, a, b, op)
        };
        let va = std::f64::consts::PI * 0.25 * 2.0;
        let vb = std::f64::consts::PI * radius * radius * 2.0;
        let common = volume(BooleanOp::Common)?;
        let fuse = volume(BooleanOp::Fuse)?;
        let cut = volume(BooleanOp::Cut)?;
        prop_assert!(common > 0.0 && common < vb, "common {}", common);
        prop_assert!((fuse - (va + vb - common)).abs() < 1e-2 * fuse, "fuse {} vs {}", fuse, va + vb - common);
        prop_assert!((cut - (va - common)).abs() < 1e-2 * va, "cut {} vs {}", cut, va - common);
    }
}
