//! Group selected face occurrences into shells and shells into solids.

use std::collections::{BTreeMap, VecDeque};
use std::f64::consts::TAU;

use tracing::{debug, info, instrument};

use crate::geometry::point::Point3d;
use crate::geometry::vector::Vec3;
use crate::topology::pcurve::FaceUv;
use crate::topology::properties::solid_volume;
use crate::topology::{Explorer, Orientation, Shape, ShapeId, ShapeKind, ShapeStore};

use super::classify::{PointState, SolidClassifier};
use super::options::BooleanOptions;
use super::report::{AlertCode, BooleanError, Report, Stage};

/// A connected set of faces, oriented so shared edges run oppositely.
#[derive(Debug, Clone)]
pub struct ShellPlan {
    pub faces: Vec<Shape>,
    pub closed: bool,
}

/// Non-degenerate edge uses of one face occurrence.
fn edge_uses(store: &ShapeStore, face: Shape) -> Vec<Shape> {
    Explorer::new(store, face, ShapeKind::Edge)
        .filter(|e| !store.is_degenerate(e.id))
        .collect()
}

/// Point, tangent along the use, and the direction pointing into the face
/// across the edge, plus the face normal there.
struct EdgeFrame {
    tangent: Vec3,
    inward: Vec3,
    normal: Vec3,
}

fn edge_frame(store: &ShapeStore, face: Shape, edge: Shape) -> Result<Option<EdgeFrame>, BooleanError> {
    let (curve, (t0, t1)) = store.edge_curve(edge.id)?;
    let t = 0.5 * (t0 + t1);
    let p: Point3d = curve.evaluate(t);
    let Some(tangent) = (curve.derivative(t) * edge.orientation.sign()).normalized() else {
        return Ok(None);
    };
    let surface = store.face_surface(face.id)?;
    let ((u, v), _) = surface.project_point(&p);
    let normal = surface.normal_at(u, v) * face.orientation.sign();
    Ok(normal.cross(&tangent).normalized().map(|inward| EdgeFrame {
        tangent,
        inward,
        normal,
    }))
}

/// Rotation, in `(0, 2π]`, from `from`'s face into its material up to the
/// face holding `to` around their common edge.
fn material_angle(from: &EdgeFrame, to: &EdgeFrame) -> f64 {
    let x = from.inward;
    let y = -from.normal;
    let d = to.inward - from.tangent * to.inward.dot(&from.tangent);
    let a = d.dot(&y).atan2(d.dot(&x));
    if a <= 1e-12 { a + TAU } else { a }
}

fn flip(shape: Shape, reversed: bool) -> Shape {
    if reversed { shape.reversed() } else { shape }
}

/// Whether every non-degenerate edge is used once in each direction.
fn is_closed(store: &ShapeStore, faces: &[Shape]) -> bool {
    let mut uses: BTreeMap<ShapeId, (usize, usize)> = BTreeMap::new();
    for &f in faces {
        for e in edge_uses(store, f) {
            let entry = uses.entry(e.id).or_default();
            match e.orientation {
                Orientation::Reversed => entry.1 += 1,
                _ => entry.0 += 1,
            }
        }
    }
    !uses.is_empty() && uses.values().all(|&c| c == (1, 1))
}

// ─── Shells ──────────────────────────────────────────────────────────────────

/// Connected components over shared edges. At an edge with more than two
/// faces the neighbour is the first face met rotating into the material.
#[instrument(skip_all, fields(faces = faces.len()))]
pub fn build_shells(store: &ShapeStore, faces: &[Shape]) -> Result<Vec<ShellPlan>, BooleanError> {
    let uses: Vec<Vec<Shape>> = faces.iter().map(|&f| edge_uses(store, f)).collect();
    let mut by_edge: BTreeMap<ShapeId, Vec<usize>> = BTreeMap::new();
    for (i, edges) in uses.iter().enumerate() {
        for e in edges {
            let list = by_edge.entry(e.id).or_default();
            if !list.contains(&i) {
                list.push(i);
            }
        }
    }

    let mut shell_of: Vec<Option<usize>> = vec![None; faces.len()];
    let mut reversed = vec![false; faces.len()];
    let mut shells = Vec::new();
    for seed in 0..faces.len() {
        if shell_of[seed].is_some() {
            continue;
        }
        let id = shells.len();
        shell_of[seed] = Some(id);
        let mut members = vec![seed];
        let mut queue = VecDeque::from([seed]);
        while let Some(i) = queue.pop_front() {
            let face = flip(faces[i], reversed[i]);
            for e in &uses[i] {
                let edge = flip(*e, reversed[i]);
                let candidates: Vec<usize> = by_edge[&e.id]
                    .iter()
                    .copied()
                    .filter(|&j| j != i && shell_of[j].is_none_or(|s| s == id))
                    .collect();
                let next = match candidates.as_slice() {
                    [] => None,
                    [only] => Some(*only),
                    _ => {
                        let Some(from) = edge_frame(store, face, edge)? else {
                            continue;
                        };
                        let mut best: Option<(f64, usize)> = None;
                        for &j in &candidates {
                            let use_j = uses[j].iter().find(|u| u.id == e.id).copied();
                            let Some(use_j) = use_j else { continue };
                            if let Some(to) = edge_frame(store, faces[j], use_j)? {
                                let a = material_angle(&from, &to);
                                if best.is_none_or(|(b, _)| a < b) {
                                    best = Some((a, j));
                                }
                            }
                        }
                        best.map(|(_, j)| j)
                    }
                };
                let Some(j) = next else { continue };
                if shell_of[j].is_some() {
                    continue;
                }
                // the neighbour must use the edge the other way round
                let same_way = uses[j]
                    .iter()
                    .find(|u| u.id == e.id)
                    .is_some_and(|u| u.orientation == edge.orientation);
                reversed[j] = same_way;
                shell_of[j] = Some(id);
                members.push(j);
                queue.push_back(j);
            }
        }
        let oriented: Vec<Shape> = members.iter().map(|&i| flip(faces[i], reversed[i])).collect();
        let closed = is_closed(store, &oriented);
        shells.push(ShellPlan { faces: oriented, closed });
    }
    let flipped = reversed.iter().filter(|r| **r).count();
    info!(shells = shells.len(), flipped, "built shells");
    Ok(shells)
}

// ─── Solids ──────────────────────────────────────────────────────────────────

/// Make solids from closed shells: positive volume shells are outer
/// boundaries, negative ones voids placed in the smallest outer shell
/// around them. Open shells are kept as bare shells.
#[instrument(skip_all, fields(shells = shells.len()))]
pub fn build_solids(
    store: &mut ShapeStore,
    shells: Vec<ShellPlan>,
    options: &BooleanOptions,
    report: &mut Report,
) -> Result<Vec<Shape>, BooleanError> {
    let mut outers = Vec::new();
    let mut voids = Vec::new();
    let mut out = Vec::new();
    for plan in shells {
        let shell = store.make_shell(plan.faces.clone())?;
        if !plan.closed {
            report.local_failure(
                AlertCode::OpenShell,
                Stage::BuildSolids,
                vec![shell.id],
                format!("shell of {} face(s) has free edges", plan.faces.len()),
            );
            out.push(shell);
            continue;
        }
        let volume = solid_volume(store, shell)?;
        debug!(faces = plan.faces.len(), volume, "closed shell");
        if volume >= 0.0 {
            outers.push((shell, volume, plan.faces));
        } else {
            voids.push((shell, plan.faces));
        }
    }
    options.check_cancel(Stage::BuildSolids)?;

    let classifiers = outers
        .iter()
        .map(|(_, _, faces)| SolidClassifier::from_faces(store, faces, options.fuzzy_value))
        .collect::<Result<Vec<_>, _>>()?;
    let mut holes: Vec<Vec<Shape>> = vec![Vec::new(); outers.len()];
    for (void, faces) in voids {
        let probe = faces.iter().find_map(|f| {
            let domain = FaceUv::new(store, f.id).ok()?;
            let uv = domain.interior_point()?;
            Some(domain.surface.evaluate(uv.x, uv.y))
        });
        let host = probe.and_then(|p| {
            classifiers
                .iter()
                .enumerate()
                .filter(|(_, c)| c.classify(&p) == Some(PointState::In))
                .min_by(|(a, _), (b, _)| outers[*a].1.total_cmp(&outers[*b].1))
                .map(|(i, _)| i)
        });
        match host {
            Some(i) => holes[i].push(void),
            None => report.local_failure(
                AlertCode::OrphanVoid,
                Stage::BuildSolids,
                vec![void.id],
                "void shell lies in no outer shell",
            ),
        }
    }

    for ((outer, _, _), inner) in outers.into_iter().zip(holes) {
        let mut shells = vec![outer];
        shells.extend(inner);
        out.push(store.make_solid(shells)?);
    }
    info!(parts = out.len(), "built solids");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::primitives::make_box;
    use approx::assert_relative_eq;

    fn box_faces(store: &mut ShapeStore, min: Point3d, max: Point3d) -> Vec<Shape> {
        let b = make_box(store, min, max).unwrap();
        Explorer::new(store, b, ShapeKind::Face).collect()
    }

    #[test]
    fn test_box_faces_make_one_closed_shell() {
        let mut store = ShapeStore::new();
        let faces = box_faces(&mut store, Point3d::ORIGIN, Point3d::new(1.0, 2.0, 3.0));
        let shells = build_shells(&store, &faces).unwrap();
        assert_eq!(shells.len(), 1);
        assert!(shells[0].closed);
        let mut report = Report::new();
        let solids = build_solids(&mut store, shells, &BooleanOptions::sequential(), &mut report).unwrap();
        assert_eq!(solids.len(), 1);
        assert_relative_eq!(solid_volume(&store, solids[0]).unwrap(), 6.0, epsilon = 1e-9);
        assert!(report.is_empty());
    }

    #[test]
    fn test_reversed_face_is_flipped_back() {
        let mut store = ShapeStore::new();
        let mut faces = box_faces(&mut store, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0));
        faces[3] = faces[3].reversed();
        let shells = build_shells(&store, &faces).unwrap();
        assert_eq!(shells.len(), 1);
        assert!(shells[0].closed);
        assert_eq!(shells[0].faces[0], faces[0]);
    }

    #[test]
    fn test_missing_face_is_an_open_shell() {
        let mut store = ShapeStore::new();
        let mut faces = box_faces(&mut store, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0));
        faces.pop();
        let shells = build_shells(&store, &faces).unwrap();
        assert!(!shells[0].closed);
        let mut report = Report::new();
        let parts = build_solids(&mut store, shells, &BooleanOptions::sequential(), &mut report).unwrap();
        assert_eq!(store.kind(parts[0].id).unwrap(), ShapeKind::Shell);
        assert!(report.has_code(AlertCode::OpenShell));
    }

    #[test]
    fn test_inner_reversed_box_becomes_a_void() {
        let mut store = ShapeStore::new();
        let mut faces = box_faces(&mut store, Point3d::ORIGIN, Point3d::new(4.0, 4.0, 4.0));
        let inner = box_faces(&mut store, Point3d::new(1.0, 1.0, 1.0), Point3d::new(2.0, 2.0, 2.0));
        faces.extend(inner.into_iter().map(Shape::reversed));
        let shells = build_shells(&store, &faces).unwrap();
        assert_eq!(shells.len(), 2);
        let mut report = Report::new();
        let solids = build_solids(&mut store, shells, &BooleanOptions::sequential(), &mut report).unwrap();
        assert_eq!(solids.len(), 1);
        assert_relative_eq!(solid_volume(&store, solids[0]).unwrap(), 63.0, epsilon = 1e-9);
    }

    #[test]
    fn test_material_angle_of_convex_corner() {
        let from = EdgeFrame {
            tangent: Vec3::new(-1.0, 0.0, 0.0),
            inward: Vec3::new(0.0, -1.0, 0.0),
            normal: Vec3::new(0.0, 0.0, 1.0),
        };
        let side = EdgeFrame {
            tangent: Vec3::new(1.0, 0.0, 0.0),
            inward: Vec3::new(0.0, 0.0, -1.0),
            normal: Vec3::new(0.0, 1.0, 0.0),
        };
        let beyond = EdgeFrame {
            tangent: Vec3::new(1.0, 0.0, 0.0),
            inward: Vec3::new(0.0, 1.0, 0.0),
            normal: Vec3::new(0.0, 0.0, 1.0),
        };
        assert_relative_eq!(material_angle(&from, &side), std::f64::consts::FRAC_PI_2, epsilon = 1e-12);
        assert_relative_eq!(material_angle(&from, &beyond), std::f64::consts::PI, epsilon = 1e-12);
    }
}
