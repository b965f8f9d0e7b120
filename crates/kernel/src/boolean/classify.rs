//! Point and face-piece classification against an argument solid.

use std::collections::BTreeMap;

use tracing::{debug, info, instrument};

use crate::geometry::intersection::{ray_surface, Ray};
use crate::geometry::point::{Point2d, Point3d};
use crate::geometry::transform::BoundingBox;
use crate::geometry::vector::Vec3;
use crate::topology::explorer::unique_subshapes;
use crate::topology::pcurve::{uv_tolerance, FaceUv, UvState};
use crate::topology::properties::bounding_box;
use crate::topology::{Explorer, Shape, ShapeId, ShapeKind, ShapeStore};

use super::ds::DataStructure;
use super::face_builder::FaceImages;
use super::filler::collect_parallel;
use super::options::BooleanOptions;
use super::report::{AlertCode, BooleanError, Report, Stage};

/// Rays whose angle with the hit surface is below this (as |cos|) abstain.
const GRAZING: f64 = 1e-3;
/// Non-abstaining rays needed before the vote is taken.
const VOTES: usize = 5;

/// Classification of a point relative to a solid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointState {
    In,
    Out,
    On,
}

/// Classification of a face piece relative to the other argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaceState {
    In,
    Out,
    /// Coincides with a piece of the other argument, normals agreeing.
    OnSame,
    /// Coincides with a piece of the other argument, normals opposed.
    OnOpposite,
}

// ─── Solid Classifier ────────────────────────────────────────────────────────

/// Ray-casting classifier over the faces of one solid argument.
#[derive(Debug, Clone)]
pub struct SolidClassifier {
    faces: Vec<FaceUv>,
    bbox: BoundingBox,
    tolerance: f64,
}

impl SolidClassifier {
    /// `None` when `shape` holds no solid.
    pub fn new(store: &ShapeStore, shape: Shape, fuzzy: f64) -> Result<Option<Self>, BooleanError> {
        if Explorer::new(store, shape, ShapeKind::Solid).next().is_none() {
            return Ok(None);
        }
        Self::from_faces(store, &unique_subshapes(store, shape, ShapeKind::Face), fuzzy).map(Some)
    }

    /// Classifier over a bare set of faces, taken as a closed boundary.
    pub fn from_faces(store: &ShapeStore, faces: &[Shape], fuzzy: f64) -> Result<Self, BooleanError> {
        let mut domains = Vec::with_capacity(faces.len());
        let mut bbox = BoundingBox::empty();
        let mut tolerance: f64 = 0.0;
        for f in faces {
            tolerance = tolerance.max(store.tolerance(f.id)?);
            bbox.merge(&bounding_box(store, *f)?);
            domains.push(FaceUv::new(store, f.id)?);
        }
        Ok(Self {
            faces: domains,
            bbox,
            tolerance: tolerance + fuzzy,
        })
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    fn on_face(&self, face: &FaceUv, p: &Point3d, tol: f64) -> bool {
        let ((u, v), d) = face.surface.project_point(p);
        if d > tol {
            return false;
        }
        let uv = Point2d::new(u, v);
        face.classify(uv, uv_tolerance(&face.surface, uv, tol)) != UvState::Outside
    }

    /// Crossings of one ray, or `None` when the ray grazes a face or runs
    /// through a face boundary.
    fn crossings(&self, ray: &Ray, t_max: f64, tol: f64) -> Option<usize> {
        let mut ts = Vec::new();
        for face in &self.faces {
            for t in ray_surface(ray, &face.surface, t_max) {
                if t <= tol {
                    continue;
                }
                let hit = ray.at(t);
                let (u, v) = face.surface.parameters_of(&hit);
                let uv = Point2d::new(u, v);
                match face.classify(uv, uv_tolerance(&face.surface, uv, tol)) {
                    UvState::Outside => continue,
                    UvState::Boundary => return None,
                    UvState::Inside => {}
                }
                if face.surface.normal_at(u, v).dot(&ray.direction).abs() < GRAZING {
                    return None;
                }
                ts.push(t);
            }
        }
        Some(deduplicate_crossings(&mut ts, tol))
    }

    /// Classify `p`; `None` when too few rays give a clean answer.
    pub fn classify(&self, p: &Point3d) -> Option<PointState> {
        let tol = self.tolerance;
        if self.faces.iter().any(|f| self.on_face(f, p, tol)) {
            return Some(PointState::On);
        }
        if !self.bbox.expanded(tol).contains_point(p) {
            return Some(PointState::Out);
        }
        let t_max = 2.0 * (p.distance_to(&self.bbox.center()) + self.bbox.diagonal()) + 1.0;
        let (mut inside, mut outside) = (0, 0);
        for dir in directions() {
            if inside + outside == VOTES {
                break;
            }
            match self.crossings(&Ray::new(*p, dir), t_max, tol) {
                Some(n) if n % 2 == 1 => inside += 1,
                Some(_) => outside += 1,
                None => {}
            }
        }
        match inside.cmp(&outside) {
            std::cmp::Ordering::Greater => Some(PointState::In),
            std::cmp::Ordering::Less => Some(PointState::Out),
            std::cmp::Ordering::Equal => None,
        }
    }
}

/// Axis rays first, then skewed ones to replace abstentions.
fn directions() -> [Vec3; 9] {
    [
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(0.0, 1.0, 0.0),
        Vec3::new(0.0, 0.0, 1.0),
        Vec3::new(1.0, 1.0, 1.0),
        Vec3::new(-1.0, 0.5, 0.3),
        Vec3::new(0.31, -0.72, 0.62),
        Vec3::new(-0.57, -0.21, -0.79),
        Vec3::new(0.83, 0.47, -0.29),
        Vec3::new(-0.13, 0.91, -0.39),
    ]
}

/// Sort hit parameters and merge clusters within `tolerance` of each other.
/// Returns the number of distinct crossings.
fn deduplicate_crossings(ts: &mut [f64], tolerance: f64) -> usize {
    if ts.is_empty() {
        return 0;
    }
    ts.sort_by(f64::total_cmp);
    let mut count = 1;
    let mut last = ts[0];
    for &t in ts.iter().skip(1) {
        if (t - last).abs() > tolerance {
            count += 1;
        }
        last = t;
    }
    count
}

// ─── Face Pieces ─────────────────────────────────────────────────────────────

/// Classify a piece that has no same-domain partner by a point well
/// inside it. A point landing on the other solid's boundary is moved a
/// little into the piece's own material and tried again.
fn classify_piece(
    store: &ShapeStore,
    ds: &DataStructure,
    classifier: &SolidClassifier,
    f: usize,
    piece: ShapeId,
) -> Result<Option<FaceState>, BooleanError> {
    let domain = FaceUv::new(store, piece)?;
    let Some(uv) = domain.interior_point() else {
        return Ok(None);
    };
    let p = domain.surface.evaluate(uv.x, uv.y);
    let state = match classifier.classify(&p) {
        Some(PointState::On) => {
            let normal = domain.surface.normal_at(uv.x, uv.y) * ds.shape(f).orientation.sign();
            let step = (50.0 * classifier.tolerance()).max(1e-6 * classifier.bbox.diagonal());
            classifier.classify(&(p - normal * step))
        }
        other => other,
    };
    Ok(match state {
        Some(PointState::In) => Some(FaceState::In),
        Some(PointState::Out) => Some(FaceState::Out),
        _ => None,
    })
}

/// State of every face piece of every argument. Pieces of an argument
/// classified against a non-solid are `Out`; ambiguous pieces are reported
/// and taken as `Out`.
#[instrument(skip_all)]
pub fn classify_pieces(
    store: &ShapeStore,
    ds: &DataStructure,
    faces: &FaceImages,
    options: &BooleanOptions,
    report: &mut Report,
) -> Result<BTreeMap<ShapeId, FaceState>, BooleanError> {
    let classifiers = ds
        .arguments
        .iter()
        .map(|&arg| SolidClassifier::new(store, arg, options.fuzzy_value))
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = BTreeMap::new();
    let mut pending = Vec::new();
    for (&f, pieces) in &faces.pieces {
        for &piece in pieces {
            match faces.same_domain.get(&piece) {
                Some((_, true)) => {
                    out.insert(piece, FaceState::OnSame);
                }
                Some((_, false)) => {
                    out.insert(piece, FaceState::OnOpposite);
                }
                None => pending.push((f, piece)),
            }
        }
    }

    let states = collect_parallel(options, &pending, |&(f, piece)| {
        let other = ds.rank(f).and_then(|r| classifiers.iter().enumerate().find(|(i, _)| *i != r));
        let state = match other {
            Some((_, Some(classifier))) => classify_piece(store, ds, classifier, f, piece),
            _ => Ok(Some(FaceState::Out)),
        };
        Some((piece, state))
    });
    options.check_cancel(Stage::Select)?;

    let mut ambiguous = 0;
    for (piece, state) in states {
        let state = match state? {
            Some(s) => s,
            None => {
                ambiguous += 1;
                report.warning(
                    AlertCode::ClassificationAmbiguous,
                    Stage::Select,
                    vec![piece],
                    "no clean ray vote; piece taken as outside",
                );
                FaceState::Out
            }
        };
        out.insert(piece, state);
    }
    debug!(pieces = out.len(), ambiguous, "classified pieces");
    info!(
        inside = out.values().filter(|s| **s == FaceState::In).count(),
        on = out.values().filter(|s| matches!(s, FaceState::OnSame | FaceState::OnOpposite)).count(),
        "classification finished"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::primitives::{make_box, make_sphere};

    fn box_classifier(store: &mut ShapeStore) -> SolidClassifier {
        let b = make_box(store, Point3d::ORIGIN, Point3d::new(10.0, 10.0, 10.0)).unwrap();
        SolidClassifier::new(store, b, 0.0).unwrap().unwrap()
    }

    #[test]
    fn test_classify_point_inside_box() {
        let mut store = ShapeStore::new();
        let c = box_classifier(&mut store);
        assert_eq!(c.classify(&Point3d::new(5.0, 5.0, 5.0)), Some(PointState::In));
        // off-center point whose axis rays stay clear of edges
        assert_eq!(c.classify(&Point3d::new(2.3, 7.1, 4.4)), Some(PointState::In));
    }

    #[test]
    fn test_classify_point_outside_box() {
        let mut store = ShapeStore::new();
        let c = box_classifier(&mut store);
        assert_eq!(c.classify(&Point3d::new(20.0, 20.0, 20.0)), Some(PointState::Out));
        assert_eq!(c.classify(&Point3d::new(5.0, 5.0, 10.5)), Some(PointState::Out));
    }

    #[test]
    fn test_classify_point_on_box_face() {
        let mut store = ShapeStore::new();
        let c = box_classifier(&mut store);
        assert_eq!(c.classify(&Point3d::new(5.0, 5.0, 10.0)), Some(PointState::On));
        assert_eq!(c.classify(&Point3d::new(0.0, 0.0, 3.0)), Some(PointState::On));
    }

    #[test]
    fn test_classify_point_in_sphere() {
        let mut store = ShapeStore::new();
        let s = make_sphere(&mut store, Point3d::new(1.0, 1.0, 1.0), 2.0).unwrap();
        let c = SolidClassifier::new(&store, s, 0.0).unwrap().unwrap();
        assert_eq!(c.classify(&Point3d::new(1.2, 0.9, 1.4)), Some(PointState::In));
        assert_eq!(c.classify(&Point3d::new(2.5, 2.5, 2.5)), Some(PointState::Out));
        assert_eq!(c.classify(&Point3d::new(3.0, 1.0, 1.0)), Some(PointState::On));
    }

    #[test]
    fn test_deduplicate_crossings_basic() {
        let mut ts = vec![];
        assert_eq!(deduplicate_crossings(&mut ts, 1e-7), 0);

        let mut ts = vec![1.0];
        assert_eq!(deduplicate_crossings(&mut ts, 1e-7), 1);

        let mut ts = vec![5.0, 1.0];
        assert_eq!(deduplicate_crossings(&mut ts, 1e-7), 2);

        // coplanar pieces hit at the same t count once
        let mut ts = vec![1.0, 1.0 + 1e-10, 5.0];
        assert_eq!(deduplicate_crossings(&mut ts, 1e-7), 2);

        let mut ts = vec![3.0, 3.0 + 1e-10, 3.0 + 2e-10, 3.0 + 3e-10];
        assert_eq!(deduplicate_crossings(&mut ts, 1e-7), 1);
    }

    #[test]
    fn test_non_solid_has_no_classifier() {
        let mut store = ShapeStore::new();
        let b = make_box(&mut store, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0)).unwrap();
        let face = Explorer::new(&store, b, ShapeKind::Face).next().unwrap();
        assert!(SolidClassifier::new(&store, face, 0.0).unwrap().is_none());
    }
}
