//! Face/face interferences: coincident faces and section curves.

use std::collections::BTreeSet;
use std::f64::consts::TAU;

use tracing::{debug, info, warn};

use crate::geometry::curves::{Curve, Line3d, Polyline3d};
use crate::geometry::marching::{march, project_to_both, seed_points, MarchOptions};
use crate::geometry::point::Point3d;
use crate::geometry::surface_intersection::{intersect_surfaces, SurfaceIntersection};
use crate::geometry::surfaces::Surface;
use crate::geometry::transform::BoundingBox;
use crate::topology::pcurve::UvState;
use crate::topology::{ShapeKind, ShapeStore};
use crate::Tolerance;

use super::super::ds::{BlockOwner, DataStructure, Interference, PaveBlock, SectionCurve};
use super::super::pave::{merge_paves, Pave, PaveSource};
use super::super::report::{AlertCode, BooleanError, Stage};
use super::edge::point_state;
use super::{collect_parallel, FaceDomains, PaveFiller};

const SEED_GRID: usize = 24;

#[derive(Debug, Clone)]
pub(crate) enum FaceFaceHit {
    /// Both faces lie on one surface.
    SameDomain,
    /// Intersection curves bounded to the common box.
    Curves {
        curves: Vec<(Curve, (f64, f64))>,
        tolerance: f64,
        /// Seeds were found but no branch could be traced.
        stalled: bool,
    },
}

fn common_box(a: &BoundingBox, b: &BoundingBox) -> Option<BoundingBox> {
    let min = Point3d::new(a.min.x.max(b.min.x), a.min.y.max(b.min.y), a.min.z.max(b.min.z));
    let max = Point3d::new(a.max.x.min(b.max.x), a.max.y.min(b.max.y), a.max.z.min(b.max.z));
    (min.x <= max.x && min.y <= max.y && min.z <= max.z).then(|| BoundingBox::new(min, max))
}

/// Parameter interval of `line` inside `bbox` (slab method).
fn clip_line(line: &Line3d, bbox: &BoundingBox) -> Option<(f64, f64)> {
    let o = [line.origin.x, line.origin.y, line.origin.z];
    let d = [line.direction.x, line.direction.y, line.direction.z];
    let lo = [bbox.min.x, bbox.min.y, bbox.min.z];
    let hi = [bbox.max.x, bbox.max.y, bbox.max.z];
    let (mut t0, mut t1) = (f64::NEG_INFINITY, f64::INFINITY);
    for k in 0..3 {
        if d[k].abs() < 1e-15 {
            if o[k] < lo[k] || o[k] > hi[k] {
                return None;
            }
        } else {
            let (a, b) = ((lo[k] - o[k]) / d[k], (hi[k] - o[k]) / d[k]);
            t0 = t0.max(a.min(b));
            t1 = t1.min(a.max(b));
        }
    }
    (t1 > t0).then_some((t0, t1))
}

fn curve_range(curve: &Curve, bbox: &BoundingBox) -> Option<(f64, f64)> {
    match curve {
        Curve::Line(line) => clip_line(line, bbox),
        Curve::Circle(_) | Curve::Ellipse(_) => Some((0.0, TAU)),
        Curve::Polyline(p) => Some((0.0, p.last_parameter())),
    }
}

/// Largest distance from either surface over the chord midpoints of a
/// traced branch.
fn chord_deviation(s1: &Surface, s2: &Surface, poly: &Polyline3d) -> f64 {
    poly.points
        .windows(2)
        .map(|w| {
            let m = w[0].lerp(&w[1], 0.5);
            s1.signed_distance(&m).abs().max(s2.signed_distance(&m).abs())
        })
        .fold(0.0, f64::max)
}

/// Vertices already known to touch both faces (edge/face contacts and
/// shared boundary points), pulled onto the common locus.
fn contact_seeds(store: &ShapeStore, ds: &DataStructure, d1: &Surface, d2: &Surface, f1: usize, f2: usize, tol: f64) -> Vec<Point3d> {
    let known: BTreeSet<usize> = [f1, f2]
        .iter()
        .filter_map(|f| ds.face_info.get(f))
        .flat_map(|fi| fi.vertices_on.iter().chain(&fi.vertices_in))
        .map(|&v| ds.real_vertex(v))
        .collect();
    known
        .into_iter()
        .filter_map(|v| ds.vertex_data(store, v).ok())
        .filter(|(p, tv)| d1.signed_distance(p).abs() <= tv + tol && d2.signed_distance(p).abs() <= tv + tol)
        .filter_map(|(p, _)| project_to_both(d1, d2, &p, tol))
        .collect()
}

/// Intersect the surfaces of two faces inside their common box.
pub(crate) fn face_face(
    store: &ShapeStore,
    ds: &DataStructure,
    faces: &FaceDomains,
    f1: usize,
    f2: usize,
    fuzzy: f64,
) -> Option<FaceFaceHit> {
    let tol = store.tolerance(ds.id(f1)).ok()? + store.tolerance(ds.id(f2)).ok()? + fuzzy;
    let bbox = common_box(&ds.info(f1).bbox, &ds.info(f2).bbox)?.expanded(tol);
    let (d1, d2) = (faces.get(&f1)?, faces.get(&f2)?);
    let tolerance = Tolerance {
        coincidence: tol,
        ..Tolerance::default()
    };
    match intersect_surfaces(&d1.surface, &d2.surface, &tolerance) {
        SurfaceIntersection::Empty | SurfaceIntersection::Point(_) => None,
        SurfaceIntersection::Coincident => Some(FaceFaceHit::SameDomain),
        SurfaceIntersection::Curves(found) => {
            let curves: Vec<(Curve, (f64, f64))> = found
                .into_iter()
                .filter_map(|c| curve_range(&c, &bbox).map(|r| (c, r)))
                .collect();
            (!curves.is_empty()).then_some(FaceFaceHit::Curves {
                curves,
                tolerance: tol,
                stalled: false,
            })
        }
        SurfaceIntersection::NeedsMarching => {
            let (lo, hi) = d1.uv_bounds();
            let mut seeds = contact_seeds(store, ds, &d1.surface, &d2.surface, f1, f2, tol);
            seeds.extend(seed_points(&d1.surface, (lo.x, hi.x), (lo.y, hi.y), &d2.surface, SEED_GRID, tol));
            if seeds.is_empty() {
                return None;
            }
            let branches = march(&d1.surface, &d2.surface, &seeds, &MarchOptions::new(bbox, tol));
            let stalled = branches.is_empty();
            // section edges must cover the chords of the traced polyline
            let deviation = branches
                .iter()
                .map(|p| chord_deviation(&d1.surface, &d2.surface, p))
                .fold(0.0, f64::max);
            let section_tol = tol.max(deviation * 1.5);
            let curves = branches
                .into_iter()
                .map(|p| {
                    let last = p.last_parameter();
                    (Curve::Polyline(p), (0.0, last))
                })
                .collect();
            Some(FaceFaceHit::Curves {
                curves,
                tolerance: section_tol,
                stalled,
            })
        }
    }
}

impl PaveFiller<'_> {
    pub(super) fn perform_ff(&mut self) -> Result<(), BooleanError> {
        let pairs = self.pairs(ShapeKind::Face, ShapeKind::Face);
        let (store, ds, faces, fuzzy) = (&*self.store, &self.ds, &self.faces, self.fuzzy());
        let found = collect_parallel(self.options(), &pairs, |&(f1, f2)| {
            face_face(store, ds, faces, f1, f2, fuzzy).map(|hit| (f1, f2, hit))
        });
        self.options().check_cancel(Stage::FaceFace)?;

        let mut same_domain = 0;
        for (f1, f2, hit) in found {
            let (curves, tolerance, stalled) = match hit {
                FaceFaceHit::SameDomain => {
                    debug!(f1, f2, "same-domain faces");
                    same_domain += 1;
                    self.ds.interferences.push(Interference::FaceFace {
                        f1,
                        f2,
                        sections: Vec::new(),
                        same_domain: true,
                    });
                    continue;
                }
                FaceFaceHit::Curves {
                    curves,
                    tolerance,
                    stalled,
                } => (curves, tolerance, stalled),
            };
            if stalled {
                warn!(f1, f2, "marching found seeds but no branch");
                self.report.warning(
                    AlertCode::MarchingNotConverged,
                    Stage::FaceFace,
                    vec![self.ds.id(f1), self.ds.id(f2)],
                    "no intersection branch could be traced from the seeds",
                );
            }
            let mut sections = Vec::new();
            for (curve, range) in curves {
                let traced = matches!(curve, Curve::Polyline(_));
                let s = self.add_section(f1, f2, curve, range, tolerance)?;
                if !self.ds.sections[s].blocks.is_empty() {
                    sections.push(s);
                } else if traced {
                    warn!(f1, f2, section = s, "traced section kept no block");
                    self.report.warning(
                        AlertCode::IntersectionNotConverged,
                        Stage::FaceFace,
                        vec![self.ds.id(f1), self.ds.id(f2)],
                        "every block of a traced section fell outside the faces",
                    );
                }
            }
            if !sections.is_empty() {
                self.ds.interferences.push(Interference::FaceFace {
                    f1,
                    f2,
                    sections,
                    same_domain: false,
                });
            }
        }
        info!(
            pairs = pairs.len(),
            same_domain,
            sections = self.ds.sections.len(),
            "face/face"
        );
        Ok(())
    }

    /// Record a section curve of faces `f1`, `f2` and split it at the
    /// vertices of both faces lying on it.
    fn add_section(&mut self, f1: usize, f2: usize, curve: Curve, range: (f64, f64), tol: f64) -> Result<usize, BooleanError> {
        let s = self.ds.sections.len();
        self.ds.sections.push(SectionCurve {
            curve: curve.clone(),
            range,
            faces: (f1, f2),
            tolerance: tol,
            blocks: Vec::new(),
        });
        self.ds.section_paves.register(s);

        let candidates: BTreeSet<usize> = [f1, f2]
            .iter()
            .filter_map(|f| self.ds.face_info.get(f))
            .flat_map(|fi| fi.vertices_on.iter().chain(&fi.vertices_in))
            .map(|&v| self.ds.real_vertex(v))
            .collect();
        for &v in &candidates {
            let (p, tv) = self.ds.vertex_data(self.store, v)?;
            let (t, d) = curve.project_point(&p, range);
            if d <= tv + tol {
                self.ds.section_paves.add_pave(s, Pave::new(v, t, PaveSource::Section));
            }
        }

        if curve.is_closed_over(range) {
            self.close_section(s, f1, f2, &candidates)?;
        }

        let curve = self.ds.sections[s].curve.clone();
        let merged = {
            let (store, ds) = (&*self.store, &self.ds);
            merge_paves(&ds.section_paves.raw(s), &curve, tol, |v| {
                let rep = ds.real_vertex(v);
                (rep, store.tolerance(ds.id(rep)).unwrap_or(0.0))
            })
        };
        for m in merged.iter().filter(|m| m.members.len() > 1) {
            for &other in &m.members {
                self.ds.union(self.store, m.vertex, other);
            }
        }

        let existing: BTreeSet<usize> = self.ds.face_blocks(f1).union(&self.ds.face_blocks(f2)).copied().collect();
        for w in merged.windows(2) {
            let (a, b) = (&w[0], &w[1]);
            if curve.approximate_length((a.param, b.param), 8) <= tol {
                continue;
            }
            let (v1, v2) = (self.ds.real_vertex(a.vertex), self.ds.real_vertex(b.vertex));
            let mut mid = curve.evaluate(0.5 * (a.param + b.param));
            if let (Curve::Polyline(_), Some(d1), Some(d2)) = (&curve, self.faces.get(&f1), self.faces.get(&f2)) {
                mid = project_to_both(&d1.surface, &d2.surface, &mid, tol).unwrap_or(mid);
            }
            let outside = [f1, f2]
                .iter()
                .any(|&f| !matches!(point_state(&self.faces, f, &mid, tol), Some(UvState::Inside | UvState::Boundary)));
            if outside || self.duplicates_block(v1, v2, &mid, tol, &existing)? {
                continue;
            }
            let b = self.ds.add_block(PaveBlock {
                owner: BlockOwner::Section(s),
                v1,
                t1: a.param,
                v2,
                t2: b.param,
                common: None,
                image: None,
            });
            self.ds.face_info_mut(f1).section.insert(b);
            self.ds.face_info_mut(f2).section.insert(b);
        }
        Ok(s)
    }

    /// Give a closed section curve a start vertex so its single block has
    /// both ends.
    fn close_section(&mut self, s: usize, f1: usize, f2: usize, candidates: &BTreeSet<usize>) -> Result<(), BooleanError> {
        let (curve, range, tol) = {
            let sc = &self.ds.sections[s];
            (sc.curve.clone(), sc.range, sc.tolerance)
        };
        let raw = self.ds.section_paves.raw(s);
        let periodic = curve.period().is_some();
        match raw.first() {
            Some(first) if periodic => {
                let start = first.param;
                self.ds.sections[s].range = (start, start + TAU);
                self.ds
                    .section_paves
                    .add_pave(s, Pave::new(first.vertex, start + TAU, PaveSource::Section));
            }
            _ => {
                let extra: Vec<usize> = candidates.iter().copied().collect();
                let v = self.vertex_near(curve.evaluate(range.0), tol, &[], &extra)?;
                for f in [f1, f2] {
                    self.ds.face_info_mut(f).vertices_in.insert(v);
                }
                self.ds.section_paves.add_pave(s, Pave::new(v, range.0, PaveSource::Section));
                self.ds.section_paves.add_pave(s, Pave::new(v, range.1, PaveSource::Section));
            }
        }
        Ok(())
    }

    /// Whether a block between `v1` and `v2` through `mid` is already
    /// present among `existing`.
    fn duplicates_block(&self, v1: usize, v2: usize, mid: &Point3d, tol: f64, existing: &BTreeSet<usize>) -> Result<bool, BooleanError> {
        for &b in existing {
            let pb = &self.ds.blocks[b];
            let ends = (self.ds.real_vertex(pb.v1), self.ds.real_vertex(pb.v2));
            if ends != (v1, v2) && ends != (v2, v1) {
                continue;
            }
            let (c, tb) = self.ds.block_curve(self.store, b)?;
            let (_, d) = c.project_point(mid, pb.range());
            if d <= tb + tol {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boolean::options::BooleanOptions;
    use crate::geometry::vector::Vec3;
    use crate::geometry::surfaces::Cylinder;
    use crate::topology::primitives::{make_box, make_cylinder, make_sphere};

    fn crossing_cylinders(store: &mut ShapeStore) -> (crate::topology::Shape, crate::topology::Shape) {
        let a = make_cylinder(store, Point3d::new(0.0, 0.0, -1.0), Vec3::Z, 0.5, 2.0).unwrap();
        let b = make_cylinder(store, Point3d::new(-1.0, 0.1, 0.0), Vec3::X, 0.3, 2.0).unwrap();
        (a, b)
    }

    fn lateral_faces(filler: &PaveFiller<'_>) -> (usize, usize) {
        let lateral = |rank: usize| {
            filler
                .ds
                .indices_of(ShapeKind::Face)
                .find(|&f| {
                    filler.ds.rank(f) == Some(rank)
                        && matches!(filler.faces.get(&f).map(|d| &d.surface), Some(Surface::Cylinder(_)))
                })
                .unwrap()
        };
        (lateral(0), lateral(1))
    }

    #[test]
    fn test_clip_line_to_box() {
        let bbox = BoundingBox::new(Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0));
        let line = Line3d::new(Point3d::new(-1.0, 0.5, 0.5), Vec3::X);
        let (t0, t1) = clip_line(&line, &bbox).unwrap();
        assert!((t0 - 1.0).abs() < 1e-12 && (t1 - 2.0).abs() < 1e-12);
        let off = Line3d::new(Point3d::new(0.0, 2.0, 0.5), Vec3::X);
        assert!(clip_line(&off, &bbox).is_none());
    }

    #[test]
    fn test_coplanar_faces_are_same_domain() {
        let mut store = ShapeStore::new();
        let a = make_box(&mut store, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0)).unwrap();
        let b = make_box(&mut store, Point3d::new(0.5, 0.0, 0.0), Point3d::new(1.5, 1.0, 1.0)).unwrap();
        let opts = BooleanOptions::sequential();
        let mut filler = PaveFiller::new(&mut store, &[a, b], &opts).unwrap();
        filler.perform().unwrap();
        // y = 0, y = 1, z = 0 and z = 1 planes are shared
        assert_eq!(filler.ds.same_domain_pairs().len(), 4);
        assert!(filler.ds.sections.iter().all(|s| s.blocks.is_empty()));
    }

    #[test]
    fn test_poking_box_makes_sections() {
        let mut store = ShapeStore::new();
        let a = make_box(&mut store, Point3d::ORIGIN, Point3d::new(2.0, 2.0, 2.0)).unwrap();
        let b = make_box(&mut store, Point3d::new(1.0, 1.0, -1.0), Point3d::new(3.0, 3.0, 1.0)).unwrap();
        let opts = BooleanOptions::sequential();
        let mut filler = PaveFiller::new(&mut store, &[a, b], &opts).unwrap();
        filler.perform().unwrap();
        let section_blocks: usize = filler.ds.sections.iter().map(|s| s.blocks.len()).sum();
        assert!(section_blocks >= 2);
        for s in &filler.ds.sections {
            for &b in &s.blocks {
                let pb = &filler.ds.blocks[b];
                assert_ne!(filler.ds.real_vertex(pb.v1), filler.ds.real_vertex(pb.v2));
            }
        }
    }

    #[test]
    fn test_plane_cuts_sphere_in_one_closed_block() {
        let mut store = ShapeStore::new();
        let sphere = make_sphere(&mut store, Point3d::ORIGIN, 1.0).unwrap();
        let slab = make_box(&mut store, Point3d::new(-2.0, -2.0, 0.0), Point3d::new(2.0, 2.0, 2.0)).unwrap();
        let opts = BooleanOptions::sequential();
        let mut filler = PaveFiller::new(&mut store, &[sphere, slab], &opts).unwrap();
        filler.perform().unwrap();
        let blocks: Vec<usize> = filler.ds.sections.iter().flat_map(|s| s.blocks.clone()).collect();
        assert_eq!(blocks.len(), 1);
        let pb = &filler.ds.blocks[blocks[0]];
        assert_eq!(filler.ds.real_vertex(pb.v1), filler.ds.real_vertex(pb.v2));
        assert!((pb.t2 - pb.t1 - TAU).abs() < 1e-9);
    }

    #[test]
    fn test_chord_deviation_of_coarse_polyline() {
        let s1 = Surface::Cylinder(Cylinder::new(Point3d::ORIGIN, Vec3::Z, 1.0));
        let s2 = Surface::Plane(crate::geometry::surfaces::Plane::new(Point3d::ORIGIN, Vec3::Z));
        let square = Polyline3d::new(vec![
            Point3d::new(1.0, 0.0, 0.0),
            Point3d::new(0.0, 1.0, 0.0),
            Point3d::new(-1.0, 0.0, 0.0),
        ]);
        let d = chord_deviation(&s1, &s2, &square);
        assert!((d - (1.0 - 0.5f64.sqrt())).abs() < 1e-12);
    }

    #[test]
    fn test_traced_sections_keep_their_blocks() {
        let mut store = ShapeStore::new();
        let (a, b) = crossing_cylinders(&mut store);
        let opts = BooleanOptions::sequential();
        let mut filler = PaveFiller::new(&mut store, &[a, b], &opts).unwrap();
        filler.perform().unwrap();
        let (fa, fb) = lateral_faces(&filler);
        let (sa, sb) = (filler.faces[&fa].surface.clone(), filler.faces[&fb].surface.clone());
        let traced: Vec<&SectionCurve> = filler
            .ds
            .sections
            .iter()
            .filter(|s| matches!(s.curve, Curve::Polyline(_)))
            .collect();
        assert!(!traced.is_empty());
        for s in &traced {
            assert!(!s.blocks.is_empty());
            let Curve::Polyline(poly) = &s.curve else { unreachable!() };
            assert!(s.tolerance >= chord_deviation(&sa, &sb, poly));
        }
        assert!(!filler.report.has_code(AlertCode::IntersectionNotConverged), "{}", filler.report);
    }

    #[test]
    fn test_edge_contacts_seed_marching() {
        let mut store = ShapeStore::new();
        let (a, b) = crossing_cylinders(&mut store);
        let opts = BooleanOptions::sequential();
        let mut filler = PaveFiller::new(&mut store, &[a, b], &opts).unwrap();
        filler.perform().unwrap();
        let (fa, fb) = lateral_faces(&filler);
        let (sa, sb) = (filler.faces[&fa].surface.clone(), filler.faces[&fb].surface.clone());
        let seeds = contact_seeds(&*filler.store, &filler.ds, &sa, &sb, fa, fb, 1e-7);
        // both seams cross the other cylinder twice
        assert!(seeds.len() >= 4, "{} seeds", seeds.len());
        for p in &seeds {
            assert!(sa.signed_distance(p).abs() < 1e-7);
            assert!(sb.signed_distance(p).abs() < 1e-7);
        }
    }
}
