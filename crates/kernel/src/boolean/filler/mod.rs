//! Intersection of the arguments: every interference between their
//! vertices, edges and faces, recorded in the [`DataStructure`].
//!
//! Stages run in a fixed order. Inside a stage the pair tests are pure and
//! may run on the rayon pool; their results are then applied one by one in
//! sorted pair order, so the outcome does not depend on thread scheduling.

pub mod edge;
pub mod face;
pub mod vertex;

use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::{debug, info, instrument};

use crate::topology::pcurve::FaceUv;
use crate::topology::{Shape, ShapeKind, ShapeStore};

use super::ds::DataStructure;
use super::options::BooleanOptions;
use super::report::{BooleanError, Report, Stage};

/// Which overlapping pairs are worth testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairFilter {
    /// Sub-shapes of different arguments.
    DifferentArguments,
    /// Sub-shapes of one shape that share no sub-shape (self-check).
    NonAdjacent,
}

/// Parameter-plane domains of the indexed faces.
pub type FaceDomains = BTreeMap<usize, FaceUv>;

/// Map `f` over `items`, on the rayon pool when the options ask for it.
/// Order is preserved; items are skipped once cancellation is requested.
pub(crate) fn collect_parallel<T, R, F>(options: &BooleanOptions, items: &[T], f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> Option<R> + Sync + Send,
{
    if options.parallel {
        items
            .par_iter()
            .filter_map(|item| if options.is_cancelled() { None } else { f(item) })
            .collect()
    } else {
        items
            .iter()
            .filter_map(|item| if options.is_cancelled() { None } else { f(item) })
            .collect()
    }
}

/// Candidate pairs of kinds `(k1, k2)` passing `filter`.
pub(crate) fn candidate_pairs(
    ds: &DataStructure,
    k1: ShapeKind,
    k2: ShapeKind,
    filter: PairFilter,
) -> Vec<(usize, usize)> {
    ds.candidate_pairs(k1, k2)
        .into_iter()
        .filter(|&(a, b)| match filter {
            PairFilter::DifferentArguments => {
                matches!((ds.rank(a), ds.rank(b)), (Some(ra), Some(rb)) if ra != rb)
            }
            PairFilter::NonAdjacent => {
                a != b
                    && !ds.has_sub(a, b)
                    && !ds.has_sub(b, a)
                    && !ds.info(a).subs.iter().any(|s| ds.has_sub(b, *s) || *s == b)
            }
        })
        .collect()
}

/// Build the domain of every indexed face.
pub(crate) fn face_domains(store: &ShapeStore, ds: &DataStructure, options: &BooleanOptions) -> FaceDomains {
    let faces: Vec<usize> = ds.indices_of(ShapeKind::Face).collect();
    collect_parallel(options, &faces, |&f| FaceUv::new(store, ds.id(f)).ok().map(|uv| (f, uv)))
        .into_iter()
        .collect()
}

// ─── Pave Filler ─────────────────────────────────────────────────────────────

pub struct PaveFiller<'a> {
    pub store: &'a mut ShapeStore,
    pub ds: DataStructure,
    pub report: Report,
    pub faces: FaceDomains,
    options: &'a BooleanOptions,
    filter: PairFilter,
}

type StageFn<'a> = fn(&mut PaveFiller<'a>) -> Result<(), BooleanError>;

impl<'a> PaveFiller<'a> {
    /// Index `arguments` (object first, then tool) on `store`.
    pub fn new(
        store: &'a mut ShapeStore,
        arguments: &[Shape],
        options: &'a BooleanOptions,
    ) -> Result<Self, BooleanError> {
        let ds = DataStructure::new(store, arguments, options.fuzzy_value)?;
        let faces = face_domains(store, &ds, options);
        debug!(shapes = ds.len(), faces = faces.len(), "indexed arguments");
        Ok(Self {
            store,
            ds,
            report: Report::new(),
            faces,
            options,
            filter: PairFilter::DifferentArguments,
        })
    }

    pub fn options(&self) -> &BooleanOptions {
        self.options
    }

    pub fn fuzzy(&self) -> f64 {
        self.options.fuzzy_value
    }

    pub(crate) fn pairs(&self, k1: ShapeKind, k2: ShapeKind) -> Vec<(usize, usize)> {
        candidate_pairs(&self.ds, k1, k2, self.filter)
    }

    /// Set up the unary mode: one shape checked against itself, pairs
    /// sharing a sub-shape skipped.
    pub fn self_check(
        store: &'a mut ShapeStore,
        shape: Shape,
        options: &'a BooleanOptions,
    ) -> Result<Self, BooleanError> {
        let mut filler = Self::new(store, &[shape], options)?;
        filler.filter = PairFilter::NonAdjacent;
        Ok(filler)
    }

    fn run_stages(&mut self, stages: &[(Stage, StageFn<'a>)]) -> Result<(), BooleanError> {
        self.options.check_cancel(Stage::Init)?;
        for &(stage, run) in stages {
            run(self)?;
            self.options.check_cancel(stage)?;
        }
        Ok(())
    }

    /// Run every intersection stage.
    #[instrument(skip_all, fields(shapes = self.ds.len()))]
    pub fn perform(&mut self) -> Result<(), BooleanError> {
        self.run_stages(&[
            (Stage::VertexVertex, Self::perform_vv),
            (Stage::VertexEdge, Self::perform_ve),
            (Stage::EdgeEdge, Self::perform_ee),
            (Stage::VertexFace, Self::perform_vf),
            (Stage::EdgeFace, Self::perform_ef),
            (Stage::PaveBlocks, Self::perform_pave_blocks),
            (Stage::FaceFace, Self::perform_ff),
        ])?;
        info!(
            interferences = self.ds.interferences.len(),
            blocks = self.ds.blocks.len(),
            common_blocks = self.ds.common_blocks.len(),
            sections = self.ds.sections.len(),
            "intersection finished"
        );
        Ok(())
    }

    /// Contact stages only; used by the self-interference check.
    #[instrument(skip_all, fields(shapes = self.ds.len()))]
    pub fn perform_contacts(&mut self) -> Result<(), BooleanError> {
        self.run_stages(&[
            (Stage::VertexVertex, Self::perform_vv),
            (Stage::VertexEdge, Self::perform_ve),
            (Stage::EdgeEdge, Self::perform_ee),
            (Stage::VertexFace, Self::perform_vf),
            (Stage::EdgeFace, Self::perform_ef),
        ])?;
        info!(interferences = self.ds.interferences.len(), "contacts finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::point::Point3d;
    use crate::topology::primitives::make_box;

    #[test]
    fn test_collect_parallel_keeps_order() {
        let items: Vec<usize> = (0..100).collect();
        let out = collect_parallel(&BooleanOptions::default(), &items, |&i| (i % 3 == 0).then_some(i));
        assert_eq!(out, (0..100).filter(|i| i % 3 == 0).collect::<Vec<_>>());
    }

    #[test]
    fn test_cancelled_collect_is_empty() {
        let token = crate::boolean::options::CancellationToken::new();
        token.cancel();
        let opts = BooleanOptions::sequential().with_cancel(token);
        let items = [1, 2, 3];
        assert!(collect_parallel(&opts, &items, |&i| Some(i)).is_empty());
    }

    #[test]
    fn test_pair_filters() {
        let mut store = ShapeStore::new();
        let a = make_box(&mut store, Point3d::ORIGIN, Point3d::new(1.0, 1.0, 1.0)).unwrap();
        let ds = DataStructure::new(&store, &[a], 0.0).unwrap();
        assert!(candidate_pairs(&ds, ShapeKind::Edge, ShapeKind::Edge, PairFilter::DifferentArguments).is_empty());
        // edges of one box meeting at a corner are adjacent
        assert!(candidate_pairs(&ds, ShapeKind::Edge, ShapeKind::Edge, PairFilter::NonAdjacent).is_empty());
        assert!(candidate_pairs(&ds, ShapeKind::Edge, ShapeKind::Face, PairFilter::NonAdjacent).is_empty());
    }
}
