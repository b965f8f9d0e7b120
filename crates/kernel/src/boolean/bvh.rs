//! Bounding volume hierarchy over indexed boxes, used as the broad phase
//! of interference detection.
//!
//! Built top-down with a bucketed surface area heuristic.

use crate::geometry::point::Point3d;
use crate::geometry::transform::BoundingBox;

const LEAF_SIZE: usize = 4;
const NUM_BUCKETS: usize = 12;

#[derive(Debug, Clone)]
enum BvhNode {
    Leaf {
        bounds: BoundingBox,
        items: Vec<(usize, BoundingBox)>,
    },
    Internal {
        bounds: BoundingBox,
        left: Box<BvhNode>,
        right: Box<BvhNode>,
    },
}

impl BvhNode {
    fn bounds(&self) -> &BoundingBox {
        match self {
            BvhNode::Leaf { bounds, .. } | BvhNode::Internal { bounds, .. } => bounds,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Bvh {
    root: Option<BvhNode>,
    boxes: Vec<(usize, BoundingBox)>,
}

fn axis(p: &Point3d, a: usize) -> f64 {
    match a {
        0 => p.x,
        1 => p.y,
        _ => p.z,
    }
}

fn surface_area(bb: &BoundingBox) -> f64 {
    if bb.is_empty() {
        return 0.0;
    }
    let s = bb.size();
    2.0 * (s.x * s.y + s.y * s.z + s.z * s.x)
}

impl Bvh {
    /// Build over `(item, box)` pairs. Empty boxes are ignored.
    pub fn build(boxes: Vec<(usize, BoundingBox)>) -> Self {
        let mut data: Vec<(usize, BoundingBox, Point3d)> = boxes
            .iter()
            .filter(|(_, bb)| !bb.is_empty())
            .map(|(i, bb)| (*i, *bb, bb.center()))
            .collect();
        let root = if data.is_empty() {
            None
        } else {
            Some(build_node(&mut data))
        };
        Self { root, boxes }
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Items whose box overlaps `query`, sorted ascending.
    pub fn query(&self, query: &BoundingBox) -> Vec<usize> {
        let mut out = Vec::new();
        if let Some(root) = &self.root {
            query_node(root, query, &mut out);
        }
        out.sort_unstable();
        out
    }

    /// Every overlapping pair `(a, b)` with `a < b`, sorted.
    pub fn overlapping_pairs(&self) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for (i, bb) in &self.boxes {
            for j in self.query(bb) {
                if *i < j {
                    pairs.push((*i, j));
                }
            }
        }
        pairs.sort_unstable();
        pairs.dedup();
        pairs
    }
}

fn query_node(node: &BvhNode, query: &BoundingBox, out: &mut Vec<usize>) {
    if !node.bounds().intersects(query) {
        return;
    }
    match node {
        BvhNode::Leaf { items, .. } => {
            out.extend(items.iter().filter(|(_, bb)| bb.intersects(query)).map(|(i, _)| *i));
        }
        BvhNode::Internal { left, right, .. } => {
            query_node(left, query, out);
            query_node(right, query, out);
        }
    }
}

fn build_node(data: &mut [(usize, BoundingBox, Point3d)]) -> BvhNode {
    let mut bounds = BoundingBox::empty();
    for (_, bb, _) in data.iter() {
        bounds.merge(bb);
    }
    if data.len() <= LEAF_SIZE {
        return BvhNode::Leaf {
            bounds,
            items: data.iter().map(|(i, bb, _)| (*i, *bb)).collect(),
        };
    }

    let mid = match find_best_split(data) {
        Some((a, pos)) => partition(data, a, pos),
        None => 0,
    };
    // fall back to a median split on the longest centroid axis
    let mid = if mid == 0 || mid == data.len() {
        let mut centroids = BoundingBox::empty();
        for (_, _, c) in data.iter() {
            centroids.expand_to_include(c);
        }
        let a = centroids.longest_axis();
        data.sort_by(|x, y| axis(&x.2, a).total_cmp(&axis(&y.2, a)).then(x.0.cmp(&y.0)));
        data.len() / 2
    } else {
        mid
    };

    let (left, right) = data.split_at_mut(mid);
    BvhNode::Internal {
        bounds,
        left: Box::new(build_node(left)),
        right: Box::new(build_node(right)),
    }
}

fn find_best_split(data: &[(usize, BoundingBox, Point3d)]) -> Option<(usize, f64)> {
    let mut centroids = BoundingBox::empty();
    for (_, _, c) in data {
        centroids.expand_to_include(c);
    }
    let mut best: Option<(f64, usize, f64)> = None;
    for a in 0..3 {
        let lo = axis(&centroids.min, a);
        let extent = axis(&centroids.max, a) - lo;
        if extent < 1e-12 {
            continue;
        }
        let mut counts = [0usize; NUM_BUCKETS];
        let mut boxes = [BoundingBox::empty(); NUM_BUCKETS];
        for (_, bb, c) in data {
            let b = (((axis(c, a) - lo) / extent * NUM_BUCKETS as f64) as usize).min(NUM_BUCKETS - 1);
            counts[b] += 1;
            boxes[b].merge(bb);
        }
        for split in 1..NUM_BUCKETS {
            let (mut lb, mut rb) = (BoundingBox::empty(), BoundingBox::empty());
            let (mut lc, mut rc) = (0, 0);
            for i in 0..split {
                lc += counts[i];
                lb.merge(&boxes[i]);
            }
            for i in split..NUM_BUCKETS {
                rc += counts[i];
                rb.merge(&boxes[i]);
            }
            if lc == 0 || rc == 0 {
                continue;
            }
            let cost = lc as f64 * surface_area(&lb) + rc as f64 * surface_area(&rb);
            if best.is_none_or(|(c, _, _)| cost < c) {
                best = Some((cost, a, lo + extent * split as f64 / NUM_BUCKETS as f64));
            }
        }
    }
    best.map(|(_, a, pos)| (a, pos))
}

fn partition(data: &mut [(usize, BoundingBox, Point3d)], a: usize, pos: f64) -> usize {
    let mut left = 0;
    for i in 0..data.len() {
        if axis(&data[i].2, a) < pos {
            data.swap(i, left);
            left += 1;
        }
    }
    left
}
