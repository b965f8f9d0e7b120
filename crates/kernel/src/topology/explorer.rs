use std::collections::HashMap;

use super::shape::{Shape, ShapeId, ShapeKind, ShapeStore};

// ─── Explorer ────────────────────────────────────────────────────────────────

/// Pre-order walk yielding every sub-shape of one kind. Shared sub-shapes
/// are yielded once per occurrence; use [`IndexedShapeMap`] for unique
/// results. Dangling child references are skipped and remembered.
pub struct Explorer<'a> {
    store: &'a ShapeStore,
    root: Shape,
    kind: ShapeKind,
    avoid: Option<ShapeKind>,
    stack: Vec<Shape>,
    dangling: Vec<ShapeId>,
}

impl<'a> Explorer<'a> {
    pub fn new(store: &'a ShapeStore, root: Shape, kind: ShapeKind) -> Self {
        Self {
            store,
            root,
            kind,
            avoid: None,
            stack: vec![root],
            dangling: Vec::new(),
        }
    }

    /// Do not descend into shapes of `avoid` kind (e.g. faces of a shell
    /// but not edges of free wires).
    pub fn avoiding(store: &'a ShapeStore, root: Shape, kind: ShapeKind, avoid: ShapeKind) -> Self {
        let mut ex = Self::new(store, root, kind);
        ex.avoid = Some(avoid);
        ex
    }

    pub fn restart(&mut self) {
        self.stack.clear();
        self.stack.push(self.root);
        self.dangling.clear();
    }

    /// References met so far that point at no record.
    pub fn dangling(&self) -> &[ShapeId] {
        &self.dangling
    }
}

impl Iterator for Explorer<'_> {
    type Item = Shape;

    fn next(&mut self) -> Option<Shape> {
        while let Some(shape) = self.stack.pop() {
            let Ok(kind) = self.store.kind(shape.id) else {
                self.dangling.push(shape.id);
                continue;
            };
            if kind == self.kind {
                return Some(shape);
            }
            if Some(kind) == self.avoid || kind > self.kind {
                continue;
            }
            let first = self.stack.len();
            self.stack.extend(self.store.children(shape));
            self.stack[first..].reverse();
        }
        None
    }
}

/// Unique sub-shapes of `kind` in first-met order.
pub fn unique_subshapes(store: &ShapeStore, root: Shape, kind: ShapeKind) -> Vec<Shape> {
    IndexedShapeMap::from_shape(store, root, kind).into_shapes()
}

// ─── Indexed Map ─────────────────────────────────────────────────────────────

/// Bijection between shapes and 1-based indices, keyed by record identity
/// (orientation-insensitive). The stored reference is the first one added.
#[derive(Debug, Clone, Default)]
pub struct IndexedShapeMap {
    shapes: Vec<Shape>,
    index: HashMap<ShapeId, usize>,
}

impl IndexedShapeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_shape(store: &ShapeStore, root: Shape, kind: ShapeKind) -> Self {
        let mut map = Self::new();
        for s in Explorer::new(store, root, kind) {
            map.add(s);
        }
        map
    }

    /// Index of `shape`, inserting it if new.
    pub fn add(&mut self, shape: Shape) -> usize {
        if let Some(&i) = self.index.get(&shape.id) {
            return i;
        }
        self.shapes.push(shape);
        let i = self.shapes.len();
        self.index.insert(shape.id, i);
        i
    }

    pub fn index_of(&self, id: ShapeId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn contains(&self, id: ShapeId) -> bool {
        self.index.contains_key(&id)
    }

    /// Shape at 1-based `index`.
    pub fn get(&self, index: usize) -> Option<Shape> {
        index.checked_sub(1).and_then(|i| self.shapes.get(i)).copied()
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, Shape)> + '_ {
        self.shapes.iter().enumerate().map(|(i, s)| (i + 1, *s))
    }

    pub fn into_shapes(self) -> Vec<Shape> {
        self.shapes
    }
}

// ─── Ancestors ───────────────────────────────────────────────────────────────

/// Sub-shape to its unique ancestors of one kind, built with one traversal.
#[derive(Debug, Clone, Default)]
pub struct AncestorMap {
    map: HashMap<ShapeId, Vec<Shape>>,
}

impl AncestorMap {
    pub fn build(store: &ShapeStore, root: Shape, sub_kind: ShapeKind, ancestor_kind: ShapeKind) -> Self {
        let mut map: HashMap<ShapeId, Vec<Shape>> = HashMap::new();
        for ancestor in unique_subshapes(store, root, ancestor_kind) {
            for sub in Explorer::new(store, ancestor, sub_kind) {
                let list = map.entry(sub.id).or_default();
                if !list.iter().any(|a| a.is_same(&ancestor)) {
                    list.push(ancestor);
                }
            }
        }
        Self { map }
    }

    pub fn ancestors(&self, id: ShapeId) -> &[Shape] {
        self.map.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Dangling references reachable from `root`.
pub fn check_references(store: &ShapeStore, root: Shape) -> Vec<ShapeId> {
    let mut ex = Explorer::new(store, root, ShapeKind::Vertex);
    for _ in ex.by_ref() {}
    let mut dangling = ex.dangling().to_vec();
    dangling.sort();
    dangling.dedup();
    dangling
}
