//! Broad-phase pair pruning.
//!
//! Three interchangeable structures produce candidate pairs of bodies whose
//! AABBs may overlap: a brute-force reference, a spatial hash grid, and a
//! bounding volume hierarchy rebuilt every step. All variants yield the same
//! pair set once the world applies its exact-AABB post-filter; pairs come out
//! as `(a, b)` with `a < b` and no duplicates.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::math::{Aabb, Scalar};
use crate::types::BodyId;

/// Which broad-phase structure the world uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BroadphaseKind {
    /// Every body against every other; O(n^2) but exact. Useful as a
    /// reference and for tiny worlds.
    BruteForce,
    #[default]
    SpatialHashGrid,
    BoundingVolumeHierarchy,
}

/// Grid cell coordinate packed into 32 bits: high 16 bits are the signed x
/// cell index, low 16 the signed y. The packing caps the grid at 32768 cells
/// from the origin on either axis; out-of-bounds bodies are clamped to edge
/// cells before packing so the cap is never exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey(u32);

impl CellKey {
    pub fn pack(x: i16, y: i16) -> Self {
        CellKey(((x as u16 as u32) << 16) | (y as u16 as u32))
    }

    pub fn x(self) -> i16 {
        (self.0 >> 16) as u16 as i16
    }

    pub fn y(self) -> i16 {
        self.0 as u16 as i16
    }
}

/// Uniform grid over a configured world rectangle. Rebuilt from scratch every
/// step: each body is inserted into every cell its AABB overlaps.
pub struct SpatialHashGrid {
    bounds: Aabb,
    cell_width: Scalar,
    cell_height: Scalar,
    cols: i16,
    rows: i16,
    cells: FxHashMap<CellKey, Vec<BodyId>>,
}

impl SpatialHashGrid {
    pub fn new(bounds: Aabb, cell_width: Scalar, cell_height: Scalar) -> Self {
        let extent = bounds.extents();
        let cols = ((extent.x / cell_width).ceil() as i32).clamp(1, i16::MAX as i32) as i16;
        let rows = ((extent.y / cell_height).ceil() as i32).clamp(1, i16::MAX as i32) as i16;
        Self {
            bounds,
            cell_width,
            cell_height,
            cols,
            rows,
            cells: FxHashMap::default(),
        }
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Cell range an AABB covers, clamped to the grid. Bodies that leave the
    /// configured bounds are clipped to edge cells, never dropped.
    fn cell_range(&self, aabb: &Aabb) -> (i16, i16, i16, i16, bool) {
        let x0 = ((aabb.min.x - self.bounds.min.x) / self.cell_width).floor() as i32;
        let y0 = ((aabb.min.y - self.bounds.min.y) / self.cell_height).floor() as i32;
        let x1 = ((aabb.max.x - self.bounds.min.x) / self.cell_width).floor() as i32;
        let y1 = ((aabb.max.y - self.bounds.min.y) / self.cell_height).floor() as i32;

        let max_x = self.cols as i32 - 1;
        let max_y = self.rows as i32 - 1;
        let clamped = x0 < 0 || y0 < 0 || x1 > max_x || y1 > max_y;
        (
            x0.clamp(0, max_x) as i16,
            y0.clamp(0, max_y) as i16,
            x1.clamp(0, max_x) as i16,
            y1.clamp(0, max_y) as i16,
            clamped,
        )
    }

    pub fn rebuild(&mut self, items: &[(BodyId, Aabb)]) {
        self.cells.clear();
        let mut any_clamped = false;
        for (id, aabb) in items {
            let (x0, y0, x1, y1, clamped) = self.cell_range(aabb);
            any_clamped |= clamped;
            for x in x0..=x1 {
                for y in y0..=y1 {
                    self.cells.entry(CellKey::pack(x, y)).or_default().push(*id);
                }
            }
        }
        if any_clamped {
            log::warn!(
                "spatial hash grid: body AABB outside configured bounds, clamped to edge cells"
            );
        }
    }

    /// Candidate pairs: all intra-cell pairs, plus cross-cell pairs against
    /// the 8 neighbors, emitted only toward neighbors with a greater packed
    /// key so each cell border is walked once.
    pub fn pairs(&self, out: &mut Vec<(BodyId, BodyId)>) {
        let mut seen: FxHashSet<(BodyId, BodyId)> = FxHashSet::default();

        for (key, occupants) in &self.cells {
            for i in 0..occupants.len() {
                for j in (i + 1)..occupants.len() {
                    push_pair(occupants[i], occupants[j], &mut seen, out);
                }
            }

            for dx in -1i16..=1 {
                for dy in -1i16..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let nx = key.x() + dx;
                    let ny = key.y() + dy;
                    if nx < 0 || nx >= self.cols || ny < 0 || ny >= self.rows {
                        continue;
                    }
                    let neighbor = CellKey::pack(nx, ny);
                    if neighbor <= *key {
                        continue;
                    }
                    if let Some(others) = self.cells.get(&neighbor) {
                        for &a in occupants {
                            for &b in others {
                                if a != b {
                                    push_pair(a, b, &mut seen, out);
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Ids of bodies occupying cells the query AABB touches.
    pub fn query(&self, aabb: &Aabb, out: &mut Vec<BodyId>) {
        let (x0, y0, x1, y1, _) = self.cell_range(aabb);
        let mut seen: FxHashSet<BodyId> = FxHashSet::default();
        for x in x0..=x1 {
            for y in y0..=y1 {
                if let Some(occupants) = self.cells.get(&CellKey::pack(x, y)) {
                    for &id in occupants {
                        if seen.insert(id) {
                            out.push(id);
                        }
                    }
                }
            }
        }
    }
}

fn push_pair(
    a: BodyId,
    b: BodyId,
    seen: &mut FxHashSet<(BodyId, BodyId)>,
    out: &mut Vec<(BodyId, BodyId)>,
) {
    let pair = if a < b { (a, b) } else { (b, a) };
    if seen.insert(pair) {
        out.push(pair);
    }
}

const NULL_NODE: i32 = -1;

struct BvhNode {
    aabb: Aabb,
    left: i32,
    right: i32,
    body: BodyId,
}

impl BvhNode {
    fn is_leaf(&self) -> bool {
        self.left == NULL_NODE
    }
}

/// Binary AABB tree rebuilt top-down each step with a median split on the
/// longer centroid axis.
pub struct Bvh {
    nodes: Vec<BvhNode>,
    root: Option<usize>,
}

impl Default for Bvh {
    fn default() -> Self {
        Self::new()
    }
}

impl Bvh {
    pub fn new() -> Self {
        Self { nodes: Vec::new(), root: None }
    }

    pub fn rebuild(&mut self, items: &[(BodyId, Aabb)]) {
        self.nodes.clear();
        if items.is_empty() {
            self.root = None;
            return;
        }
        let mut order: Vec<usize> = (0..items.len()).collect();
        let root = self.build_node(items, &mut order);
        self.root = Some(root);
    }

    fn build_node(&mut self, items: &[(BodyId, Aabb)], order: &mut [usize]) -> usize {
        if order.len() == 1 {
            let (id, aabb) = items[order[0]];
            self.nodes.push(BvhNode { aabb, left: NULL_NODE, right: NULL_NODE, body: id });
            return self.nodes.len() - 1;
        }

        // Median split on the longer axis of the centroid bounds; body id
        // breaks ties so rebuilds are deterministic.
        let mut lo = items[order[0]].1.center();
        let mut hi = lo;
        for &i in order.iter() {
            let c = items[i].1.center();
            lo = lo.min(c);
            hi = hi.max(c);
        }
        let span = hi - lo;
        let split_x = span.x >= span.y;
        order.sort_unstable_by(|&a, &b| {
            let ca = items[a].1.center();
            let cb = items[b].1.center();
            let (ka, kb) = if split_x { (ca.x, cb.x) } else { (ca.y, cb.y) };
            ka.partial_cmp(&kb)
                .unwrap_or(core::cmp::Ordering::Equal)
                .then(items[a].0.cmp(&items[b].0))
        });

        let mid = order.len() / 2;
        let (left_half, right_half) = order.split_at_mut(mid);
        let left = self.build_node(items, left_half) as i32;
        let right = self.build_node(items, right_half) as i32;
        let aabb = self.nodes[left as usize].aabb.union(&self.nodes[right as usize].aabb);
        self.nodes.push(BvhNode { aabb, left, right, body: 0 });
        self.nodes.len() - 1
    }

    pub fn pairs(&self, out: &mut Vec<(BodyId, BodyId)>) {
        if let Some(root) = self.root {
            self.walk(root, root, out);
        }
    }

    fn walk(&self, a: usize, b: usize, out: &mut Vec<(BodyId, BodyId)>) {
        if a == b {
            let node = &self.nodes[a];
            if node.is_leaf() {
                return;
            }
            let (l, r) = (node.left as usize, node.right as usize);
            self.walk(l, l, out);
            self.walk(r, r, out);
            self.walk(l, r, out);
            return;
        }

        let na = &self.nodes[a];
        let nb = &self.nodes[b];
        if !na.aabb.overlaps(&nb.aabb) {
            return;
        }
        match (na.is_leaf(), nb.is_leaf()) {
            (true, true) => {
                let pair = if na.body < nb.body { (na.body, nb.body) } else { (nb.body, na.body) };
                out.push(pair);
            }
            (false, _) => {
                self.walk(na.left as usize, b, out);
                self.walk(na.right as usize, b, out);
            }
            (true, false) => {
                self.walk(a, nb.left as usize, out);
                self.walk(a, nb.right as usize, out);
            }
        }
    }

    pub fn query(&self, aabb: &Aabb, out: &mut Vec<BodyId>) {
        let Some(root) = self.root else { return };
        let mut stack = vec![root];
        while let Some(i) = stack.pop() {
            let node = &self.nodes[i];
            if !node.aabb.overlaps(aabb) {
                continue;
            }
            if node.is_leaf() {
                out.push(node.body);
            } else {
                stack.push(node.left as usize);
                stack.push(node.right as usize);
            }
        }
    }
}

/// The structure the world currently runs. `rebuild` is called once per
/// substep before pair generation; `items` is the id + world-AABB list the
/// world maintains.
pub(crate) enum Broadphase {
    BruteForce,
    Grid(SpatialHashGrid),
    Bvh(Bvh),
}

impl Broadphase {
    pub fn kind(&self) -> BroadphaseKind {
        match self {
            Broadphase::BruteForce => BroadphaseKind::BruteForce,
            Broadphase::Grid(_) => BroadphaseKind::SpatialHashGrid,
            Broadphase::Bvh(_) => BroadphaseKind::BoundingVolumeHierarchy,
        }
    }

    pub fn rebuild(&mut self, items: &[(BodyId, Aabb)]) {
        match self {
            Broadphase::BruteForce => {}
            Broadphase::Grid(grid) => grid.rebuild(items),
            Broadphase::Bvh(bvh) => bvh.rebuild(items),
        }
    }

    pub fn pairs(&self, items: &[(BodyId, Aabb)], out: &mut Vec<(BodyId, BodyId)>) {
        match self {
            Broadphase::BruteForce => {
                for i in 0..items.len() {
                    for j in (i + 1)..items.len() {
                        if items[i].1.overlaps(&items[j].1) {
                            let (a, b) = (items[i].0, items[j].0);
                            out.push(if a < b { (a, b) } else { (b, a) });
                        }
                    }
                }
            }
            Broadphase::Grid(grid) => grid.pairs(out),
            Broadphase::Bvh(bvh) => bvh.pairs(out),
        }
    }

    /// Candidate ids for an AABB query; a superset of the exact answer.
    pub fn query(&self, aabb: &Aabb, items: &[(BodyId, Aabb)], out: &mut Vec<BodyId>) {
        match self {
            Broadphase::BruteForce => {
                for (id, body_aabb) in items {
                    if body_aabb.overlaps(aabb) {
                        out.push(*id);
                    }
                }
            }
            Broadphase::Grid(grid) => grid.query(aabb, out),
            Broadphase::Bvh(bvh) => bvh.query(aabb, out),
        }
    }
}
