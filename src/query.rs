//! Window queries: prefix-bounded descent with per-level range masks
//! pruning the 2^K fanout (§4.5).

use std::ops::ControlFlow;

use crate::entry::Entry;
use crate::error::{PhTreeError, PhTreeResult};
use crate::key::Key;
use crate::layout::Layout;
use crate::node::{NodeIndex, TreeNode};
use crate::point::Point;
use crate::tree::Tree;

/// A closed axis-aligned box `[min, max]` in key space. Degenerate boxes
/// (max < min on some axis) are normalized per-axis at construction time
/// (§4.5 Normalization).
#[derive(Debug, Clone, Copy)]
pub struct Query<KY: Key, const K: usize> {
    pub min: Point<KY, K>,
    pub max: Point<KY, K>,
}

impl<KY: Key, const K: usize> Query<KY, K> {
    pub fn new(min: Point<KY, K>, max: Point<KY, K>) -> Self {
        let mut min = min;
        let mut max = max;
        for dimension in 0..K {
            if max.0[dimension] < min.0[dimension] {
                std::mem::swap(&mut min.0[dimension], &mut max.0[dimension]);
            }
        }
        Self { min, max }
    }

    /// Resets this query to a new window, re-applying normalization.
    pub fn set(&mut self, min: Point<KY, K>, max: Point<KY, K>) {
        *self = Self::new(min, max);
    }
}

/// Rewrites a box-point's bounds for an "intersect" box query: the first
/// half of `min`'s coordinates is zeroed and the second half of `max`'s
/// coordinates is set to the key-space maximum, so any stored box whose
/// lower corner is `<= query max-half` and upper corner is `>= query
/// min-half` is visited (§4.6 / §9 Design Notes, resolved against the
/// original reference's unconditional rewrite under `intersect`).
///
/// A box-point packs its lower and upper corner into one point's two
/// halves of dimensions, so `K` must be even; an odd `K` can't be split
/// into matching halves and is rejected rather than silently truncated.
pub fn box_intersect_bounds<KY: Key, const K: usize>(
    mut min: Point<KY, K>,
    mut max: Point<KY, K>,
) -> PhTreeResult<(Point<KY, K>, Point<KY, K>)> {
    if K % 2 != 0 {
        return Err(PhTreeError::BoxDimensionMismatch { point_dimensions: K });
    }
    let half = K / 2;
    for coordinate in min.0.iter_mut().take(half) {
        *coordinate = KY::zero();
    }
    for coordinate in max.0.iter_mut().skip(half) {
        *coordinate = KY::max_value();
    }
    Ok((min, max))
}

impl<KY: Key, const K: usize, V, L: Layout> Tree<KY, K, V, L> {
    /// Invokes `visitor` on every entry within `query`'s window. The
    /// visitor may signal early termination via `ControlFlow::Break`;
    /// per §5, it must not mutate the tree.
    pub fn query<F>(&self, query: &Query<KY, K>, mut visitor: F)
    where
        F: FnMut(&Entry<KY, K, V>) -> ControlFlow<()>,
    {
        let _ = self.query_node(self.root_index(), query, &mut visitor);
    }

    fn query_node<F>(
        &self,
        index: NodeIndex,
        query: &Query<KY, K>,
        visitor: &mut F,
    ) -> ControlFlow<()>
    where
        F: FnMut(&Entry<KY, K, V>) -> ControlFlow<()>,
    {
        match self.node_ref(index) {
            TreeNode::Interior(node) => {
                let shift = node.postfix_length + 1;
                if !(node.prefix.ge_shifted(&query.min, shift)
                    && node.prefix.le_shifted(&query.max, shift))
                {
                    return ControlFlow::Continue(());
                }
                let mask_lower = mask_ge(&node.prefix, &query.min);
                let mask_upper = mask_ge(&node.prefix, &query.max);
                let fanout = 1usize << K;
                for address in 0..fanout {
                    if !is_candidate(address, mask_lower, mask_upper) {
                        continue;
                    }
                    if let Some(child) = node.children.get(address) {
                        self.query_node(child, query, visitor)?;
                    }
                }
            }
            TreeNode::Leaf(node) => {
                let mask_lower = mask_ge(&node.prefix, &query.min);
                let mask_upper = mask_ge(&node.prefix, &query.max);
                let fanout = 1usize << K;
                for address in 0..fanout {
                    if !is_candidate(address, mask_lower, mask_upper) {
                        continue;
                    }
                    if let Some(entry_index) = node.entries.get(address) {
                        let entry = self.entry_ref(entry_index);
                        if entry.point.in_window(&query.min, &query.max) {
                            visitor(entry)?;
                        }
                    }
                }
            }
        }
        ControlFlow::Continue(())
    }
}

/// bit i = 1 iff `bound`'s coordinate i is `>=` `prefix`'s coordinate i,
/// dimension 0 most significant (matching hypercube address bit order).
fn mask_ge<KY: Key, const K: usize>(prefix: &Point<KY, K>, bound: &Point<KY, K>) -> usize {
    let mut mask = 0usize;
    for (p, b) in prefix.0.iter().zip(bound.0.iter()) {
        mask = (mask << 1) | usize::from(*b >= *p);
    }
    mask
}

fn is_candidate(address: usize, mask_lower: usize, mask_upper: usize) -> bool {
    (address | mask_lower) & mask_upper == address
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Dense;

    fn point(x: u8, y: u8) -> Point<u8, 2> {
        Point::new([x, y])
    }

    fn collect_query(tree: &Tree<u8, 2, u32, Dense>, min: Point<u8, 2>, max: Point<u8, 2>) -> Vec<(u8, u8)> {
        let query = Query::new(min, max);
        let mut found = Vec::new();
        tree.query(&query, |entry| {
            found.push((entry.point.get(0), entry.point.get(1)));
            ControlFlow::Continue(())
        });
        found.sort_unstable();
        found
    }

    #[test]
    fn window_query_visits_exactly_contained_points() {
        let mut tree = Tree::<u8, 2, u32, Dense>::try_new().unwrap();
        for p in [(0, 0), (1, 0), (0, 1), (1, 1), (5, 5)] {
            tree.insert(point(p.0, p.1), 1);
        }
        let found = collect_query(&tree, point(0, 0), point(1, 1));
        assert_eq!(found, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
    }

    #[test]
    fn window_query_over_full_space_visits_everything_once() {
        let mut tree = Tree::<u8, 2, u32, Dense>::try_new().unwrap();
        let points = [(3, 200), (0, 0), (255, 255), (128, 64)];
        for p in points {
            tree.insert(point(p.0, p.1), 1);
        }
        let found = collect_query(&tree, point(0, 0), point(255, 255));
        let mut expected: Vec<_> = points.to_vec();
        expected.sort_unstable();
        assert_eq!(found, expected);
    }

    #[test]
    fn degenerate_box_is_normalized() {
        let query = Query::new(point(10, 10), point(2, 20));
        assert_eq!(query.min, point(2, 10));
        assert_eq!(query.max, point(10, 20));
    }

    #[test]
    fn boundary_points_are_visited() {
        let mut tree = Tree::<u8, 2, u32, Dense>::try_new().unwrap();
        tree.insert(point(5, 5), 1);
        let found = collect_query(&tree, point(5, 5), point(5, 5));
        assert_eq!(found, vec![(5, 5)]);
    }

    #[test]
    fn box_intersect_bounds_widens_each_half() {
        let min = Point::<u8, 4>::new([10, 10, 10, 10]);
        let max = Point::<u8, 4>::new([20, 20, 20, 20]);
        let (widened_min, widened_max) = box_intersect_bounds(min, max).unwrap();
        assert_eq!(widened_min.0, [0, 0, 10, 10]);
        assert_eq!(widened_max.0, [20, 20, 255, 255]);
    }

    #[test]
    fn box_intersect_bounds_rejects_odd_dimensions() {
        let min = Point::<u8, 3>::new([0, 0, 0]);
        let max = Point::<u8, 3>::new([1, 1, 1]);
        assert!(box_intersect_bounds(min, max).is_err());
    }
}
