//! The tree engine: insertion (with split-on-divergence), removal (with
//! upward collapse), lookup, and whole-tree traversal. §4.3, §4.4 and the
//! arena/index design notes in §9 of the expanded specification.

use log::{debug, log_enabled, trace};

use crate::entry::Entry;
use crate::error::{PhTreeError, PhTreeResult};
use crate::key::Key;
use crate::layout::{Dense, Layout};
use crate::node::{EntryIndex, InteriorNode, LeafNode, NodeIndex, TreeNode};
use crate::point::Point;
use crate::stats::TreeStats;

/// Maximum number of dimensions a tree may index, per the data model.
pub const MAX_DIMENSIONS: usize = 6;

/// A PH-Tree indexing `K`-dimensional points of key type `KY`, storing a
/// caller value `V` per accumulated id, using representational layout `L`
/// (defaults to the dense-array variant).
///
/// Nodes and entries live in two arenas (`Vec<Option<_>>`), addressed by
/// `NodeIndex`/`EntryIndex` rather than pointers, with a free list per
/// arena so a collapsed node's or a removed entry's slot is recycled
/// rather than leaked or left to grow the backing allocation unboundedly.
#[derive(Debug)]
pub struct Tree<KY: Key, const K: usize, V, L: Layout = Dense> {
    nodes: Vec<Option<TreeNode<KY, K, L>>>,
    free_nodes: Vec<u32>,
    entries: Vec<Option<Entry<KY, K, V>>>,
    free_entries: Vec<u32>,
    root: NodeIndex,
    len: usize,
}

impl<KY: Key, const K: usize, V, L: Layout> Tree<KY, K, V, L> {
    /// Creates an empty tree. Fails if `K` is outside the supported
    /// dimension range (1..=6) — a construction-time configuration error,
    /// not a runtime one.
    pub fn try_new() -> PhTreeResult<Self> {
        if K == 0 || K > MAX_DIMENSIONS {
            return Err(PhTreeError::InvalidDimensions { requested: K });
        }
        let root_postfix = KY::BITS - 1;
        let root = TreeNode::Interior(InteriorNode {
            prefix: Point::default().canonicalize(root_postfix),
            postfix_length: root_postfix,
            infix_length: 0,
            children: Default::default(),
        });
        Ok(Self {
            nodes: vec![Some(root)],
            free_nodes: Vec::new(),
            entries: Vec::new(),
            free_entries: Vec::new(),
            root: NodeIndex(0),
            len: 0,
        })
    }

    /// Number of distinct points currently stored.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True iff the root has no children — the empty-tree test (§6).
    pub fn empty(&self) -> bool {
        self.node(self.root).child_count() == 0
    }

    fn node(&self, index: NodeIndex) -> &TreeNode<KY, K, L> {
        self.nodes[index.0 as usize]
            .as_ref()
            .expect("arena invariant violated: dangling node index")
    }

    fn node_mut(&mut self, index: NodeIndex) -> &mut TreeNode<KY, K, L> {
        self.nodes[index.0 as usize]
            .as_mut()
            .expect("arena invariant violated: dangling node index")
    }

    fn entry(&self, index: EntryIndex) -> &Entry<KY, K, V> {
        self.entries[index.0 as usize]
            .as_ref()
            .expect("arena invariant violated: dangling entry index")
    }

    /// Root node index, exposed crate-internally so the window query
    /// engine (a separate module) has a traversal entry point.
    pub(crate) fn root_index(&self) -> NodeIndex {
        self.root
    }

    pub(crate) fn node_ref(&self, index: NodeIndex) -> &TreeNode<KY, K, L> {
        self.node(index)
    }

    pub(crate) fn entry_ref(&self, index: EntryIndex) -> &Entry<KY, K, V> {
        self.entry(index)
    }

    fn alloc_node(&mut self, node: TreeNode<KY, K, L>) -> NodeIndex {
        if let Some(slot) = self.free_nodes.pop() {
            self.nodes[slot as usize] = Some(node);
            NodeIndex(slot)
        } else {
            self.nodes.push(Some(node));
            NodeIndex((self.nodes.len() - 1) as u32)
        }
    }

    fn free_node(&mut self, index: NodeIndex) {
        self.nodes[index.0 as usize] = None;
        self.free_nodes.push(index.0);
    }

    fn alloc_entry(&mut self, entry: Entry<KY, K, V>) -> EntryIndex {
        if let Some(slot) = self.free_entries.pop() {
            self.entries[slot as usize] = Some(entry);
            EntryIndex(slot)
        } else {
            self.entries.push(Some(entry));
            EntryIndex((self.entries.len() - 1) as u32)
        }
    }

    fn free_entry(&mut self, index: EntryIndex) {
        self.entries[index.0 as usize] = None;
        self.free_entries.push(index.0);
    }

    /// Inserts `value` at `point`. If an entry already exists there, its
    /// id is appended and no new entry, node or split is created (§4.3
    /// accumulation semantics). Returns the entry's index either way.
    pub fn insert(&mut self, point: Point<KY, K>, value: V) -> EntryIndex {
        let mut current = self.root;
        loop {
            let postfix_length = self.node(current).postfix_length();
            let address = point.hypercube_address(postfix_length);
            let existing_child = match self.node(current) {
                TreeNode::Interior(n) => n.children.get(address),
                TreeNode::Leaf(_) => unreachable!("loop only continues while current is interior"),
            };

            let child_index = match existing_child {
                None => {
                    let entry_index = self.create_leaf_for(current, address, point, value);
                    self.len += 1;
                    return entry_index;
                }
                Some(child_index) => child_index,
            };

            // Copy out the child's discriminating fields before taking any
            // `&mut self` call below, so no borrow of `self` survives past
            // this point.
            let (child_infix_length, child_postfix_length, child_prefix, child_is_leaf) = {
                let child = self.node(child_index);
                (
                    child.infix_length(),
                    child.postfix_length(),
                    *child.prefix(),
                    child.is_leaf(),
                )
            };
            let diverging = point.diverging_bits(&child_prefix);

            if child_infix_length > 0 && diverging > child_postfix_length + 1 {
                let split_index = self.split(current, address, child_index, diverging, &point);
                current = split_index;
                continue;
            }

            if child_is_leaf {
                let leaf_address = point.hypercube_address(0);
                let existing_entry = match self.node(child_index) {
                    TreeNode::Leaf(n) => n.entries.get(leaf_address),
                    TreeNode::Interior(_) => unreachable!("child_is_leaf was just checked"),
                };
                return match existing_entry {
                    Some(entry_index) => {
                        self.entries[entry_index.0 as usize]
                            .as_mut()
                            .expect("arena invariant violated: dangling entry index")
                            .push(value);
                        entry_index
                    }
                    None => {
                        let entry_index = self.alloc_entry(Entry::new(point, value));
                        if let TreeNode::Leaf(leaf) = self.node_mut(child_index) {
                            leaf.entries.insert(leaf_address, entry_index);
                        }
                        self.len += 1;
                        entry_index
                    }
                };
            }

            current = child_index;
        }
    }

    /// Creates a brand-new leaf (with its first entry) under `parent` at
    /// `address`, per §4.3 step 2b.
    fn create_leaf_for(
        &mut self,
        parent: NodeIndex,
        address: usize,
        point: Point<KY, K>,
        value: V,
    ) -> EntryIndex {
        let parent_postfix = self.node(parent).postfix_length();
        let leaf = LeafNode {
            prefix: point.canonicalize(0),
            infix_length: parent_postfix - 1,
            entries: Default::default(),
        };
        let leaf_index = self.alloc_node(TreeNode::Leaf(leaf));
        let leaf_address = point.hypercube_address(0);
        let entry_index = self.alloc_entry(Entry::new(point, value));
        if let TreeNode::Leaf(leaf) = self.node_mut(leaf_index) {
            leaf.entries.insert(leaf_address, entry_index);
        }
        if let TreeNode::Interior(n) = self.node_mut(parent) {
            n.children.insert(address, leaf_index);
        }
        entry_index
    }

    /// Introduces a new interior node `S` between `parent` and `child`
    /// (found at `address` under `parent`) when `point` diverges from
    /// `child`'s prefix above `child`'s own discriminator. Returns `S`'s
    /// index; the caller continues its descent loop from `S`, which is
    /// where the leaf/entry for `point` actually gets created (§4.3).
    fn split(
        &mut self,
        parent: NodeIndex,
        address: usize,
        child: NodeIndex,
        diverging: u32,
        point: &Point<KY, K>,
    ) -> NodeIndex {
        let parent_postfix = self.node(parent).postfix_length();
        let child_postfix = self.node(child).postfix_length();
        let split_postfix = diverging - 1;
        let split_infix = parent_postfix - diverging;
        let split_prefix = point.canonicalize(split_postfix);

        let mut split_node = InteriorNode {
            prefix: split_prefix,
            postfix_length: split_postfix,
            infix_length: split_infix,
            children: Default::default(),
        };
        let child_address_under_split = self.node(child).prefix().hypercube_address(split_postfix);
        split_node.children.insert(child_address_under_split, child);
        let split_index = self.alloc_node(TreeNode::Interior(split_node));

        let new_child_infix = split_postfix - child_postfix - 1;
        match self.node_mut(child) {
            TreeNode::Interior(n) => n.infix_length = new_child_infix,
            TreeNode::Leaf(n) => n.infix_length = new_child_infix,
        }

        if let TreeNode::Interior(p) = self.node_mut(parent) {
            p.children.insert(address, split_index);
        }

        if log_enabled!(log::Level::Trace) {
            trace!(
                "split: introduced node at postfix {split_postfix} between \
                 parent (postfix {parent_postfix}) and child (postfix \
                 {child_postfix}) for diverging point"
            );
        }

        split_index
    }

    /// Locates the entry exactly matching `point`, following hypercube
    /// addresses from the root. The final point-equality check guards
    /// against returning a different point that happens to share every
    /// discriminator bit visited along the path (see `remove` for the
    /// same check on the mutating side).
    fn find_entry_index(&self, point: &Point<KY, K>) -> Option<EntryIndex> {
        let mut current = self.root;
        loop {
            match self.node(current) {
                TreeNode::Interior(n) => {
                    let address = point.hypercube_address(n.postfix_length);
                    current = n.children.get(address)?;
                }
                TreeNode::Leaf(n) => {
                    let address = point.hypercube_address(0);
                    let entry_index = n.entries.get(address)?;
                    return if self.entry(entry_index).point == *point {
                        Some(entry_index)
                    } else {
                        None
                    };
                }
            }
        }
    }

    /// Looks up the entry at `point`, or `None` if absent.
    pub fn find(&self, point: &Point<KY, K>) -> Option<&Entry<KY, K, V>> {
        self.find_entry_index(point).map(|index| self.entry(index))
    }

    /// Removes the entry at `point` entirely, if present; no-op
    /// otherwise. Collapses any interior ancestor left with exactly one
    /// child (§4.4).
    pub fn remove(&mut self, point: &Point<KY, K>) {
        let mut stack: Vec<(NodeIndex, usize)> = Vec::new();
        let mut current = self.root;
        loop {
            match self.node(current) {
                TreeNode::Interior(n) => {
                    let address = point.hypercube_address(n.postfix_length);
                    match n.children.get(address) {
                        Some(child) => {
                            stack.push((current, address));
                            current = child;
                        }
                        None => return,
                    }
                }
                TreeNode::Leaf(_) => break,
            }
        }

        let leaf_index = current;
        let leaf_address = point.hypercube_address(0);
        let leaf = self
            .node(leaf_index)
            .as_leaf()
            .expect("descent loop only breaks on TreeNode::Leaf");
        let entry_index = match leaf.entries.get(leaf_address) {
            Some(index) => index,
            None => return,
        };
        if self.entry(entry_index).point != *point {
            return;
        }

        self.free_entry(entry_index);
        self.len -= 1;
        let remaining = {
            let leaf = self
                .node_mut(leaf_index)
                .as_leaf_mut()
                .expect("just matched TreeNode::Leaf above");
            leaf.entries.remove(leaf_address);
            leaf.entries.len()
        };
        if remaining > 0 {
            return;
        }

        let (parent_index, parent_address) = match stack.pop() {
            Some(pair) => pair,
            None => return,
        };
        self.free_node(leaf_index);
        if let TreeNode::Interior(p) = self.node_mut(parent_index) {
            p.children.remove(parent_address);
        }
        if log_enabled!(log::Level::Trace) {
            trace!("remove: dropped exhausted leaf, collapsing upward from parent");
        }

        let mut node_index = parent_index;
        loop {
            if node_index == self.root {
                break;
            }
            if self.node(node_index).child_count() != 1 {
                break;
            }
            let (grandparent_index, node_address) = stack
                .pop()
                .expect("non-root node must have a recorded ancestor on the descent stack");
            let (_, lone_child) = self
                .node(node_index)
                .as_interior()
                .expect("single-child collapse only applies to interior nodes")
                .children
                .only_child()
                .expect("child_count == 1 was just checked");

            let grandparent_postfix = self.node(grandparent_index).postfix_length();
            let lone_child_postfix = self.node(lone_child).postfix_length();
            let new_infix = grandparent_postfix - lone_child_postfix - 1;
            match self.node_mut(lone_child) {
                TreeNode::Interior(n) => n.infix_length = new_infix,
                TreeNode::Leaf(n) => n.infix_length = new_infix,
            }
            if let TreeNode::Interior(gp) = self.node_mut(grandparent_index) {
                gp.children.insert(node_address, lone_child);
            }
            self.free_node(node_index);
            if log_enabled!(log::Level::Debug) {
                debug!("remove: collapsed single-child interior node into its parent");
            }
            node_index = grandparent_index;
        }
    }

    /// Removes a single accumulated id from the entry at `point` (§4.4
    /// supplemental operation). If the entry's id collection becomes
    /// empty as a result, the entry and, if warranted, its ancestors are
    /// torn down exactly as `remove` would. Returns whether anything was
    /// removed.
    pub fn remove_element(&mut self, point: &Point<KY, K>, value: &V) -> bool
    where
        V: PartialEq,
    {
        let entry_index = match self.find_entry_index(point) {
            Some(index) => index,
            None => return false,
        };
        let now_empty = {
            let entry = self.entries[entry_index.0 as usize]
                .as_mut()
                .expect("arena invariant violated: dangling entry index");
            if !entry.remove_value(value) {
                return false;
            }
            entry.values.is_empty()
        };
        if now_empty {
            self.remove(point);
        }
        true
    }

    /// Visits every entry in the tree, in unspecified order. Per §4.5/§9,
    /// the visitor must not mutate the tree.
    pub fn for_each<F: FnMut(&Entry<KY, K, V>)>(&self, mut visitor: F) {
        for entry in self.entries.iter().flatten() {
            visitor(entry);
        }
    }

    /// The fewest live children any non-root interior node currently has,
    /// or `None` if the tree has no interior nodes besides the root.
    /// Exposed so tests can check invariant 3 (§3: "an interior node can
    /// never be left with exactly one child") without reaching into
    /// private arena storage.
    pub fn min_interior_child_count(&self) -> Option<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|node| (index, node)))
            .filter(|(index, _)| NodeIndex(*index as u32) != self.root)
            .filter_map(|(_, node)| node.as_interior())
            .map(|interior| interior.children.len())
            .min()
    }

    /// A snapshot of tree shape counters, for diagnostics and
    /// benchmarking (§6).
    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats::default();
        for node in self.nodes.iter().flatten() {
            match node {
                TreeNode::Interior(n) => {
                    stats.interior_nodes += 1;
                    stats.children_capacity_used += n.children.len();
                }
                TreeNode::Leaf(n) => {
                    stats.leaf_nodes += 1;
                    stats.children_capacity_used += n.entries.len();
                }
            }
        }
        stats.entries = self.len;
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Compact;

    fn point(x: u8, y: u8) -> Point<u8, 2> {
        Point::new([x, y])
    }

    #[test]
    fn insert_find_roundtrip_dense() {
        let mut tree = Tree::<u8, 2, u32, Dense>::try_new().unwrap();
        tree.insert(point(10, 20), 1);
        assert_eq!(tree.find(&point(10, 20)).unwrap().values, vec![1]);
        assert!(tree.find(&point(10, 21)).is_none());
    }

    #[test]
    fn insert_find_roundtrip_compact() {
        let mut tree = Tree::<u8, 2, u32, Compact>::try_new().unwrap();
        tree.insert(point(10, 20), 1);
        assert_eq!(tree.find(&point(10, 20)).unwrap().values, vec![1]);
        assert!(tree.find(&point(10, 21)).is_none());
    }

    #[test]
    fn repeated_insert_accumulates() {
        let mut tree = Tree::<u8, 2, u32, Dense>::try_new().unwrap();
        tree.insert(point(0, 0), 1);
        tree.insert(point(0, 0), 2);
        tree.insert(point(0, 0), 3);
        assert_eq!(tree.find(&point(0, 0)).unwrap().values, vec![1, 2, 3]);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn remove_makes_tree_empty_and_reusable() {
        let mut tree = Tree::<u8, 2, u32, Dense>::try_new().unwrap();
        assert!(tree.empty());
        tree.insert(point(0, 0), 1);
        assert!(!tree.empty());
        tree.remove(&point(0, 0));
        assert!(tree.empty());
        assert!(tree.find(&point(0, 0)).is_none());
        tree.insert(point(5, 5), 9);
        assert_eq!(tree.find(&point(5, 5)).unwrap().values, vec![9]);
    }

    #[test]
    fn remove_is_noop_on_absent_point() {
        let mut tree = Tree::<u8, 2, u32, Dense>::try_new().unwrap();
        tree.insert(point(1, 1), 1);
        tree.remove(&point(9, 9));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn split_then_insert_keeps_both_points_reachable() {
        let mut tree = Tree::<u8, 2, u32, Dense>::try_new().unwrap();
        tree.insert(point(0, 0), 1);
        tree.insert(point(1, 0), 2);
        tree.insert(point(0, 1), 3);
        tree.insert(point(1, 1), 4);
        assert_eq!(tree.find(&point(0, 0)).unwrap().values, vec![1]);
        assert_eq!(tree.find(&point(1, 0)).unwrap().values, vec![2]);
        assert_eq!(tree.find(&point(0, 1)).unwrap().values, vec![3]);
        assert_eq!(tree.find(&point(1, 1)).unwrap().values, vec![4]);
    }

    #[test]
    fn invalid_dimensions_rejected() {
        assert!(Tree::<u8, 0, u32, Dense>::try_new().is_err());
        assert!(Tree::<u8, 7, u32, Dense>::try_new().is_err());
    }

    #[test]
    fn remove_element_only_drops_whole_entry_when_empty() {
        let mut tree = Tree::<u8, 2, u32, Dense>::try_new().unwrap();
        tree.insert(point(2, 2), 1);
        tree.insert(point(2, 2), 2);
        assert!(tree.remove_element(&point(2, 2), &1));
        assert_eq!(tree.find(&point(2, 2)).unwrap().values, vec![2]);
        assert!(tree.remove_element(&point(2, 2), &2));
        assert!(tree.find(&point(2, 2)).is_none());
    }

    #[test]
    fn interior_nodes_never_left_with_one_child() {
        let mut tree = Tree::<u16, 2, u32, Dense>::try_new().unwrap();
        let points: Vec<Point<u16, 2>> = (0..50)
            .map(|i| Point::new([i as u16 * 7, i as u16 * 13]))
            .collect();
        for p in &points {
            tree.insert(*p, 0);
        }
        for p in points.iter().rev() {
            tree.remove(p);
            assert_no_single_child_interior(&tree);
        }
        assert!(tree.empty());
    }

    fn assert_no_single_child_interior<KY: Key, const D: usize, V, L: Layout>(
        tree: &Tree<KY, D, V, L>,
    ) {
        if let Some(min_children) = tree.min_interior_child_count() {
            assert!(min_children >= 2, "non-root interior node with < 2 children");
        }
    }
}
