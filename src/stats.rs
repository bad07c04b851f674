//! Shape counters for diagnostics and benchmarking (§6).

/// A point-in-time snapshot of a tree's shape. Not part of the core
/// algorithm; exposed because every data structure in this lineage
/// carries a stats/counters surface for its core store.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TreeStats {
    pub interior_nodes: usize,
    pub leaf_nodes: usize,
    /// Sum, across all nodes, of live child-slot occupancy — i.e. total
    /// live (address -> child) and (address -> entry) mappings.
    pub children_capacity_used: usize,
    pub entries: usize,
}

impl TreeStats {
    pub fn total_nodes(&self) -> usize {
        self.interior_nodes + self.leaf_nodes
    }
}
