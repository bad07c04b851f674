//! Selects which [`ChildTable`] implementation a tree's nodes use.

use std::fmt;

use crate::children::{ChildTable, CompactChildTable, DenseChildTable};
use crate::node::{EntryIndex, NodeIndex};

/// A node-representational variant (§4.2). `Tree` is generic over `L:
/// Layout`; everything above the child-table itself (insertion, removal,
/// window query) is written once and shared by both layouts.
pub trait Layout: Default + Clone + fmt::Debug {
    /// Child table used by interior nodes, mapping address -> child node.
    type Children: ChildTable<NodeIndex>;
    /// Child table used by leaf nodes, mapping address -> entry.
    type Entries: ChildTable<EntryIndex>;
}

/// Dense-array layout: O(1) child access, O(2^K) memory per node.
#[derive(Default, Clone, Debug)]
pub struct Dense;

impl Layout for Dense {
    type Children = DenseChildTable<NodeIndex>;
    type Entries = DenseChildTable<EntryIndex>;
}

/// Compact sorted-array-with-bitmask layout: O(K) child access, O(live
/// children) memory per node.
#[derive(Default, Clone, Debug)]
pub struct Compact;

impl Layout for Compact {
    type Children = CompactChildTable<NodeIndex>;
    type Entries = CompactChildTable<EntryIndex>;
}
