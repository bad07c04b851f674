//! Terminal records held at postfix_length 0.

use crate::key::Key;
use crate::point::Point;

/// A terminal record for a unique point (§3). Repeated insertion at the
/// same point accumulates another value into `values` rather than
/// creating a second entry or overwriting the first — the variant this
/// codebase's original reference implementation uses (a per-entry
/// dynamic collection of caller ids), and the only one the non-goals
/// permit ("duplicate-key replacement semantics beyond accumulate").
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Entry<KY: Key, const K: usize, V> {
    pub point: Point<KY, K>,
    pub values: Vec<V>,
}

impl<KY: Key, const K: usize, V> Entry<KY, K, V> {
    pub fn new(point: Point<KY, K>, value: V) -> Self {
        Self {
            point,
            values: vec![value],
        }
    }

    pub fn push(&mut self, value: V) {
        self.values.push(value);
    }
}

impl<KY: Key, const K: usize, V: PartialEq> Entry<KY, K, V> {
    /// Removes one accumulated value, by equality. Returns whether
    /// anything was removed and whether the entry is now empty.
    pub fn remove_value(&mut self, value: &V) -> bool {
        if let Some(position) = self.values.iter().position(|v| v == value) {
            self.values.remove(position);
            true
        } else {
            false
        }
    }
}
