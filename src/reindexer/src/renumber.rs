//! Renumbering of 1-based positions after removals.
//!
//! Used identically for table indices and for column numbers within one table.
//! Positions are always computed against the original numbering.

use std::collections::BTreeSet;

/// Position of `original` once every member of `removed` is gone.
///
/// Returns `None` when `original` is itself removed.
pub fn new_index(original: u32, removed: &BTreeSet<u32>) -> Option<u32> {
    if removed.contains(&original) {
        return None;
    }

    let shift = removed.range(..original).count() as u32;
    Some(original - shift)
}

/// A removal set bound to its original numbering
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Renumbering {
    removed: BTreeSet<u32>,
}

impl Renumbering {
    pub fn new(removed: BTreeSet<u32>) -> Self {
        Self { removed }
    }

    pub fn removed(&self) -> &BTreeSet<u32> {
        &self.removed
    }

    pub fn is_identity(&self) -> bool {
        self.removed.is_empty()
    }

    pub fn is_removed(&self, original: u32) -> bool {
        self.removed.contains(&original)
    }

    pub fn new_index(&self, original: u32) -> Option<u32> {
        new_index(original, &self.removed)
    }

    /// Whether `original` keeps its position
    pub fn is_unchanged(&self, original: u32) -> bool {
        self.new_index(original) == Some(original)
    }
}

impl FromIterator<u32> for Renumbering {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
