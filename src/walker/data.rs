//! This module contains miscellaneous small data-types that are used by the
//! walker.

use std::collections::HashSet;

/// A container that tracks which instruction offsets have been explored in a
/// single walk.
///
/// Each offset is explored at most once, which bounds the walk even when the
/// method contains loops.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExploredOffsets {
    data: HashSet<u32>,
}

impl ExploredOffsets {
    /// Constructs a new, empty, tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `offset` as explored, returning `false` if it already was.
    pub fn mark_explored(&mut self, offset: u32) -> bool {
        self.data.insert(offset)
    }

    /// Checks if `offset` has been explored.
    #[must_use]
    pub fn is_explored(&self, offset: u32) -> bool {
        self.data.contains(&offset)
    }

    /// Gets the number of explored offsets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Checks if no offsets have been explored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
