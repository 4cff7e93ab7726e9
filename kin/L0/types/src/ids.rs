//! Identifiers for mechanism elements.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier of an element in a mechanism.
///
/// Ids are dense indices handed out by the mechanism in insertion order, so
/// they double as positions in per-element lookup tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ElementId(pub usize);

impl ElementId {
    /// Create a new element ID.
    #[must_use]
    pub const fn new(id: usize) -> Self {
        Self(id)
    }

    /// Get the raw index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl From<usize> for ElementId {
    fn from(id: usize) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Element({})", self.0)
    }
}
