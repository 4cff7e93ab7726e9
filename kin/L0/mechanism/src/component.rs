//! Solver components: the elements that own (or share) coordinates.

use kin_types::{ElementId, Pose};

/// How a component's coordinates are determined.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Location {
    /// Seven unknowns solved by its group.
    Free,
    /// Frozen at the element's pose; contributes no unknowns.
    Fixed,
    /// Rigidly attached to another component through three or more joints.
    /// The element's pose is `owner_pose ∘ offset`.
    Relative {
        /// Index of the owning component. Always a free or fixed component.
        owner: usize,
        /// Transform from this element's frame to the owner's frame.
        offset: Pose,
    },
}

/// One element as seen by the solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Component {
    element: ElementId,
    location: Location,
}

impl Component {
    pub(crate) fn new(element: ElementId, location: Location) -> Self {
        Self { element, location }
    }

    /// Element this component represents.
    #[must_use]
    pub fn element(&self) -> ElementId {
        self.element
    }

    /// How the coordinates are determined.
    #[must_use]
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Whether this component carries unknowns.
    #[must_use]
    pub fn is_free(&self) -> bool {
        matches!(self.location, Location::Free)
    }

    /// Whether this component is frozen.
    #[must_use]
    pub fn is_fixed(&self) -> bool {
        matches!(self.location, Location::Fixed)
    }

    /// Whether this component delegates to an owner.
    #[must_use]
    pub fn is_relative(&self) -> bool {
        matches!(self.location, Location::Relative { .. })
    }

    /// Index of the component whose coordinates this one uses.
    #[must_use]
    pub fn owner(&self, own_index: usize) -> usize {
        match self.location {
            Location::Relative { owner, .. } => owner,
            Location::Free | Location::Fixed => own_index,
        }
    }

    /// Transform from this element's frame to the owner's frame.
    #[must_use]
    pub fn offset(&self) -> Pose {
        match self.location {
            Location::Relative { offset, .. } => offset,
            Location::Free | Location::Fixed => Pose::identity(),
        }
    }
}
