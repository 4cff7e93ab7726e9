//! The mechanism container: elements plus the joints between them.

use hashbrown::HashMap;
use kin_types::{ElementId, KinematicError, Point3, Result};

use crate::element::{Element, Joint, PointRef};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Elements and joints describing one linkage.
///
/// Element ids are dense indices assigned in insertion order.
///
/// # Example
///
/// ```
/// use kin_mechanism::{Element, Mechanism};
/// use nalgebra::Vector3;
///
/// let mut mechanism = Mechanism::new();
/// let chassis = mechanism.add_element(
///     Element::frame("chassis").with_point("pivot", Vector3::zeros()),
/// );
/// let link = mechanism.add_element(Element::bar(
///     "link",
///     Vector3::zeros(),
///     Vector3::new(0.0, 0.0, 10.0),
/// ));
/// mechanism.connect(chassis, "pivot", link, "start");
/// assert_eq!(mechanism.joints().len(), 1);
/// assert_eq!(mechanism.find("link"), Some(link));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Mechanism {
    elements: Vec<Element>,
    joints: Vec<Joint>,
}

impl Mechanism {
    /// Create an empty mechanism.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element and return its id.
    pub fn add_element(&mut self, element: Element) -> ElementId {
        let id = ElementId::new(self.elements.len());
        self.elements.push(element);
        id
    }

    /// Join a point on one element to a point on another.
    ///
    /// References are checked when the solver is built.
    pub fn connect(
        &mut self,
        a: ElementId,
        a_point: impl Into<String>,
        b: ElementId,
        b_point: impl Into<String>,
    ) -> &mut Self {
        self.joints.push(Joint {
            a: PointRef::new(a, a_point),
            b: PointRef::new(b, b_point),
        });
        self
    }

    /// All elements, indexed by id.
    #[must_use]
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// All joints.
    #[must_use]
    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether there are no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Look up an element.
    #[must_use]
    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(id.index())
    }

    /// Look up an element mutably.
    pub fn element_mut(&mut self, id: ElementId) -> Option<&mut Element> {
        self.elements.get_mut(id.index())
    }

    /// Look up an element, failing with [`KinematicError::UnknownElement`].
    ///
    /// # Errors
    ///
    /// Returns an error when `id` is out of range.
    pub fn try_element(&self, id: ElementId) -> Result<&Element> {
        self.element(id).ok_or(KinematicError::UnknownElement(id))
    }

    /// First element with the given name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<ElementId> {
        self.elements
            .iter()
            .position(|e| e.name == name)
            .map(ElementId::new)
    }

    /// Map of element names to ids. Later duplicates shadow earlier ones.
    #[must_use]
    pub fn name_index(&self) -> HashMap<&str, ElementId> {
        self.elements
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name.as_str(), ElementId::new(i)))
            .collect()
    }

    /// Children of an assembly.
    pub fn children(&self, parent: ElementId) -> impl Iterator<Item = ElementId> + '_ {
        self.elements
            .iter()
            .enumerate()
            .filter(move |(_, e)| e.parent == Some(parent))
            .map(|(i, _)| ElementId::new(i))
    }

    /// World position of a named point at the element's current pose.
    ///
    /// # Errors
    ///
    /// Returns [`KinematicError::UnknownElement`] or
    /// [`KinematicError::UnresolvedReference`].
    pub fn world_point(&self, id: ElementId, point: &str) -> Result<Point3<f64>> {
        self.try_element(id)?
            .world_point(point)
            .ok_or_else(|| KinematicError::unresolved(id, point))
    }
}
