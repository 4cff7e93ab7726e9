//! Scalar objectives for driving a mechanism.
//!
//! An objective measures one element. The solver locates the group that
//! owns the element's coordinates and minimizes the objective over that
//! group while keeping its constraints satisfied.

use kin_constraint::{Coordinates, PointJacobian, COORDINATES_PER_BODY};
use kin_types::{ElementId, KinematicError, Point3, Pose, Result, Vector3};
use nalgebra::SVector;

use crate::mechanism::Mechanism;

/// Gradient with respect to one component's seven coordinates.
pub type ComponentGradient = SVector<f64, COORDINATES_PER_BODY>;

/// The frame of the measured element during a solve.
///
/// Elements merged into another component see the owner's coordinates
/// through a fixed offset.
#[derive(Debug, Clone, Copy)]
pub struct ElementFrame<'a> {
    coords: &'a Coordinates,
    offset: &'a Pose,
}

impl<'a> ElementFrame<'a> {
    /// Frame from owner coordinates and the element-to-owner offset.
    #[must_use]
    pub fn new(coords: &'a Coordinates, offset: &'a Pose) -> Self {
        Self { coords, offset }
    }

    /// World position of a point in the element's frame.
    #[must_use]
    pub fn world_point(&self, local: &Vector3<f64>) -> Vector3<f64> {
        self.coords
            .transform_point(&self.offset.transform_point(local).coords)
    }

    /// Jacobian of [`ElementFrame::world_point`] with respect to the
    /// owner's coordinates.
    #[must_use]
    pub fn point_jacobian(&self, local: &Vector3<f64>) -> PointJacobian {
        self.coords
            .point_jacobian(&self.offset.transform_point(local).coords)
    }
}

/// A scalar function of one element's pose.
pub trait Objective {
    /// Element the objective measures.
    fn element(&self) -> ElementId;

    /// Objective value.
    fn value(&self, frame: &ElementFrame<'_>) -> f64;

    /// Gradient with respect to the owning component's coordinates.
    fn gradient(&self, frame: &ElementFrame<'_>) -> ComponentGradient;
}

/// Squared distance between a body-fixed point and a world target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointTarget {
    /// Element carrying the point.
    pub element: ElementId,
    /// Point in the element's frame.
    pub local: Vector3<f64>,
    /// World target.
    pub target: Point3<f64>,
}

impl PointTarget {
    /// Target a local point.
    #[must_use]
    pub fn new(element: ElementId, local: Vector3<f64>, target: Point3<f64>) -> Self {
        Self {
            element,
            local,
            target,
        }
    }

    /// Target a named point of an element.
    ///
    /// # Errors
    ///
    /// Returns [`KinematicError::UnknownElement`] or
    /// [`KinematicError::UnresolvedReference`].
    pub fn named(mechanism: &Mechanism, element: ElementId, point: &str, target: Point3<f64>) -> Result<Self> {
        let local = mechanism
            .try_element(element)?
            .point(point)
            .ok_or_else(|| KinematicError::unresolved(element, point))?;
        Ok(Self::new(element, local, target))
    }
}

impl Objective for PointTarget {
    fn element(&self) -> ElementId {
        self.element
    }

    fn value(&self, frame: &ElementFrame<'_>) -> f64 {
        (frame.world_point(&self.local) - self.target.coords).norm_squared()
    }

    fn gradient(&self, frame: &ElementFrame<'_>) -> ComponentGradient {
        let d = frame.world_point(&self.local) - self.target.coords;
        (d.transpose() * frame.point_jacobian(&self.local)).transpose() * 2.0
    }
}
