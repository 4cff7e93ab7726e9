//! Mechanism elements and point-to-point joints.
//!
//! An element is a rigid part with a list of named local points. Its
//! [`ElementKind`] tells the graph builder whether it can be replaced by a
//! cheaper constraint (bars, springs, tires, A-arms, linear bushings) or
//! must become a solver component.

use kin_types::{ElementId, Pose};
use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What kind of part an element is.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ElementKind {
    /// Generic rigid body (chassis, upright, bell crank).
    Body,
    /// The vehicle frame. Grounded when the solver runs in
    /// [`FrameMode::Grounded`](kin_types::FrameMode::Grounded).
    Frame,
    /// Rigid link with exactly two points.
    Bar,
    /// Two-point link whose length may vary within `[dl_min, dl_max]`
    /// around its rest length.
    SpringDamper {
        /// Minimum elongation (compression is negative).
        dl_min: f64,
        /// Maximum elongation.
        dl_max: f64,
    },
    /// Wheel with two bearing points; other points are free markers.
    Tire {
        /// Point indices of the two bearings.
        bearings: [usize; 2],
    },
    /// Triangular control arm: points 0 and 1 are the base pivots, point 2
    /// the outer ball joint.
    AArm,
    /// Rod sliding in two bushings. The support points define the axis; all
    /// other points are rod ends.
    LinearBushing {
        /// Point indices of the two bushing supports.
        supports: [usize; 2],
    },
    /// Container only. Assemblies group elements and are never solved.
    Assembly,
}

impl ElementKind {
    /// Whether the graph builder may replace this element by constraints.
    #[must_use]
    pub fn is_simplifiable(&self) -> bool {
        matches!(
            self,
            Self::Bar
                | Self::SpringDamper { .. }
                | Self::Tire { .. }
                | Self::AArm
                | Self::LinearBushing { .. }
        )
    }

    /// Bars and springs: two-point links.
    #[must_use]
    pub fn is_link(&self) -> bool {
        matches!(self, Self::Bar | Self::SpringDamper { .. })
    }

    /// Short name for messages.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Body => "body",
            Self::Frame => "frame",
            Self::Bar => "bar",
            Self::SpringDamper { .. } => "spring-damper",
            Self::Tire { .. } => "tire",
            Self::AArm => "a-arm",
            Self::LinearBushing { .. } => "linear bushing",
            Self::Assembly => "assembly",
        }
    }
}

/// A named point in an element's local frame.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NamedPoint {
    /// Point name, unique within the element.
    pub name: String,
    /// Local coordinates.
    pub local: Vector3<f64>,
}

/// A rigid part of a mechanism.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Element {
    /// Display name.
    pub name: String,
    /// Part type.
    pub kind: ElementKind,
    /// Current world pose.
    pub pose: Pose,
    /// Whether the element never moves.
    pub fixed: bool,
    /// Containing assembly, if any.
    pub parent: Option<ElementId>,
    points: Vec<NamedPoint>,
    dl_current: Option<f64>,
}

impl Element {
    /// Create an element at the origin.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ElementKind) -> Self {
        Self {
            name: name.into(),
            kind,
            pose: Pose::identity(),
            fixed: false,
            parent: None,
            points: Vec::new(),
            dl_current: None,
        }
    }

    /// Generic rigid body.
    #[must_use]
    pub fn body(name: impl Into<String>) -> Self {
        Self::new(name, ElementKind::Body)
    }

    /// Vehicle frame.
    #[must_use]
    pub fn frame(name: impl Into<String>) -> Self {
        Self::new(name, ElementKind::Frame)
    }

    /// Assembly container.
    #[must_use]
    pub fn assembly(name: impl Into<String>) -> Self {
        Self::new(name, ElementKind::Assembly)
    }

    /// Two-point rigid link with points `"start"` and `"end"`, posed at
    /// `start` with identity orientation.
    #[must_use]
    pub fn bar(name: impl Into<String>, start: Vector3<f64>, end: Vector3<f64>) -> Self {
        Self::link(name, ElementKind::Bar, start, end)
    }

    /// Spring-damper between `start` and `end` with elongation limits.
    #[must_use]
    pub fn spring_damper(
        name: impl Into<String>,
        start: Vector3<f64>,
        end: Vector3<f64>,
        dl_min: f64,
        dl_max: f64,
    ) -> Self {
        Self::link(name, ElementKind::SpringDamper { dl_min, dl_max }, start, end)
    }

    fn link(name: impl Into<String>, kind: ElementKind, start: Vector3<f64>, end: Vector3<f64>) -> Self {
        Self::new(name, kind)
            .with_pose(Pose::from_position(start.into()))
            .with_point("start", Vector3::zeros())
            .with_point("end", end - start)
    }

    /// Add a named local point.
    #[must_use]
    pub fn with_point(mut self, name: impl Into<String>, local: Vector3<f64>) -> Self {
        self.points.push(NamedPoint {
            name: name.into(),
            local,
        });
        self
    }

    /// Add a point given in world coordinates at the current pose.
    #[must_use]
    pub fn with_world_point(self, name: impl Into<String>, world: Vector3<f64>) -> Self {
        let local = self.pose.inverse_transform_point(&world.into());
        self.with_point(name, local)
    }

    /// Set the pose.
    #[must_use]
    pub fn with_pose(mut self, pose: Pose) -> Self {
        self.pose = pose;
        self
    }

    /// Mark the element as fixed.
    #[must_use]
    pub fn with_fixed(mut self, fixed: bool) -> Self {
        self.fixed = fixed;
        self
    }

    /// Place the element in an assembly.
    #[must_use]
    pub fn with_parent(mut self, parent: ElementId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Declared points.
    #[must_use]
    pub fn points(&self) -> &[NamedPoint] {
        &self.points
    }

    /// Index of a point by name.
    #[must_use]
    pub fn point_index(&self, name: &str) -> Option<usize> {
        self.points.iter().position(|p| p.name == name)
    }

    /// Local coordinates of a point by name.
    #[must_use]
    pub fn point(&self, name: &str) -> Option<Vector3<f64>> {
        self.points.iter().find(|p| p.name == name).map(|p| p.local)
    }

    /// World position of a point by name.
    #[must_use]
    pub fn world_point(&self, name: &str) -> Option<nalgebra::Point3<f64>> {
        self.point(name).map(|local| self.pose.transform_point(&local))
    }

    /// Distance between the first two points; the rest length of links.
    #[must_use]
    pub fn rest_length(&self) -> Option<f64> {
        match self.points.as_slice() {
            [a, b, ..] => Some((b.local - a.local).norm()),
            _ => None,
        }
    }

    /// Current elongation of links and linear bushings, written by the
    /// restorers after every post-process.
    #[must_use]
    pub fn dl_current(&self) -> Option<f64> {
        self.dl_current
    }

    pub(crate) fn set_dl_current(&mut self, dl: Option<f64>) {
        self.dl_current = dl;
    }
}

/// One end of a joint: a named point on an element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PointRef {
    /// Element carrying the point.
    pub element: ElementId,
    /// Point name on that element.
    pub point: String,
}

impl PointRef {
    /// Create a point reference.
    #[must_use]
    pub fn new(element: ElementId, point: impl Into<String>) -> Self {
        Self {
            element,
            point: point.into(),
        }
    }
}

/// Two points that must coincide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Joint {
    /// First point.
    pub a: PointRef,
    /// Second point.
    pub b: PointRef,
}
