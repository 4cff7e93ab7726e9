//! Pose reconstruction for elements that are not solver components.
//!
//! Bars, springs, tires, simplified A-arms and linear bushings are replaced
//! by constraints between the components they attach to. After every solve
//! their poses are rebuilt from the solved positions of the points they are
//! jointed to. Elements merged into another component are restored by
//! composing the owner's pose with their fixed offset.
//!
//! Alignment is incremental: each restorer starts from the element's
//! current rotation and applies the smallest rotation that matches the
//! observed reference directions, so undetermined spin about a link axis
//! stays where it was.

use kin_constraint::Coordinates;
use kin_types::{ElementId, Pose, Vector3};

use crate::align::{three_point_pose, two_point_pose};

/// A point fixed in a component frame, used as a restorer reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefPoint {
    /// Owning component index.
    pub component: usize,
    /// Point in that component's frame.
    pub local: Vector3<f64>,
}

impl RefPoint {
    /// World position from solved component coordinates.
    #[must_use]
    pub fn world(&self, state: &[Coordinates]) -> Vector3<f64> {
        state[self.component].transform_point(&self.local)
    }
}

/// Result of a restore.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Restored {
    /// New element pose.
    pub pose: Pose,
    /// Elongation or axial travel, for elements that report one.
    pub dl_current: Option<f64>,
}

/// Rebuilds the pose of one non-component element.
#[derive(Debug, Clone, PartialEq)]
pub enum Restorer {
    /// Bar or spring-damper between two reference points.
    Bar {
        /// Restored element.
        element: ElementId,
        /// Where the two ends are jointed.
        ends: [RefPoint; 2],
        /// The two ends in the element's frame.
        locals: [Vector3<f64>; 2],
        /// Distance between the ends at rest.
        rest_length: f64,
    },
    /// Tire aligned to its bearing axis.
    Tire {
        /// Restored element.
        element: ElementId,
        /// Where the two bearings are jointed.
        bearings: [RefPoint; 2],
        /// The two bearings in the element's frame.
        locals: [Vector3<f64>; 2],
    },
    /// A-arm aligned to its base axis and outer joint.
    AArm {
        /// Restored element.
        element: ElementId,
        /// Base pivots then outer joint.
        references: [RefPoint; 3],
        /// Same points in the element's frame.
        locals: [Vector3<f64>; 3],
    },
    /// Linear bushing rod aligned to its support axis.
    LinearBushing {
        /// Restored element.
        element: ElementId,
        /// Where the two supports are jointed.
        supports: [RefPoint; 2],
        /// Where the first rod end is jointed.
        rod_end: RefPoint,
        /// Support points in the element's frame.
        support_locals: [Vector3<f64>; 2],
        /// First rod end in the element's frame.
        rod_local: Vector3<f64>,
        /// Axial offset of the rod end from the first support at rest.
        rest_travel: f64,
    },
    /// Element merged into another component.
    Relative {
        /// Restored element.
        element: ElementId,
        /// Owning component.
        owner: usize,
        /// Transform from the element's frame to the owner's frame.
        offset: Pose,
    },
}

impl Restorer {
    /// Element this restorer writes.
    #[must_use]
    pub fn element(&self) -> ElementId {
        match self {
            Self::Bar { element, .. }
            | Self::Tire { element, .. }
            | Self::AArm { element, .. }
            | Self::LinearBushing { element, .. }
            | Self::Relative { element, .. } => *element,
        }
    }

    /// Short name for logging.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Bar { .. } => "bar",
            Self::Tire { .. } => "tire",
            Self::AArm { .. } => "a-arm",
            Self::LinearBushing { .. } => "linear bushing",
            Self::Relative { .. } => "relative",
        }
    }

    /// Rewrite every component index.
    pub(crate) fn map_components(&mut self, mut f: impl FnMut(usize) -> usize) {
        let mut remap = |r: &mut RefPoint| r.component = f(r.component);
        match self {
            Self::Bar { ends: refs, .. } | Self::Tire { bearings: refs, .. } => {
                refs.iter_mut().for_each(&mut remap);
            }
            Self::AArm { references, .. } => references.iter_mut().for_each(&mut remap),
            Self::LinearBushing {
                supports, rod_end, ..
            } => {
                supports.iter_mut().for_each(&mut remap);
                remap(rod_end);
            }
            Self::Relative { owner, .. } => *owner = f(*owner),
        }
    }

    /// Compute the element's pose from solved component coordinates.
    #[must_use]
    pub fn restore(&self, state: &[Coordinates], current: &Pose) -> Restored {
        match self {
            Self::Bar {
                ends,
                locals,
                rest_length,
                ..
            } => {
                let worlds = ends.map(|r| r.world(state));
                Restored {
                    pose: two_point_pose(current, *locals, worlds),
                    dl_current: Some((worlds[1] - worlds[0]).norm() - rest_length),
                }
            }
            Self::Tire {
                bearings, locals, ..
            } => Restored {
                pose: two_point_pose(current, *locals, bearings.map(|r| r.world(state))),
                dl_current: None,
            },
            Self::AArm {
                references,
                locals,
                ..
            } => Restored {
                pose: three_point_pose(current, *locals, references.map(|r| r.world(state))),
                dl_current: None,
            },
            Self::LinearBushing {
                supports,
                rod_end,
                support_locals,
                rod_local,
                rest_travel,
                ..
            } => {
                let worlds = supports.map(|r| r.world(state));
                let rod = rod_end.world(state);
                let aligned = two_point_pose(current, *support_locals, worlds);
                let pose = Pose::from_position_rotation(
                    (rod - aligned.rotation * rod_local).into(),
                    aligned.rotation,
                );
                let axis = (worlds[1] - worlds[0]).try_normalize(f64::EPSILON);
                let travel = axis.map(|a| (rod - worlds[0]).dot(&a) - rest_travel);
                Restored {
                    pose,
                    dl_current: travel,
                }
            }
            Self::Relative { owner, offset, .. } => Restored {
                pose: state[*owner].to_pose().compose(offset),
                dl_current: None,
            },
        }
    }
}
