//! Constraint primitives and group solvers for rigid linkages.
//!
//! This crate is the numeric core of the kinematic solver. It knows nothing
//! about mechanism elements or joints; it works on components (rigid frames
//! with seven coordinates each) and constraints between points fixed in
//! them.
//!
//! # Constraint Types
//!
//! - [`SphereConstraint`] - Two points coincide (3 rows)
//! - [`HingeConstraint`] - Revolute joint (5 rows)
//! - [`DistanceConstraint`] - Fixed or travel-bounded distance (1 row)
//! - [`LinearBushingConstraint`] - Point stays on an axis (2 rows)
//! - [`QuaternionNormConstraint`] - Unit quaternion (1 row)
//!
//! # Solvers
//!
//! - [`Group::solve`] - Newton iteration with SVD pseudo-inverse steps
//! - [`Group::solve_objective`] - Quasi-Newton SQP with BFGS Hessian
//!   updates and at most one re-solve for a violated travel bound
//! - [`solve_groups`] - Solve every group, optionally on a rayon pool
//!
//! # Example
//!
//! ```
//! use kin_constraint::{partition, Anchor, BodyRef, Constraint, Coordinates, NewtonSettings, SolveMode};
//! use nalgebra::{Quaternion, Vector3};
//!
//! // Component 0 is ground, component 1 is a free link pinned to it.
//! let coords = vec![
//!     Coordinates::identity(),
//!     Coordinates::new(Vector3::new(0.5, 0.0, 0.0), Quaternion::identity()),
//! ];
//! let pin = Constraint::sphere(
//!     Anchor::new(BodyRef::Free(1), Vector3::zeros()),
//!     Anchor::new(BodyRef::Fixed(0), Vector3::zeros()),
//! );
//! let mut groups = partition(&[false, true], &coords, vec![pin]);
//! let report = groups[0]
//!     .solve(&coords, SolveMode::Assemble, &NewtonSettings::default())
//!     .unwrap();
//! assert!(report.residual < 1e-9);
//! ```
//!
//! # Feature Flags
//!
//! - `parallel` - Solve independent groups with rayon
//! - `serde` - Serialization of plain data types

#![doc(html_root_url = "https://docs.rs/kin-constraint/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::missing_errors_doc,
    clippy::many_single_char_names,
    clippy::suboptimal_flops
)]

mod constraint;
mod coords;
mod group;
mod islands;
mod linalg;
mod parallel;
mod quasi_newton;

pub use constraint::{
    orthonormal_complement, Anchor, BodyRef, BoundHint, Constraint, DistanceConstraint, Frames,
    HingeConstraint, LinearBushingConstraint, QuaternionNormConstraint, SolveMode,
    SphereConstraint, TravelBounds,
};
pub use coords::{Coordinates, PointJacobian, COORDINATES_PER_BODY};
pub use group::{Group, GroupReport, NewtonSettings};
pub use islands::{partition, GroupStatistics};
pub use linalg::{skew, solve_least_squares, DivergenceGuard, UnionFind};
#[cfg(feature = "parallel")]
pub use parallel::solve_groups_parallel;
pub use parallel::{solve_groups, solve_groups_sequential};
pub use quasi_newton::{ActiveBound, GroupObjective, ObjectiveReport};
