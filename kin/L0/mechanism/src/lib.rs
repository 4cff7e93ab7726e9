//! Mechanism graphs and the kinematic solver facade.
//!
//! A [`Mechanism`] is a flat list of [`Element`]s (rigid bodies, frames,
//! bars, spring-dampers, tires, A-arms, linear bushings and assemblies)
//! plus point-to-point [`Joint`]s. [`KinematicSolver`] turns it into a
//! constraint system, assembles it, and keeps element poses up to date
//! across repeated solves.
//!
//! # Graph Simplification
//!
//! Two-force members never become unknowns. A bar between two bodies is a
//! distance constraint; an A-arm is two distances from its base pivots to
//! its outer joint; a tire rides on its bearings. After each solve a
//! [`Restorer`] rebuilds those elements' poses from the jointed points.
//! Elements tied together by three or more non-collinear joints share one
//! set of coordinates.
//!
//! # Solves
//!
//! - [`KinematicSolver::solve`] - Satisfy every equality constraint
//! - [`KinematicSolver::solve_objective`] - Minimize an [`Objective`] while
//!   respecting constraints and at most one spring travel limit
//! - [`KinematicSolver::restore_initial_q`] - Return to the assembled pose
//!
//! A failed solve leaves element poses as they were.
//!
//! # Feature Flags
//!
//! - `parallel` - Solve independent groups with rayon
//! - `serde` - Serialization of elements and mechanisms

#![doc(html_root_url = "https://docs.rs/kin-mechanism/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::missing_errors_doc,
    clippy::suboptimal_flops
)]

pub mod align;
mod builder;
mod component;
mod element;
mod mechanism;
mod objective;
mod restorer;
mod solver;

pub use component::{Component, Location};
pub use element::{Element, ElementKind, Joint, NamedPoint, PointRef};
pub use mechanism::Mechanism;
pub use objective::{ComponentGradient, ElementFrame, Objective, PointTarget};
pub use restorer::{RefPoint, Restored, Restorer};
pub use solver::{ConstraintResidual, KinematicSolver, SolveReport};

// Results of the numeric core surface through the solver API.
pub use kin_constraint::{ActiveBound, BoundHint, GroupReport, GroupStatistics, ObjectiveReport};
