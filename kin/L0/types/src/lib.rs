//! Core types for linkage kinematics.
//!
//! This crate provides the vocabulary shared by the kinematic solver crates:
//!
//! - [`ElementId`] - Identifier of an element in a mechanism
//! - [`Pose`] - Position and orientation of an element
//! - [`SolverConfig`] - Tolerances, iteration caps, group scheduling
//! - [`KinematicError`] - Convergence, topology and reference errors
//!
//! # Layer 0
//!
//! This is a Layer 0 crate with **zero rendering or UI dependencies**. The
//! types here are pure data shared between the constraint core, the
//! mechanism builder, and whatever front end feeds them.
//!
//! # Units and Conventions
//!
//! - Lengths are unit-agnostic; suspension models typically use millimetres.
//! - Right-handed world frame.
//! - Quaternions in the solver are ordered `(w, x, y, z)`.

#![doc(html_root_url = "https://docs.rs/kin-types/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::missing_errors_doc,
)]

mod config;
mod error;
mod ids;
mod pose;

pub use config::{FrameMode, ObjectiveConfig, ParallelConfig, SolveOptions, SolverConfig};
pub use error::{ConvergenceFailure, KinematicError, Result};
pub use ids::ElementId;
pub use pose::Pose;

// Re-export math types used throughout the public API
pub use nalgebra::{Isometry3, Point3, Quaternion, UnitQuaternion, Vector3};
