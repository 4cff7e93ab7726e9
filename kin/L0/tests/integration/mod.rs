//! Integration tests for the kin-* crates.
//!
//! These tests drive whole mechanisms through the public solver API:
//! - Assembly of jointed bodies and suspension corners
//! - Objective solves with spring travel limits
//! - Rollback after failed solves
//! - Restorer consistency for simplified elements
//! - Group partitioning and relative-fixed merging

pub mod assembly;
pub mod grouping;
pub mod objective;
pub mod relative;
pub mod restorers;
pub mod rollback;
