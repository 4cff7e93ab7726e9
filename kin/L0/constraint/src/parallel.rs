//! Group-parallel Newton solving.
//!
//! Groups share no unknowns, so they can be solved on separate threads
//! without synchronization. Parallel solving is off by default; enable it
//! with the `parallel` feature and [`ParallelConfig::parallel_groups`].
//!
//! Reports are returned in group order regardless of scheduling, and the
//! first failure by group index is the one reported, so the outcome does
//! not depend on which thread finished first.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use kin_types::{ParallelConfig, Result};
#[cfg(feature = "parallel")]
use tracing::debug;

use crate::constraint::SolveMode;
use crate::coords::Coordinates;
use crate::group::{Group, GroupReport, NewtonSettings};

/// Solve every group, dispatching to rayon when configured.
///
/// # Errors
///
/// Returns the error of the lowest-index failing group.
#[cfg_attr(not(feature = "parallel"), allow(unused_variables))]
pub fn solve_groups(
    groups: &mut [Group],
    fixed: &[Coordinates],
    mode: SolveMode,
    settings: &NewtonSettings,
    parallel: &ParallelConfig,
) -> Result<Vec<GroupReport>> {
    #[cfg(feature = "parallel")]
    if parallel.parallel_groups && groups.len() >= parallel.min_groups_for_parallel {
        return solve_groups_parallel(groups, fixed, mode, settings);
    }

    solve_groups_sequential(groups, fixed, mode, settings)
}

/// Solve groups one after another, stopping at the first failure.
///
/// # Errors
///
/// Returns the first group error.
pub fn solve_groups_sequential(
    groups: &mut [Group],
    fixed: &[Coordinates],
    mode: SolveMode,
    settings: &NewtonSettings,
) -> Result<Vec<GroupReport>> {
    groups
        .iter_mut()
        .map(|group| group.solve(fixed, mode, settings))
        .collect()
}

/// Solve groups on the rayon pool.
///
/// # Errors
///
/// Returns the error of the lowest-index failing group.
#[cfg(feature = "parallel")]
pub fn solve_groups_parallel(
    groups: &mut [Group],
    fixed: &[Coordinates],
    mode: SolveMode,
    settings: &NewtonSettings,
) -> Result<Vec<GroupReport>> {
    debug!(groups = groups.len(), "solving groups in parallel");
    let results: Vec<Result<GroupReport>> = groups
        .par_iter_mut()
        .map(|group| group.solve(fixed, mode, settings))
        .collect();
    results.into_iter().collect()
}
