//! Independent constraint groups and their Newton solve.
//!
//! A group owns the coordinates of a set of free components plus every
//! constraint touching at least one of them. Groups share no unknowns, so
//! each one is solved on its own: sequentially, or on a rayon pool when the
//! `parallel` feature is enabled.
//!
//! # Newton Iteration
//!
//! ```text
//! repeat:
//!     assemble φ(q), J(q)          (active rows only)
//!     dq = pinv(J) φ               (SVD, minimum norm)
//!     q  = q - dq, renormalize quaternions
//!     stop when |dq| < tolerance
//! ```
//!
//! A step that is non-finite or larger than `divergence_ratio` times the
//! smallest step seen so far aborts the solve.

use std::time::Instant;

use kin_types::{ConvergenceFailure, KinematicError, Result, SolverConfig};
use nalgebra::{DMatrix, DVector};
use tracing::{debug, trace};

use crate::constraint::{Constraint, Frames, SolveMode};
use crate::coords::{Coordinates, COORDINATES_PER_BODY};
use crate::linalg::{solve_least_squares, DivergenceGuard};
use crate::quasi_newton::ActiveBound;

// ============================================================================
// Settings and reports
// ============================================================================

/// Numeric settings of one Newton solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewtonSettings {
    /// Step-norm convergence threshold.
    pub tolerance: f64,
    /// Iteration cap.
    pub max_iterations: usize,
    /// Divergence detection ratio.
    pub divergence_ratio: f64,
    /// Relative singular value cutoff.
    pub svd_rcond: f64,
}

impl NewtonSettings {
    /// Settings from a solver configuration, optionally overriding the
    /// iteration cap.
    #[must_use]
    pub fn from_config(config: &SolverConfig, max_iterations: Option<usize>) -> Self {
        Self {
            tolerance: config.tolerance,
            max_iterations: max_iterations.unwrap_or(config.max_iterations),
            divergence_ratio: config.divergence_ratio,
            svd_rcond: config.svd_rcond,
        }
    }
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self::from_config(&SolverConfig::default(), None)
    }
}

/// Outcome of a converged Newton solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupReport {
    /// Group index.
    pub group: usize,
    /// Iterations performed (the converging iteration included).
    pub iterations: usize,
    /// Norm of the final step.
    pub step_norm: f64,
    /// Largest absolute residual after the solve.
    pub residual: f64,
}

// ============================================================================
// Group
// ============================================================================

/// A set of free components coupled by constraints.
#[derive(Debug, Clone)]
pub struct Group {
    index: usize,
    members: Vec<usize>,
    coords: Vec<Coordinates>,
    constraints: Vec<Constraint>,
}

impl Group {
    /// Create a group.
    ///
    /// `members[slot]` is the global component index of each slot and
    /// `coords[slot]` its coordinates. Constraints must already refer to
    /// free bodies by slot.
    #[must_use]
    pub fn new(
        index: usize,
        members: Vec<usize>,
        coords: Vec<Coordinates>,
        constraints: Vec<Constraint>,
    ) -> Self {
        debug_assert_eq!(members.len(), coords.len());
        Self {
            index,
            members,
            coords,
            constraints,
        }
    }

    /// Group index.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Global component index of each slot.
    #[must_use]
    pub fn members(&self) -> &[usize] {
        &self.members
    }

    /// Slot of a global component, if it belongs to this group.
    #[must_use]
    pub fn slot_of(&self, component: usize) -> Option<usize> {
        self.members.iter().position(|&m| m == component)
    }

    /// Current coordinates by slot.
    #[must_use]
    pub fn coords(&self) -> &[Coordinates] {
        &self.coords
    }

    /// Mutable coordinates by slot.
    pub fn coords_mut(&mut self) -> &mut [Coordinates] {
        &mut self.coords
    }

    /// Constraints, quaternion normalization rows included.
    #[must_use]
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Number of unknowns.
    #[must_use]
    pub fn dof(&self) -> usize {
        self.coords.len() * COORDINATES_PER_BODY
    }

    /// Number of active residual rows in a mode.
    #[must_use]
    pub fn active_rows(&self, mode: SolveMode) -> usize {
        self.constraints
            .iter()
            .filter(|c| c.is_active(mode))
            .map(Constraint::rows)
            .sum()
    }

    /// Assemble the residual vector and Jacobian of the active rows.
    ///
    /// An active bound appends one extra row pinning that distance to its
    /// violated limit.
    #[must_use]
    pub fn assemble(
        &self,
        fixed: &[Coordinates],
        mode: SolveMode,
        bound: Option<&ActiveBound>,
    ) -> (DVector<f64>, DMatrix<f64>) {
        let extra = usize::from(bound.is_some());
        let rows = self.active_rows(mode) + extra;
        let mut residual = DVector::zeros(rows);
        let mut jacobian = DMatrix::zeros(rows, self.dof());
        let frames = Frames::new(&self.coords, fixed);

        let mut row = 0;
        for constraint in self.constraints.iter().filter(|c| c.is_active(mode)) {
            constraint.evaluate(&frames, row, &mut residual, &mut jacobian);
            row += constraint.rows();
        }
        if let Some(bound) = bound {
            if let Some(Constraint::Distance(distance)) = self.constraints.get(bound.constraint) {
                distance.evaluate_with_length(&frames, bound.length, row, &mut residual, &mut jacobian);
            }
        }
        (residual, jacobian)
    }

    /// Largest absolute residual of the active rows.
    #[must_use]
    pub fn residual(&self, fixed: &[Coordinates], mode: SolveMode) -> f64 {
        let (residual, _) = self.assemble(fixed, mode, None);
        if residual.is_empty() {
            0.0
        } else {
            residual.amax()
        }
    }

    /// Add `scale * step` to every slot and renormalize.
    pub fn apply_step(&mut self, step: &DVector<f64>, scale: f64) {
        for (slot, coords) in self.coords.iter_mut().enumerate() {
            let start = slot * COORDINATES_PER_BODY;
            coords.apply_step(&step.as_slice()[start..start + COORDINATES_PER_BODY], scale);
        }
    }

    /// Newton solve of the active constraint rows.
    ///
    /// On failure the coordinates are left wherever the iteration stopped;
    /// the caller owns rollback.
    ///
    /// # Errors
    ///
    /// Returns [`KinematicError::Convergence`] when the iteration cap is
    /// reached, a step diverges or turns non-finite, or the SVD fails.
    pub fn solve(
        &mut self,
        fixed: &[Coordinates],
        mode: SolveMode,
        settings: &NewtonSettings,
    ) -> Result<GroupReport> {
        let start = Instant::now();
        let (iterations, step_norm) = self.newton(fixed, mode, None, settings)?;
        let residual = self.residual(fixed, mode);
        debug!(
            group = self.index,
            iterations,
            residual,
            elapsed_us = start.elapsed().as_micros(),
            "group converged"
        );
        Ok(GroupReport {
            group: self.index,
            iterations,
            step_norm,
            residual,
        })
    }

    /// Pull the coordinates back onto the operating constraints, with an
    /// optional travel bound pinned. Returns the iterations used.
    ///
    /// # Errors
    ///
    /// Same as [`Group::solve`].
    pub fn project(
        &mut self,
        fixed: &[Coordinates],
        bound: Option<&ActiveBound>,
        settings: &NewtonSettings,
    ) -> Result<usize> {
        self.newton(fixed, SolveMode::Operate, bound, settings)
            .map(|(iterations, _)| iterations)
    }

    fn newton(
        &mut self,
        fixed: &[Coordinates],
        mode: SolveMode,
        bound: Option<&ActiveBound>,
        settings: &NewtonSettings,
    ) -> Result<(usize, f64)> {
        let mut guard = DivergenceGuard::new(settings.divergence_ratio, settings.tolerance);
        let index = self.index;
        let fail = |iterations: usize, failure: ConvergenceFailure| {
            KinematicError::convergence(index, iterations, failure)
        };

        for iteration in 1..=settings.max_iterations {
            let (residual, jacobian) = self.assemble(fixed, mode, bound);
            let step = solve_least_squares(jacobian, &residual, settings.svd_rcond)
                .ok_or_else(|| fail(iteration, ConvergenceFailure::SingularSystem))?;
            let step_norm = step.norm();
            guard
                .check(step_norm)
                .map_err(|failure| fail(iteration, failure))?;

            self.apply_step(&step, -1.0);
            trace!(group = self.index, iteration, step_norm, "newton step");

            if step_norm < settings.tolerance {
                return Ok((iteration, step_norm));
            }
        }

        Err(fail(settings.max_iterations, ConvergenceFailure::IterationLimit))
    }
}
