//! Constrained objective minimization (quasi-Newton SQP).
//!
//! Minimizes a scalar objective over one group's coordinates while keeping
//! the active constraint rows satisfied. Each iteration solves the KKT
//! system
//!
//! ```text
//! [ H  -Jᵀ ] [ Δ ]   [ -∇f ]
//! [ J   0  ] [ λ ] = [ -φ  ]
//! ```
//!
//! in the least-squares sense and moves along `Δ`. Each trial point is
//! pulled back onto the constraints by a Newton projection and accepted
//! once the objective decreases enough; the quaternion part of a step is
//! capped by `max_rotation_step`. The Hessian approximation `H` starts as
//! the identity, is rescaled to the first observed curvature, and then
//! follows damped BFGS updates on the Lagrangian gradient `∇L = ∇f - Jᵀλ`.
//!
//! A pass converges when `‖Δ‖` drops below the tolerance, when the step
//! vanishes, or when no fraction of the step decreases the objective.
//!
//! # Travel Bounds
//!
//! Bounded distances are ignored on the first pass. If the converged pose
//! violates exactly one travel limit, the group restarts from where the
//! pass began with that distance pinned to the violated limit. More than
//! one violated limit is reported as a topology error.

use std::time::Instant;

use kin_types::{ConvergenceFailure, KinematicError, ObjectiveConfig, Result};
use nalgebra::{DMatrix, DVector};
use tracing::{debug, trace};

use crate::constraint::{BoundHint, Constraint, Frames, SolveMode};
use crate::coords::{Coordinates, COORDINATES_PER_BODY};
use crate::group::{Group, NewtonSettings};
use crate::linalg::{solve_least_squares, DivergenceGuard};

/// Scalar objective over one group's coordinates.
pub trait GroupObjective {
    /// Objective value.
    fn value(&self, coords: &[Coordinates]) -> f64;

    /// Add `∂f/∂q` into `gradient`, laid out like the group's unknowns.
    /// The caller zeroes the vector first.
    fn gradient(&self, coords: &[Coordinates], gradient: &mut DVector<f64>);
}

/// A travel bound promoted to an equality.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveBound {
    /// Index of the bounded distance in the group's constraint list.
    pub constraint: usize,
    /// Which limit was violated.
    pub hint: BoundHint,
    /// Length the distance is pinned to.
    pub length: f64,
}

/// Outcome of an objective solve on one group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectiveReport {
    /// Group index.
    pub group: usize,
    /// Passes run (1 or 2).
    pub passes: usize,
    /// Iterations summed over all passes.
    pub iterations: usize,
    /// Objective value at the solution.
    pub value: f64,
    /// Norm of the final step.
    pub step_norm: f64,
    /// Norm of the Lagrangian gradient at the solution.
    pub gradient_norm: f64,
    /// Bound that was pinned on the second pass, if any.
    pub active_bound: Option<ActiveBound>,
}

#[derive(Debug, Clone, Copy)]
struct PassOutcome {
    iterations: usize,
    step_norm: f64,
    gradient_norm: f64,
}

impl Group {
    /// Bounded distances whose elongation lies outside their travel.
    #[must_use]
    pub fn violated_bounds(&self, fixed: &[Coordinates], tolerance: f64) -> Vec<ActiveBound> {
        let frames = Frames::new(self.coords(), fixed);
        self.constraints()
            .iter()
            .enumerate()
            .filter_map(|(index, constraint)| {
                let Constraint::Distance(distance) = constraint else {
                    return None;
                };
                let bounds = distance.bounds?;
                let hint = bounds.hint(distance.elongation(&frames), tolerance);
                bounds.limit(hint).map(|dl| ActiveBound {
                    constraint: index,
                    hint,
                    length: distance.rest_length + dl,
                })
            })
            .collect()
    }

    /// Minimize an objective subject to the group's operating constraints.
    ///
    /// On failure the coordinates are left wherever the iteration stopped;
    /// the caller owns rollback.
    ///
    /// # Errors
    ///
    /// Returns [`KinematicError::Convergence`] for iteration-cap, divergence
    /// or non-finite failures, and [`KinematicError::Topology`] when more
    /// than one travel bound is violated after the first pass.
    pub fn solve_objective(
        &mut self,
        fixed: &[Coordinates],
        objective: &dyn GroupObjective,
        config: &ObjectiveConfig,
        settings: &NewtonSettings,
    ) -> Result<ObjectiveReport> {
        let start = Instant::now();
        let snapshot = self.coords().to_vec();

        let mut outcome = self.minimize(fixed, objective, None, config, settings)?;
        let mut iterations = outcome.iterations;
        let mut passes = 1;
        let mut active_bound = None;

        if config.max_passes > 1 {
            let violated = self.violated_bounds(fixed, config.bound_tolerance);
            match violated.as_slice() {
                [] => {}
                [bound] => {
                    debug!(
                        group = self.index(),
                        constraint = bound.constraint,
                        hint = bound.hint.as_i8(),
                        length = bound.length,
                        "travel bound violated, re-solving with limit active"
                    );
                    self.coords_mut().copy_from_slice(&snapshot);
                    outcome = self.minimize(fixed, objective, Some(bound), config, settings)?;
                    iterations += outcome.iterations;
                    passes = 2;
                    active_bound = Some(*bound);
                }
                many => {
                    return Err(KinematicError::topology(format!(
                        "{} travel bounds in group {} are violated at once; \
                         only one active limit is supported",
                        many.len(),
                        self.index()
                    )));
                }
            }
        }

        let value = objective.value(self.coords());
        debug!(
            group = self.index(),
            passes,
            iterations,
            value,
            elapsed_us = start.elapsed().as_micros(),
            "objective solved"
        );
        Ok(ObjectiveReport {
            group: self.index(),
            passes,
            iterations,
            value,
            step_norm: outcome.step_norm,
            gradient_norm: outcome.gradient_norm,
            active_bound,
        })
    }

    #[allow(clippy::too_many_lines)]
    fn minimize(
        &mut self,
        fixed: &[Coordinates],
        objective: &dyn GroupObjective,
        bound: Option<&ActiveBound>,
        config: &ObjectiveConfig,
        settings: &NewtonSettings,
    ) -> Result<PassOutcome> {
        let n = self.dof();
        let index = self.index();
        let fail = |iterations: usize, failure: ConvergenceFailure| {
            KinematicError::convergence(index, iterations, failure)
        };

        // The second pass starts off the pinned limit.
        self.project(fixed, bound, settings)?;

        let mut hessian = DMatrix::<f64>::identity(n, n);
        let mut scaled = false;
        let mut guard = DivergenceGuard::new(settings.divergence_ratio, config.tolerance);
        let mut gradient = DVector::zeros(n);
        objective.gradient(self.coords(), &mut gradient);
        let mut value = objective.value(self.coords());
        let (mut residual, mut jacobian) = self.assemble(fixed, SolveMode::Operate, bound);

        for iteration in 1..=config.max_iterations {
            let m = residual.len();
            let mut kkt = DMatrix::zeros(n + m, n + m);
            kkt.view_mut((0, 0), (n, n)).copy_from(&hessian);
            kkt.view_mut((0, n), (n, m)).copy_from(&(-jacobian.transpose()));
            kkt.view_mut((n, 0), (m, n)).copy_from(&jacobian);
            let mut rhs = DVector::zeros(n + m);
            rhs.rows_mut(0, n).copy_from(&(-&gradient));
            rhs.rows_mut(n, m).copy_from(&(-&residual));

            let solution = solve_least_squares(kkt, &rhs, settings.svd_rcond)
                .ok_or_else(|| fail(iteration, ConvergenceFailure::SingularSystem))?;
            let step = solution.rows(0, n).into_owned();
            let multipliers = solution.rows(n, m).into_owned();
            let step_norm = step.norm();
            guard
                .check(step_norm)
                .map_err(|failure| fail(iteration, failure))?;

            let lagrangian_before = &gradient - jacobian.transpose() * &multipliers;
            let before = flatten(self.coords());

            let Some(accepted) = self.line_search(fixed, objective, bound, &step, &gradient, value, config, settings)
            else {
                debug!(group = index, iteration, step_norm, "no descent along the step, stopping");
                return Ok(PassOutcome {
                    iterations: iteration,
                    step_norm,
                    gradient_norm: lagrangian_before.norm(),
                });
            };
            value = accepted;

            gradient.fill(0.0);
            objective.gradient(self.coords(), &mut gradient);
            (residual, jacobian) = self.assemble(fixed, SolveMode::Operate, bound);

            let lagrangian = &gradient - jacobian.transpose() * &multipliers;
            let gradient_norm = lagrangian.norm();
            if !gradient_norm.is_finite() {
                return Err(fail(iteration, ConvergenceFailure::NonFinite));
            }
            trace!(group = index, iteration, step_norm, gradient_norm, value, "quasi-newton step");

            if step_norm < config.tolerance {
                return Ok(PassOutcome {
                    iterations: iteration,
                    step_norm,
                    gradient_norm,
                });
            }

            let s = flatten(self.coords()) - before;
            let y = lagrangian - lagrangian_before;
            if !scaled {
                // Match the identity seed to the observed curvature once.
                let ys = y.dot(&s);
                if ys > config.curvature_epsilon {
                    hessian.fill_with_identity();
                    hessian *= y.norm_squared() / ys;
                    guard = DivergenceGuard::new(settings.divergence_ratio, config.tolerance);
                    scaled = true;
                }
            }
            if !bfgs_update(&mut hessian, &s, &y, config.curvature_epsilon) {
                // No curvature information left: the step has vanished.
                return Ok(PassOutcome {
                    iterations: iteration,
                    step_norm,
                    gradient_norm,
                });
            }
        }

        Err(fail(config.max_iterations, ConvergenceFailure::IterationLimit))
    }

    /// Backtrack along `step` until the re-projected objective decreases.
    ///
    /// Each trial applies a fraction of the step and pulls the coordinates
    /// back onto the constraints. Returns the accepted objective value, or
    /// `None` with the coordinates unchanged when no fraction decreases it.
    #[allow(clippy::too_many_arguments)]
    fn line_search(
        &mut self,
        fixed: &[Coordinates],
        objective: &dyn GroupObjective,
        bound: Option<&ActiveBound>,
        step: &DVector<f64>,
        gradient: &DVector<f64>,
        value: f64,
        config: &ObjectiveConfig,
        settings: &NewtonSettings,
    ) -> Option<f64> {
        let start = self.coords().to_vec();
        let slope = gradient.dot(step).min(0.0);
        let mut scale = rotation_limited_scale(step, config.max_rotation_step);

        for _ in 0..=config.max_backtracks {
            self.apply_step(step, scale);
            if self.project(fixed, bound, settings).is_ok() {
                let trial = objective.value(self.coords());
                if trial.is_finite() && trial <= value + ARMIJO * scale * slope {
                    return Some(trial);
                }
            }
            self.coords_mut().copy_from_slice(&start);
            scale *= 0.5;
        }
        None
    }
}

/// Sufficient-decrease fraction of the predicted objective change.
const ARMIJO: f64 = 1e-4;

fn flatten(coords: &[Coordinates]) -> DVector<f64> {
    DVector::from_iterator(
        coords.len() * COORDINATES_PER_BODY,
        coords.iter().flat_map(Coordinates::to_array),
    )
}

/// Largest fraction of `step` that changes no quaternion component by more
/// than `max_rotation_step`.
fn rotation_limited_scale(step: &DVector<f64>, max_rotation_step: f64) -> f64 {
    let largest = step
        .as_slice()
        .chunks(COORDINATES_PER_BODY)
        .flat_map(|slot| slot[3..].iter())
        .fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if largest > max_rotation_step {
        max_rotation_step / largest
    } else {
        1.0
    }
}

/// Damped BFGS update of `hessian` from displacement `s` and gradient
/// change `y`.
///
/// When `sᵀy < 0.2 sᵀHs`, `y` is blended towards `Hs` (Powell damping) so
/// the update keeps `hessian` positive definite even across negative
/// curvature. Returns `false` and leaves `hessian` untouched when
/// `sᵀHs <= epsilon`.
fn bfgs_update(hessian: &mut DMatrix<f64>, s: &DVector<f64>, y: &DVector<f64>, epsilon: f64) -> bool {
    let hs = &*hessian * s;
    let shs = s.dot(&hs);
    if shs.is_nan() || shs <= epsilon {
        return false;
    }
    let ys = y.dot(s);
    let r = if ys >= 0.2 * shs {
        y.clone()
    } else {
        let theta = 0.8 * shs / (shs - ys);
        y * theta + &hs * (1.0 - theta)
    };
    let sr = s.dot(&r);
    if sr.is_nan() || sr <= epsilon {
        return false;
    }
    *hessian += &r * r.transpose() / sr - &hs * hs.transpose() / shs;
    true
}
