//! Configuration types for the kinematic solver.
//!
//! These control tolerances and iteration caps of the Newton-Raphson
//! assembly solver, the quasi-Newton objective solver, and how independent
//! groups are scheduled.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How the designated frame element is treated while building the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FrameMode {
    /// The frame element is grounded: it contributes no unknowns.
    #[default]
    Grounded,
    /// The frame element floats like any other body unless flagged `fixed`.
    Floating,
}

/// Main configuration for the kinematic solver.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolverConfig {
    /// Newton-Raphson convergence threshold on the step norm `‖dq‖`.
    pub tolerance: f64,
    /// Newton-Raphson iteration cap per group.
    pub max_iterations: usize,
    /// A step norm exceeding `divergence_ratio` times the smallest norm seen
    /// so far is treated as divergence.
    pub divergence_ratio: f64,
    /// Relative singular-value cutoff used by the pseudo-inverse.
    pub svd_rcond: f64,
    /// Objective-driven solver settings.
    pub objective: ObjectiveConfig,
    /// Group scheduling.
    pub parallel: ParallelConfig,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-4,
            max_iterations: 100,
            divergence_ratio: 100.0,
            svd_rcond: 1e-12,
            objective: ObjectiveConfig::default(),
            parallel: ParallelConfig::default(),
        }
    }
}

impl SolverConfig {
    /// Tight tolerances for reference geometry and regression baselines.
    #[must_use]
    pub fn precise() -> Self {
        Self {
            tolerance: 1e-8,
            max_iterations: 200,
            objective: ObjectiveConfig {
                tolerance: 1e-6,
                max_iterations: 200,
                ..ObjectiveConfig::default()
            },
            ..Default::default()
        }
    }

    /// Loose tolerances for interactive dragging.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            tolerance: 1e-3,
            max_iterations: 30,
            objective: ObjectiveConfig {
                tolerance: 1e-2,
                max_iterations: 40,
                ..ObjectiveConfig::default()
            },
            ..Default::default()
        }
    }

    /// Set the Newton-Raphson tolerance.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the Newton-Raphson iteration cap.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the objective solver configuration.
    #[must_use]
    pub fn with_objective(mut self, objective: ObjectiveConfig) -> Self {
        self.objective = objective;
        self
    }

    /// Enable or disable solving independent groups in parallel.
    #[must_use]
    pub fn with_parallel_groups(mut self, enabled: bool) -> Self {
        self.parallel.parallel_groups = enabled;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(crate::KinematicError::invalid_config(format!(
                "tolerance must be positive and finite, got {}",
                self.tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(crate::KinematicError::invalid_config(
                "max_iterations must be at least 1",
            ));
        }
        if !self.divergence_ratio.is_finite() || self.divergence_ratio <= 1.0 {
            return Err(crate::KinematicError::invalid_config(format!(
                "divergence_ratio must exceed 1, got {}",
                self.divergence_ratio
            )));
        }
        if !self.svd_rcond.is_finite() || self.svd_rcond < 0.0 {
            return Err(crate::KinematicError::invalid_config(format!(
                "svd_rcond must be non-negative, got {}",
                self.svd_rcond
            )));
        }
        self.objective.validate()
    }
}

/// Configuration for the objective-driven quasi-Newton solver.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ObjectiveConfig {
    /// Convergence threshold on the norm of the KKT step `‖dq‖`.
    pub tolerance: f64,
    /// Inner iteration cap per pass.
    pub max_iterations: usize,
    /// Outer passes: the first ignores travel bounds, later passes bind the
    /// violated one.
    pub max_passes: usize,
    /// A BFGS update whose curvature `sᵀHs` is below this is skipped.
    pub curvature_epsilon: f64,
    /// Largest change of any quaternion component in one step.
    pub max_rotation_step: f64,
    /// Step halvings tried before a step counts as stalled.
    pub max_backtracks: usize,
    /// Elongation slack before a travel bound counts as violated.
    pub bound_tolerance: f64,
}

impl Default for ObjectiveConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-3,
            max_iterations: 100,
            max_passes: 2,
            curvature_epsilon: 1e-12,
            max_rotation_step: 0.05,
            max_backtracks: 40,
            bound_tolerance: 1e-6,
        }
    }
}

impl ObjectiveConfig {
    fn validate(&self) -> crate::Result<()> {
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(crate::KinematicError::invalid_config(format!(
                "objective tolerance must be positive and finite, got {}",
                self.tolerance
            )));
        }
        if self.max_iterations == 0 || self.max_passes == 0 {
            return Err(crate::KinematicError::invalid_config(
                "objective iteration and pass caps must be at least 1",
            ));
        }
        if self.curvature_epsilon < 0.0 || self.bound_tolerance < 0.0 {
            return Err(crate::KinematicError::invalid_config(
                "objective epsilons must be non-negative",
            ));
        }
        if !self.max_rotation_step.is_finite() || self.max_rotation_step <= 0.0 {
            return Err(crate::KinematicError::invalid_config(format!(
                "max_rotation_step must be positive and finite, got {}",
                self.max_rotation_step
            )));
        }
        Ok(())
    }
}

/// Scheduling of independent groups.
///
/// Groups produced by the union-find partition share no unknowns, so they
/// can be solved concurrently. Solving one group never reads another group's
/// coordinates, which keeps parallel results identical to sequential ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParallelConfig {
    /// Solve groups on the rayon pool (requires the `parallel` feature of
    /// the solver crates; ignored otherwise).
    pub parallel_groups: bool,
    /// Minimum number of groups before the parallel path is taken.
    pub min_groups_for_parallel: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            parallel_groups: false,
            min_groups_for_parallel: 2,
        }
    }
}

/// Per-call options for an equality solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolveOptions {
    /// Treat travel-bounded elements (springs, dampers) as rigid at their
    /// rest length. Used when assembling a freshly built mechanism.
    pub on_assemble: bool,
    /// Overrides the configured iteration cap.
    pub max_iterations: Option<usize>,
    /// Write results back to elements and run restorers.
    pub run_post_process: bool,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            on_assemble: false,
            max_iterations: None,
            run_post_process: true,
        }
    }
}

impl SolveOptions {
    /// Options for the assembly pass.
    #[must_use]
    pub fn assemble() -> Self {
        Self {
            on_assemble: true,
            ..Default::default()
        }
    }

    /// Override the iteration cap.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    /// Skip writing results back to elements.
    #[must_use]
    pub fn without_post_process(mut self) -> Self {
        self.run_post_process = false;
        self
    }

    /// Validate the per-call overrides.
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_iterations == Some(0) {
            return Err(crate::KinematicError::invalid_config(
                "max_iterations override must be at least 1",
            ));
        }
        Ok(())
    }
}
