//! Error types for kinematic solving.

use thiserror::Error;

use crate::ElementId;

/// Why an iterative solve stopped without converging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConvergenceFailure {
    /// The iteration cap was reached.
    IterationLimit,
    /// The step norm grew past the allowed multiple of its historical minimum.
    Diverged {
        /// Offending step norm.
        norm: f64,
        /// Smallest step norm seen before it.
        min_norm: f64,
    },
    /// A step or residual contained `NaN` or `Inf`.
    NonFinite,
    /// The least-squares factorization did not produce a solution.
    SingularSystem,
}

impl std::fmt::Display for ConvergenceFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IterationLimit => write!(f, "iteration limit reached"),
            Self::Diverged { norm, min_norm } => {
                write!(f, "step norm {norm:e} diverged from minimum {min_norm:e}")
            }
            Self::NonFinite => write!(f, "non-finite step"),
            Self::SingularSystem => write!(f, "least-squares factorization failed"),
        }
    }
}

/// Errors raised while building or solving a mechanism.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum KinematicError {
    /// An iterative solve failed; the solver state was rolled back.
    #[error("group {group} failed to converge after {iterations} iterations: {failure}")]
    Convergence {
        /// Index of the failing group.
        group: usize,
        /// Iterations performed before failing.
        iterations: usize,
        /// What went wrong.
        failure: ConvergenceFailure,
    },

    /// The mechanism cannot be turned into a solvable constraint system.
    #[error("invalid topology: {reason}")]
    Topology {
        /// Description of the structural problem.
        reason: String,
    },

    /// A joint names a point the element does not declare.
    #[error("point '{point}' is not declared on {element}")]
    UnresolvedReference {
        /// Element that was searched.
        element: ElementId,
        /// Point name that was not found.
        point: String,
    },

    /// An element id does not exist in the mechanism.
    #[error("unknown element: {0}")]
    UnknownElement(ElementId),

    /// Invalid solver configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },
}

impl KinematicError {
    /// Create a convergence error.
    #[must_use]
    pub fn convergence(group: usize, iterations: usize, failure: ConvergenceFailure) -> Self {
        Self::Convergence {
            group,
            iterations,
            failure,
        }
    }

    /// Create a topology error.
    #[must_use]
    pub fn topology(reason: impl Into<String>) -> Self {
        Self::Topology {
            reason: reason.into(),
        }
    }

    /// Create an unresolved reference error.
    #[must_use]
    pub fn unresolved(element: ElementId, point: impl Into<String>) -> Self {
        Self::UnresolvedReference {
            element,
            point: point.into(),
        }
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Check if this is a convergence error.
    #[must_use]
    pub fn is_convergence(&self) -> bool {
        matches!(self, Self::Convergence { .. })
    }

    /// Check if this is a topology error.
    #[must_use]
    pub fn is_topology(&self) -> bool {
        matches!(self, Self::Topology { .. })
    }

    /// Check if this is an unresolved reference error.
    #[must_use]
    pub fn is_unresolved_reference(&self) -> bool {
        matches!(self, Self::UnresolvedReference { .. })
    }

    /// Check if this is a configuration error.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. })
    }
}

/// Result alias used across the kinematics crates.
pub type Result<T> = std::result::Result<T, KinematicError>;
