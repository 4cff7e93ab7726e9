//! Linear algebra utilities: SVD least squares, skew matrices, union-find.
//!
//! Pure math routines with no solver state. The Newton and KKT iterations
//! both solve their linear systems through [`solve_least_squares`], which
//! yields the minimum-norm solution even when the system is rank
//! deficient.

use kin_types::ConvergenceFailure;
use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

// ============================================================================
// Skew matrix
// ============================================================================

/// Cross-product matrix: `skew(a) * b == a × b`.
#[must_use]
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

// ============================================================================
// Least squares
// ============================================================================

/// Minimum-norm least-squares solution of `a x = b`.
///
/// Singular values below `rcond * σ_max` are treated as zero, which is the
/// Moore-Penrose pseudo-inverse applied to `b`. Returns `None` when the
/// input is not finite, the dimensions disagree, or the SVD fails.
#[must_use]
pub fn solve_least_squares(a: DMatrix<f64>, b: &DVector<f64>, rcond: f64) -> Option<DVector<f64>> {
    if a.nrows() != b.len() {
        return None;
    }
    if a.ncols() == 0 {
        return Some(DVector::zeros(0));
    }
    if a.iter().any(|x| !x.is_finite()) || b.iter().any(|x| !x.is_finite()) {
        return None;
    }

    let svd = a.try_svd(true, true, f64::EPSILON, 0)?;
    let sigma_max = svd.singular_values.max();
    let cutoff = (sigma_max * rcond).max(f64::MIN_POSITIVE);
    svd.solve(b, cutoff).ok()
}

// ============================================================================
// Divergence guard
// ============================================================================

/// Tracks the smallest step norm seen and flags steps that blow up.
///
/// A step is diverging when it is not finite, or when it exceeds
/// `ratio` times the smallest step observed so far (floored at `floor`
/// so that an exactly zero step does not poison later comparisons).
#[derive(Debug, Clone, Copy)]
pub struct DivergenceGuard {
    ratio: f64,
    floor: f64,
    min_norm: f64,
}

impl DivergenceGuard {
    /// Create a guard with the given growth ratio and floor.
    #[must_use]
    pub fn new(ratio: f64, floor: f64) -> Self {
        Self {
            ratio,
            floor,
            min_norm: f64::INFINITY,
        }
    }

    /// Record a step norm.
    ///
    /// # Errors
    ///
    /// Returns the failure kind when the step is non-finite or diverging.
    pub fn check(&mut self, norm: f64) -> Result<(), ConvergenceFailure> {
        if !norm.is_finite() {
            return Err(ConvergenceFailure::NonFinite);
        }
        let reference = self.min_norm.max(self.floor);
        if self.min_norm.is_finite() && norm > self.ratio * reference {
            return Err(ConvergenceFailure::Diverged {
                norm,
                min_norm: self.min_norm,
            });
        }
        self.min_norm = self.min_norm.min(norm);
        Ok(())
    }

    /// Smallest step norm recorded so far.
    #[must_use]
    pub fn min_norm(&self) -> f64 {
        self.min_norm
    }
}

// ============================================================================
// Union-Find
// ============================================================================

/// Disjoint-set forest used to partition components into independent
/// groups.
///
/// Path compression + union by rank.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<usize>,
}

impl UnionFind {
    /// Create `n` singleton sets.
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    /// Representative of the set containing `x`.
    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]]; // Path compression
            x = self.parent[x];
        }
        x
    }

    /// Merge the sets containing `a` and `b`.
    pub fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }

    /// Whether `a` and `b` share a set.
    pub fn connected(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }
}
