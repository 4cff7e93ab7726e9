//! Constraint primitives and their residual/Jacobian rows.
//!
//! Every constraint relates points fixed in one or two component frames.
//! Residuals vanish when the constraint is satisfied. Jacobian rows are
//! written against the seven coordinates of each free component touched by
//! the constraint; fixed components contribute nothing.
//!
//! | Constraint | Rows | Residual |
//! |------------|------|----------|
//! | [`SphereConstraint`] | 3 | `P_l - P_r` |
//! | [`HingeConstraint`] | 5 | sphere + `(R_l h_k) · (R_r a)` |
//! | [`DistanceConstraint`] | 1 | `|P_l - P_r|² - L²` |
//! | [`LinearBushingConstraint`] | 2 | `(P_c - P_s) · (R_s n_k)` |
//! | [`QuaternionNormConstraint`] | 1 | `q·q - 1` |

use kin_types::{KinematicError, Result};
use nalgebra::{DMatrix, DVector, RowSVector, SMatrix, Vector3};

use crate::coords::{Coordinates, COORDINATES_PER_BODY};

/// Below this norm an axis is considered degenerate.
const AXIS_EPSILON: f64 = 1e-9;

// ============================================================================
// Body references and frames
// ============================================================================

/// Which coordinates a constraint anchor is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BodyRef {
    /// A free component, by index. Inside a group this is the group-local
    /// slot; before partitioning it is the global component index.
    Free(usize),
    /// A fixed component, by global component index.
    Fixed(usize),
}

impl BodyRef {
    /// Whether this side is fixed.
    #[must_use]
    pub fn is_fixed(self) -> bool {
        matches!(self, Self::Fixed(_))
    }

    /// Raw index.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Free(i) | Self::Fixed(i) => i,
        }
    }
}

/// A point fixed in a component frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    /// Component the point moves with.
    pub body: BodyRef,
    /// Point in the component's local frame.
    pub local: Vector3<f64>,
}

impl Anchor {
    /// Create an anchor.
    #[must_use]
    pub fn new(body: BodyRef, local: Vector3<f64>) -> Self {
        Self { body, local }
    }
}

/// Read access to the coordinates a constraint is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct Frames<'a> {
    free: &'a [Coordinates],
    fixed: &'a [Coordinates],
}

impl<'a> Frames<'a> {
    /// Free coordinates indexed by slot, fixed coordinates by component.
    #[must_use]
    pub fn new(free: &'a [Coordinates], fixed: &'a [Coordinates]) -> Self {
        Self { free, fixed }
    }

    /// Coordinates of a body.
    #[must_use]
    pub fn coords(&self, body: BodyRef) -> &'a Coordinates {
        match body {
            BodyRef::Free(slot) => &self.free[slot],
            BodyRef::Fixed(index) => &self.fixed[index],
        }
    }

    /// First Jacobian column of a body, or `None` for fixed bodies.
    #[must_use]
    pub fn column(body: BodyRef) -> Option<usize> {
        match body {
            BodyRef::Free(slot) => Some(slot * COORDINATES_PER_BODY),
            BodyRef::Fixed(_) => None,
        }
    }

    /// World position of an anchor.
    #[must_use]
    pub fn world(&self, anchor: &Anchor) -> Vector3<f64> {
        self.coords(anchor.body).transform_point(&anchor.local)
    }
}

fn add_block<const R: usize>(
    jacobian: &mut DMatrix<f64>,
    row: usize,
    body: BodyRef,
    block: &SMatrix<f64, R, COORDINATES_PER_BODY>,
) {
    if let Some(col) = Frames::column(body) {
        let mut view = jacobian.fixed_view_mut::<R, COORDINATES_PER_BODY>(row, col);
        view += block;
    }
}

/// Build two unit vectors orthogonal to `axis` and to each other.
///
/// Returns `None` for a degenerate axis.
#[must_use]
pub fn orthonormal_complement(axis: &Vector3<f64>) -> Option<[Vector3<f64>; 2]> {
    let norm = axis.norm();
    if norm <= AXIS_EPSILON || !norm.is_finite() {
        return None;
    }
    let axis = axis / norm;
    let seed = if axis.x.abs() <= axis.y.abs() && axis.x.abs() <= axis.z.abs() {
        Vector3::x()
    } else if axis.y.abs() <= axis.z.abs() {
        Vector3::y()
    } else {
        Vector3::z()
    };
    let first = axis.cross(&seed).normalize();
    let second = axis.cross(&first);
    Some([first, second])
}

// ============================================================================
// Solve mode and travel bounds
// ============================================================================

/// Which solve the constraint rows are assembled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SolveMode {
    /// Assembly from raw poses: bounded distances are enforced at rest
    /// length.
    #[default]
    Assemble,
    /// Normal operation: bounded distances are free within their travel.
    Operate,
}

/// Which side of its travel a bounded distance sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundHint {
    /// Shorter than the lower travel limit.
    Below,
    /// Within the travel limits.
    Within,
    /// Longer than the upper travel limit.
    Above,
}

impl BoundHint {
    /// Signed hint value: -1, 0 or +1.
    #[must_use]
    pub fn as_i8(self) -> i8 {
        match self {
            Self::Below => -1,
            Self::Within => 0,
            Self::Above => 1,
        }
    }
}

/// Allowed elongation range of a bounded distance.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TravelBounds {
    /// Minimum elongation (usually negative).
    pub dl_min: f64,
    /// Maximum elongation.
    pub dl_max: f64,
}

impl TravelBounds {
    /// Create bounds.
    #[must_use]
    pub fn new(dl_min: f64, dl_max: f64) -> Self {
        Self { dl_min, dl_max }
    }

    /// Classify an elongation.
    #[must_use]
    pub fn hint(&self, elongation: f64, tolerance: f64) -> BoundHint {
        if elongation > self.dl_max + tolerance {
            BoundHint::Above
        } else if elongation < self.dl_min - tolerance {
            BoundHint::Below
        } else {
            BoundHint::Within
        }
    }

    /// Elongation the distance is pinned to for a violated side.
    #[must_use]
    pub fn limit(&self, hint: BoundHint) -> Option<f64> {
        match hint {
            BoundHint::Below => Some(self.dl_min),
            BoundHint::Above => Some(self.dl_max),
            BoundHint::Within => None,
        }
    }
}

// ============================================================================
// Constraint primitives
// ============================================================================

/// Coincident points: three rows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereConstraint {
    /// Point on the left side.
    pub lhs: Anchor,
    /// Point on the right side.
    pub rhs: Anchor,
}

/// Revolute joint: a sphere joint plus two axis-alignment rows.
///
/// The axis is carried on the right body; two helper vectors orthogonal to
/// the axis are carried on the left body. The joint is satisfied when both
/// helpers stay perpendicular to the axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HingeConstraint {
    /// Anchor on the left side.
    pub lhs: Anchor,
    /// Anchor on the right side.
    pub rhs: Anchor,
    helpers: [Vector3<f64>; 2],
    axis: Vector3<f64>,
}

impl HingeConstraint {
    /// Build a hinge from two coincident point pairs.
    ///
    /// `lhs_points[k]` and `rhs_points[k]` are the same physical point in the
    /// two local frames; the hinge axis runs from point 0 to point 1.
    ///
    /// # Errors
    ///
    /// Returns a topology error when the two points coincide.
    pub fn new(
        lhs_body: BodyRef,
        rhs_body: BodyRef,
        lhs_points: [Vector3<f64>; 2],
        rhs_points: [Vector3<f64>; 2],
    ) -> Result<Self> {
        let lhs_axis = lhs_points[1] - lhs_points[0];
        let rhs_axis = rhs_points[1] - rhs_points[0];
        let helpers = orthonormal_complement(&lhs_axis)
            .filter(|_| rhs_axis.norm() > AXIS_EPSILON)
            .ok_or_else(|| {
                KinematicError::topology("hinge points coincide; the axis is undefined")
            })?;
        Ok(Self {
            lhs: Anchor::new(lhs_body, lhs_points[0]),
            rhs: Anchor::new(rhs_body, rhs_points[0]),
            helpers,
            axis: rhs_axis.normalize(),
        })
    }

    /// Axis direction in the right body's frame.
    #[must_use]
    pub fn axis(&self) -> Vector3<f64> {
        self.axis
    }
}

/// Fixed (or travel-bounded) distance between two points: one row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceConstraint {
    /// Point on the left side.
    pub lhs: Anchor,
    /// Point on the right side.
    pub rhs: Anchor,
    /// Nominal distance.
    pub rest_length: f64,
    /// Travel limits. A bounded distance is only enforced during assembly,
    /// or when the objective solver pins it to a violated limit.
    pub bounds: Option<TravelBounds>,
}

impl DistanceConstraint {
    /// Current distance between the anchors.
    #[must_use]
    pub fn length(&self, frames: &Frames<'_>) -> f64 {
        (frames.world(&self.lhs) - frames.world(&self.rhs)).norm()
    }

    /// Current elongation relative to the rest length.
    #[must_use]
    pub fn elongation(&self, frames: &Frames<'_>) -> f64 {
        self.length(frames) - self.rest_length
    }

    /// Write the row for an arbitrary target length.
    pub fn evaluate_with_length(
        &self,
        frames: &Frames<'_>,
        length: f64,
        row: usize,
        residual: &mut DVector<f64>,
        jacobian: &mut DMatrix<f64>,
    ) {
        let lhs = frames.coords(self.lhs.body);
        let rhs = frames.coords(self.rhs.body);
        let d = lhs.transform_point(&self.lhs.local) - rhs.transform_point(&self.rhs.local);
        residual[row] = d.norm_squared() - length * length;

        let dt = d.transpose() * 2.0;
        add_block::<1>(jacobian, row, self.lhs.body, &(dt * lhs.point_jacobian(&self.lhs.local)));
        add_block::<1>(
            jacobian,
            row,
            self.rhs.body,
            &(-(dt * rhs.point_jacobian(&self.rhs.local))),
        );
    }
}

/// A rod end sliding along an axis carried by a support body: two rows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearBushingConstraint {
    /// First support point; the axis passes through it.
    pub support: Anchor,
    /// Rod end that must stay on the axis.
    pub rod_end: Anchor,
    helpers: [Vector3<f64>; 2],
}

impl LinearBushingConstraint {
    /// Build a bushing constraint from the two support points (in the
    /// support body's frame) and the rod end anchor.
    ///
    /// # Errors
    ///
    /// Returns a topology error when the support points coincide.
    pub fn new(support_body: BodyRef, supports: [Vector3<f64>; 2], rod_end: Anchor) -> Result<Self> {
        let helpers = orthonormal_complement(&(supports[1] - supports[0])).ok_or_else(|| {
            KinematicError::topology("linear bushing supports coincide; the axis is undefined")
        })?;
        Ok(Self {
            support: Anchor::new(support_body, supports[0]),
            rod_end,
            helpers,
        })
    }
}

/// Unit-norm condition on one free component's quaternion: one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuaternionNormConstraint {
    /// Group-local slot.
    pub slot: usize,
}

/// Any constraint the solver can assemble.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constraint {
    /// Coincident points.
    Sphere(SphereConstraint),
    /// Revolute joint.
    Hinge(HingeConstraint),
    /// Fixed or bounded distance.
    Distance(DistanceConstraint),
    /// Point-on-axis.
    LinearBushing(LinearBushingConstraint),
    /// Quaternion normalization.
    QuaternionNorm(QuaternionNormConstraint),
}

impl Constraint {
    /// Sphere constraint between two anchors.
    #[must_use]
    pub fn sphere(lhs: Anchor, rhs: Anchor) -> Self {
        Self::Sphere(SphereConstraint { lhs, rhs })
    }

    /// Distance constraint between two anchors.
    #[must_use]
    pub fn distance(lhs: Anchor, rhs: Anchor, rest_length: f64, bounds: Option<TravelBounds>) -> Self {
        Self::Distance(DistanceConstraint {
            lhs,
            rhs,
            rest_length,
            bounds,
        })
    }

    /// Number of residual rows.
    #[must_use]
    pub fn rows(&self) -> usize {
        match self {
            Self::Sphere(_) => 3,
            Self::Hinge(_) => 5,
            Self::Distance(_) | Self::QuaternionNorm(_) => 1,
            Self::LinearBushing(_) => 2,
        }
    }

    /// Short name for logging.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Sphere(_) => "sphere",
            Self::Hinge(_) => "hinge",
            Self::Distance(_) => "distance",
            Self::LinearBushing(_) => "linear bushing",
            Self::QuaternionNorm(_) => "quaternion norm",
        }
    }

    /// Bodies touched by the constraint.
    #[must_use]
    pub fn bodies(&self) -> (BodyRef, Option<BodyRef>) {
        match self {
            Self::Sphere(c) => (c.lhs.body, Some(c.rhs.body)),
            Self::Hinge(c) => (c.lhs.body, Some(c.rhs.body)),
            Self::Distance(c) => (c.lhs.body, Some(c.rhs.body)),
            Self::LinearBushing(c) => (c.support.body, Some(c.rod_end.body)),
            Self::QuaternionNorm(c) => (BodyRef::Free(c.slot), None),
        }
    }

    /// Rewrite every body reference.
    pub fn map_bodies(&mut self, mut f: impl FnMut(BodyRef) -> BodyRef) {
        match self {
            Self::Sphere(c) => {
                c.lhs.body = f(c.lhs.body);
                c.rhs.body = f(c.rhs.body);
            }
            Self::Hinge(c) => {
                c.lhs.body = f(c.lhs.body);
                c.rhs.body = f(c.rhs.body);
            }
            Self::Distance(c) => {
                c.lhs.body = f(c.lhs.body);
                c.rhs.body = f(c.rhs.body);
            }
            Self::LinearBushing(c) => {
                c.support.body = f(c.support.body);
                c.rod_end.body = f(c.rod_end.body);
            }
            Self::QuaternionNorm(c) => {
                if let BodyRef::Free(slot) = f(BodyRef::Free(c.slot)) {
                    c.slot = slot;
                }
            }
        }
    }

    /// Travel bounds of a bounded distance.
    #[must_use]
    pub fn bounds(&self) -> Option<&TravelBounds> {
        match self {
            Self::Distance(c) => c.bounds.as_ref(),
            _ => None,
        }
    }

    /// Whether the constraint contributes rows in the given mode.
    #[must_use]
    pub fn is_active(&self, mode: SolveMode) -> bool {
        self.bounds().is_none() || mode == SolveMode::Assemble
    }

    /// Write this constraint's rows starting at `row`.
    ///
    /// `jacobian` must be zeroed by the caller; blocks are accumulated.
    pub fn evaluate(
        &self,
        frames: &Frames<'_>,
        row: usize,
        residual: &mut DVector<f64>,
        jacobian: &mut DMatrix<f64>,
    ) {
        match self {
            Self::Sphere(c) => evaluate_sphere(&c.lhs, &c.rhs, frames, row, residual, jacobian),
            Self::Hinge(c) => {
                evaluate_sphere(&c.lhs, &c.rhs, frames, row, residual, jacobian);
                let lhs = frames.coords(c.lhs.body);
                let rhs = frames.coords(c.rhs.body);
                let axis = rhs.rotate(&c.axis);
                let axis_partials = rhs.rotation_partials(&c.axis);
                for (k, helper) in c.helpers.iter().enumerate() {
                    let r = row + 3 + k;
                    let h = lhs.rotate(helper);
                    residual[r] = h.dot(&axis);

                    let mut lhs_block = RowSVector::<f64, COORDINATES_PER_BODY>::zeros();
                    lhs_block
                        .fixed_view_mut::<1, 4>(0, 3)
                        .copy_from(&(axis.transpose() * lhs.rotation_partials(helper)));
                    let mut rhs_block = RowSVector::<f64, COORDINATES_PER_BODY>::zeros();
                    rhs_block
                        .fixed_view_mut::<1, 4>(0, 3)
                        .copy_from(&(h.transpose() * axis_partials));
                    add_block::<1>(jacobian, r, c.lhs.body, &lhs_block);
                    add_block::<1>(jacobian, r, c.rhs.body, &rhs_block);
                }
            }
            Self::Distance(c) => c.evaluate_with_length(frames, c.rest_length, row, residual, jacobian),
            Self::LinearBushing(c) => {
                let support = frames.coords(c.support.body);
                let rod = frames.coords(c.rod_end.body);
                let delta = rod.transform_point(&c.rod_end.local)
                    - support.transform_point(&c.support.local);
                let rod_jacobian = rod.point_jacobian(&c.rod_end.local);
                let support_jacobian = support.point_jacobian(&c.support.local);
                for (k, helper) in c.helpers.iter().enumerate() {
                    let r = row + k;
                    let n = support.rotate(helper);
                    residual[r] = delta.dot(&n);

                    let nt = n.transpose();
                    let rod_block = nt * rod_jacobian;
                    let mut support_block = -(nt * support_jacobian);
                    let helper_part = delta.transpose() * support.rotation_partials(helper);
                    let mut quat = support_block.fixed_view_mut::<1, 4>(0, 3);
                    quat += helper_part;
                    add_block::<1>(jacobian, r, c.rod_end.body, &rod_block);
                    add_block::<1>(jacobian, r, c.support.body, &support_block);
                }
            }
            Self::QuaternionNorm(c) => {
                let q = &frames.coords(BodyRef::Free(c.slot)).quaternion;
                residual[row] = q.norm_squared() - 1.0;
                let mut block = RowSVector::<f64, COORDINATES_PER_BODY>::zeros();
                block[3] = 2.0 * q.w;
                block[4] = 2.0 * q.i;
                block[5] = 2.0 * q.j;
                block[6] = 2.0 * q.k;
                add_block::<1>(jacobian, row, BodyRef::Free(c.slot), &block);
            }
        }
    }

    /// Largest absolute residual of this constraint.
    #[must_use]
    pub fn max_residual(&self, frames: &Frames<'_>, columns: usize) -> f64 {
        let rows = self.rows();
        let mut residual = DVector::zeros(rows);
        let mut jacobian = DMatrix::zeros(rows, columns);
        self.evaluate(frames, 0, &mut residual, &mut jacobian);
        residual.amax()
    }
}

fn evaluate_sphere(
    lhs: &Anchor,
    rhs: &Anchor,
    frames: &Frames<'_>,
    row: usize,
    residual: &mut DVector<f64>,
    jacobian: &mut DMatrix<f64>,
) {
    let lc = frames.coords(lhs.body);
    let rc = frames.coords(rhs.body);
    let d = lc.transform_point(&lhs.local) - rc.transform_point(&rhs.local);
    residual.fixed_rows_mut::<3>(row).copy_from(&d);
    add_block::<3>(jacobian, row, lhs.body, &lc.point_jacobian(&lhs.local));
    add_block::<3>(jacobian, row, rhs.body, &(-rc.point_jacobian(&rhs.local)));
}
