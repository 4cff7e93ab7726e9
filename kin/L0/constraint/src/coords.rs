//! Generalized coordinates of a rigid component.
//!
//! Each free component owns seven unknowns laid out as
//! `[px, py, pz, w, x, y, z]`: a world position followed by an orientation
//! quaternion in `(w, x, y, z)` order.
//!
//! # Rotation Formula
//!
//! Local vectors are rotated with the homogeneous quadratic form
//!
//! ```text
//! R(q) v = (w² - u·u) v + 2 (u·v) u + 2 w (u × v),    u = (x, y, z)
//! ```
//!
//! which equals the usual rotation matrix product for a unit quaternion.
//! Differentiating this form (rather than the normalized one) gives the
//! Euler-parameter partials used by every constraint Jacobian:
//!
//! ```text
//! ∂(R v)/∂w = 2 w v + 2 (u × v)
//! ∂(R v)/∂u = 2 (u·v) I + 2 u vᵀ - 2 v uᵀ - 2 w [v]×
//! ```

use kin_types::Pose;
use nalgebra::{Matrix3, Matrix3x4, Point3, Quaternion, SMatrix, UnitQuaternion, Vector3};

use crate::linalg::skew;

/// Number of generalized coordinates per free component.
pub const COORDINATES_PER_BODY: usize = 7;

/// Jacobian of a world point with respect to one component's coordinates.
pub type PointJacobian = SMatrix<f64, 3, COORDINATES_PER_BODY>;

/// Position and (renormalized) quaternion of one component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    /// World position of the component origin.
    pub position: Vector3<f64>,
    /// Orientation quaternion. Kept at unit norm after every update.
    pub quaternion: Quaternion<f64>,
}

impl Default for Coordinates {
    fn default() -> Self {
        Self::identity()
    }
}

impl Coordinates {
    /// Create coordinates from a position and quaternion.
    #[must_use]
    pub fn new(position: Vector3<f64>, quaternion: Quaternion<f64>) -> Self {
        Self {
            position,
            quaternion,
        }
    }

    /// Coordinates at the origin with identity orientation.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            position: Vector3::zeros(),
            quaternion: Quaternion::identity(),
        }
    }

    /// Read coordinates from an element pose.
    #[must_use]
    pub fn from_pose(pose: &Pose) -> Self {
        Self {
            position: pose.position.coords,
            quaternion: *pose.rotation.quaternion(),
        }
    }

    /// Convert back to a pose.
    #[must_use]
    pub fn to_pose(&self) -> Pose {
        Pose::from_position_rotation(
            Point3::from(self.position),
            UnitQuaternion::new_normalize(self.quaternion),
        )
    }

    /// Coordinates as `[px, py, pz, w, x, y, z]`.
    #[must_use]
    pub fn to_array(&self) -> [f64; COORDINATES_PER_BODY] {
        let q = &self.quaternion;
        [
            self.position.x,
            self.position.y,
            self.position.z,
            q.w,
            q.i,
            q.j,
            q.k,
        ]
    }

    /// Build coordinates from `[px, py, pz, w, x, y, z]`.
    #[must_use]
    pub fn from_array(values: [f64; COORDINATES_PER_BODY]) -> Self {
        Self {
            position: Vector3::new(values[0], values[1], values[2]),
            quaternion: Quaternion::new(values[3], values[4], values[5], values[6]),
        }
    }

    /// Rotate a local vector.
    #[must_use]
    pub fn rotate(&self, v: &Vector3<f64>) -> Vector3<f64> {
        let w = self.quaternion.scalar();
        let u = self.quaternion.imag();
        v * (w * w - u.dot(&u)) + u * (2.0 * u.dot(v)) + u.cross(v) * (2.0 * w)
    }

    /// Map a local point to world coordinates.
    #[must_use]
    pub fn transform_point(&self, local: &Vector3<f64>) -> Vector3<f64> {
        self.position + self.rotate(local)
    }

    /// Rotation matrix `R(q)`.
    #[must_use]
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        Matrix3::from_columns(&[
            self.rotate(&Vector3::x()),
            self.rotate(&Vector3::y()),
            self.rotate(&Vector3::z()),
        ])
    }

    /// Partials of `R(q) v` with respect to `(w, x, y, z)`.
    #[must_use]
    pub fn rotation_partials(&self, v: &Vector3<f64>) -> Matrix3x4<f64> {
        let w = self.quaternion.scalar();
        let u = self.quaternion.imag();

        let d_w = (v * w + u.cross(v)) * 2.0;
        let d_u = Matrix3::identity() * (2.0 * u.dot(v)) + u * v.transpose() * 2.0
            - v * u.transpose() * 2.0
            - skew(v) * (2.0 * w);

        let mut partials = Matrix3x4::zeros();
        partials.set_column(0, &d_w);
        partials.fixed_view_mut::<3, 3>(0, 1).copy_from(&d_u);
        partials
    }

    /// Jacobian of `position + R(q) v` with respect to all seven coordinates.
    #[must_use]
    pub fn point_jacobian(&self, local: &Vector3<f64>) -> PointJacobian {
        let mut jacobian = PointJacobian::zeros();
        jacobian
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&Matrix3::identity());
        jacobian
            .fixed_view_mut::<3, 4>(0, 3)
            .copy_from(&self.rotation_partials(local));
        jacobian
    }

    /// Quaternion normalization residual `q·q - 1`.
    #[must_use]
    pub fn norm_residual(&self) -> f64 {
        self.quaternion.norm_squared() - 1.0
    }

    /// Add `scale * step` to the coordinates and renormalize the quaternion.
    ///
    /// `step` is ordered like [`Coordinates::to_array`].
    pub fn apply_step(&mut self, step: &[f64], scale: f64) {
        debug_assert_eq!(step.len(), COORDINATES_PER_BODY);
        self.position += Vector3::new(step[0], step[1], step[2]) * scale;
        let q = &self.quaternion;
        self.quaternion = Quaternion::new(
            q.w + scale * step[3],
            q.i + scale * step[4],
            q.j + scale * step[5],
            q.k + scale * step[6],
        );
        self.normalize();
    }

    /// Rescale the quaternion to unit norm. Degenerate quaternions are left
    /// untouched so that the caller's non-finite checks can see them.
    pub fn normalize(&mut self) {
        let norm = self.quaternion.norm();
        if norm > f64::EPSILON && norm.is_finite() {
            self.quaternion = self.quaternion / norm;
        }
    }

    /// Check that every coordinate is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|x| x.is_finite())
    }
}
