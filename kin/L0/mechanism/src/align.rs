//! Rigid alignment helpers: shortest-arc rotations and Kabsch fitting.

use std::f64::consts::PI;

use kin_constraint::orthonormal_complement;
use kin_types::{Point3, Pose, UnitQuaternion, Vector3};
use nalgebra::{Matrix3, Rotation3, Unit};

/// Below this norm a direction is treated as undefined.
const DIRECTION_EPSILON: f64 = 1e-12;

/// Shortest-arc rotation taking `from` onto `to`.
///
/// Antiparallel inputs rotate half a turn about an axis perpendicular to
/// `from`; degenerate inputs give the identity.
#[must_use]
pub fn rotation_between(from: &Vector3<f64>, to: &Vector3<f64>) -> UnitQuaternion<f64> {
    if from.norm() < DIRECTION_EPSILON || to.norm() < DIRECTION_EPSILON {
        return UnitQuaternion::identity();
    }
    UnitQuaternion::rotation_between(from, to).unwrap_or_else(|| {
        orthonormal_complement(from).map_or_else(UnitQuaternion::identity, |[perp, _]| {
            UnitQuaternion::from_axis_angle(&Unit::new_normalize(perp), PI)
        })
    })
}

/// Rotate `current` by the smallest amount that maps `local_axis` onto
/// `world_axis`.
#[must_use]
pub fn align_axis(
    current: &UnitQuaternion<f64>,
    local_axis: &Vector3<f64>,
    world_axis: &Vector3<f64>,
) -> UnitQuaternion<f64> {
    rotation_between(&(current * local_axis), world_axis) * current
}

/// Pose that maps local point `locals[0]` onto `worlds[0]` and the local
/// direction `locals[0] -> locals[1]` onto `worlds[0] -> worlds[1]`,
/// changing the current rotation as little as possible.
#[must_use]
pub fn two_point_pose(current: &Pose, locals: [Vector3<f64>; 2], worlds: [Vector3<f64>; 2]) -> Pose {
    let rotation = align_axis(&current.rotation, &(locals[1] - locals[0]), &(worlds[1] - worlds[0]));
    Pose::from_position_rotation(Point3::from(worlds[0] - rotation * locals[0]), rotation)
}

/// Three-point alignment: align the base axis `locals[0] -> locals[1]`,
/// then twist about it until `locals[2]` lies in the observed plane.
/// `locals[0]` lands exactly on `worlds[0]`.
#[must_use]
pub fn three_point_pose(current: &Pose, locals: [Vector3<f64>; 3], worlds: [Vector3<f64>; 3]) -> Pose {
    let base = two_point_pose(current, [locals[0], locals[1]], [worlds[0], worlds[1]]);
    let axis = worlds[1] - worlds[0];
    let Some(axis) = Unit::try_new(axis, DIRECTION_EPSILON) else {
        return base;
    };

    let project = |v: Vector3<f64>| v - axis.into_inner() * axis.dot(&v);
    let predicted = project(base.rotation * (locals[2] - locals[0]));
    let observed = project(worlds[2] - worlds[0]);
    if predicted.norm() < DIRECTION_EPSILON || observed.norm() < DIRECTION_EPSILON {
        return base;
    }

    let angle = axis.dot(&predicted.cross(&observed)).atan2(predicted.dot(&observed));
    let rotation = UnitQuaternion::from_axis_angle(&axis, angle) * base.rotation;
    Pose::from_position_rotation(Point3::from(worlds[0] - rotation * locals[0]), rotation)
}

/// Best rigid transform `T` with `T(source[i]) ≈ target[i]` (Kabsch).
///
/// Returns `None` for empty or mismatched inputs, or when the SVD fails.
#[must_use]
pub fn rigid_transform(source: &[Vector3<f64>], target: &[Vector3<f64>]) -> Option<Pose> {
    if source.is_empty() || source.len() != target.len() {
        return None;
    }
    let source_centroid = centroid(source);
    let target_centroid = centroid(target);

    // H = Σ s_i t_iᵀ over centered points
    let mut h = Matrix3::zeros();
    for (s, t) in source.iter().zip(target) {
        h += (s - source_centroid) * (t - target_centroid).transpose();
    }

    let svd = h.svd(true, true);
    let u = svd.u?;
    let v = svd.v_t?.transpose();
    let mut rotation_matrix = v * u.transpose();
    if rotation_matrix.determinant() < 0.0 {
        // Reflection: flip the axis of the smallest singular value.
        let mut v = v;
        for i in 0..3 {
            v[(i, 2)] = -v[(i, 2)];
        }
        rotation_matrix = v * u.transpose();
    }

    let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rotation_matrix));
    let translation = target_centroid - rotation * source_centroid;
    Some(Pose::from_position_rotation(Point3::from(translation), rotation))
}

/// Largest distance between `transform(source[i])` and `target[i]`.
#[must_use]
pub fn max_alignment_error(transform: &Pose, source: &[Vector3<f64>], target: &[Vector3<f64>]) -> f64 {
    source
        .iter()
        .zip(target)
        .map(|(s, t)| (transform.transform_point(s).coords - t).norm())
        .fold(0.0, f64::max)
}

/// Whether all points lie on one line, within `tolerance`.
#[must_use]
pub fn is_collinear(points: &[Vector3<f64>], tolerance: f64) -> bool {
    let Some((i, j)) = farthest_pair(points) else {
        return true;
    };
    let Some(axis) = Unit::try_new(points[j] - points[i], tolerance) else {
        return true;
    };
    points.iter().all(|p| {
        let d = p - points[i];
        (d - axis.into_inner() * axis.dot(&d)).norm() <= tolerance
    })
}

/// Indices of the two points farthest apart.
#[must_use]
pub fn farthest_pair(points: &[Vector3<f64>]) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize, f64)> = None;
    for i in 0..points.len() {
        for j in i + 1..points.len() {
            let d = (points[j] - points[i]).norm_squared();
            if best.map_or(true, |(_, _, b)| d > b) {
                best = Some((i, j, d));
            }
        }
    }
    best.map(|(i, j, _)| (i, j))
}

fn centroid(points: &[Vector3<f64>]) -> Vector3<f64> {
    #[allow(clippy::cast_precision_loss)]
    let n = points.len() as f64;
    points.iter().sum::<Vector3<f64>>() / n
}
