//! Assembly of freshly built mechanisms.

use approx::assert_relative_eq;
use kin_mechanism::KinematicSolver;
use kin_tests::{double_wishbone, separated_pair};
use kin_types::{FrameMode, Pose, SolveOptions, SolverConfig, UnitQuaternion, Vector3};

fn build_grounded(m: kin_mechanism::Mechanism) -> KinematicSolver {
    KinematicSolver::new(m, SolverConfig::default(), FrameMode::Grounded).unwrap()
}

/// Test: two free bodies ten units apart are pulled onto their shared point.
#[test]
fn test_sphere_pair_closes_gap() {
    let (m, a, b) = separated_pair(10.0);
    let solver = build_grounded(m);

    let ball = solver.world_point(a, "ball").unwrap();
    let socket = solver.world_point(b, "socket").unwrap();
    assert!((ball - socket).norm() < 1e-4);
    assert_eq!(solver.groups().len(), 1);
    assert_eq!(solver.statistics().total_dof, 14);
}

/// Test: a double-wishbone corner builds into one upright and five restorers.
#[test]
fn test_double_wishbone_topology() {
    let (m, corner) = double_wishbone();
    let solver = build_grounded(m);

    assert_eq!(solver.components().len(), 2);
    assert!(solver.components()[0].is_fixed());
    assert_eq!(solver.restorers().len(), 5);
    assert_eq!(solver.groups().len(), 1);
    assert_eq!(solver.group_of(corner.upright), Some(0));
    assert_eq!(solver.group_of(corner.chassis), None);
    assert_eq!(solver.group_of(corner.tie_rod), None);

    // Two distances per A-arm, the tie rod, the coil-over, one norm row.
    let residuals = solver.constraint_residuals();
    assert_eq!(residuals.len(), 7);
    assert_eq!(residuals.iter().filter(|r| r.bounded).count(), 1);
    for r in &residuals {
        assert!(r.residual < 1e-4, "{r:?}");
    }
}

/// Test: solving an assembled mechanism again does no work.
#[test]
fn test_resolve_is_idempotent() {
    let (m, corner) = double_wishbone();
    let mut solver = build_grounded(m);
    let before = solver.mechanism().element(corner.upright).unwrap().pose;

    for options in [SolveOptions::assemble(), SolveOptions::default()] {
        let report = solver.solve(&options).unwrap();
        assert!(report.total_iterations() <= 1);
    }
    let after = solver.mechanism().element(corner.upright).unwrap().pose;
    assert_relative_eq!(before.position, after.position, epsilon = 1e-6);
    assert_relative_eq!(
        before.rotation.angle_to(&after.rotation),
        0.0,
        epsilon = 1e-8
    );
}

/// Test: a disturbed upright is pulled back to the design position.
#[test]
fn test_disturbed_upright_reassembles() {
    let (m, corner) = double_wishbone();
    let mut solver = build_grounded(m);
    let design = solver.world_point(corner.upright, "hub_outer").unwrap();

    let pose = solver.mechanism().element(corner.upright).unwrap().pose;
    let disturbed = Pose::from_position_rotation(
        pose.position + Vector3::new(4.0, -2.0, 6.0),
        UnitQuaternion::from_euler_angles(0.01, -0.02, 0.015) * pose.rotation,
    );
    solver.set_pose(corner.upright, disturbed).unwrap();
    solver.solve(&SolveOptions::assemble()).unwrap();

    let hub = solver.world_point(corner.upright, "hub_outer").unwrap();
    assert_relative_eq!(hub, design, epsilon = 1e-2);
}

/// Test: a floating frame becomes an unknown alongside the upright.
#[test]
fn test_floating_frame_joins_group() {
    let (m, corner) = double_wishbone();
    let solver = KinematicSolver::new(m, SolverConfig::default(), FrameMode::Floating).unwrap();

    assert!(solver.components().iter().all(|c| c.is_free()));
    assert_eq!(solver.group_of(corner.chassis), solver.group_of(corner.upright));
    assert_eq!(solver.statistics().total_dof, 14);

    let chassis = solver.world_point(corner.chassis, "lca_front").unwrap();
    let arm = solver.world_point(corner.lower_arm, "front").unwrap();
    assert!((chassis - arm).norm() < 1e-3);
    assert!(chassis.coords.iter().all(|c| c.is_finite()));
}
