//! Failed solves leave observable state untouched.

use approx::assert_relative_eq;
use kin_mechanism::{Element, KinematicSolver, PointTarget};
use kin_tests::{double_wishbone, hanging_slider};
use kin_types::{
    ConvergenceFailure, FrameMode, KinematicError, Point3, Pose, SolveOptions, SolverConfig,
    UnitQuaternion, Vector3,
};

fn snapshot(solver: &KinematicSolver) -> Vec<(Pose, Option<f64>)> {
    solver
        .mechanism()
        .elements()
        .iter()
        .map(|e: &Element| (e.pose, e.dl_current()))
        .collect()
}

/// Test: an iteration-capped solve fails without touching any element.
#[test]
fn test_failed_solve_keeps_element_poses() {
    let (m, corner) = double_wishbone();
    let mut solver = KinematicSolver::new(m, SolverConfig::default(), FrameMode::Grounded).unwrap();

    let pose = solver.mechanism().element(corner.upright).unwrap().pose;
    let disturbed = Pose::from_position_rotation(
        pose.position + Vector3::new(30.0, -20.0, 40.0),
        UnitQuaternion::from_euler_angles(0.2, -0.1, 0.3) * pose.rotation,
    );
    solver.set_pose(corner.upright, disturbed).unwrap();
    let before = snapshot(&solver);
    let coordinates = solver.coordinates().to_vec();

    let err = solver
        .solve(&SolveOptions::assemble().with_max_iterations(1))
        .unwrap_err();
    assert!(matches!(
        err,
        KinematicError::Convergence {
            failure: ConvergenceFailure::IterationLimit,
            ..
        }
    ));

    assert_eq!(snapshot(&solver), before);
    assert_eq!(solver.coordinates(), coordinates.as_slice());

    // The solver is still usable and recovers from the same start.
    solver.solve(&SolveOptions::assemble()).unwrap();
}

/// Test: a failed objective solve restores the coordinates it started from,
/// not the assembled ones.
#[test]
fn test_failed_objective_restores_entry_coordinates() {
    let (m, slider, _) = hanging_slider(200.0, 30.0);
    let mut solver = KinematicSolver::new(m, SolverConfig::default(), FrameMode::Grounded).unwrap();

    let first = PointTarget::named(solver.mechanism(), slider, "eye", Point3::new(0.0, 10.0, -210.0)).unwrap();
    solver.solve_objective(&first, &SolveOptions::default()).unwrap();
    let entry = solver.groups()[0].coords().to_vec();
    let before = snapshot(&solver);

    let second = PointTarget::named(solver.mechanism(), slider, "eye", Point3::new(40.0, -30.0, -190.0)).unwrap();
    let err = solver
        .solve_objective(&second, &SolveOptions::default().with_max_iterations(1))
        .unwrap_err();
    assert!(err.is_convergence());

    assert_eq!(solver.groups()[0].coords(), entry.as_slice());
    assert_eq!(snapshot(&solver), before);
}

/// Test: the assembled pose can be restored after a sweep.
#[test]
fn test_restore_initial_q_after_sweep() {
    let (m, corner) = double_wishbone();
    let mut solver = KinematicSolver::new(m, SolverConfig::default(), FrameMode::Grounded).unwrap();
    let design = solver.world_point(corner.upright, "hub_outer").unwrap();

    for step in 1..=3 {
        let lift = f64::from(step) * 10.0;
        let target = PointTarget::named(
            solver.mechanism(),
            corner.upright,
            "hub_outer",
            Point3::new(design.x, design.y, design.z + lift),
        )
        .unwrap();
        solver.solve_objective(&target, &SolveOptions::default()).unwrap();
    }
    let swept = solver.world_point(corner.upright, "hub_outer").unwrap();
    assert!(swept.z > design.z + 10.0);

    solver.restore_initial_q();
    let hub = solver.world_point(corner.upright, "hub_outer").unwrap();
    assert_relative_eq!(hub, design, epsilon = 1e-9);
    let dl = solver.mechanism().element(corner.spring).unwrap().dl_current().unwrap();
    assert_relative_eq!(dl, 0.0, epsilon = 1e-4);
}
