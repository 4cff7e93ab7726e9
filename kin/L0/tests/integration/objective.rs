//! Objective solves and spring travel limits.

use approx::assert_relative_eq;
use kin_mechanism::{BoundHint, KinematicSolver, PointTarget};
use kin_tests::{double_wishbone, hanging_slider, SPRING_TRAVEL};
use kin_types::{FrameMode, Point3, SolveOptions, SolverConfig};

/// Test: stretching a spring past its travel clamps at the limit.
///
/// Rest length 200 with +/-30 travel, driven towards length 250.
#[test]
fn test_spring_clamps_at_travel_limit() {
    let (m, slider, spring) = hanging_slider(200.0, 30.0);
    let mut solver = KinematicSolver::new(m, SolverConfig::default(), FrameMode::Grounded).unwrap();

    let target = PointTarget::named(solver.mechanism(), slider, "eye", Point3::new(0.0, 0.0, -250.0)).unwrap();
    let report = solver.solve_objective(&target, &SolveOptions::default()).unwrap();

    assert_eq!(report.passes, 2);
    let bound = report.active_bound.unwrap();
    assert_eq!(bound.hint, BoundHint::Above);
    assert_relative_eq!(bound.length, 230.0, epsilon = 1e-9);

    let dl = solver.mechanism().element(spring).unwrap().dl_current().unwrap();
    assert_relative_eq!(dl, 30.0, epsilon = 1e-3);
    let eye = solver.world_point(slider, "eye").unwrap();
    assert_relative_eq!(eye.coords.norm(), 230.0, epsilon = 1e-3);
}

/// Test: a target inside the travel is reached in one pass.
#[test]
fn test_target_within_travel_is_reached() {
    let (m, slider, spring) = hanging_slider(200.0, 30.0);
    let mut solver = KinematicSolver::new(m, SolverConfig::default(), FrameMode::Grounded).unwrap();

    let target = PointTarget::named(solver.mechanism(), slider, "eye", Point3::new(0.0, 0.0, -220.0)).unwrap();
    let report = solver.solve_objective(&target, &SolveOptions::default()).unwrap();

    assert_eq!(report.passes, 1);
    assert!(report.active_bound.is_none());
    let dl = solver.mechanism().element(spring).unwrap().dl_current().unwrap();
    assert_relative_eq!(dl, 20.0, epsilon = 1e-3);
}

/// Test: compressing past the lower limit is clamped from below.
#[test]
fn test_spring_clamps_from_below() {
    let (m, slider, spring) = hanging_slider(200.0, 30.0);
    let mut solver = KinematicSolver::new(m, SolverConfig::default(), FrameMode::Grounded).unwrap();

    let target = PointTarget::named(solver.mechanism(), slider, "eye", Point3::new(0.0, 0.0, -100.0)).unwrap();
    let report = solver.solve_objective(&target, &SolveOptions::default()).unwrap();

    assert_eq!(report.active_bound.map(|b| b.hint), Some(BoundHint::Below));
    let dl = solver.mechanism().element(spring).unwrap().dl_current().unwrap();
    assert_relative_eq!(dl, -30.0, epsilon = 1e-3);
}

/// Test: pulling the hub up moves the wheel in bump and compresses the
/// coil-over while every link keeps its length.
#[test]
fn test_bump_travel() {
    let (m, corner) = double_wishbone();
    let mut solver = KinematicSolver::new(m, SolverConfig::default(), FrameMode::Grounded).unwrap();
    let design = solver.world_point(corner.upright, "hub_outer").unwrap();

    let target = PointTarget::named(
        solver.mechanism(),
        corner.upright,
        "hub_outer",
        Point3::new(design.x, design.y, design.z + 30.0),
    )
    .unwrap();
    let report = solver.solve_objective(&target, &SolveOptions::default()).unwrap();
    assert_eq!(report.passes, 1);

    let hub = solver.world_point(corner.upright, "hub_outer").unwrap();
    assert!(hub.z > design.z + 20.0, "hub only reached {}", hub.z);

    for r in solver.constraint_residuals().iter().filter(|r| !r.bounded) {
        assert!(r.residual < 1e-3, "{r:?}");
    }
    let dl = solver.mechanism().element(corner.spring).unwrap().dl_current().unwrap();
    assert!(dl < -10.0, "coil-over should compress, dl = {dl}");

    let tie_rod = solver.mechanism().element(corner.tie_rod).unwrap().dl_current().unwrap();
    assert_relative_eq!(tie_rod, 0.0, epsilon = 1e-3);
}

/// Drive the corner's hub straight up (`dz > 0`) or down from its design
/// position. Returns the solver, the design hub position and the report.
fn drive_hub(dz: f64) -> (KinematicSolver, kin_tests::Corner, Point3<f64>, kin_mechanism::ObjectiveReport) {
    let (m, corner) = double_wishbone();
    let mut solver = KinematicSolver::new(m, SolverConfig::default(), FrameMode::Grounded).unwrap();
    let design = solver.world_point(corner.upright, "hub_outer").unwrap();
    let target = PointTarget::named(
        solver.mechanism(),
        corner.upright,
        "hub_outer",
        Point3::new(design.x, design.y, design.z + dz),
    )
    .unwrap();
    let report = solver
        .solve_objective(&target, &SolveOptions::default())
        .unwrap_or_else(|err| panic!("dz = {dz}: {err}"));
    (solver, corner, design, report)
}

fn assert_links_hold(solver: &KinematicSolver) {
    for r in solver.constraint_residuals().iter().filter(|r| !r.bounded) {
        assert!(r.residual < 1e-3, "{r:?}");
    }
}

/// Test: a 50 mm rebound stays inside the coil-over travel and the hub
/// follows the target.
#[test]
fn test_large_rebound_within_travel() {
    let (solver, corner, design, report) = drive_hub(-50.0);
    assert_eq!(report.passes, 1);
    assert!(report.active_bound.is_none());

    let hub = solver.world_point(corner.upright, "hub_outer").unwrap();
    assert!((hub.z - (design.z - 50.0)).abs() < 2.0, "hub at {}", hub.z);
    assert_links_hold(&solver);

    let dl = solver.mechanism().element(corner.spring).unwrap().dl_current().unwrap();
    assert!(dl > 30.0 && dl < SPRING_TRAVEL, "dl = {dl}");
}

/// Test: rebound past the coil-over travel clamps at full extension.
#[test]
fn test_rebound_clamps_at_spring_travel() {
    let (solver, corner, design, report) = drive_hub(-120.0);
    assert_eq!(report.passes, 2);
    assert_eq!(report.active_bound.map(|b| b.hint), Some(BoundHint::Above));

    let dl = solver.mechanism().element(corner.spring).unwrap().dl_current().unwrap();
    assert_relative_eq!(dl, SPRING_TRAVEL, epsilon = 1e-3);

    let hub = solver.world_point(corner.upright, "hub_outer").unwrap();
    assert!(hub.z < design.z - 40.0 && hub.z > design.z - 120.0, "hub at {}", hub.z);
    assert_links_hold(&solver);
}

/// Test: an 80 mm bump converges and clamps at full compression.
#[test]
fn test_large_bump_clamps_at_spring_travel() {
    let (solver, corner, design, report) = drive_hub(80.0);
    assert_eq!(report.passes, 2);
    assert_eq!(report.active_bound.map(|b| b.hint), Some(BoundHint::Below));

    let dl = solver.mechanism().element(corner.spring).unwrap().dl_current().unwrap();
    assert_relative_eq!(dl, -SPRING_TRAVEL, epsilon = 1e-3);

    let hub = solver.world_point(corner.upright, "hub_outer").unwrap();
    assert!(hub.z > design.z + 40.0 && hub.z < design.z + 80.0, "hub at {}", hub.z);
    assert_links_hold(&solver);
}

/// Test: an objective on an element the solver does not move is rejected.
#[test]
fn test_objective_on_restored_element_is_rejected() {
    let (m, corner) = double_wishbone();
    let mut solver = KinematicSolver::new(m, SolverConfig::default(), FrameMode::Grounded).unwrap();

    let target = PointTarget::named(solver.mechanism(), corner.tie_rod, "end", Point3::origin()).unwrap();
    let err = solver.solve_objective(&target, &SolveOptions::default()).unwrap_err();
    assert!(err.is_topology());
}
