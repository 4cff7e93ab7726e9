//! Simplified elements follow the solved components.

use approx::assert_relative_eq;
use kin_mechanism::{KinematicSolver, PointTarget, Restorer};
use kin_tests::{double_wishbone, rail_slider};
use kin_types::{ElementId, FrameMode, Point3, SolveOptions, SolverConfig};

/// Solver for a corner pushed 25 mm into bump.
fn bumped() -> (KinematicSolver, kin_tests::Corner) {
    let (m, corner) = double_wishbone();
    let mut solver = KinematicSolver::new(m, SolverConfig::default(), FrameMode::Grounded).unwrap();
    let design = solver.world_point(corner.upright, "hub_outer").unwrap();
    let target = PointTarget::named(
        solver.mechanism(),
        corner.upright,
        "hub_outer",
        Point3::new(design.x, design.y, design.z + 25.0),
    )
    .unwrap();
    solver.solve_objective(&target, &SolveOptions::default()).unwrap();
    (solver, corner)
}

fn assert_coincident(solver: &KinematicSolver, a: (ElementId, &str), b: (ElementId, &str)) {
    let pa = solver.world_point(a.0, a.1).unwrap();
    let pb = solver.world_point(b.0, b.1).unwrap();
    assert!(
        (pa - pb).norm() < 1e-3,
        "{}:{} at {pa} vs {}:{} at {pb}",
        a.0,
        a.1,
        b.0,
        b.1
    );
}

/// Test: both ends of the tie rod sit on the points they are jointed to,
/// and its elongation is the observed length minus the rest length.
#[test]
fn test_bar_restorer_endpoints() {
    let (solver, c) = bumped();
    assert_coincident(&solver, (c.tie_rod, "start"), (c.chassis, "tie_inner"));
    assert_coincident(&solver, (c.tie_rod, "end"), (c.upright, "tie_outer"));

    let tie_rod = solver.mechanism().element(c.tie_rod).unwrap();
    let start = solver.world_point(c.chassis, "tie_inner").unwrap();
    let end = solver.world_point(c.upright, "tie_outer").unwrap();
    let observed = (end - start).norm();
    assert_relative_eq!(
        tie_rod.dl_current().unwrap(),
        observed - tie_rod.rest_length().unwrap(),
        epsilon = 1e-9
    );
}

/// Test: the coil-over starts on the chassis, points at the upright, and
/// reports its compression.
#[test]
fn test_spring_restorer_tracks_length() {
    let (solver, c) = bumped();
    assert_coincident(&solver, (c.spring, "start"), (c.chassis, "spring_top"));

    let spring = solver.mechanism().element(c.spring).unwrap();
    let top = solver.world_point(c.chassis, "spring_top").unwrap();
    let bottom = solver.world_point(c.upright, "spring_bottom").unwrap();
    let end = solver.world_point(c.spring, "end").unwrap();
    let along = (end - top).normalize();
    assert_relative_eq!(along, (bottom - top).normalize(), epsilon = 1e-9);

    let dl = spring.dl_current().unwrap();
    assert_relative_eq!(dl, (bottom - top).norm() - spring.rest_length().unwrap(), epsilon = 1e-9);
    assert!(dl < 0.0);
}

/// Test: each A-arm lies on its chassis pivots and its ball joint.
#[test]
fn test_a_arm_restorers() {
    let (solver, c) = bumped();
    for (arm, ball) in [(c.lower_arm, "lower_ball"), (c.upper_arm, "upper_ball")] {
        assert!(solver
            .restorers()
            .iter()
            .any(|r| matches!(r, Restorer::AArm { element, .. } if *element == arm)));
        assert_coincident(&solver, (arm, "ball"), (c.upright, ball));
    }
    assert_coincident(&solver, (c.lower_arm, "front"), (c.chassis, "lca_front"));
    assert_coincident(&solver, (c.lower_arm, "rear"), (c.chassis, "lca_rear"));
    assert_coincident(&solver, (c.upper_arm, "front"), (c.chassis, "uca_front"));
    assert_coincident(&solver, (c.upper_arm, "rear"), (c.chassis, "uca_rear"));
}

/// Test: the tire rides on the hub bearings.
#[test]
fn test_tire_restorer() {
    let (solver, c) = bumped();
    assert_coincident(&solver, (c.tire, "inner"), (c.upright, "hub_inner"));
    assert_coincident(&solver, (c.tire, "outer"), (c.upright, "hub_outer"));
    assert!(solver.mechanism().element(c.tire).unwrap().dl_current().is_none());
}

/// Test: a slider pulled off its rail stays on the bushing axis, and the
/// bushing reports how far the rod end travelled.
#[test]
fn test_linear_bushing_restorer() {
    let (m, slider, bushing) = rail_slider();
    let mut solver = KinematicSolver::new(m, SolverConfig::default(), FrameMode::Grounded).unwrap();
    let target = PointTarget::named(solver.mechanism(), slider, "pin", Point3::new(10.0, 0.0, 60.0)).unwrap();
    solver.solve_objective(&target, &SolveOptions::default()).unwrap();

    let pin = solver.world_point(slider, "pin").unwrap();
    assert!(pin.x.abs() < 1e-3 && pin.y.abs() < 1e-3, "pin left the axis: {pin}");
    assert_relative_eq!(pin.z, 60.0, epsilon = 1e-2);
    assert_coincident(&solver, (bushing, "rod"), (slider, "pin"));

    let dl = solver.mechanism().element(bushing).unwrap().dl_current().unwrap();
    assert_relative_eq!(dl, pin.z - 40.0, epsilon = 1e-9);
}
