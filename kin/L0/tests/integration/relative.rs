//! Elements tied by three or more joints move as one.

use approx::assert_relative_eq;
use kin_mechanism::{Element, KinematicSolver, Location, Mechanism, PointTarget, Restorer};
use kin_types::{ElementId, FrameMode, Point3, Pose, SolveOptions, SolverConfig, UnitQuaternion, Vector3};

const BOLTS: [(&str, [f64; 3]); 3] = [
    ("bolt_a", [0.2, 0.0, -0.8]),
    ("bolt_b", [-0.2, 0.1, -0.8]),
    ("bolt_c", [0.0, -0.2, -0.5]),
];

/// A knuckle hanging from ground with a bracket bolted to it at three
/// points. The bracket's frame is rotated and offset from the knuckle's.
fn bolted() -> (Mechanism, ElementId, ElementId) {
    let mut m = Mechanism::new();
    let ground = m.add_element(Element::frame("ground").with_point("pivot", Vector3::zeros()));
    let mut knuckle = Element::body("knuckle").with_point("pivot", Vector3::zeros());
    let mut bracket = Element::body("bracket").with_pose(Pose::from_position_rotation(
        Point3::new(0.3, -0.1, -0.6),
        UnitQuaternion::from_euler_angles(0.4, 0.0, 1.1),
    ));
    for (name, [x, y, z]) in BOLTS {
        let world = Vector3::new(x, y, z);
        knuckle = knuckle.with_point(name, world);
        bracket = bracket.with_world_point(name, world);
    }
    let bracket = bracket.with_world_point("tab", Vector3::new(0.5, 0.0, -1.0));
    let knuckle = m.add_element(knuckle);
    let bracket = m.add_element(bracket);
    m.connect(ground, "pivot", knuckle, "pivot");
    for (name, _) in BOLTS {
        m.connect(knuckle, name, bracket, name);
    }
    (m, knuckle, bracket)
}

/// Test: the bracket becomes a relative component of the knuckle.
#[test]
fn test_bolted_bracket_is_merged() {
    let (m, knuckle, bracket) = bolted();
    let solver = KinematicSolver::new(m, SolverConfig::default(), FrameMode::Grounded).unwrap();

    let component = solver.component_of(bracket).unwrap();
    let owner = solver.component_of(knuckle).unwrap();
    assert!(matches!(
        solver.components()[component].location(),
        Location::Relative { owner: o, .. } if *o == owner
    ));
    assert!(solver
        .restorers()
        .iter()
        .any(|r| matches!(r, Restorer::Relative { element, .. } if *element == bracket)));
    assert_eq!(solver.group_of(bracket), solver.group_of(knuckle));
    assert_eq!(solver.statistics().total_dof, 7);
}

/// Test: driving the bracket swings the knuckle, and the bolts stay
/// together.
#[test]
fn test_objective_on_merged_element_moves_owner() {
    let (m, knuckle, bracket) = bolted();
    let mut solver = KinematicSolver::new(m, SolverConfig::default(), FrameMode::Grounded).unwrap();

    let tab = solver.world_point(bracket, "tab").unwrap();
    let radius = tab.coords.norm();
    let target = PointTarget::named(solver.mechanism(), bracket, "tab", Point3::new(3.0, 0.0, 0.0)).unwrap();
    solver.solve_objective(&target, &SolveOptions::default()).unwrap();

    let tab = solver.world_point(bracket, "tab").unwrap();
    assert_relative_eq!(tab.coords.norm(), radius, epsilon = 1e-3);
    assert!(tab.x > 0.9 * radius, "tab at {tab}");

    for (name, _) in BOLTS {
        let a = solver.world_point(knuckle, name).unwrap();
        let b = solver.world_point(bracket, name).unwrap();
        assert!((a - b).norm() < 1e-9, "{name}: {a} vs {b}");
    }
}

/// Test: a body bolted to the fixed frame is frozen with it.
#[test]
fn test_merge_into_fixed_frame() {
    let mut m = Mechanism::new();
    let mut ground = Element::frame("ground");
    let mut plate = Element::body("plate").with_pose(Pose::from_position(Point3::new(1.0, 2.0, 3.0)));
    for (name, [x, y, z]) in BOLTS {
        ground = ground.with_point(name, Vector3::new(x, y, z));
        plate = plate.with_world_point(name, Vector3::new(x, y, z));
    }
    let ground = m.add_element(ground);
    let plate = m.add_element(plate);
    for (name, _) in BOLTS {
        m.connect(ground, name, plate, name);
    }

    let mut solver = KinematicSolver::new(m, SolverConfig::default(), FrameMode::Grounded).unwrap();
    assert!(solver.groups().is_empty());
    assert_eq!(solver.group_of(plate), None);

    let target = PointTarget::new(plate, Vector3::zeros(), Point3::origin());
    let err = solver.solve_objective(&target, &SolveOptions::default()).unwrap_err();
    assert!(err.is_topology());
    assert_relative_eq!(
        solver.mechanism().element(plate).unwrap().pose.position,
        Point3::new(1.0, 2.0, 3.0),
        epsilon = 1e-9
    );
}
