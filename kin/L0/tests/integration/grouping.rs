//! Components share a group exactly when free constraints connect them.

use kin_mechanism::{Element, KinematicSolver, Mechanism};
use kin_tests::add_double_wishbone;
use kin_types::{FrameMode, Point3, Pose, SolverConfig, Vector3};

fn pendulum_chain(m: &mut Mechanism, ground: kin_types::ElementId, x: f64, links: usize) -> Vec<kin_types::ElementId> {
    let mut parent = (ground, format!("pivot{x}"));
    let mut ids = Vec::new();
    for k in 0..links {
        #[allow(clippy::cast_precision_loss)]
        let z = -(k as f64);
        let link = m.add_element(
            Element::body(format!("link{x}_{k}"))
                .with_pose(Pose::from_position(Point3::new(x, 0.0, z - 1.0)))
                .with_point("top", Vector3::new(0.0, 0.0, 1.0))
                .with_point("bottom", Vector3::zeros()),
        );
        m.connect(parent.0, parent.1, link, "top");
        parent = (link, "bottom".to_string());
        ids.push(link);
    }
    ids
}

/// Test: chains hanging from one fixed frame are independent groups, and
/// links within a chain share one.
#[test]
fn test_fixed_anchors_do_not_couple() {
    let mut m = Mechanism::new();
    let ground = m.add_element(
        Element::frame("ground")
            .with_point("pivot0", Vector3::zeros())
            .with_point("pivot5", Vector3::new(5.0, 0.0, 0.0)),
    );
    let left = pendulum_chain(&mut m, ground, 0.0, 3);
    let right = pendulum_chain(&mut m, ground, 5.0, 2);

    let solver = KinematicSolver::new(m, SolverConfig::default(), FrameMode::Grounded).unwrap();
    assert_eq!(solver.groups().len(), 2);

    let left_group = solver.group_of(left[0]);
    assert!(left.iter().all(|&id| solver.group_of(id) == left_group));
    let right_group = solver.group_of(right[0]);
    assert!(right.iter().all(|&id| solver.group_of(id) == right_group));
    assert_ne!(left_group, right_group);

    let stats = solver.statistics();
    assert_eq!(stats.max_components_per_group, 3);
    assert_eq!(stats.total_dof, 35);
}

/// Test: separate corners are separate groups.
#[test]
fn test_corners_are_independent() {
    let mut m = Mechanism::new();
    let front = add_double_wishbone(&mut m, 0.0);
    let rear = add_double_wishbone(&mut m, 2000.0);

    let solver = KinematicSolver::new(m, SolverConfig::default(), FrameMode::Grounded).unwrap();
    assert_eq!(solver.groups().len(), 2);
    assert_ne!(solver.group_of(front.upright), solver.group_of(rear.upright));
}

/// Test: parallel group solves give the same poses as sequential ones.
#[cfg(feature = "parallel")]
#[test]
fn test_parallel_matches_sequential() {
    let build = |parallel: bool| {
        let mut m = Mechanism::new();
        let corners: Vec<_> = (0..4)
            .map(|k| add_double_wishbone(&mut m, f64::from(k) * 2000.0))
            .collect();
        let config = SolverConfig::default().with_parallel_groups(parallel);
        let mut solver = KinematicSolver::new(m, config, FrameMode::Grounded).unwrap();
        for c in &corners {
            let pose = solver.mechanism().element(c.upright).unwrap().pose;
            let moved = Pose::from_position_rotation(pose.position + Vector3::new(0.0, 0.0, 3.0), pose.rotation);
            solver.set_pose(c.upright, moved).unwrap();
        }
        solver.solve(&kin_types::SolveOptions::assemble()).unwrap();
        solver.into_mechanism()
    };
    assert_eq!(build(true), build(false));
}
