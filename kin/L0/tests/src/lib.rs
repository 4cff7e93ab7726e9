//! Shared mechanisms for the integration scenarios.
//!
//! Dimensions are millimetres: x forward, y outboard, z up.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use kin_mechanism::{Element, ElementKind, Mechanism};
use kin_types::{ElementId, Point3, Pose, Vector3};

/// Element ids of one double-wishbone corner.
#[derive(Debug, Clone, Copy)]
pub struct Corner {
    pub chassis: ElementId,
    pub upright: ElementId,
    pub lower_arm: ElementId,
    pub upper_arm: ElementId,
    pub tie_rod: ElementId,
    pub spring: ElementId,
    pub tire: ElementId,
}

/// Spring-damper travel used by [`double_wishbone`].
pub const SPRING_TRAVEL: f64 = 50.0;

/// A double-wishbone corner in its design position: two A-arms, a tie rod
/// and a coil-over between chassis and upright, and a tire on the hub.
#[must_use]
pub fn double_wishbone() -> (Mechanism, Corner) {
    let mut m = Mechanism::new();
    let corner = add_double_wishbone(&mut m, 0.0);
    (m, corner)
}

/// Add a corner shifted outboard by `y_offset` with its own chassis frame.
pub fn add_double_wishbone(m: &mut Mechanism, y_offset: f64) -> Corner {
    let p = |x: f64, y: f64, z: f64| Vector3::new(x, y + y_offset, z);

    let chassis = m.add_element(
        Element::frame("chassis")
            .with_point("lca_front", p(150.0, 300.0, 150.0))
            .with_point("lca_rear", p(-150.0, 300.0, 150.0))
            .with_point("uca_front", p(120.0, 400.0, 450.0))
            .with_point("uca_rear", p(-120.0, 400.0, 450.0))
            .with_point("tie_inner", p(-100.0, 320.0, 200.0))
            .with_point("spring_top", p(0.0, 500.0, 600.0)),
    );
    let upright = m.add_element(
        Element::body("upright")
            .with_point("lower_ball", p(0.0, 700.0, 130.0))
            .with_point("upper_ball", p(0.0, 650.0, 470.0))
            .with_point("tie_outer", p(-110.0, 690.0, 220.0))
            .with_point("spring_bottom", p(0.0, 660.0, 250.0))
            .with_point("hub_inner", p(0.0, 700.0, 300.0))
            .with_point("hub_outer", p(0.0, 760.0, 300.0)),
    );
    let lower_arm = m.add_element(
        Element::new("lower arm", ElementKind::AArm)
            .with_point("front", p(150.0, 300.0, 150.0))
            .with_point("rear", p(-150.0, 300.0, 150.0))
            .with_point("ball", p(0.0, 700.0, 130.0)),
    );
    let upper_arm = m.add_element(
        Element::new("upper arm", ElementKind::AArm)
            .with_point("front", p(120.0, 400.0, 450.0))
            .with_point("rear", p(-120.0, 400.0, 450.0))
            .with_point("ball", p(0.0, 650.0, 470.0)),
    );
    let tie_rod = m.add_element(Element::bar(
        "tie rod",
        p(-100.0, 320.0, 200.0),
        p(-110.0, 690.0, 220.0),
    ));
    let spring = m.add_element(Element::spring_damper(
        "coil-over",
        p(0.0, 500.0, 600.0),
        p(0.0, 660.0, 250.0),
        -SPRING_TRAVEL,
        SPRING_TRAVEL,
    ));
    let tire = m.add_element(
        Element::new("tire", ElementKind::Tire { bearings: [0, 1] })
            .with_point("inner", p(0.0, 700.0, 300.0))
            .with_point("outer", p(0.0, 760.0, 300.0))
            .with_point("contact", p(0.0, 730.0, 0.0)),
    );

    m.connect(chassis, "lca_front", lower_arm, "front")
        .connect(chassis, "lca_rear", lower_arm, "rear")
        .connect(upright, "lower_ball", lower_arm, "ball")
        .connect(chassis, "uca_front", upper_arm, "front")
        .connect(chassis, "uca_rear", upper_arm, "rear")
        .connect(upright, "upper_ball", upper_arm, "ball")
        .connect(chassis, "tie_inner", tie_rod, "start")
        .connect(upright, "tie_outer", tie_rod, "end")
        .connect(chassis, "spring_top", spring, "start")
        .connect(upright, "spring_bottom", spring, "end")
        .connect(upright, "hub_inner", tire, "inner")
        .connect(upright, "hub_outer", tire, "outer");

    Corner {
        chassis,
        upright,
        lower_arm,
        upper_arm,
        tie_rod,
        spring,
        tire,
    }
}

/// Two free bodies whose joint points start `gap` apart along x.
#[must_use]
pub fn separated_pair(gap: f64) -> (Mechanism, ElementId, ElementId) {
    let mut m = Mechanism::new();
    let a = m.add_element(
        Element::body("a")
            .with_pose(Pose::from_position(Point3::origin()))
            .with_point("ball", Vector3::new(1.0, 0.0, 0.0)),
    );
    let b = m.add_element(
        Element::body("b")
            .with_pose(Pose::from_position(Point3::new(1.0 + gap, 2.0, -1.0)))
            .with_point("socket", Vector3::new(0.0, -2.0, 1.0)),
    );
    m.connect(a, "ball", b, "socket");
    (m, a, b)
}

/// A free slider hung from a grounded frame by a spring-damper of the given
/// rest length and symmetric travel. Returns `(mechanism, slider, spring)`.
#[must_use]
pub fn hanging_slider(rest_length: f64, travel: f64) -> (Mechanism, ElementId, ElementId) {
    let mut m = Mechanism::new();
    let ground = m.add_element(Element::frame("ground").with_point("anchor", Vector3::zeros()));
    let slider = m.add_element(
        Element::body("slider")
            .with_pose(Pose::from_position(Point3::new(0.0, 0.0, -rest_length)))
            .with_point("eye", Vector3::zeros()),
    );
    let spring = m.add_element(Element::spring_damper(
        "spring",
        Vector3::zeros(),
        Vector3::new(0.0, 0.0, -rest_length),
        -travel,
        travel,
    ));
    m.connect(ground, "anchor", spring, "start")
        .connect(slider, "eye", spring, "end");
    (m, slider, spring)
}

/// A free slider whose pin rides in a linear bushing along a grounded rail
/// from z = 0 to z = 100. The pin starts at z = 40.
/// Returns `(mechanism, slider, bushing)`.
#[must_use]
pub fn rail_slider() -> (Mechanism, ElementId, ElementId) {
    let mut m = Mechanism::new();
    let rail = m.add_element(
        Element::frame("rail")
            .with_point("low", Vector3::zeros())
            .with_point("high", Vector3::new(0.0, 0.0, 100.0)),
    );
    let slider = m.add_element(
        Element::body("slider")
            .with_pose(Pose::from_position(Point3::new(0.0, 0.0, 40.0)))
            .with_point("pin", Vector3::zeros()),
    );
    let bushing = m.add_element(
        Element::new("bushing", ElementKind::LinearBushing { supports: [0, 1] })
            .with_point("low", Vector3::zeros())
            .with_point("high", Vector3::new(0.0, 0.0, 100.0))
            .with_point("rod", Vector3::new(0.0, 0.0, 40.0)),
    );
    m.connect(rail, "low", bushing, "low")
        .connect(rail, "high", bushing, "high")
        .connect(slider, "pin", bushing, "rod");
    (m, slider, bushing)
}
