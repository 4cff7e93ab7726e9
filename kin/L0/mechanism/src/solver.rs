//! The kinematic solver facade.
//!
//! [`KinematicSolver`] owns a [`Mechanism`], derives its solver topology
//! once, assembles it, and then answers repeated equality and objective
//! solves. Element poses are the externally observed state: a failed solve
//! leaves them untouched and reloads the solver coordinates from them.
//!
//! # Example
//!
//! ```
//! use kin_mechanism::{Element, KinematicSolver, Mechanism};
//! use kin_types::{FrameMode, SolveOptions, SolverConfig, Vector3};
//!
//! let mut mechanism = Mechanism::new();
//! let ground = mechanism.add_element(Element::frame("ground").with_point("pivot", Vector3::zeros()));
//! let link = mechanism.add_element(Element::body("link").with_world_point("pivot", Vector3::new(0.0, 0.0, 1.0)));
//! mechanism.connect(ground, "pivot", link, "pivot");
//!
//! let mut solver = KinematicSolver::new(mechanism, SolverConfig::default(), FrameMode::Grounded).unwrap();
//! let pivot = solver.world_point(link, "pivot").unwrap();
//! assert!(pivot.coords.norm() < 1e-4);
//!
//! let report = solver.solve(&SolveOptions::default()).unwrap();
//! assert!(report.total_iterations() <= 1);
//! ```

use std::time::{Duration, Instant};

use kin_constraint::{
    partition, solve_groups, Constraint, Coordinates, Frames, Group, GroupObjective,
    GroupReport, GroupStatistics, NewtonSettings, ObjectiveReport, SolveMode,
    COORDINATES_PER_BODY,
};
use kin_types::{
    ElementId, FrameMode, KinematicError, Point3, Pose, Result, SolveOptions, SolverConfig,
};
use nalgebra::DVector;
use tracing::{debug, info, warn};

use crate::builder::{build, Topology};
use crate::component::{Component, Location};
use crate::mechanism::Mechanism;
use crate::objective::{ElementFrame, Objective};
use crate::restorer::Restorer;

/// Outcome of an equality solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveReport {
    /// One report per group, in group order.
    pub groups: Vec<GroupReport>,
    /// Wall time of the solve, post-processing included.
    pub elapsed: Duration,
}

impl SolveReport {
    /// Iterations summed over all groups.
    #[must_use]
    pub fn total_iterations(&self) -> usize {
        self.groups.iter().map(|g| g.iterations).sum()
    }

    /// Largest final residual over all groups.
    #[must_use]
    pub fn max_residual(&self) -> f64 {
        self.groups.iter().map(|g| g.residual).fold(0.0, f64::max)
    }
}

/// Current residual of one constraint, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstraintResidual {
    /// Group owning the constraint.
    pub group: usize,
    /// Index of the constraint within its group.
    pub constraint: usize,
    /// Constraint kind.
    pub kind: &'static str,
    /// Whether the constraint carries travel bounds (and is therefore only
    /// enforced as an equality while assembling).
    pub bounded: bool,
    /// Largest absolute residual row.
    pub residual: f64,
}

/// Position and slot of a free component's coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Placement {
    group: usize,
    slot: usize,
}

/// Adapts an element objective to the coordinates of its group.
struct SlotObjective<'a> {
    objective: &'a dyn Objective,
    slot: usize,
    offset: Pose,
}

impl GroupObjective for SlotObjective<'_> {
    fn value(&self, coords: &[Coordinates]) -> f64 {
        self.objective
            .value(&ElementFrame::new(&coords[self.slot], &self.offset))
    }

    fn gradient(&self, coords: &[Coordinates], gradient: &mut DVector<f64>) {
        let component = self
            .objective
            .gradient(&ElementFrame::new(&coords[self.slot], &self.offset));
        let mut rows = gradient
            .fixed_rows_mut::<COORDINATES_PER_BODY>(self.slot * COORDINATES_PER_BODY);
        rows += component;
    }
}

/// Kinematic solver for one mechanism.
///
/// Every solve takes `&mut self`, so one solver is never driven from two
/// places at once.
#[derive(Debug, Clone)]
pub struct KinematicSolver {
    mechanism: Mechanism,
    config: SolverConfig,
    frame_mode: FrameMode,
    components: Vec<Component>,
    element_components: Vec<Option<usize>>,
    /// Coordinates of every component, indexed like `components`.
    state: Vec<Coordinates>,
    groups: Vec<Group>,
    placement: Vec<Option<Placement>>,
    restorers: Vec<Restorer>,
    initial_state: Option<Vec<Coordinates>>,
}

impl KinematicSolver {
    /// Build the solver topology and assemble the mechanism.
    ///
    /// Springs and dampers are held at their rest length during assembly.
    /// The assembled coordinates are kept for [`KinematicSolver::restore_initial_q`].
    ///
    /// # Errors
    ///
    /// Returns [`KinematicError::InvalidConfig`] for a bad configuration,
    /// [`KinematicError::Topology`] or [`KinematicError::UnresolvedReference`]
    /// for a malformed mechanism, and [`KinematicError::Convergence`] if
    /// assembly fails.
    pub fn new(mechanism: Mechanism, config: SolverConfig, frame_mode: FrameMode) -> Result<Self> {
        config.validate()?;
        let Topology {
            components,
            element_components,
            constraints,
            restorers,
        } = build(&mechanism, frame_mode)?;

        let state: Vec<Coordinates> = components
            .iter()
            .map(|c| Coordinates::from_pose(&mechanism.elements()[c.element().index()].pose))
            .collect();
        let free: Vec<bool> = components.iter().map(Component::is_free).collect();
        let groups = partition(&free, &state, constraints);

        let mut placement = vec![None; components.len()];
        for group in &groups {
            for (slot, &member) in group.members().iter().enumerate() {
                placement[member] = Some(Placement {
                    group: group.index(),
                    slot,
                });
            }
        }

        let mut solver = Self {
            mechanism,
            config,
            frame_mode,
            components,
            element_components,
            state,
            groups,
            placement,
            restorers,
            initial_state: None,
        };
        solver.sync_relative();

        let statistics = solver.statistics();
        info!(
            elements = solver.mechanism.len(),
            components = solver.components.len(),
            groups = statistics.num_groups,
            dof = statistics.total_dof,
            restorers = solver.restorers.len(),
            "kinematic solver built"
        );

        solver.solve(&SolveOptions::assemble())?;
        Ok(solver)
    }

    /// Solve every group for its equality constraints.
    ///
    /// The first successful solve records the assembled coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`KinematicError::Convergence`] when any group fails. Solver
    /// coordinates are then reloaded from the element poses, which the failed
    /// call has not modified. A zero iteration override is
    /// [`KinematicError::InvalidConfig`] and changes nothing.
    pub fn solve(&mut self, options: &SolveOptions) -> Result<SolveReport> {
        options.validate()?;
        let start = Instant::now();
        let mode = if options.on_assemble {
            SolveMode::Assemble
        } else {
            SolveMode::Operate
        };
        let settings = NewtonSettings::from_config(&self.config, options.max_iterations);

        let outcome = solve_groups(
            &mut self.groups,
            &self.state,
            mode,
            &settings,
            &self.config.parallel,
        );
        let groups = match outcome {
            Ok(groups) => groups,
            Err(err) => {
                warn!(%err, "solve failed; reloading coordinates from element poses");
                self.reload_from_elements();
                return Err(err);
            }
        };

        self.gather();
        if self.initial_state.is_none() {
            debug!("recording assembled coordinates");
            self.initial_state = Some(self.state.clone());
        }
        if options.run_post_process {
            self.post_process();
        }

        let report = SolveReport {
            groups,
            elapsed: start.elapsed(),
        };
        debug!(
            groups = report.groups.len(),
            iterations = report.total_iterations(),
            residual = report.max_residual(),
            elapsed_us = report.elapsed.as_micros(),
            "mechanism solved"
        );
        Ok(report)
    }

    /// Minimize an objective over the group that moves its element.
    ///
    /// Only that group changes. `options.max_iterations` overrides the
    /// objective iteration cap; `on_assemble` is ignored since travel bounds
    /// are handled as inequalities here.
    ///
    /// # Errors
    ///
    /// Returns [`KinematicError::UnknownElement`] for a bad element id,
    /// [`KinematicError::Topology`] when the element is not moved by any
    /// group or more than one travel bound becomes active, and
    /// [`KinematicError::Convergence`] on solver failure. On error the
    /// group's coordinates are restored to their values at entry. A zero
    /// iteration override is [`KinematicError::InvalidConfig`].
    pub fn solve_objective(
        &mut self,
        objective: &dyn Objective,
        options: &SolveOptions,
    ) -> Result<ObjectiveReport> {
        options.validate()?;
        let element = objective.element();
        let name = &self.mechanism.try_element(element)?.name;
        let component = self.element_components[element.index()].ok_or_else(|| {
            KinematicError::topology(format!(
                "'{name}' is not a solver component and cannot carry an objective"
            ))
        })?;
        let owner = self.components[component].owner(component);
        let Placement { group, slot } = self.placement[owner].ok_or_else(|| {
            KinematicError::topology(format!("'{name}' is fixed and cannot be driven"))
        })?;

        let adapter = SlotObjective {
            objective,
            slot,
            offset: self.components[component].offset(),
        };
        let mut config = self.config.objective;
        if let Some(max_iterations) = options.max_iterations {
            config.max_iterations = max_iterations;
        }
        let settings = NewtonSettings::from_config(&self.config, options.max_iterations);

        let entry = self.groups[group].coords().to_vec();
        match self.groups[group].solve_objective(&self.state, &adapter, &config, &settings) {
            Ok(report) => {
                self.gather();
                if options.run_post_process {
                    self.post_process();
                }
                Ok(report)
            }
            Err(err) => {
                warn!(%err, group, "objective solve failed; restoring entry coordinates");
                self.groups[group].coords_mut().copy_from_slice(&entry);
                Err(err)
            }
        }
    }

    /// Return to the coordinates recorded by the first successful solve and
    /// write them back to the elements.
    pub fn restore_initial_q(&mut self) {
        let Some(initial) = &self.initial_state else {
            return;
        };
        self.state.clone_from(initial);
        self.scatter();
        self.post_process();
        debug!("restored assembled coordinates");
    }

    /// Move an element between solves.
    ///
    /// Components take the new pose as their next starting point; for an
    /// element merged into another component the owner moves with it.
    /// Elements that are not components (bars, springs, ...) only have their
    /// stored pose replaced; the next solve restores them.
    ///
    /// # Errors
    ///
    /// Returns [`KinematicError::UnknownElement`] for a bad id and
    /// [`KinematicError::Topology`] for a non-finite pose.
    pub fn set_pose(&mut self, element: ElementId, pose: Pose) -> Result<()> {
        if !pose.is_finite() {
            return Err(KinematicError::topology(format!(
                "non-finite pose for {element}"
            )));
        }
        self.mechanism
            .element_mut(element)
            .ok_or(KinematicError::UnknownElement(element))?
            .pose = pose;

        let Some(component) = self.element_components[element.index()] else {
            return Ok(());
        };
        let located = self.components[component];
        let owner = located.owner(component);
        let owner_pose = if located.is_relative() {
            pose.compose(&located.offset().inverse())
        } else {
            pose
        };
        if located.is_relative() {
            let owner_element = self.components[owner].element();
            if let Some(e) = self.mechanism.element_mut(owner_element) {
                e.pose = owner_pose;
            }
        }
        self.state[owner] = Coordinates::from_pose(&owner_pose);
        if let Some(Placement { group, slot }) = self.placement[owner] {
            self.groups[group].coords_mut()[slot] = self.state[owner];
        }
        self.sync_relative();
        Ok(())
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// The mechanism, with poses as of the last post-processed solve.
    #[must_use]
    pub fn mechanism(&self) -> &Mechanism {
        &self.mechanism
    }

    /// Give the mechanism back.
    #[must_use]
    pub fn into_mechanism(self) -> Mechanism {
        self.mechanism
    }

    /// Solver configuration.
    #[must_use]
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// How frames were treated when building.
    #[must_use]
    pub fn frame_mode(&self) -> FrameMode {
        self.frame_mode
    }

    /// Independent constraint groups.
    #[must_use]
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Solver components.
    #[must_use]
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Restorers for elements that are not free or fixed components.
    #[must_use]
    pub fn restorers(&self) -> &[Restorer] {
        &self.restorers
    }

    /// Component coordinates, indexed like [`KinematicSolver::components`].
    #[must_use]
    pub fn coordinates(&self) -> &[Coordinates] {
        &self.state
    }

    /// Component index of an element, if it became one.
    #[must_use]
    pub fn component_of(&self, element: ElementId) -> Option<usize> {
        self.element_components.get(element.index()).copied().flatten()
    }

    /// Group whose unknowns move an element, if any.
    #[must_use]
    pub fn group_of(&self, element: ElementId) -> Option<usize> {
        let component = self.component_of(element)?;
        let owner = self.components[component].owner(component);
        self.placement[owner].map(|p| p.group)
    }

    /// Group sizes and degrees of freedom.
    #[must_use]
    pub fn statistics(&self) -> GroupStatistics {
        GroupStatistics::of(&self.groups)
    }

    /// World position of a named point, as of the last post-processed solve.
    ///
    /// # Errors
    ///
    /// Returns [`KinematicError::UnknownElement`] or
    /// [`KinematicError::UnresolvedReference`].
    pub fn world_point(&self, element: ElementId, point: &str) -> Result<Point3<f64>> {
        self.mechanism.world_point(element, point)
    }

    /// Residual of every group constraint at the current coordinates.
    #[must_use]
    pub fn constraint_residuals(&self) -> Vec<ConstraintResidual> {
        let mut residuals = Vec::new();
        for group in &self.groups {
            let frames = Frames::new(group.coords(), &self.state);
            residuals.extend(group.constraints().iter().enumerate().map(
                |(index, constraint): (usize, &Constraint)| ConstraintResidual {
                    group: group.index(),
                    constraint: index,
                    kind: constraint.kind_name(),
                    bounded: constraint.bounds().is_some(),
                    residual: constraint.max_residual(&frames, group.dof()),
                },
            ));
        }
        residuals
    }

    // ========================================================================
    // State bookkeeping
    // ========================================================================

    /// Copy group coordinates into the component state.
    fn gather(&mut self) {
        for group in &self.groups {
            for (slot, &member) in group.members().iter().enumerate() {
                self.state[member] = group.coords()[slot];
            }
        }
        self.sync_relative();
    }

    /// Copy the component state into the groups.
    fn scatter(&mut self) {
        for group in &mut self.groups {
            for slot in 0..group.members().len() {
                let member = group.members()[slot];
                group.coords_mut()[slot] = self.state[member];
            }
        }
        self.sync_relative();
    }

    /// Recompute relative components from their owners.
    fn sync_relative(&mut self) {
        for (index, component) in self.components.iter().enumerate() {
            if let Location::Relative { owner, offset } = component.location() {
                let pose = self.state[*owner].to_pose().compose(offset);
                self.state[index] = Coordinates::from_pose(&pose);
            }
        }
    }

    /// Rollback: reload every free and fixed component from its element.
    fn reload_from_elements(&mut self) {
        let elements = self.mechanism.elements();
        for (index, component) in self.components.iter().enumerate() {
            if !component.is_relative() {
                self.state[index] = Coordinates::from_pose(&elements[component.element().index()].pose);
            }
        }
        self.scatter();
    }

    /// Write solved poses to the elements, then run every restorer.
    fn post_process(&mut self) {
        for (index, component) in self.components.iter().enumerate() {
            if component.is_relative() {
                continue;
            }
            if let Some(element) = self.mechanism.element_mut(component.element()) {
                element.pose = self.state[index].to_pose();
            }
        }
        for restorer in &self.restorers {
            let Some(element) = self.mechanism.element_mut(restorer.element()) else {
                continue;
            };
            let restored = restorer.restore(&self.state, &element.pose);
            element.pose = restored.pose;
            element.set_dl_current(restored.dl_current);
        }
    }
}
