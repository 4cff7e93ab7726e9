//! Graph builder: turns elements and joints into components, constraints
//! and restorers.
//!
//! # Stages
//!
//! 1. **Resolve** every joint to `(element, point index)` pairs
//! 2. **Merge** element pairs tied by three or more non-collinear joints into
//!    one rigid unit; the dependent side keeps a fixed offset to its owner
//! 3. **Simplify** A-arms, tires, linear bushings, then bars and springs,
//!    replacing each by distance or bushing constraints between the elements
//!    it is jointed to, plus a restorer
//! 4. **Create components** for every surviving element
//! 5. **Join**: one shared point pair becomes a sphere constraint, two become
//!    a hinge, three or more collinear ones a hinge through the extremes
//!
//! Until stage 4 constraint anchors and restorer references name root
//! element indices; they are remapped to component indices at the end.

use hashbrown::HashMap;
use kin_constraint::{
    Anchor, BodyRef, Constraint, HingeConstraint, LinearBushingConstraint, TravelBounds,
};
use kin_types::{ElementId, FrameMode, KinematicError, Pose, Result, Vector3};
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::align::{farthest_pair, is_collinear, max_alignment_error, rigid_transform};
use crate::component::{Component, Location};
use crate::element::{Element, ElementKind, PointRef};
use crate::mechanism::Mechanism;
use crate::restorer::{RefPoint, Restorer};

/// Points closer than this (relative to their magnitude) are the same point.
const COINCIDENT_EPSILON: f64 = 1e-9;

/// Relative tolerance for collinearity and rigid-fit residuals.
const SHAPE_TOLERANCE: f64 = 1e-6;

/// Everything the solver needs, derived from one mechanism topology.
#[derive(Debug, Clone)]
pub(crate) struct Topology {
    pub components: Vec<Component>,
    pub element_components: Vec<Option<usize>>,
    pub constraints: Vec<Constraint>,
    pub restorers: Vec<Restorer>,
}

/// Build the solver topology of a mechanism.
pub(crate) fn build(mechanism: &Mechanism, frame_mode: FrameMode) -> Result<Topology> {
    let mut builder = Builder::new(mechanism, frame_mode)?;
    builder.merge_relative_fixed()?;
    builder.simplify()?;
    builder.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PointKey {
    element: usize,
    point: usize,
}

type RootPairs = Vec<((usize, usize), Vec<(Vector3<f64>, Vector3<f64>)>)>;

struct Builder<'a> {
    elements: &'a [Element],
    fixed: Vec<bool>,
    joints: Vec<(PointKey, PointKey)>,
    attachments: Vec<Vec<SmallVec<[PointKey; 2]>>>,
    root: Vec<usize>,
    offset: Vec<Pose>,
    simplified: Vec<bool>,
    constraints: Vec<Constraint>,
    restorers: Vec<Restorer>,
}

fn scale_of(points: &[Vector3<f64>]) -> f64 {
    1.0 + points.iter().map(Vector3::norm).fold(0.0, f64::max)
}

fn resolve(mechanism: &Mechanism, reference: &PointRef) -> Result<PointKey> {
    let element = mechanism.try_element(reference.element)?;
    if matches!(element.kind, ElementKind::Assembly) {
        return Err(KinematicError::topology(format!(
            "joint references assembly '{}', which has no geometry",
            element.name
        )));
    }
    let point = element
        .point_index(&reference.point)
        .ok_or_else(|| KinematicError::unresolved(reference.element, reference.point.as_str()))?;
    Ok(PointKey {
        element: reference.element.index(),
        point,
    })
}

fn validate(mechanism: &Mechanism, id: ElementId, element: &Element) -> Result<()> {
    if let Some(parent) = element.parent {
        let container = mechanism.try_element(parent)?;
        if !matches!(container.kind, ElementKind::Assembly) {
            return Err(KinematicError::topology(format!(
                "'{}' names '{}' as its parent, which is not an assembly",
                element.name, container.name
            )));
        }
    }
    if !element.pose.is_finite() {
        return Err(KinematicError::topology(format!(
            "'{}' has a non-finite pose",
            element.name
        )));
    }
    let count = element.points().len();
    let check_pair = |pair: [usize; 2], what: &str| {
        if pair[0] >= count || pair[1] >= count || pair[0] == pair[1] {
            Err(KinematicError::topology(format!(
                "{id} '{}' has invalid {what} point indices {pair:?}",
                element.name
            )))
        } else {
            Ok(())
        }
    };
    match element.kind {
        ElementKind::SpringDamper { dl_min, dl_max } => {
            if !(dl_min.is_finite() && dl_max.is_finite() && dl_min <= dl_max) {
                return Err(KinematicError::topology(format!(
                    "spring-damper '{}' has travel [{dl_min}, {dl_max}]",
                    element.name
                )));
            }
        }
        ElementKind::Tire { bearings } => check_pair(bearings, "bearing")?,
        ElementKind::LinearBushing { supports } => check_pair(supports, "support")?,
        _ => {}
    }
    Ok(())
}

impl<'a> Builder<'a> {
    fn new(mechanism: &'a Mechanism, frame_mode: FrameMode) -> Result<Self> {
        let elements = mechanism.elements();
        for (index, element) in elements.iter().enumerate() {
            validate(mechanism, ElementId::new(index), element)?;
        }

        let mut attachments: Vec<Vec<SmallVec<[PointKey; 2]>>> = elements
            .iter()
            .map(|e| vec![SmallVec::new(); e.points().len()])
            .collect();
        let mut joints = Vec::with_capacity(mechanism.joints().len());
        for joint in mechanism.joints() {
            let a = resolve(mechanism, &joint.a)?;
            let b = resolve(mechanism, &joint.b)?;
            if a.element == b.element {
                return Err(KinematicError::topology(format!(
                    "joint connects '{}' to itself",
                    elements[a.element].name
                )));
            }
            attachments[a.element][a.point].push(b);
            attachments[b.element][b.point].push(a);
            joints.push((a, b));
        }

        let fixed = elements
            .iter()
            .map(|e| {
                e.fixed
                    || (matches!(e.kind, ElementKind::Frame) && frame_mode == FrameMode::Grounded)
            })
            .collect();

        let n = elements.len();
        Ok(Self {
            elements,
            fixed,
            joints,
            attachments,
            root: (0..n).collect(),
            offset: vec![Pose::identity(); n],
            simplified: vec![false; n],
            constraints: Vec::new(),
            restorers: Vec::new(),
        })
    }

    /// A point in its element's root frame.
    fn local_in_root(&self, key: PointKey) -> Vector3<f64> {
        let local = self.elements[key.element].points()[key.point].local;
        self.offset[key.element].transform_point(&local).coords
    }

    fn anchor(&self, key: PointKey) -> Anchor {
        Anchor::new(BodyRef::Free(self.root[key.element]), self.local_in_root(key))
    }

    fn ref_point(&self, key: PointKey) -> RefPoint {
        RefPoint {
            component: self.root[key.element],
            local: self.local_in_root(key),
        }
    }

    /// Joint point pairs between distinct roots, grouped by root pair with
    /// the lower root on the left. Joints touching simplified elements are
    /// skipped; duplicate point pairs are collapsed.
    fn root_pairs(&self) -> RootPairs {
        let mut pairs: HashMap<(usize, usize), Vec<(Vector3<f64>, Vector3<f64>)>> = HashMap::new();
        for &(a, b) in &self.joints {
            if self.simplified[a.element] || self.simplified[b.element] {
                continue;
            }
            let (ra, rb) = (self.root[a.element], self.root[b.element]);
            if ra == rb {
                continue;
            }
            let (pa, pb) = (self.local_in_root(a), self.local_in_root(b));
            let (key, pair) = if ra < rb {
                ((ra, rb), (pa, pb))
            } else {
                ((rb, ra), (pb, pa))
            };
            let entry = pairs.entry(key).or_default();
            let duplicate = entry
                .iter()
                .any(|(l, _)| (l - pair.0).norm() <= COINCIDENT_EPSILON * (1.0 + l.norm()));
            if !duplicate {
                entry.push(pair);
            }
        }
        let mut pairs: RootPairs = pairs.into_iter().collect();
        pairs.sort_unstable_by_key(|(key, _)| *key);
        pairs
    }

    // ========================================================================
    // Relative-fixed merging
    // ========================================================================

    fn merge_relative_fixed(&mut self) -> Result<()> {
        'rescan: loop {
            for ((r1, r2), pairs) in self.root_pairs() {
                if pairs.len() < 3 || (self.fixed[r1] && self.fixed[r2]) {
                    continue;
                }
                let lhs: Vec<_> = pairs.iter().map(|p| p.0).collect();
                let rhs: Vec<_> = pairs.iter().map(|p| p.1).collect();
                if is_collinear(&lhs, SHAPE_TOLERANCE * scale_of(&lhs)) {
                    continue;
                }

                let (owner, dependent, owner_points, dependent_points) =
                    if self.fixed[r2] && !self.fixed[r1] {
                        (r2, r1, &rhs, &lhs)
                    } else {
                        (r1, r2, &lhs, &rhs)
                    };
                let transform = rigid_transform(dependent_points, owner_points).ok_or_else(|| {
                    KinematicError::topology(format!(
                        "no rigid fit between '{}' and '{}'",
                        self.elements[dependent].name, self.elements[owner].name
                    ))
                })?;
                let residual = max_alignment_error(&transform, dependent_points, owner_points);
                if residual > SHAPE_TOLERANCE * scale_of(owner_points) {
                    warn!(
                        owner = %self.elements[owner].name,
                        dependent = %self.elements[dependent].name,
                        residual,
                        "joint points do not fit a rigid transform; merging anyway"
                    );
                }

                for element in 0..self.elements.len() {
                    if self.root[element] == dependent {
                        self.offset[element] = transform.compose(&self.offset[element]);
                        self.root[element] = owner;
                    }
                }
                debug!(
                    owner = %self.elements[owner].name,
                    dependent = %self.elements[dependent].name,
                    joints = pairs.len(),
                    "merged relative-fixed elements"
                );
                continue 'rescan;
            }
            return Ok(());
        }
    }

    // ========================================================================
    // Element simplification
    // ========================================================================

    fn simplify(&mut self) -> Result<()> {
        let elements = self.elements;
        let passes: [fn(&ElementKind) -> bool; 4] = [
            |k| matches!(k, ElementKind::AArm),
            |k| matches!(k, ElementKind::Tire { .. }),
            |k| matches!(k, ElementKind::LinearBushing { .. }),
            ElementKind::is_link,
        ];
        for pass in passes {
            for (index, element) in elements.iter().enumerate() {
                if !pass(&element.kind) || !self.is_candidate(index) {
                    continue;
                }
                let done = match element.kind {
                    ElementKind::AArm => self.simplify_a_arm(index),
                    ElementKind::Tire { bearings } => self.simplify_tire(index, bearings),
                    ElementKind::LinearBushing { supports } => {
                        self.simplify_linear_bushing(index, supports)?
                    }
                    _ => self.simplify_link(index),
                };
                if done {
                    self.simplified[index] = true;
                } else {
                    warn!(
                        element = %element.name,
                        kind = element.kind.name(),
                        "element does not fit its simplification pattern; solving it as a body"
                    );
                }
            }
        }
        Ok(())
    }

    fn is_candidate(&self, element: usize) -> bool {
        !self.fixed[element]
            && self.root[element] == element
            && !self
                .root
                .iter()
                .enumerate()
                .any(|(other, &root)| root == element && other != element)
    }

    /// The only element jointed to a point, if it is still a solver
    /// candidate.
    fn single_partner(&self, element: usize, point: usize) -> Option<PointKey> {
        match self.attachments[element][point].as_slice() {
            [partner] if !self.simplified[partner.element] => Some(*partner),
            _ => None,
        }
    }

    fn root_kind(&self, key: PointKey) -> &ElementKind {
        &self.elements[self.root[key.element]].kind
    }

    fn simplify_a_arm(&mut self, index: usize) -> bool {
        let elements = self.elements;
        let points = elements[index].points();
        if points.len() != 3 {
            return false;
        }
        let (Some(b0), Some(b1), Some(tip)) = (
            self.single_partner(index, 0),
            self.single_partner(index, 1),
            self.single_partner(index, 2),
        ) else {
            return false;
        };
        let base_root = self.root[b0.element];
        if self.root[b1.element] != base_root
            || self.root[tip.element] == base_root
            || matches!(self.root_kind(b0), ElementKind::AArm)
            || matches!(self.root_kind(tip), ElementKind::AArm)
        {
            return false;
        }

        let locals = [points[0].local, points[1].local, points[2].local];
        for (k, base) in [b0, b1].into_iter().enumerate() {
            let length = (locals[2] - locals[k]).norm();
            self.constraints.push(Constraint::distance(
                self.anchor(base),
                self.anchor(tip),
                length,
                None,
            ));
        }
        self.restorers.push(Restorer::AArm {
            element: ElementId::new(index),
            references: [self.ref_point(b0), self.ref_point(b1), self.ref_point(tip)],
            locals,
        });
        true
    }

    fn simplify_tire(&mut self, index: usize, bearings: [usize; 2]) -> bool {
        let markers_free = self.attachments[index]
            .iter()
            .enumerate()
            .all(|(point, attached)| bearings.contains(&point) || attached.is_empty());
        if !markers_free {
            return false;
        }
        let (Some(a), Some(b)) = (
            self.single_partner(index, bearings[0]),
            self.single_partner(index, bearings[1]),
        ) else {
            return false;
        };

        let elements = self.elements;
        let points = elements[index].points();
        let locals = [points[bearings[0]].local, points[bearings[1]].local];
        if self.root[a.element] != self.root[b.element] {
            self.constraints.push(Constraint::distance(
                self.anchor(a),
                self.anchor(b),
                (locals[1] - locals[0]).norm(),
                None,
            ));
        }
        self.restorers.push(Restorer::Tire {
            element: ElementId::new(index),
            bearings: [self.ref_point(a), self.ref_point(b)],
            locals,
        });
        true
    }

    fn simplify_linear_bushing(&mut self, index: usize, supports: [usize; 2]) -> Result<bool> {
        let elements = self.elements;
        let points = elements[index].points();
        let (Some(s0), Some(s1)) = (
            self.single_partner(index, supports[0]),
            self.single_partner(index, supports[1]),
        ) else {
            return Ok(false);
        };
        let support_root = self.root[s0.element];
        if self.root[s1.element] != support_root {
            return Ok(false);
        }

        let rod_points: Vec<usize> = (0..points.len()).filter(|p| !supports.contains(p)).collect();
        let Some(rod_partners) = rod_points
            .iter()
            .map(|&p| self.single_partner(index, p))
            .collect::<Option<Vec<_>>>()
        else {
            return Ok(false);
        };
        if rod_partners.is_empty() || rod_partners.iter().any(|k| self.root[k.element] == support_root) {
            return Ok(false);
        }

        let support_locals = [points[supports[0]].local, points[supports[1]].local];
        let Some(axis) = (support_locals[1] - support_locals[0]).try_normalize(COINCIDENT_EPSILON) else {
            return Err(KinematicError::topology(format!(
                "linear bushing '{}' has coincident supports",
                elements[index].name
            )));
        };

        let support_axis = [self.local_in_root(s0), self.local_in_root(s1)];
        for &rod in &rod_partners {
            self.constraints.push(Constraint::LinearBushing(LinearBushingConstraint::new(
                BodyRef::Free(support_root),
                support_axis,
                self.anchor(rod),
            )?));
        }
        for (partners, locals) in rod_partners.windows(2).zip(rod_points.windows(2)) {
            if self.root[partners[0].element] != self.root[partners[1].element] {
                let length = (points[locals[1]].local - points[locals[0]].local).norm();
                self.constraints.push(Constraint::distance(
                    self.anchor(partners[0]),
                    self.anchor(partners[1]),
                    length,
                    None,
                ));
            }
        }

        let rod_local = points[rod_points[0]].local;
        self.restorers.push(Restorer::LinearBushing {
            element: ElementId::new(index),
            supports: [self.ref_point(s0), self.ref_point(s1)],
            rod_end: self.ref_point(rod_partners[0]),
            support_locals,
            rod_local,
            rest_travel: (rod_local - support_locals[0]).dot(&axis),
        });
        Ok(true)
    }

    fn simplify_link(&mut self, index: usize) -> bool {
        let elements = self.elements;
        let element = &elements[index];
        let points = element.points();
        if points.len() != 2 {
            return false;
        }
        let (Some(a), Some(b)) = (self.single_partner(index, 0), self.single_partner(index, 1)) else {
            return false;
        };
        if self.root_kind(a).is_link() || self.root_kind(b).is_link() {
            return false;
        }

        let locals = [points[0].local, points[1].local];
        let rest_length = (locals[1] - locals[0]).norm();
        let bounds = match element.kind {
            ElementKind::SpringDamper { dl_min, dl_max } => Some(TravelBounds::new(dl_min, dl_max)),
            _ => None,
        };
        if self.root[a.element] != self.root[b.element] {
            self.constraints.push(Constraint::distance(
                self.anchor(a),
                self.anchor(b),
                rest_length,
                bounds,
            ));
        }
        self.restorers.push(Restorer::Bar {
            element: ElementId::new(index),
            ends: [self.ref_point(a), self.ref_point(b)],
            locals,
            rest_length,
        });
        true
    }

    // ========================================================================
    // Components and joints
    // ========================================================================

    fn finish(mut self) -> Result<Topology> {
        let n = self.elements.len();
        let mut element_components = vec![None; n];
        let mut components = Vec::new();

        for (index, element) in self.elements.iter().enumerate() {
            if matches!(element.kind, ElementKind::Assembly)
                || self.simplified[index]
                || self.root[index] != index
            {
                continue;
            }
            let location = if self.fixed[index] {
                Location::Fixed
            } else {
                Location::Free
            };
            element_components[index] = Some(components.len());
            components.push(Component::new(ElementId::new(index), location));
        }

        for ((ra, rb), pairs) in self.root_pairs() {
            if self.fixed[ra] && self.fixed[rb] {
                continue;
            }
            let lhs: Vec<_> = pairs.iter().map(|p| p.0).collect();
            let rhs: Vec<_> = pairs.iter().map(|p| p.1).collect();
            let (lhs_body, rhs_body) = (BodyRef::Free(ra), BodyRef::Free(rb));
            let constraint = if pairs.len() == 1 {
                Constraint::sphere(Anchor::new(lhs_body, lhs[0]), Anchor::new(rhs_body, rhs[0]))
            } else {
                if pairs.len() > 2 && !is_collinear(&lhs, SHAPE_TOLERANCE * scale_of(&lhs)) {
                    warn!(
                        lhs = %self.elements[ra].name,
                        rhs = %self.elements[rb].name,
                        joints = pairs.len(),
                        "non-collinear joints left unmerged; using the outermost pair as a hinge"
                    );
                }
                let (i, j) = farthest_pair(&lhs).unwrap_or((0, 1));
                Constraint::Hinge(HingeConstraint::new(
                    lhs_body,
                    rhs_body,
                    [lhs[i], lhs[j]],
                    [rhs[i], rhs[j]],
                )?)
            };
            self.constraints.push(constraint);
        }

        // Root element indices -> component indices.
        let elements = self.elements;
        let roots = element_components.clone();
        let lookup = |element: usize| -> Result<usize> {
            roots[element].ok_or_else(|| {
                KinematicError::topology(format!(
                    "'{}' is referenced by a constraint but has no solver component",
                    elements[element].name
                ))
            })
        };

        let mut constraints = std::mem::take(&mut self.constraints);
        for constraint in &mut constraints {
            let mut failure = None;
            constraint.map_bodies(|body| match lookup(body.index()) {
                Ok(c) if components[c].is_fixed() => BodyRef::Fixed(c),
                Ok(c) => BodyRef::Free(c),
                Err(err) => {
                    failure = Some(err);
                    body
                }
            });
            if let Some(err) = failure {
                return Err(err);
            }
        }

        let mut restorers = std::mem::take(&mut self.restorers);
        for restorer in &mut restorers {
            let mut failure = None;
            restorer.map_components(|element| {
                lookup(element).unwrap_or_else(|err| {
                    failure = Some(err);
                    element
                })
            });
            if let Some(err) = failure {
                return Err(err);
            }
        }

        for (index, element) in elements.iter().enumerate() {
            let root = self.root[index];
            if root == index || matches!(element.kind, ElementKind::Assembly) {
                continue;
            }
            let owner = lookup(root)?;
            let offset = self.offset[index];
            element_components[index] = Some(components.len());
            components.push(Component::new(
                ElementId::new(index),
                Location::Relative { owner, offset },
            ));
            restorers.push(Restorer::Relative {
                element: ElementId::new(index),
                owner,
                offset,
            });
        }

        let mut touched = vec![false; components.len()];
        for constraint in &constraints {
            let (a, b) = constraint.bodies();
            for body in std::iter::once(a).chain(b) {
                touched[body.index()] = true;
            }
        }
        for (index, component) in components.iter().enumerate() {
            if component.is_free() && !touched[index] {
                warn!(
                    element = %self.elements[component.element().index()].name,
                    "free element has no joints and will not move"
                );
            }
        }

        debug!(
            elements = n,
            components = components.len(),
            free = components.iter().filter(|c| c.is_free()).count(),
            constraints = constraints.len(),
            restorers = restorers.len(),
            "built solver topology"
        );

        Ok(Topology {
            components,
            element_components,
            constraints,
            restorers,
        })
    }
}
