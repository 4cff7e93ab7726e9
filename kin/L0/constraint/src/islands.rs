//! Partitioning of components into independent constraint groups.
//!
//! Two free components belong to the same group when a chain of
//! constraints connects them. Fixed components never merge groups: a
//! constraint with one fixed side only pulls its free side's group.
//!
//! # Algorithm
//!
//! 1. Each component starts in its own set
//! 2. Every constraint with two free sides unions them
//! 3. Groups are numbered by their smallest member, so numbering is
//!    deterministic for a given component order
//! 4. Constraints are distributed to the group of their free side and
//!    rewritten to group-local slots; a quaternion normalization row is
//!    appended per member
//!
//! Constraints with no free side cannot move anything and are dropped.

use tracing::{debug, warn};

use crate::constraint::{BodyRef, Constraint, QuaternionNormConstraint};
use crate::coords::Coordinates;
use crate::group::Group;
use crate::linalg::UnionFind;

/// Summary of a partition.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GroupStatistics {
    /// Number of groups.
    pub num_groups: usize,
    /// Most free components in any group.
    pub max_components_per_group: usize,
    /// Most constraints (normalization rows included) in any group.
    pub max_constraints_per_group: usize,
    /// Total unknowns across all groups.
    pub total_dof: usize,
}

impl GroupStatistics {
    /// Gather statistics for a set of groups.
    #[must_use]
    pub fn of(groups: &[Group]) -> Self {
        Self {
            num_groups: groups.len(),
            max_components_per_group: groups.iter().map(|g| g.members().len()).max().unwrap_or(0),
            max_constraints_per_group: groups
                .iter()
                .map(|g| g.constraints().len())
                .max()
                .unwrap_or(0),
            total_dof: groups.iter().map(Group::dof).sum(),
        }
    }
}

/// Split constraints into independent groups.
///
/// `coords[i]` holds the current coordinates of component `i`; only free
/// components (`free[i] == true`) get unknowns. Constraint bodies must use
/// [`BodyRef::Free`] with the global component index for free components
/// and [`BodyRef::Fixed`] for fixed ones.
#[must_use]
pub fn partition(free: &[bool], coords: &[Coordinates], constraints: Vec<Constraint>) -> Vec<Group> {
    debug_assert_eq!(free.len(), coords.len());
    let n = free.len();
    let mut uf = UnionFind::new(n);

    for constraint in &constraints {
        if let (BodyRef::Free(a), Some(BodyRef::Free(b))) = constraint.bodies() {
            uf.union(a, b);
        }
    }

    // Number groups by first (smallest) member.
    let mut group_of_root: Vec<Option<usize>> = vec![None; n];
    let mut group_of: Vec<Option<usize>> = vec![None; n];
    let mut slot_of: Vec<usize> = vec![0; n];
    let mut members: Vec<Vec<usize>> = Vec::new();
    for component in (0..n).filter(|&i| free[i]) {
        let root = uf.find(component);
        let group = *group_of_root[root].get_or_insert_with(|| {
            members.push(Vec::new());
            members.len() - 1
        });
        slot_of[component] = members[group].len();
        members[group].push(component);
        group_of[component] = Some(group);
    }

    let mut grouped: Vec<Vec<Constraint>> = vec![Vec::new(); members.len()];
    for mut constraint in constraints {
        let owner = match constraint.bodies() {
            (BodyRef::Free(a), _) | (_, Some(BodyRef::Free(a))) => group_of.get(a).copied().flatten(),
            _ => None,
        };
        let Some(group) = owner else {
            warn!(
                kind = constraint.kind_name(),
                "constraint has no free side and is ignored"
            );
            continue;
        };
        constraint.map_bodies(|body| match body {
            BodyRef::Free(component) => BodyRef::Free(slot_of[component]),
            fixed @ BodyRef::Fixed(_) => fixed,
        });
        grouped[group].push(constraint);
    }

    let groups: Vec<Group> = members
        .into_iter()
        .zip(grouped)
        .enumerate()
        .map(|(index, (members, mut constraints))| {
            constraints.extend(
                (0..members.len()).map(|slot| Constraint::QuaternionNorm(QuaternionNormConstraint { slot })),
            );
            let group_coords = members.iter().map(|&m| coords[m]).collect();
            Group::new(index, members, group_coords, constraints)
        })
        .collect();

    debug!(
        components = n,
        groups = groups.len(),
        "partitioned constraint groups"
    );
    groups
}
