//! Plan-to-plan comparison.
//!
//! Compares two emitted plans only. Nothing here knows what is actually
//! provisioned.

use crate::emit::{Plan, PlannedResource};
use keystone_core::{ResourceId, Version};
use keystone_policy::{PolicyStatement, ResourceRef};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Resource present in only one plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedResource {
    /// Resource id
    pub id: ResourceId,
    /// Phase it occupies
    pub phase: usize,
}

/// Resource present in both plans that differs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceChange {
    /// Resource id
    pub id: ResourceId,
    /// Phase in the earlier plan
    pub before_phase: usize,
    /// Phase in the later plan
    pub after_phase: usize,
    /// Kind changed
    pub kind_changed: bool,
    /// Top-level attributes added, removed or changed
    pub attributes: BTreeSet<String>,
    /// Binding paths added, removed or retargeted
    pub bindings: BTreeSet<String>,
}

impl ResourceChange {
    /// Whether only the phase differs
    #[must_use]
    pub fn is_move_only(&self) -> bool {
        !self.kind_changed && self.attributes.is_empty() && self.bindings.is_empty()
    }
}

/// Actions added or revoked on one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGrantChange {
    /// Resource the actions are scoped to
    pub resource: ResourceRef,
    /// Actions only in the later plan
    pub granted: BTreeSet<String>,
    /// Actions only in the earlier plan
    pub revoked: BTreeSet<String>,
}

/// Grants added or revoked for one principal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantChange {
    /// Principal id
    pub principal: ResourceId,
    /// Changed grants, ordered by resource
    pub resources: Vec<ResourceGrantChange>,
}

impl GrantChange {
    fn compute(
        principal: &ResourceId,
        before: Option<&PolicyStatement>,
        after: Option<&PolicyStatement>,
    ) -> Self {
        let by_resource = |s: Option<&PolicyStatement>| -> BTreeMap<ResourceRef, BTreeSet<String>> {
            s.map(|s| {
                s.grants
                    .iter()
                    .map(|g| (g.resource.clone(), g.actions.clone()))
                    .collect()
            })
            .unwrap_or_default()
        };
        let (before, after) = (by_resource(before), by_resource(after));
        let empty = BTreeSet::new();

        let resources = before
            .keys()
            .chain(after.keys())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter_map(|resource| {
                let old = before.get(resource).unwrap_or(&empty);
                let new = after.get(resource).unwrap_or(&empty);
                let change = ResourceGrantChange {
                    resource: resource.clone(),
                    granted: new.difference(old).cloned().collect(),
                    revoked: old.difference(new).cloned().collect(),
                };
                (!change.granted.is_empty() || !change.revoked.is_empty()).then_some(change)
            })
            .collect();

        Self {
            principal: principal.clone(),
            resources,
        }
    }

    /// Change on one resource
    #[must_use]
    pub fn on(&self, id: &str) -> Option<&ResourceGrantChange> {
        self.resources.iter().find(|r| r.resource.resource.as_str() == id)
    }

    fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Summary counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    /// Resources added
    pub added_count: usize,
    /// Resources removed
    pub removed_count: usize,
    /// Resources that only changed phase
    pub moved_count: usize,
    /// Resources with changed content
    pub modified_count: usize,
    /// Principals whose grants changed
    pub grant_change_count: usize,
}

/// Differences between two plans
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanDiff {
    /// Capability table versions, when they differ
    pub capabilities_version: Option<(Version, Version)>,
    /// Resources only in the later plan
    pub added: Vec<PlacedResource>,
    /// Resources only in the earlier plan
    pub removed: Vec<PlacedResource>,
    /// Resources in both plans that differ
    pub changed: Vec<ResourceChange>,
    /// Per-principal grant changes
    pub grants: Vec<GrantChange>,
}

impl PlanDiff {
    /// Compare `before` with `after`
    #[must_use]
    pub fn compute(before: &Plan, after: &Plan) -> Self {
        let before_resources = index(before);
        let after_resources = index(after);

        let mut diff = Self {
            capabilities_version: (before.capabilities_version != after.capabilities_version)
                .then_some((before.capabilities_version, after.capabilities_version)),
            ..Self::default()
        };

        for (id, (phase, _)) in &after_resources {
            if !before_resources.contains_key(id) {
                diff.added.push(PlacedResource {
                    id: (*id).clone(),
                    phase: *phase,
                });
            }
        }

        for (id, (before_phase, old)) in &before_resources {
            let Some((after_phase, new)) = after_resources.get(id) else {
                diff.removed.push(PlacedResource {
                    id: (*id).clone(),
                    phase: *before_phase,
                });
                continue;
            };

            let change = ResourceChange {
                id: (*id).clone(),
                before_phase: *before_phase,
                after_phase: *after_phase,
                kind_changed: old.kind != new.kind,
                attributes: changed_attributes(old, new),
                bindings: changed_bindings(old, new),
            };
            if before_phase != after_phase || !change.is_move_only() {
                diff.changed.push(change);
            }
        }

        let principals: BTreeSet<&ResourceId> = before
            .policies
            .iter()
            .chain(&after.policies)
            .map(|s| &s.principal_id)
            .collect();
        for principal in principals {
            let change = GrantChange::compute(
                principal,
                before.policy_for(principal.as_str()),
                after.policy_for(principal.as_str()),
            );
            if !change.is_empty() {
                diff.grants.push(change);
            }
        }

        diff
    }

    /// Whether the plans are equivalent
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.capabilities_version.is_none()
            && self.added.is_empty()
            && self.removed.is_empty()
            && self.changed.is_empty()
            && self.grants.is_empty()
    }

    /// Summary counts
    #[must_use]
    pub fn summary(&self) -> DiffSummary {
        let moved_count = self.changed.iter().filter(|c| c.is_move_only()).count();
        DiffSummary {
            added_count: self.added.len(),
            removed_count: self.removed.len(),
            moved_count,
            modified_count: self.changed.len() - moved_count,
            grant_change_count: self.grants.len(),
        }
    }
}

fn index(plan: &Plan) -> BTreeMap<&ResourceId, (usize, &PlannedResource)> {
    plan.phases
        .iter()
        .flat_map(|phase| phase.resources.iter().map(move |r| (&r.id, (phase.index, r))))
        .collect()
}

fn changed_attributes(old: &PlannedResource, new: &PlannedResource) -> BTreeSet<String> {
    old.attributes
        .keys()
        .chain(new.attributes.keys())
        .filter(|key| old.attributes.get(*key) != new.attributes.get(*key))
        .cloned()
        .collect()
}

fn changed_bindings(old: &PlannedResource, new: &PlannedResource) -> BTreeSet<String> {
    let by_path = |r: &PlannedResource| -> BTreeMap<String, (ResourceId, String)> {
        r.bindings
            .iter()
            .map(|b| (b.path.clone(), (b.target.clone(), b.output.clone())))
            .collect()
    };
    let (old, new) = (by_path(old), by_path(new));
    old.keys()
        .chain(new.keys())
        .filter(|path| old.get(*path) != new.get(*path))
        .cloned()
        .collect()
}

impl fmt::Display for PlanDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "plans are equivalent");
        }
        if let Some((before, after)) = &self.capabilities_version {
            writeln!(f, "capability table {before} -> {after}")?;
        }
        for r in &self.added {
            writeln!(f, "+ {} (phase {})", r.id, r.phase)?;
        }
        for r in &self.removed {
            writeln!(f, "- {} (phase {})", r.id, r.phase)?;
        }
        for c in &self.changed {
            if c.before_phase != c.after_phase {
                writeln!(f, "~ {} phase {} -> {}", c.id, c.before_phase, c.after_phase)?;
            } else {
                writeln!(f, "~ {}", c.id)?;
            }
            if c.kind_changed {
                writeln!(f, "    kind changed")?;
            }
            for key in &c.attributes {
                writeln!(f, "    attribute {key}")?;
            }
            for path in &c.bindings {
                writeln!(f, "    binding {path}")?;
            }
        }
        for g in &self.grants {
            writeln!(f, "policy {}", g.principal)?;
            for r in &g.resources {
                writeln!(f, "    on {}", r.resource)?;
                for action in &r.granted {
                    writeln!(f, "        + {action}")?;
                }
                for action in &r.revoked {
                    writeln!(f, "        - {action}")?;
                }
            }
        }
        Ok(())
    }
}
