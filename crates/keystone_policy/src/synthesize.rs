//! Least-privilege statement synthesis.
//!
//! For every principal, walk the references it declared and emit one grant per
//! referenced target: the read actions its kind exposes, plus the write actions
//! when some reference to that target asked for write access. A grant is scoped
//! to its own target, so write access to one table never reaches another.
//! Nothing the principal did not reference is ever considered.

use crate::audit::GrantAuditor;
use crate::capability::CapabilityTable;
use crate::error::{PolicyError, PolicyResult};
use crate::statement::{Grant, PolicySet, PolicyStatement, ResourceRef};
use keystone_core::{ResourceDescriptor, ResourceId, ResourceKind};
use keystone_graph::DependencyGraph;
use std::collections::BTreeSet;

/// Derives policy statements from a dependency graph
#[derive(Debug, Clone)]
pub struct PolicySynthesizer<'t> {
    table: &'t CapabilityTable,
    principal_kinds: BTreeSet<ResourceKind>,
}

impl<'t> PolicySynthesizer<'t> {
    /// Create a synthesizer over a validated capability table
    ///
    /// # Errors
    ///
    /// Returns error if the table fails validation
    pub fn new(
        table: &'t CapabilityTable,
        principal_kinds: impl IntoIterator<Item = ResourceKind>,
    ) -> PolicyResult<Self> {
        table.validate()?;
        Ok(Self {
            table,
            principal_kinds: principal_kinds.into_iter().collect(),
        })
    }

    /// Kinds that can hold grants
    #[must_use]
    pub fn principal_kinds(&self) -> &BTreeSet<ResourceKind> {
        &self.principal_kinds
    }

    /// Synthesize one statement per principal that references anything
    /// access-bearing
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::UncoveredKind`] if a principal references a kind
    /// the table does not describe, and [`PolicyError::OverBroadGrant`] if a
    /// synthesized statement fails the audit
    pub fn synthesize(&self, graph: &DependencyGraph) -> PolicyResult<PolicySet> {
        let mut statements = Vec::new();

        for principal in graph
            .nodes()
            .filter(|d| self.principal_kinds.contains(&d.kind()))
        {
            if let Some(statement) = self.statement_for(graph, principal)? {
                tracing::debug!(
                    principal = %statement.principal_id,
                    grants = statement.grants.len(),
                    "statement synthesized"
                );
                statements.push(statement);
            }
        }

        let set = PolicySet::new(self.table.version, statements);
        GrantAuditor::new(graph, self.table, &self.principal_kinds).audit(&set)?;
        Ok(set)
    }

    fn statement_for(
        &self,
        graph: &DependencyGraph,
        principal: &ResourceDescriptor,
    ) -> PolicyResult<Option<PolicyStatement>> {
        let principal_id = principal.id();
        let mut grants = Vec::new();

        for target_id in graph.dependencies(principal_id.as_str()) {
            let target = dependency(graph, principal_id, target_id)?;
            let capabilities =
                self.table
                    .get(target.kind())
                    .ok_or_else(|| PolicyError::UncoveredKind {
                        principal: principal_id.clone(),
                        target: target_id.clone(),
                        kind: target.kind(),
                    })?;

            if capabilities.is_wiring_only() {
                tracing::debug!(principal = %principal_id, target = %target_id, "wiring-only reference");
                continue;
            }

            let write = graph
                .references_between(target_id.as_str(), principal_id.as_str())
                .any(|r| r.access().allows_write());
            let grant = Grant::new(
                ResourceRef::new(target_id.clone(), capabilities.arn_output.clone()),
                capabilities.actions_for(write),
            );
            if grant.actions.is_empty() {
                tracing::warn!(
                    principal = %principal_id,
                    target = %target_id,
                    "reference selects no actions; {} only exposes write actions",
                    target.kind()
                );
                continue;
            }
            grants.push(grant);
        }

        if grants.is_empty() {
            return Ok(None);
        }
        Ok(Some(PolicyStatement::new(principal_id.clone(), grants)))
    }
}

/// Look up a dependency the graph reported for `principal`
fn dependency<'g>(
    graph: &'g DependencyGraph,
    principal: &ResourceId,
    target: &ResourceId,
) -> PolicyResult<&'g ResourceDescriptor> {
    graph
        .get_node(target.as_str())
        .ok_or_else(|| PolicyError::OverBroadGrant {
            principal: principal.clone(),
            reason: format!("dependency {target} is missing from the graph"),
        })
}
