//! Grant auditing.
//!
//! Every statement must be traceable to the references its principal declared.
//! Each grant is checked on its own: the resource is a referenced target, the
//! ARN output is the one the table names for that target's kind, and every
//! action is one the table exposes for that target under the access it was
//! referenced with.

use crate::capability::CapabilityTable;
use crate::error::{PolicyError, PolicyResult};
use crate::statement::{PolicySet, PolicyStatement};
use keystone_core::ResourceKind;
use keystone_graph::DependencyGraph;
use std::collections::BTreeSet;

/// Checks synthesized statements against the declared references
#[derive(Debug, Clone, Copy)]
pub struct GrantAuditor<'a> {
    graph: &'a DependencyGraph,
    table: &'a CapabilityTable,
    principal_kinds: &'a BTreeSet<ResourceKind>,
}

impl<'a> GrantAuditor<'a> {
    /// Create an auditor
    #[must_use]
    pub fn new(
        graph: &'a DependencyGraph,
        table: &'a CapabilityTable,
        principal_kinds: &'a BTreeSet<ResourceKind>,
    ) -> Self {
        Self {
            graph,
            table,
            principal_kinds,
        }
    }

    /// Audit every statement of a set
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::CapabilityVersionMismatch`] if the set came from
    /// another table, and [`PolicyError::OverBroadGrant`] for the first
    /// statement that grants something no declared reference accounts for
    pub fn audit(&self, set: &PolicySet) -> PolicyResult<()> {
        if set.capabilities_version() != self.table.version {
            return Err(PolicyError::CapabilityVersionMismatch {
                synthesized: set.capabilities_version(),
                audited: self.table.version,
            });
        }

        let mut seen = BTreeSet::new();
        for statement in set.statements() {
            if !seen.insert(&statement.principal_id) {
                return Err(over_broad(statement, "principal has more than one statement"));
            }
            self.audit_statement(statement)?;
        }
        Ok(())
    }

    /// Audit one statement
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::OverBroadGrant`] if the statement is not
    /// traceable to the principal's references
    pub fn audit_statement(&self, statement: &PolicyStatement) -> PolicyResult<()> {
        let principal_id = statement.principal_id.as_str();
        let principal = self
            .graph
            .get_node(principal_id)
            .ok_or_else(|| over_broad(statement, "principal is not in the graph"))?;

        if !self.principal_kinds.contains(&principal.kind()) {
            return Err(over_broad(
                statement,
                format!("{} is not a principal kind", principal.kind()),
            ));
        }
        if statement.grants.is_empty() {
            return Err(over_broad(statement, "statement grants nothing"));
        }

        let referenced = principal.referenced_ids();
        let mut seen = BTreeSet::new();

        for grant in &statement.grants {
            let resource_ref = &grant.resource;
            if !seen.insert(&resource_ref.resource) {
                return Err(over_broad(
                    statement,
                    format!("{} has more than one grant", resource_ref.resource),
                ));
            }
            if !referenced.contains(&resource_ref.resource) {
                return Err(over_broad(
                    statement,
                    format!("{} is not referenced by the principal", resource_ref.resource),
                ));
            }
            let target = self
                .graph
                .get_node(resource_ref.resource.as_str())
                .ok_or_else(|| over_broad(statement, format!("{} is not in the graph", resource_ref.resource)))?;
            let capabilities = self
                .table
                .get(target.kind())
                .ok_or_else(|| over_broad(statement, format!("{} is not covered by the table", target.kind())))?;

            if capabilities.is_wiring_only() {
                return Err(over_broad(
                    statement,
                    format!("{} is wiring only and carries no access", resource_ref.resource),
                ));
            }
            if resource_ref.output != capabilities.arn_output {
                return Err(over_broad(
                    statement,
                    format!("{resource_ref} is not the ARN output of {}", target.kind()),
                ));
            }
            if grant.actions.is_empty() {
                return Err(over_broad(statement, format!("grant on {resource_ref} is empty")));
            }

            let write = self
                .graph
                .references_between(resource_ref.resource.as_str(), principal_id)
                .any(|r| r.access().allows_write());
            let allowed: BTreeSet<&str> = capabilities.actions_for(write).collect();

            for action in &grant.actions {
                if action.contains(['*', '?']) {
                    return Err(over_broad(statement, format!("wildcard action {action}")));
                }
                if !allowed.contains(action.as_str()) {
                    return Err(over_broad(
                        statement,
                        format!("{action} on {resource_ref} is not needed by its reference"),
                    ));
                }
            }
        }

        Ok(())
    }
}

fn over_broad(statement: &PolicyStatement, reason: impl Into<String>) -> PolicyError {
    PolicyError::OverBroadGrant {
        principal: statement.principal_id.clone(),
        reason: reason.into(),
    }
}
