//! Derived policy statements.

use keystone_core::{ResourceId, Version};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Late-bound ARN of a referenced resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceRef {
    /// Referenced resource
    pub resource: ResourceId,
    /// Output that carries its ARN
    pub output: String,
}

impl ResourceRef {
    /// Create a new resource ref
    #[must_use]
    pub fn new(resource: ResourceId, output: impl Into<String>) -> Self {
        Self {
            resource,
            output: output.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${{{}.{}}}", self.resource, self.output)
    }
}

/// Actions granted on exactly one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    /// Resource the actions are scoped to
    pub resource: ResourceRef,
    /// Granted actions, ascending
    pub actions: BTreeSet<String>,
}

impl Grant {
    /// Create a grant on one resource
    #[must_use]
    pub fn new(resource: ResourceRef, actions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            resource,
            actions: actions.into_iter().map(Into::into).collect(),
        }
    }
}

/// Grants of one principal, one block per referenced resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStatement {
    /// Resource receiving the grants
    pub principal_id: ResourceId,
    /// Per-resource grants, ordered by resource
    pub grants: Vec<Grant>,
}

impl PolicyStatement {
    /// Create a statement; grants are ordered by resource
    #[must_use]
    pub fn new(principal_id: ResourceId, grants: impl IntoIterator<Item = Grant>) -> Self {
        let mut grants: Vec<Grant> = grants.into_iter().collect();
        grants.sort_by(|a, b| a.resource.cmp(&b.resource));
        Self { principal_id, grants }
    }

    /// Ids of the resources this statement is scoped to
    pub fn scoped_ids(&self) -> impl Iterator<Item = &ResourceId> {
        self.grants.iter().map(|g| &g.resource.resource)
    }

    /// Grant on one resource
    #[must_use]
    pub fn grant_on(&self, id: &str) -> Option<&Grant> {
        self.grants.iter().find(|g| g.resource.resource.as_str() == id)
    }

    /// Every action granted on any resource, ascending
    #[must_use]
    pub fn actions(&self) -> BTreeSet<&str> {
        self.grants
            .iter()
            .flat_map(|g| g.actions.iter().map(String::as_str))
            .collect()
    }

    /// Whether `action` is granted on resource `id`
    #[must_use]
    pub fn allows(&self, action: &str, id: &str) -> bool {
        self.grant_on(id).is_some_and(|g| g.actions.contains(action))
    }
}

/// Every statement synthesized for one graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySet {
    capabilities_version: Version,
    statements: Vec<PolicyStatement>,
}

impl PolicySet {
    /// Create a set; statements are ordered by principal
    #[must_use]
    pub fn new(capabilities_version: Version, mut statements: Vec<PolicyStatement>) -> Self {
        statements.sort_by(|a, b| a.principal_id.cmp(&b.principal_id));
        Self {
            capabilities_version,
            statements,
        }
    }

    /// Version of the capability table the set was derived from
    #[must_use]
    pub fn capabilities_version(&self) -> Version {
        self.capabilities_version
    }

    /// Statements ordered by principal id
    #[must_use]
    pub fn statements(&self) -> &[PolicyStatement] {
        &self.statements
    }

    /// Statement for one principal
    #[must_use]
    pub fn for_principal(&self, id: &str) -> Option<&PolicyStatement> {
        self.statements.iter().find(|s| s.principal_id.as_str() == id)
    }

    /// Number of statements
    #[must_use]
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Check if no statement was synthesized
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}
