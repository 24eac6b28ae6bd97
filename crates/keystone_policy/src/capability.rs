//! Versioned capability table.
//!
//! The table says, per resource kind, which actions a consumer may be granted
//! on a resource of that kind and which output carries the ARN grants are
//! scoped to. It is supplied from outside so policy semantics can change
//! without touching the scheduler.

use crate::error::{PolicyError, PolicyResult};
use keystone_core::{ResourceKind, Version};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

static ACTION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9-]*:[A-Za-z0-9]+$").expect("action pattern is valid")
});

/// One action a kind exposes to consumers
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionTemplate {
    /// Action name, `service:Action`
    pub action: String,
    /// Only granted when the consumer declared write access
    #[serde(default)]
    pub requires_write: bool,
}

impl ActionTemplate {
    /// Create a read action
    #[must_use]
    pub fn read(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            requires_write: false,
        }
    }

    /// Create a write action
    #[must_use]
    pub fn write(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            requires_write: true,
        }
    }
}

/// What one kind exposes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCapabilities {
    /// Output holding the ARN grants are scoped to (`tableArn`)
    #[serde(default)]
    pub arn_output: String,
    /// Exposed actions. Empty means references to this kind are wiring only.
    #[serde(default)]
    pub actions: Vec<ActionTemplate>,
}

impl KindCapabilities {
    /// Create an entry scoped to the given ARN output
    #[must_use]
    pub fn new(arn_output: impl Into<String>) -> Self {
        Self {
            arn_output: arn_output.into(),
            actions: Vec::new(),
        }
    }

    /// Add an action
    #[must_use]
    pub fn with_action(mut self, action: ActionTemplate) -> Self {
        self.actions.push(action);
        self
    }

    /// Whether references to this kind never carry access
    #[must_use]
    pub fn is_wiring_only(&self) -> bool {
        self.actions.is_empty()
    }

    /// Actions granted for the given write flag, in table order
    pub fn actions_for(&self, write: bool) -> impl Iterator<Item = &str> {
        self.actions
            .iter()
            .filter(move |a| write || !a.requires_write)
            .map(|a| a.action.as_str())
    }
}

/// Versioned mapping from resource kind to exposed capabilities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityTable {
    /// Table version, recorded in every plan
    pub version: Version,
    /// Per-kind entries
    #[serde(default)]
    pub kinds: BTreeMap<ResourceKind, KindCapabilities>,
}

impl CapabilityTable {
    /// Create an empty table
    #[must_use]
    pub fn new(version: Version) -> Self {
        Self {
            version,
            kinds: BTreeMap::new(),
        }
    }

    /// Add or replace the entry for a kind
    #[must_use]
    pub fn with_kind(mut self, kind: ResourceKind, capabilities: KindCapabilities) -> Self {
        self.kinds.insert(kind, capabilities);
        self
    }

    /// Parse and validate a JSON table
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is malformed or the table is invalid
    pub fn from_json(json: &str) -> PolicyResult<Self> {
        let table: Self = serde_json::from_str(json)?;
        table.validate()?;
        Ok(table)
    }

    /// Entry for a kind
    #[must_use]
    pub fn get(&self, kind: ResourceKind) -> Option<&KindCapabilities> {
        self.kinds.get(&kind)
    }

    /// Check every action is a concrete `service:Action` and every kind
    /// exposing actions names its ARN output
    ///
    /// # Errors
    ///
    /// Returns the first problem found, in kind order
    pub fn validate(&self) -> PolicyResult<()> {
        for (&kind, entry) in &self.kinds {
            if !entry.actions.is_empty() && entry.arn_output.is_empty() {
                return Err(PolicyError::MissingArnOutput { kind });
            }
            for template in &entry.actions {
                let action = &template.action;
                if action.contains(['*', '?']) {
                    return Err(PolicyError::WildcardAction {
                        kind,
                        action: action.clone(),
                    });
                }
                if !ACTION_PATTERN.is_match(action) {
                    return Err(PolicyError::MalformedAction {
                        kind,
                        action: action.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
