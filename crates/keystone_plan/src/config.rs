//! Planner configuration.

use crate::error::{PlanError, PlanResult};
use keystone_core::ResourceKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Executor limit on logical id length
pub const DEFAULT_MAX_ID_LEN: usize = 255;

/// Configuration for the planner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Longest id the executor accepts
    pub max_id_len: usize,
    /// Kinds that receive synthesized policy statements
    pub principal_kinds: BTreeSet<ResourceKind>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_id_len: DEFAULT_MAX_ID_LEN,
            principal_kinds: ResourceKind::ALL
                .into_iter()
                .filter(ResourceKind::is_default_principal)
                .collect(),
        }
    }
}

impl PlannerConfig {
    /// Parse a JSON configuration; absent fields keep their defaults
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is malformed or the id limit is zero
    pub fn from_json(json: &str) -> PlanResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        if config.max_id_len == 0 {
            return Err(PlanError::Definition {
                message: "max_id_len must be positive".to_string(),
            });
        }
        Ok(config)
    }

    /// Set the id length limit
    #[must_use]
    pub fn with_max_id_len(mut self, max: usize) -> Self {
        self.max_id_len = max;
        self
    }

    /// Add a principal kind
    #[must_use]
    pub fn with_principal(mut self, kind: ResourceKind) -> Self {
        self.principal_kinds.insert(kind);
        self
    }
}
