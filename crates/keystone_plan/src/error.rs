//! Planning pipeline errors.

use keystone_core::{CoreError, Hash, ResourceId};
use keystone_graph::GraphError;
use keystone_policy::PolicyError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Plan result type
pub type PlanResult<T> = Result<T, PlanError>;

/// Emit result type
pub type EmitResult<T> = Result<T, EmitError>;

/// Stage of the planning pipeline. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    /// Descriptors collected, nothing checked
    Defined,
    /// Ids unique, references resolve
    Validated,
    /// Phases assigned, graph acyclic
    Scheduled,
    /// Policy statements synthesized and audited
    PolicyResolved,
    /// Plan serialized
    Emitted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Defined => "defined",
            Self::Validated => "validated",
            Self::Scheduled => "scheduled",
            Self::PolicyResolved => "policy-resolved",
            Self::Emitted => "emitted",
        };
        f.write_str(name)
    }
}

/// Plan serialization error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EmitError {
    /// Id exceeds the executor's logical id limit
    #[error("resource id {id} is {len} characters long, the limit is {max}")]
    IdTooLong {
        /// Offending id
        id: ResourceId,
        /// Its length
        len: usize,
        /// Configured limit
        max: usize,
    },

    /// Id uses characters the executor cannot use in a logical id
    #[error("resource id {id} contains characters outside [A-Za-z0-9]")]
    IdNotRepresentable {
        /// Offending id
        id: ResourceId,
    },

    /// Scheduled id has no node in the graph
    #[error("scheduled resource {id} is not in the graph")]
    UnknownResource {
        /// Missing id
        id: ResourceId,
    },

    /// JSON encoding or decoding failed
    #[error("plan serialization failed: {message}")]
    Serialization {
        /// Encoder message
        message: String,
    },

    /// Recorded digest does not match the plan content
    #[error("plan digest mismatch: recorded {recorded}, computed {computed}")]
    DigestMismatch {
        /// Digest stored in the plan
        recorded: Hash,
        /// Digest of the content
        computed: Hash,
    },
}

impl From<serde_json::Error> for EmitError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

/// Any failure of the planning pipeline
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// Stack definition or planner configuration could not be read
    #[error("invalid definition: {message}")]
    Definition {
        /// Parser message
        message: String,
    },

    /// Descriptor construction failed
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Graph construction or scheduling failed
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Policy synthesis failed
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// Plan emission failed
    #[error(transparent)]
    Emit(#[from] EmitError),
}

impl PlanError {
    /// Stage the pipeline was entering when it failed
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::Definition { .. } | Self::Core(_) => Stage::Defined,
            Self::Graph(GraphError::CycleDetected { .. }) => Stage::Scheduled,
            Self::Graph(_) => Stage::Validated,
            Self::Policy(_) => Stage::PolicyResolved,
            Self::Emit(_) => Stage::Emitted,
        }
    }

    /// Resource ids the error names, where it names any
    #[must_use]
    pub fn resource_ids(&self) -> Vec<&ResourceId> {
        match self {
            Self::Graph(err) => err.resource_ids(),
            Self::Policy(PolicyError::UncoveredKind { principal, target, .. }) => {
                vec![principal, target]
            }
            Self::Policy(PolicyError::OverBroadGrant { principal, .. }) => vec![principal],
            Self::Emit(
                EmitError::IdTooLong { id, .. }
                | EmitError::IdNotRepresentable { id }
                | EmitError::UnknownResource { id },
            ) => vec![id],
            _ => Vec::new(),
        }
    }
}

impl From<serde_json::Error> for PlanError {
    fn from(err: serde_json::Error) -> Self {
        Self::Definition {
            message: err.to_string(),
        }
    }
}
