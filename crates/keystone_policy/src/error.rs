//! Policy synthesis errors.

use keystone_core::{ResourceId, ResourceKind, Version};

/// Policy result type
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Policy synthesis error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// Capability table could not be parsed
    #[error("capability table parse error: {message}")]
    Parse {
        /// Parser message
        message: String,
    },

    /// Capability table lists a wildcard action
    #[error("{kind}: wildcard action {action:?} is not allowed in a capability table")]
    WildcardAction {
        /// Kind exposing the action
        kind: ResourceKind,
        /// Offending action
        action: String,
    },

    /// Capability table lists an action that is not `service:Action`
    #[error("{kind}: malformed action {action:?}")]
    MalformedAction {
        /// Kind exposing the action
        kind: ResourceKind,
        /// Offending action
        action: String,
    },

    /// Kind exposes actions but names no output to scope them to
    #[error("{kind}: actions are exposed but no ARN output is named")]
    MissingArnOutput {
        /// Kind missing the output
        kind: ResourceKind,
    },

    /// Principal references a kind the capability table does not describe
    #[error("{principal} references {target} of kind {kind}, which the capability table does not cover")]
    UncoveredKind {
        /// Principal holding the reference
        principal: ResourceId,
        /// Referenced resource
        target: ResourceId,
        /// Kind missing from the table
        kind: ResourceKind,
    },

    /// A statement grants something no declared reference accounts for.
    ///
    /// This is a synthesizer defect, never a user input error.
    #[error("over-broad grant for {principal}: {reason}")]
    OverBroadGrant {
        /// Principal of the offending statement
        principal: ResourceId,
        /// What could not be traced to a reference
        reason: String,
    },

    /// A set is audited against a different capability table than it came from
    #[error("policy set derived from capability table {synthesized}, audited against {audited}")]
    CapabilityVersionMismatch {
        /// Table version recorded in the set
        synthesized: Version,
        /// Table version of the auditor
        audited: Version,
    },
}

impl From<serde_json::Error> for PolicyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse {
            message: err.to_string(),
        }
    }
}
