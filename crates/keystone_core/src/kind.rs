//! Resource kinds in the provisioned topology.

use serde::{Deserialize, Serialize};

/// The kind of infrastructure a descriptor stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Virtual network
    Network,
    /// Relational database instance
    RelationalDatabase,
    /// Key-value table
    KeyValueTable,
    /// Object storage bucket
    ObjectStore,
    /// User identity pool
    IdentityPool,
    /// Compute function
    ComputeFunction,
    /// API front door
    ApiFront,
    /// Access policy attached to a principal
    AccessPolicy,
}

impl ResourceKind {
    /// Every kind, in declaration order
    pub const ALL: [ResourceKind; 8] = [
        Self::Network,
        Self::RelationalDatabase,
        Self::KeyValueTable,
        Self::ObjectStore,
        Self::IdentityPool,
        Self::ComputeFunction,
        Self::ApiFront,
        Self::AccessPolicy,
    ];

    /// Get a string representation of the kind
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Network => "Network",
            Self::RelationalDatabase => "RelationalDatabase",
            Self::KeyValueTable => "KeyValueTable",
            Self::ObjectStore => "ObjectStore",
            Self::IdentityPool => "IdentityPool",
            Self::ComputeFunction => "ComputeFunction",
            Self::ApiFront => "ApiFront",
            Self::AccessPolicy => "AccessPolicy",
        }
    }

    /// Whether this kind can hold grants unless configured otherwise
    #[must_use]
    pub const fn is_default_principal(&self) -> bool {
        matches!(self, Self::ComputeFunction)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_name_matches_serde() {
        for kind in ResourceKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.kind_name()));
        }
    }

    #[test]
    fn test_default_principal() {
        let principals: Vec<_> = ResourceKind::ALL
            .iter()
            .filter(|k| k.is_default_principal())
            .collect();
        assert_eq!(principals, vec![&ResourceKind::ComputeFunction]);
    }
}
