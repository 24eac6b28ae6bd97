//! Graph construction and scheduling errors.

use keystone_core::ResourceId;

/// Graph result type
pub type GraphResult<T> = Result<T, GraphError>;

/// Structural errors in a descriptor set. All of them are fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// Two descriptors share an id
    #[error("duplicate resource id: {id}")]
    DuplicateId {
        /// The repeated id
        id: ResourceId,
    },

    /// A reference names a resource that is not in the set
    #[error("{source_id} references unknown resource {target_id} at {path:?}")]
    DanglingReference {
        /// Referencing resource
        source_id: ResourceId,
        /// Missing resource
        target_id: ResourceId,
        /// Substituted attribute path
        path: String,
    },

    /// A descriptor references itself
    #[error("{id} references itself at {path:?}")]
    SelfReference {
        /// Offending resource
        id: ResourceId,
        /// Substituted attribute path
        path: String,
    },

    /// The graph is not acyclic
    #[error("dependency cycle detected: {}", render_cycle(.cycle))]
    CycleDetected {
        /// Cycle members in edge order, starting at the smallest id
        cycle: Vec<ResourceId>,
    },
}

impl GraphError {
    /// Resource ids named by this error
    #[must_use]
    pub fn resource_ids(&self) -> Vec<&ResourceId> {
        match self {
            Self::DuplicateId { id } | Self::SelfReference { id, .. } => vec![id],
            Self::DanglingReference {
                source_id,
                target_id,
                ..
            } => vec![source_id, target_id],
            Self::CycleDetected { cycle } => cycle.iter().collect(),
        }
    }
}

fn render_cycle(cycle: &[ResourceId]) -> String {
    let mut rendered: Vec<&str> = cycle.iter().map(ResourceId::as_str).collect();
    if let Some(first) = rendered.first().copied() {
        rendered.push(first);
    }
    rendered.join(" -> ")
}
