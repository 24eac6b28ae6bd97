//! Dependency graph built from declared references.
//!
//! Nodes are descriptor ids. An edge `from -> to` means `from` must be
//! realized before `to`, because `to` declared a reference to `from`. Edges
//! only come from declared references; attribute values never imply one.

use crate::error::{GraphError, GraphResult};
use keystone_core::{Reference, ResourceDescriptor, ResourceId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// An ordering constraint between two resources
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    /// Referenced resource, realized first
    pub from: ResourceId,
    /// Referencing resource
    pub to: ResourceId,
}

impl Edge {
    /// Create a new edge
    #[must_use]
    pub fn new(from: ResourceId, to: ResourceId) -> Self {
        Self { from, to }
    }
}

/// Validated set of descriptors plus their ordering constraints.
///
/// The graph owns the descriptors and only hands out shared borrows, so no
/// stage can alter a descriptor once it has been validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGraph {
    nodes: BTreeMap<ResourceId, ResourceDescriptor>,
    edges: BTreeSet<Edge>,
    dependencies: BTreeMap<ResourceId, BTreeSet<ResourceId>>,
    dependents: BTreeMap<ResourceId, BTreeSet<ResourceId>>,
}

impl DependencyGraph {
    /// Build the graph from a full descriptor set
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateId`] if two descriptors share an id,
    /// [`GraphError::SelfReference`] if a descriptor references itself and
    /// [`GraphError::DanglingReference`] if a reference names no descriptor
    pub fn build(descriptors: impl IntoIterator<Item = ResourceDescriptor>) -> GraphResult<Self> {
        let mut nodes = BTreeMap::new();
        for descriptor in descriptors {
            let id = descriptor.id().clone();
            if nodes.contains_key(&id) {
                return Err(GraphError::DuplicateId { id });
            }
            nodes.insert(id, descriptor);
        }

        let mut edges = BTreeSet::new();
        let mut dependencies: BTreeMap<ResourceId, BTreeSet<ResourceId>> =
            nodes.keys().map(|id| (id.clone(), BTreeSet::new())).collect();
        let mut dependents = dependencies.clone();

        for (id, descriptor) in &nodes {
            for reference in descriptor.references() {
                let target = reference.target_id();
                if target == id {
                    return Err(GraphError::SelfReference {
                        id: id.clone(),
                        path: reference.attribute_path().to_string(),
                    });
                }
                if !nodes.contains_key(target) {
                    return Err(GraphError::DanglingReference {
                        source_id: id.clone(),
                        target_id: target.clone(),
                        path: reference.attribute_path().to_string(),
                    });
                }

                edges.insert(Edge::new(target.clone(), id.clone()));
                dependencies.entry(id.clone()).or_default().insert(target.clone());
                dependents.entry(target.clone()).or_default().insert(id.clone());
            }
        }

        tracing::debug!(
            nodes = nodes.len(),
            edges = edges.len(),
            "dependency graph built"
        );

        Ok(Self {
            nodes,
            edges,
            dependencies,
            dependents,
        })
    }

    /// Get descriptor by id
    #[must_use]
    pub fn get_node(&self, id: &str) -> Option<&ResourceDescriptor> {
        self.nodes.get(id)
    }

    /// Check whether an id is part of the graph
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// All descriptors, ordered by id
    pub fn nodes(&self) -> impl Iterator<Item = &ResourceDescriptor> {
        self.nodes.values()
    }

    /// All ids, ascending
    pub fn ids(&self) -> impl Iterator<Item = &ResourceId> {
        self.nodes.keys()
    }

    /// All edges, ordered
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    /// Resources the given resource depends on, ascending
    pub fn dependencies(&self, id: &str) -> impl Iterator<Item = &ResourceId> {
        self.dependencies.get(id).into_iter().flatten()
    }

    /// Resources that depend on the given resource, ascending
    pub fn dependents(&self, id: &str) -> impl Iterator<Item = &ResourceId> {
        self.dependents.get(id).into_iter().flatten()
    }

    /// References `source` declares
    pub fn references_from(&self, source: &str) -> impl Iterator<Item = &Reference> {
        self.nodes
            .get(source)
            .into_iter()
            .flat_map(|d| d.references().iter())
    }

    /// References `source` declares towards `target`
    pub fn references_between<'a>(
        &'a self,
        target: &'a str,
        source: &'a str,
    ) -> impl Iterator<Item = &'a Reference> + 'a {
        self.references_from(source)
            .filter(move |r| r.target_id().as_str() == target)
    }

    /// Nodes with no dependencies
    #[must_use]
    pub fn entry_nodes(&self) -> Vec<&ResourceId> {
        self.dependencies
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(id, _)| id)
            .collect()
    }

    /// Nodes nothing depends on
    #[must_use]
    pub fn exit_nodes(&self) -> Vec<&ResourceId> {
        self.dependents
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(id, _)| id)
            .collect()
    }

    /// Get total node count
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Get total edge count
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Check if graph is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
