//! Phase scheduling.
//!
//! Kahn's algorithm, one layer at a time: every node whose dependencies have
//! all been placed goes into the next phase. Members of a phase are sorted by
//! id so the schedule is reproducible for the same descriptor set.

use crate::cycle::find_cycle_among;
use crate::error::{GraphError, GraphResult};
use crate::graph::DependencyGraph;
use keystone_core::ResourceId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A set of mutually independent resources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningPhase {
    /// Position in the schedule
    pub index: usize,
    /// Members, ascending by id
    pub resources: Vec<ResourceId>,
}

impl ProvisioningPhase {
    /// Number of resources in the phase
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Check if the phase is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Ordered provisioning phases for one graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    phases: Vec<ProvisioningPhase>,
    phase_of: BTreeMap<ResourceId, usize>,
}

impl Schedule {
    /// Phases in provisioning order
    #[must_use]
    pub fn phases(&self) -> &[ProvisioningPhase] {
        &self.phases
    }

    /// Phase index assigned to a resource
    #[must_use]
    pub fn phase_of(&self, id: &str) -> Option<usize> {
        self.phase_of.get(id).copied()
    }

    /// Size of the largest phase, the useful concurrency bound
    #[must_use]
    pub fn width(&self) -> usize {
        self.phases.iter().map(ProvisioningPhase::len).max().unwrap_or(0)
    }

    /// Every resource in provisioning order
    pub fn ordered_ids(&self) -> impl Iterator<Item = &ResourceId> {
        self.phases.iter().flat_map(|p| p.resources.iter())
    }

    /// Number of phases
    #[must_use]
    pub fn len(&self) -> usize {
        self.phases.len()
    }

    /// Check if nothing was scheduled
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }
}

/// Orders a dependency graph into phases
#[derive(Debug, Clone, Copy, Default)]
pub struct Scheduler;

impl Scheduler {
    /// Create a new scheduler
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Schedule the graph
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::CycleDetected`] with the full cycle if the graph
    /// is not acyclic
    pub fn schedule(&self, graph: &DependencyGraph) -> GraphResult<Schedule> {
        let mut in_degree: BTreeMap<&ResourceId, usize> = graph
            .ids()
            .map(|id| (id, graph.dependencies(id.as_str()).count()))
            .collect();

        let mut ready: Vec<&ResourceId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut phases = Vec::new();
        let mut phase_of = BTreeMap::new();

        while !ready.is_empty() {
            let index = phases.len();
            let mut next = BTreeSet::new();

            for &id in &ready {
                for dependent in graph.dependents(id.as_str()) {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.insert(dependent);
                        }
                    }
                }
                phase_of.insert(id.clone(), index);
            }

            tracing::debug!(phase = index, resources = ready.len(), "phase scheduled");
            phases.push(ProvisioningPhase {
                index,
                resources: ready.into_iter().cloned().collect(),
            });
            ready = next.into_iter().collect();
        }

        if phase_of.len() < graph.node_count() {
            let stalled: BTreeSet<&ResourceId> =
                graph.ids().filter(|id| !phase_of.contains_key(*id)).collect();
            let cycle = find_cycle_among(graph, &stalled)
                .unwrap_or_else(|| stalled.iter().map(|id| (*id).clone()).collect());
            tracing::debug!(stalled = stalled.len(), "scheduler stalled on a cycle");
            return Err(GraphError::CycleDetected { cycle });
        }

        Ok(Schedule { phases, phase_of })
    }
}
