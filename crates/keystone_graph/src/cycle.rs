//! Cycle extraction for diagnostics.
//!
//! Only runs once the scheduler has stalled, so it can afford a plain
//! depth-first search that tracks the recursion stack.

use crate::graph::DependencyGraph;
use indexmap::IndexSet;
use keystone_core::ResourceId;
use std::collections::BTreeSet;

impl DependencyGraph {
    /// Find one cycle anywhere in the graph
    #[must_use]
    pub fn find_cycle(&self) -> Option<Vec<ResourceId>> {
        let candidates: BTreeSet<&ResourceId> = self.ids().collect();
        find_cycle_among(self, &candidates)
    }
}

/// Find a cycle using only `candidates` and the edges between them.
///
/// The result follows edge direction (each id is depended on by the next, the
/// last by the first) and is rotated to start at its smallest id.
pub(crate) fn find_cycle_among(
    graph: &DependencyGraph,
    candidates: &BTreeSet<&ResourceId>,
) -> Option<Vec<ResourceId>> {
    let mut visited = BTreeSet::new();
    let mut rec_stack = IndexSet::new();

    for &start in candidates {
        if let Some(mut cycle) = dfs_cycle(start, graph, candidates, &mut visited, &mut rec_stack) {
            rotate_to_smallest(&mut cycle);
            return Some(cycle);
        }
    }

    None
}

/// DFS cycle detection
fn dfs_cycle<'g>(
    node: &'g ResourceId,
    graph: &'g DependencyGraph,
    candidates: &BTreeSet<&'g ResourceId>,
    visited: &mut BTreeSet<&'g ResourceId>,
    rec_stack: &mut IndexSet<&'g ResourceId>,
) -> Option<Vec<ResourceId>> {
    if let Some(pos) = rec_stack.get_index_of(node) {
        return Some(rec_stack.iter().skip(pos).map(|id| (*id).clone()).collect());
    }
    if !visited.insert(node) {
        return None;
    }

    rec_stack.insert(node);
    for next in graph.dependents(node.as_str()) {
        if !candidates.contains(next) {
            continue;
        }
        if let Some(cycle) = dfs_cycle(next, graph, candidates, visited, rec_stack) {
            return Some(cycle);
        }
    }
    rec_stack.pop();

    None
}

fn rotate_to_smallest(cycle: &mut [ResourceId]) {
    let start = cycle
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.cmp(b))
        .map_or(0, |(i, _)| i);
    cycle.rotate_left(start);
}
