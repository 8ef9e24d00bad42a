// src/dag/levels.rs

//! Topological leveling.
//!
//! A node's level is one more than the highest level among its
//! dependencies; nodes without dependencies sit on level 0. Nodes on the
//! same level have no dependency on each other and may run concurrently.

use std::collections::HashMap;

use tracing::{debug, error};

use crate::dag::graph::DagGraph;
use crate::errors::{GraphError, Result};
use crate::graph::model::NodeId;

/// Ordered execution levels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Levels {
    levels: Vec<Vec<NodeId>>,
}

impl Levels {
    pub fn iter(&self) -> impl Iterator<Item = &[NodeId]> {
        self.levels.iter().map(|l| l.as_slice())
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&[NodeId]> {
        self.levels.get(index).map(|l| l.as_slice())
    }

    /// Level index of `node`, if present.
    pub fn level_of(&self, node: &str) -> Option<usize> {
        self.levels
            .iter()
            .position(|level| level.iter().any(|n| n == node))
    }

    /// Flattened topological order.
    pub fn flatten(&self) -> Vec<NodeId> {
        self.levels.iter().flatten().cloned().collect()
    }

    pub fn into_inner(self) -> Vec<Vec<NodeId>> {
        self.levels
    }
}

/// Partition `graph` into execution levels.
///
/// The connection validator keeps cycles out of the store, but a snapshot
/// can still be corrupt. Each round must place at least one node, so the
/// loop is capped at the node count; whatever is left over is on a cycle.
pub fn compute_levels(graph: &DagGraph) -> Result<Levels> {
    let mut remaining: HashMap<&str, usize> = graph
        .nodes()
        .map(|id| (id, graph.dependencies_of(id).len()))
        .collect();

    let mut levels: Vec<Vec<NodeId>> = Vec::new();
    let max_rounds = graph.len();

    for round in 0..max_rounds {
        if remaining.is_empty() {
            break;
        }

        // Keep graph order inside a level for deterministic dispatch.
        let ready: Vec<&str> = graph
            .nodes()
            .filter(|id| remaining.get(id) == Some(&0))
            .collect();

        if ready.is_empty() {
            break;
        }

        for id in &ready {
            remaining.remove(id);
            for dependent in graph.dependents_of(id) {
                if let Some(count) = remaining.get_mut(dependent.as_str()) {
                    *count = count.saturating_sub(1);
                }
            }
        }

        debug!(level = round, nodes = ?ready, "computed execution level");
        levels.push(ready.into_iter().map(str::to_string).collect());
    }

    if !remaining.is_empty() {
        let mut stuck: Vec<&str> = remaining.keys().copied().collect();
        stuck.sort();
        error!(nodes = ?stuck, "cycle detected while leveling graph");
        return Err(GraphError::CycleDetected(format!(
            "nodes left unscheduled after {} rounds: {}",
            max_rounds,
            stuck.join(", ")
        )));
    }

    Ok(Levels { levels })
}
