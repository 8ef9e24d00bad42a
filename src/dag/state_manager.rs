// src/dag/state_manager.rs

//! Per-run status bookkeeping on the executor side.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::dag::status::{NodeStatus, StatusTransitionError, validate_status_transition};
use crate::graph::model::NodeId;
use crate::graph::snapshot::GraphSnapshot;

/// Authoritative node statuses for one run.
///
/// Seeded from the snapshot; every change is checked against the node
/// state machine and an illegal change is returned as an error.
#[derive(Debug, Clone, Default)]
pub struct StateManager {
    statuses: HashMap<NodeId, NodeStatus>,
}

impl StateManager {
    pub fn from_snapshot(snapshot: &GraphSnapshot) -> Self {
        let statuses = snapshot
            .nodes
            .values()
            .map(|n| (n.id.clone(), n.status()))
            .collect();
        Self { statuses }
    }

    pub fn status_of(&self, node: &str) -> Option<NodeStatus> {
        self.statuses.get(node).copied()
    }

    /// Apply a single guarded transition.
    pub fn transition(&mut self, node: &str, to: NodeStatus) -> Result<(), StatusTransitionError> {
        let from = self.statuses.get(node).copied().unwrap_or_default();
        validate_status_transition(from, to).map_err(|e| e.for_node(node))?;
        debug!(node = %node, %from, %to, "node status transition");
        self.statuses.insert(node.to_string(), to);
        Ok(())
    }

    /// Check that `node` has a legal path to `queued` without moving it.
    pub fn check_requeue(&self, node: &str) -> Result<(), StatusTransitionError> {
        let from = self.statuses.get(node).copied().unwrap_or_default();
        if from.requeue_path().is_some() {
            return Ok(());
        }
        warn!(node = %node, %from, "cannot queue a node that is still running");
        Err(StatusTransitionError {
            from,
            to: NodeStatus::Queued,
            allowed: from.legal_next().to_vec(),
            node: Some(node.to_string()),
        })
    }

    /// Walk `node` to `queued` along the legal path for its current status.
    ///
    /// Returns the intermediate and final statuses that were applied.
    pub fn requeue(&mut self, node: &str) -> Result<Vec<NodeStatus>, StatusTransitionError> {
        self.check_requeue(node)?;
        let from = self.statuses.get(node).copied().unwrap_or_default();
        let path = from.requeue_path().unwrap_or(&[]);
        for step in path {
            self.transition(node, *step)?;
        }
        Ok(path.to_vec())
    }

    /// Nodes currently in `status`.
    pub fn nodes_in(&self, status: NodeStatus) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self
            .statuses
            .iter()
            .filter(|(_, s)| **s == status)
            .map(|(id, _)| id.clone())
            .collect();
        nodes.sort();
        nodes
    }
}
