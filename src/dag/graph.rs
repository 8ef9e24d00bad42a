// src/dag/graph.rs

use std::collections::HashMap;

use crate::errors::{GraphError, Result};
use crate::graph::model::NodeId;
use crate::graph::snapshot::GraphSnapshot;

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone, Default)]
struct DagNode {
    /// Nodes supplying at least one of this node's input ports.
    deps: Vec<NodeId>,
    /// Nodes consuming at least one of this node's outputs.
    dependents: Vec<NodeId>,
}

/// Node-level adjacency derived from a snapshot's port-level edges.
///
/// Several edges between the same pair of nodes collapse into one
/// dependency. Node iteration follows the snapshot's (sorted) id order.
#[derive(Debug, Clone)]
pub struct DagGraph {
    order: Vec<NodeId>,
    nodes: HashMap<NodeId, DagNode>,
}

impl DagGraph {
    /// Build the adjacency for `snapshot`.
    ///
    /// An edge that names a node missing from the snapshot means the snapshot
    /// was assembled wrongly; that is reported instead of silently dropped.
    pub fn from_snapshot(snapshot: &GraphSnapshot) -> Result<Self> {
        let order: Vec<NodeId> = snapshot.nodes.keys().cloned().collect();
        let mut nodes: HashMap<NodeId, DagNode> = order
            .iter()
            .map(|id| (id.clone(), DagNode::default()))
            .collect();

        for edge in &snapshot.edges {
            for end in [&edge.source.node, &edge.target.node] {
                if !nodes.contains_key(end) {
                    return Err(GraphError::CorruptSnapshot(format!(
                        "edge '{}' references missing node '{}'",
                        edge.id, end
                    )));
                }
            }

            let source = edge.source.node.clone();
            let target = edge.target.node.clone();

            if let Some(node) = nodes.get_mut(&target) {
                if !node.deps.contains(&source) {
                    node.deps.push(source.clone());
                }
            }
            if let Some(node) = nodes.get_mut(&source) {
                if !node.dependents.contains(&target) {
                    node.dependents.push(target);
                }
            }
        }

        Ok(Self { order, nodes })
    }

    /// Return all node ids.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Immediate dependencies of a node.
    pub fn dependencies_of(&self, id: &str) -> &[NodeId] {
        self.nodes
            .get(id)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a node.
    pub fn dependents_of(&self, id: &str) -> &[NodeId] {
        self.nodes
            .get(id)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }
}
