// src/graph/snapshot.rs

//! Immutable copy of the graph handed to the executor.

use std::collections::{BTreeMap, BTreeSet};

use crate::graph::model::{Edge, Node, NodeId};

/// Nodes and edges frozen at run start. Edits made to the store afterwards
/// are not visible through a snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphSnapshot {
    pub nodes: BTreeMap<NodeId, Node>,
    pub edges: Vec<Edge>,
}

impl GraphSnapshot {
    pub fn new(nodes: BTreeMap<NodeId, Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Edges terminating at `node`, in insertion order.
    pub fn edges_into<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.target.node == node)
    }

    /// Restrict the snapshot to `targets` and everything they depend on.
    ///
    /// Unknown target ids are ignored.
    pub fn upstream_closure<I, S>(&self, targets: I) -> GraphSnapshot
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keep: BTreeSet<NodeId> = BTreeSet::new();
        let mut stack: Vec<NodeId> = targets
            .into_iter()
            .filter(|t| self.nodes.contains_key(t.as_ref()))
            .map(|t| t.as_ref().to_string())
            .collect();

        while let Some(id) = stack.pop() {
            if !keep.insert(id.clone()) {
                continue;
            }
            for edge in self.edges_into(&id) {
                stack.push(edge.source.node.clone());
            }
        }

        let nodes = self
            .nodes
            .iter()
            .filter(|(id, _)| keep.contains(*id))
            .map(|(id, node)| (id.clone(), node.clone()))
            .collect();
        let edges = self
            .edges
            .iter()
            .filter(|e| keep.contains(&e.source.node) && keep.contains(&e.target.node))
            .cloned()
            .collect();

        GraphSnapshot { nodes, edges }
    }
}
