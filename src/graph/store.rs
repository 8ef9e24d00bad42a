// src/graph/store.rs

//! In-memory graph store.
//!
//! The store owns every node and edge. Edge mutations always go through the
//! [`ConnectionValidator`]; a rejected mutation leaves the store untouched.
//! Node removal cascades to every edge touching the node, so no edge can
//! outlive either of its endpoints.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::model::WorkflowFile;
use crate::dag::status::NodeStatus;
use crate::engine::events::{NodeRunStatus, RunEvent};
use crate::errors::{GraphError, Result};
use crate::graph::ids::{new_node_id, normalize_node_id, parse_port_id};
use crate::graph::model::{
    Edge, EdgeId, EdgeStatus, Node, NodeId, NodeKind, NodeParams, Position,
};
use crate::graph::snapshot::GraphSnapshot;
use crate::graph::validate::{
    BatchValidation, ConnectionError, ConnectionRequest, ConnectionValidator, PortSuggestion,
    ValidationResult, edge_from_request,
};
use crate::types::PortDirection;

/// Partial update applied by [`GraphStore::update_node`].
#[derive(Debug, Clone, Default)]
pub struct NodeUpdate {
    pub label: Option<String>,
    /// Raw params; parsed against the node's kind.
    pub params: Option<Value>,
    pub position: Option<Position>,
    /// Manual input values to set (`Some`) or clear (`None`), by port name.
    pub manual_inputs: BTreeMap<String, Option<Value>>,
}

impl NodeUpdate {
    /// Whether the update changes what the node would produce.
    fn affects_output(&self) -> bool {
        self.params.is_some() || !self.manual_inputs.is_empty()
    }
}

/// Summary of a bulk workflow load.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// External id → canonical node id.
    pub id_map: BTreeMap<String, NodeId>,
    pub edges_added: Vec<EdgeId>,
    pub rejected: Vec<(ConnectionRequest, ConnectionError)>,
}

/// Owns the node and edge collections of one graph.
#[derive(Debug, Clone, Default)]
pub struct GraphStore {
    nodes: BTreeMap<NodeId, Node>,
    edges: Vec<Edge>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Read-only validator over the current contents.
    pub fn validator(&self) -> ConnectionValidator<'_> {
        ConnectionValidator::new(&self.nodes, &self.edges)
    }

    /// Freeze the current contents for a run.
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot::new(self.nodes.clone(), self.edges.clone())
    }

    /// Create a node of `kind` with a fresh id and add it to the store.
    pub fn create_node(&mut self, kind: NodeKind, label: &str, params: Value) -> Result<NodeId> {
        let id = new_node_id();
        let params = parse_params(&id, &kind, params)?;
        let node = Node::new(id.clone(), kind, label, params);
        self.add_node(node)?;
        Ok(id)
    }

    /// Add a fully built node.
    pub fn add_node(&mut self, node: Node) -> Result<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(GraphError::DuplicateNode(node.id));
        }
        if !node.params.matches_kind(&node.kind) {
            return Err(GraphError::InvalidParams {
                node: node.id.clone(),
                message: format!("params do not belong to kind '{}'", node.kind),
            });
        }
        ensure_unique_ports(&node)?;

        info!(node = %node.id, kind = %node.kind, label = %node.label, "node added");
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Update label, params, position or manual inputs of a node.
    ///
    /// Changing params or manual inputs makes the node's last result (and
    /// that of everything downstream) stale: finished nodes become `dirty`.
    pub fn update_node(&mut self, id: &str, update: NodeUpdate) -> Result<()> {
        let node = self
            .nodes
            .get(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;

        // Parse before touching anything so a bad update is a no-op.
        let params = match &update.params {
            Some(raw) => Some(parse_params(id, &node.kind, raw.clone())?),
            None => None,
        };
        if let Some(port) = update
            .manual_inputs
            .keys()
            .find(|name| node.find_port(PortDirection::Input, name).is_none())
        {
            return Err(GraphError::InvalidParams {
                node: id.to_string(),
                message: format!("no input port named '{port}' for a manual value"),
            });
        }

        let affects_output = update.affects_output();
        if let Some(node) = self.nodes.get_mut(id) {
            if let Some(label) = update.label {
                node.label = label;
            }
            if let Some(params) = params {
                node.params = params;
            }
            if let Some(position) = update.position {
                node.position = position;
            }
            for (name, value) in update.manual_inputs {
                match value {
                    Some(v) => node.manual_inputs.insert(name, v),
                    None => node.manual_inputs.remove(&name),
                };
            }
        }

        if affects_output {
            self.invalidate_downstream(id)?;
        }

        debug!(node = %id, "node updated");
        Ok(())
    }

    /// Mark `id` and every finished node downstream of it as `dirty`.
    fn invalidate_downstream(&mut self, id: &str) -> Result<()> {
        let mut stack = vec![id.to_string()];
        let mut seen = BTreeSet::new();

        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get_mut(&current) {
                if matches!(node.status(), NodeStatus::Succeeded | NodeStatus::Failed) {
                    node.set_status(NodeStatus::Dirty)?;
                    debug!(node = %current, "node invalidated");
                }
            }
            stack.extend(
                self.edges
                    .iter()
                    .filter(|e| e.source.node == current)
                    .map(|e| e.target.node.clone()),
            );
        }
        Ok(())
    }

    /// Remove a node and every edge touching it.
    pub fn remove_node(&mut self, id: &str) -> Result<Node> {
        let node = self
            .nodes
            .remove(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;

        let before = self.edges.len();
        self.edges
            .retain(|e| e.source.node != id && e.target.node != id);
        let removed = before - self.edges.len();

        info!(node = %id, removed_edges = removed, "node removed");
        Ok(node)
    }

    /// Guarded status change on a stored node.
    pub fn set_node_status(&mut self, id: &str, status: NodeStatus) -> Result<()> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;
        node.set_status(status)?;
        Ok(())
    }

    /// Run the validator without mutating anything.
    pub fn validate_connection(&self, request: &ConnectionRequest) -> ValidationResult {
        self.validator().validate(request)
    }

    /// Validate and add an edge.
    pub fn add_edge(&mut self, request: ConnectionRequest) -> Result<EdgeId> {
        let verdict = self.validator().validate(&request).into_result()?;
        for warning in &verdict.warnings {
            warn!(
                source = %request.source_node,
                target = %request.target_node,
                "{warning}"
            );
        }

        let edge = edge_from_request(&request, verdict.data_type);
        let id = edge.id.clone();
        info!(
            edge = %id,
            source = %edge.source,
            target = %edge.target,
            data_type = %edge.data_type,
            "edge added"
        );
        self.edges.push(edge);
        Ok(id)
    }

    /// Add an edge addressing ports by name instead of id.
    pub fn connect(
        &mut self,
        source_node: &str,
        source_port: &str,
        target_node: &str,
        target_port: &str,
    ) -> Result<EdgeId> {
        let request = self.resolve_request(source_node, source_port, target_node, target_port);
        self.add_edge(request)
    }

    /// Validate a batch and add every accepted edge.
    pub fn add_edges(&mut self, requests: &[ConnectionRequest]) -> BatchValidation {
        let batch = self.validator().validate_batch(requests);
        self.edges.extend(batch.accepted.iter().cloned());
        batch
    }

    pub fn remove_edge(&mut self, id: &str) -> Result<Edge> {
        let index = self
            .edges
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| GraphError::EdgeNotFound(id.to_string()))?;
        let edge = self.edges.remove(index);
        debug!(edge = %id, "edge removed");
        Ok(edge)
    }

    /// Remove every node and edge.
    pub fn clear(&mut self) {
        info!(
            nodes = self.nodes.len(),
            edges = self.edges.len(),
            "clearing graph"
        );
        self.nodes.clear();
        self.edges.clear();
    }

    pub fn can_connect(&self, source_node: &str, target_node: &str) -> bool {
        self.validator().can_connect(source_node, target_node)
    }

    pub fn compatible_ports(&self, source_node: &str, source_port: &str) -> Vec<PortSuggestion> {
        self.validator().compatible_ports(source_node, source_port)
    }

    /// Bulk-load a workflow on top of the current contents.
    ///
    /// External node ids are normalized into the canonical format. Nodes are
    /// added all-or-nothing; edges go through the batch validator and
    /// rejected ones are reported rather than failing the load.
    pub fn load_workflow(&mut self, workflow: &WorkflowFile) -> Result<LoadReport> {
        let mut report = LoadReport::default();
        let mut staged: Vec<Node> = Vec::new();

        for (external_id, spec) in workflow.node.iter() {
            let id = normalize_node_id(external_id);
            if self.nodes.contains_key(&id) || report.id_map.values().any(|v| *v == id) {
                return Err(GraphError::DuplicateNode(id));
            }

            let kind = NodeKind::from(spec.kind.clone());
            let params = parse_params(&id, &kind, spec.params.clone())?;
            let label = spec.label.clone().unwrap_or_else(|| external_id.clone());
            let mut node = Node::new(id.clone(), kind, label, params);
            node.position = spec.position.unwrap_or_default();

            for (port, value) in &spec.inputs {
                if node.find_port(PortDirection::Input, port).is_none() {
                    return Err(GraphError::InvalidParams {
                        node: external_id.clone(),
                        message: format!("no input port named '{port}' for a manual value"),
                    });
                }
                node.manual_inputs.insert(port.clone(), value.clone());
            }

            ensure_unique_ports(&node)?;
            report.id_map.insert(external_id.clone(), id);
            staged.push(node);
        }

        for node in staged {
            self.nodes.insert(node.id.clone(), node);
        }

        let requests: Vec<ConnectionRequest> = workflow
            .edge
            .iter()
            .map(|spec| {
                let source = resolve_external(&report.id_map, &spec.from.node);
                let target = resolve_external(&report.id_map, &spec.to.node);
                self.resolve_request(&source, &spec.from.port, &target, &spec.to.port)
            })
            .collect();

        let batch = self.add_edges(&requests);
        report.edges_added = batch.accepted.iter().map(|e| e.id.clone()).collect();
        for (request, err) in &batch.rejected {
            warn!(
                source = %request.source_node,
                target = %request.target_node,
                error = %err,
                "workflow edge rejected"
            );
        }
        report.rejected = batch.rejected;

        info!(
            nodes = report.id_map.len(),
            edges = report.edges_added.len(),
            rejected = report.rejected.len(),
            "workflow loaded"
        );
        Ok(report)
    }

    /// Build a request from node ids and port names or ids.
    ///
    /// Unknown ports are passed through as given so the validator can report
    /// them (with a suggestion).
    fn resolve_request(
        &self,
        source_node: &str,
        source_port: &str,
        target_node: &str,
        target_port: &str,
    ) -> ConnectionRequest {
        let resolve = |node: &str, direction: PortDirection, port: &str| -> String {
            // Accept derived ids from other graphs, e.g. `gen1:out:text`.
            let port_name = match parse_port_id(port) {
                Some((_, d, name)) if d == direction => name,
                _ => port,
            };
            self.nodes
                .get(node)
                .and_then(|n| n.find_port(direction, port_name))
                .map(|p| p.id.clone())
                .unwrap_or_else(|| port.to_string())
        };

        ConnectionRequest {
            source_node: source_node.to_string(),
            source_port: Some(resolve(source_node, PortDirection::Output, source_port))
                .filter(|p| !p.is_empty()),
            target_node: target_node.to_string(),
            target_port: Some(resolve(target_node, PortDirection::Input, target_port))
                .filter(|p| !p.is_empty()),
        }
    }

    /// Write a run event back onto the stored node it concerns.
    ///
    /// Nodes removed while the run was in flight are skipped with a warning.
    pub fn apply_event(&mut self, event: &RunEvent) -> Result<()> {
        match event {
            RunEvent::NodeStatus(ev) => {
                let Some(node) = self.nodes.get_mut(&ev.node_id) else {
                    warn!(node = %ev.node_id, "status for node no longer in graph; ignoring");
                    return Ok(());
                };

                match ev.status {
                    NodeRunStatus::Queued => {
                        let path = node.status().requeue_path().unwrap_or(&[]);
                        for step in path {
                            node.set_status(*step)?;
                        }
                        node.progress = None;
                        node.error = None;
                    }
                    NodeRunStatus::Running => {
                        node.set_status(NodeStatus::Running)?;
                        node.progress = Some(0);
                    }
                    NodeRunStatus::Succeeded => {
                        node.set_status(NodeStatus::Succeeded)?;
                        node.progress = Some(100);
                        node.output = ev.output.clone();
                        node.error = None;
                    }
                    NodeRunStatus::Failed => {
                        node.set_status(NodeStatus::Failed)?;
                        node.error = ev.error.clone();
                    }
                    NodeRunStatus::Skipped | NodeRunStatus::Canceled => {
                        node.set_status(NodeStatus::Canceled)?;
                        node.error = ev.error.clone();
                    }
                }

                let edge_status = match ev.status {
                    NodeRunStatus::Queued => EdgeStatus::Idle,
                    NodeRunStatus::Running => EdgeStatus::Flowing,
                    NodeRunStatus::Succeeded => EdgeStatus::Delivered,
                    NodeRunStatus::Failed | NodeRunStatus::Skipped | NodeRunStatus::Canceled => {
                        EdgeStatus::Blocked
                    }
                };
                for edge in self
                    .edges
                    .iter_mut()
                    .filter(|e| e.source.node == ev.node_id)
                {
                    edge.status = edge_status;
                }
            }
            RunEvent::NodeProgress(ev) => {
                if let Some(node) = self.nodes.get_mut(&ev.node_id) {
                    node.progress = Some(ev.progress.min(100));
                }
            }
            RunEvent::Meta(_) | RunEvent::Complete(_) | RunEvent::Error(_) => {}
        }
        Ok(())
    }
}

fn parse_params(node: &str, kind: &NodeKind, raw: Value) -> Result<NodeParams> {
    NodeParams::parse(kind, raw).map_err(|e| GraphError::InvalidParams {
        node: node.to_string(),
        message: e.to_string(),
    })
}

fn resolve_external(id_map: &BTreeMap<String, NodeId>, node: &str) -> NodeId {
    id_map
        .get(node)
        .cloned()
        .unwrap_or_else(|| normalize_node_id(node))
}

fn ensure_unique_ports(node: &Node) -> Result<()> {
    for ports in [&node.inputs, &node.outputs] {
        let mut seen = BTreeSet::new();
        for port in ports {
            if !seen.insert(port.id.as_str()) {
                return Err(GraphError::InvalidParams {
                    node: node.id.clone(),
                    message: format!("duplicate port id '{}'", port.id),
                });
            }
        }
    }
    Ok(())
}
