// src/graph/validate.rs

//! Connection validation.
//!
//! Every edge that enters the graph store passes through
//! [`ConnectionValidator::validate`]. The validator is pure: it reads a node
//! map and an edge list and never mutates either.
//!
//! Checks run in a fixed order and the first failure wins:
//! 1. both port ids present
//! 2. no self-connection
//! 3. both nodes exist
//! 4. both ports exist on the right side (with a suggested fallback)
//! 5. type compatibility
//! 6. source cardinality
//! 7. target cardinality
//! 8. duplicate edge
//! 9. cycle detection

use std::collections::BTreeMap;
use std::fmt;

use petgraph::algo::astar;
use petgraph::graphmap::DiGraphMap;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace};

use crate::graph::ids::new_edge_id;
use crate::graph::model::{Edge, EdgeStatus, Endpoint, Node, NodeId, Port, PortId};
use crate::types::{
    Cardinality, CompatibilityReason, DataType, PortDirection, compatibility_reason,
};

/// Which end of a prospective edge an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum End {
    Source,
    Target,
}

impl fmt::Display for End {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            End::Source => f.write_str("source"),
            End::Target => f.write_str("target"),
        }
    }
}

/// Why a prospective edge was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConnectionError {
    #[error("{end} port id is missing")]
    MissingPortId { end: End },

    #[error("cannot connect node '{node}' to itself")]
    SelfConnection { node: NodeId },

    #[error("{end} node '{node}' does not exist")]
    NodeNotFound { end: End, node: NodeId },

    #[error("{end} port '{port}' not found on node '{node}'{}", suggestion(.suggested))]
    PortNotFound {
        end: End,
        node: NodeId,
        port: PortId,
        suggested: Option<PortId>,
    },

    #[error("type mismatch: {source_type} output cannot feed {target_type} input")]
    IncompatibleTypes {
        source_type: DataType,
        target_type: DataType,
    },

    #[error("source port {endpoint} has cardinality 1 and is already connected")]
    SourcePortOccupied { endpoint: Endpoint },

    #[error("target port {endpoint} has cardinality 1 and is already connected")]
    TargetPortOccupied { endpoint: Endpoint },

    #[error("edge {source_end} -> {target_end} already exists")]
    DuplicateEdge {
        source_end: Endpoint,
        target_end: Endpoint,
    },

    #[error("adding this edge would create a cycle: {}", .path.join(" -> "))]
    Cycle { path: Vec<NodeId> },
}

fn suggestion(suggested: &Option<PortId>) -> String {
    match suggested {
        Some(port) => format!(" (did you mean '{port}'?)"),
        None => String::new(),
    }
}

/// An edge somebody would like to add.
///
/// Port ids are optional because callers (drag handles, pasted workflows)
/// may not have resolved them yet; a missing id is its own error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRequest {
    pub source_node: NodeId,
    pub source_port: Option<PortId>,
    pub target_node: NodeId,
    pub target_port: Option<PortId>,
}

impl ConnectionRequest {
    pub fn new(
        source_node: impl Into<NodeId>,
        source_port: impl Into<PortId>,
        target_node: impl Into<NodeId>,
        target_port: impl Into<PortId>,
    ) -> Self {
        Self {
            source_node: source_node.into(),
            source_port: Some(source_port.into()),
            target_node: target_node.into(),
            target_port: Some(target_port.into()),
        }
    }
}

/// Verdict of [`ConnectionValidator::validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub valid: bool,
    pub error: Option<ConnectionError>,
    pub warnings: Vec<String>,
    /// First port of the right direction when the requested one was missing.
    pub suggested_port: Option<PortId>,
    /// Resolved connection type when valid.
    pub data_type: Option<DataType>,
}

impl ValidationResult {
    fn reject(error: ConnectionError) -> Self {
        let suggested_port = match &error {
            ConnectionError::PortNotFound { suggested, .. } => suggested.clone(),
            _ => None,
        };
        Self {
            valid: false,
            error: Some(error),
            warnings: Vec::new(),
            suggested_port,
            data_type: None,
        }
    }

    pub fn into_result(self) -> Result<Self, ConnectionError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

/// Input port on another node that a given output could connect to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortSuggestion {
    pub node_id: NodeId,
    pub port: Port,
    pub reason: CompatibilityReason,
}

/// Outcome of validating a batch of edges.
#[derive(Debug, Clone, Default)]
pub struct BatchValidation {
    /// Edges that passed, in request order, with freshly allocated ids.
    pub accepted: Vec<Edge>,
    pub rejected: Vec<(ConnectionRequest, ConnectionError)>,
}

/// Read-only view over a node map and edge list.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionValidator<'a> {
    nodes: &'a BTreeMap<NodeId, Node>,
    edges: &'a [Edge],
}

impl<'a> ConnectionValidator<'a> {
    pub fn new(nodes: &'a BTreeMap<NodeId, Node>, edges: &'a [Edge]) -> Self {
        Self { nodes, edges }
    }

    /// Decide whether `request` may be added to the graph.
    pub fn validate(&self, request: &ConnectionRequest) -> ValidationResult {
        match self.check(request) {
            Ok((source, target)) => {
                let warnings = connection_warnings(source, target);
                ValidationResult {
                    valid: true,
                    error: None,
                    warnings,
                    suggested_port: None,
                    data_type: Some(resolved_type(source.datatype, target.datatype)),
                }
            }
            Err(err) => {
                debug!(
                    source = %request.source_node,
                    target = %request.target_node,
                    error = %err,
                    "connection rejected"
                );
                ValidationResult::reject(err)
            }
        }
    }

    fn check(&self, request: &ConnectionRequest) -> Result<(&'a Port, &'a Port), ConnectionError> {
        // 1. Port ids present.
        let source_port_id = present(&request.source_port)
            .ok_or(ConnectionError::MissingPortId { end: End::Source })?;
        let target_port_id = present(&request.target_port)
            .ok_or(ConnectionError::MissingPortId { end: End::Target })?;

        // 2. Self-connection.
        if request.source_node == request.target_node {
            return Err(ConnectionError::SelfConnection {
                node: request.source_node.clone(),
            });
        }

        // 3. Nodes exist.
        let source_node = self.nodes.get(&request.source_node).ok_or_else(|| {
            ConnectionError::NodeNotFound {
                end: End::Source,
                node: request.source_node.clone(),
            }
        })?;
        let target_node = self.nodes.get(&request.target_node).ok_or_else(|| {
            ConnectionError::NodeNotFound {
                end: End::Target,
                node: request.target_node.clone(),
            }
        })?;

        // 4. Ports exist on the right side.
        let source = source_node
            .output_port(source_port_id)
            .ok_or_else(|| ConnectionError::PortNotFound {
                end: End::Source,
                node: source_node.id.clone(),
                port: source_port_id.to_string(),
                suggested: source_node.outputs.first().map(|p| p.id.clone()),
            })?;
        let target = target_node
            .input_port(target_port_id)
            .ok_or_else(|| ConnectionError::PortNotFound {
                end: End::Target,
                node: target_node.id.clone(),
                port: target_port_id.to_string(),
                suggested: target_node.inputs.first().map(|p| p.id.clone()),
            })?;

        // 5. Types.
        if compatibility_reason(source.datatype, target.datatype).is_none() {
            return Err(ConnectionError::IncompatibleTypes {
                source_type: source.datatype,
                target_type: target.datatype,
            });
        }

        let source_end = Endpoint::new(&source_node.id, &source.id);
        let target_end = Endpoint::new(&target_node.id, &target.id);

        // 6. Source cardinality.
        if source.cardinality == Cardinality::One
            && self.edges.iter().any(|e| e.source == source_end)
        {
            return Err(ConnectionError::SourcePortOccupied {
                endpoint: source_end,
            });
        }

        // 7. Target cardinality.
        if target.cardinality == Cardinality::One
            && self.edges.iter().any(|e| e.target == target_end)
        {
            return Err(ConnectionError::TargetPortOccupied {
                endpoint: target_end,
            });
        }

        // 8. Duplicate.
        if self
            .edges
            .iter()
            .any(|e| e.source == source_end && e.target == target_end)
        {
            return Err(ConnectionError::DuplicateEdge {
                source_end,
                target_end,
            });
        }

        // 9. Cycle.
        if let Some(path) = self.cycle_path(&source_node.id, &target_node.id) {
            return Err(ConnectionError::Cycle { path });
        }

        trace!(
            source = %source_end,
            target = %target_end,
            "connection accepted"
        );

        Ok((source, target))
    }

    /// If `source` is already reachable from `target`, return the cycle that
    /// adding `source -> target` would close, starting and ending at `source`.
    pub fn cycle_path(&self, source: &str, target: &str) -> Option<Vec<NodeId>> {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        graph.add_node(source);
        graph.add_node(target);
        for edge in self.edges {
            graph.add_edge(edge.source.node.as_str(), edge.target.node.as_str(), ());
        }

        let (_cost, path) = astar(&graph, target, |n| n == source, |_| 1u32, |_| 0u32)?;

        let mut cycle = Vec::with_capacity(path.len() + 1);
        cycle.push(source.to_string());
        cycle.extend(path.into_iter().map(str::to_string));
        Some(cycle)
    }

    /// Validate a list of prospective edges without touching the graph.
    ///
    /// Each request is checked against the snapshot plus the edges accepted
    /// earlier in the same batch, so order matters for cardinality and
    /// duplicate outcomes.
    pub fn validate_batch(&self, requests: &[ConnectionRequest]) -> BatchValidation {
        let mut working: Vec<Edge> = self.edges.to_vec();
        let mut batch = BatchValidation::default();

        for request in requests {
            let verdict = ConnectionValidator::new(self.nodes, &working).validate(request);
            match verdict.into_result() {
                Ok(ok) => {
                    let edge = edge_from_request(request, ok.data_type);
                    working.push(edge.clone());
                    batch.accepted.push(edge);
                }
                Err(err) => batch.rejected.push((request.clone(), err)),
            }
        }

        debug!(
            accepted = batch.accepted.len(),
            rejected = batch.rejected.len(),
            "validated edge batch"
        );
        batch
    }

    /// Whether any output of `source_node` is type-compatible with any input
    /// of `target_node`. No cardinality or cycle checks.
    pub fn can_connect(&self, source_node: &str, target_node: &str) -> bool {
        if source_node == target_node {
            return false;
        }
        let (Some(source), Some(target)) =
            (self.nodes.get(source_node), self.nodes.get(target_node))
        else {
            return false;
        };

        source.outputs.iter().any(|out| {
            target
                .inputs
                .iter()
                .any(|inp| compatibility_reason(out.datatype, inp.datatype).is_some())
        })
    }

    /// Every input port on every other node that the given output could feed
    /// and that is not already taken by a cardinality-1 connection.
    pub fn compatible_ports(&self, source_node: &str, source_port: &str) -> Vec<PortSuggestion> {
        let Some(port) = self
            .nodes
            .get(source_node)
            .and_then(|n| n.find_port(PortDirection::Output, source_port))
        else {
            return Vec::new();
        };

        let mut suggestions = Vec::new();
        for node in self.nodes.values().filter(|n| n.id != source_node) {
            for input in &node.inputs {
                let Some(reason) = compatibility_reason(port.datatype, input.datatype) else {
                    continue;
                };
                let occupied = input.cardinality == Cardinality::One
                    && self
                        .edges
                        .iter()
                        .any(|e| e.target.node == node.id && e.target.port == input.id);
                if occupied {
                    continue;
                }
                suggestions.push(PortSuggestion {
                    node_id: node.id.clone(),
                    port: input.clone(),
                    reason,
                });
            }
        }
        suggestions
    }
}

fn present(port: &Option<PortId>) -> Option<&str> {
    port.as_deref().filter(|p| !p.trim().is_empty())
}

/// Connection type shown on the edge: the concrete side wins over `any`.
fn resolved_type(source: DataType, target: DataType) -> DataType {
    if source == DataType::Any { target } else { source }
}

fn connection_warnings(source: &Port, target: &Port) -> Vec<String> {
    let mut warnings = Vec::new();
    if source.datatype == DataType::Any || target.datatype == DataType::Any {
        if source.datatype != target.datatype {
            warnings.push(format!(
                "'{}' ({}) -> '{}' ({}): values pass through without a type check",
                source.name, source.datatype, target.name, target.datatype
            ));
        }
    } else if source.datatype == DataType::Text && target.datatype != DataType::Text {
        warnings.push(format!(
            "text output '{}' will be used as {} input '{}'",
            source.name, target.datatype, target.name
        ));
    }
    warnings
}

pub(crate) fn edge_from_request(request: &ConnectionRequest, data_type: Option<DataType>) -> Edge {
    Edge {
        id: new_edge_id(),
        source: Endpoint {
            node: request.source_node.clone(),
            port: request.source_port.clone().unwrap_or_default(),
        },
        target: Endpoint {
            node: request.target_node.clone(),
            port: request.target_port.clone().unwrap_or_default(),
        },
        data_type: data_type.unwrap_or(DataType::Any),
        status: EdgeStatus::Idle,
    }
}
