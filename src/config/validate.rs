// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{RawWorkflowFile, WorkflowFile};
use crate::errors::{GraphError, Result};

impl TryFrom<RawWorkflowFile> for WorkflowFile {
    type Error = GraphError;

    fn try_from(raw: RawWorkflowFile) -> std::result::Result<Self, Self::Error> {
        validate_workflow(&raw)?;
        Ok(WorkflowFile::new_unchecked(raw.config, raw.node, raw.edge))
    }
}

/// Run every file-level check on a raw workflow.
///
/// Port names and type compatibility are not checked here; the graph
/// store's connection validator does that when the workflow is loaded.
pub fn validate_workflow(raw: &RawWorkflowFile) -> Result<()> {
    ensure_has_nodes(raw)?;
    validate_global_config(raw)?;
    validate_nodes(raw)?;
    validate_edge_references(raw)?;
    validate_dag(raw)?;
    Ok(())
}

fn ensure_has_nodes(raw: &RawWorkflowFile) -> Result<()> {
    if raw.node.is_empty() {
        return Err(GraphError::ConfigError(
            "workflow must contain at least one [node.<id>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(raw: &RawWorkflowFile) -> Result<()> {
    if raw.config.event_buffer == 0 {
        return Err(GraphError::ConfigError(
            "[config].event_buffer must be >= 1 (got 0)".to_string(),
        ));
    }
    if raw.config.node_timeout_secs == Some(0) {
        return Err(GraphError::ConfigError(
            "[config].node_timeout_secs must be >= 1 when set".to_string(),
        ));
    }
    Ok(())
}

fn validate_nodes(raw: &RawWorkflowFile) -> Result<()> {
    for (id, node) in raw.node.iter() {
        if node.kind.trim().is_empty() {
            return Err(GraphError::ConfigError(format!(
                "node '{id}' has an empty `kind`"
            )));
        }
    }
    Ok(())
}

fn validate_edge_references(raw: &RawWorkflowFile) -> Result<()> {
    for (index, edge) in raw.edge.iter().enumerate() {
        for end in [&edge.from, &edge.to] {
            if !raw.node.contains_key(&end.node) {
                return Err(GraphError::ConfigError(format!(
                    "edge #{index} ({} -> {}) references unknown node '{}'",
                    edge.from, edge.to, end.node
                )));
            }
        }
        if edge.from.node == edge.to.node {
            return Err(GraphError::ConfigError(format!(
                "edge #{index} connects node '{}' to itself",
                edge.from.node
            )));
        }
    }
    Ok(())
}

fn validate_dag(raw: &RawWorkflowFile) -> Result<()> {
    // Edge direction follows data flow: from -> to.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for id in raw.node.keys() {
        graph.add_node(id.as_str());
    }
    for edge in raw.edge.iter() {
        graph.add_edge(edge.from.node.as_str(), edge.to.node.as_str(), ());
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(GraphError::CycleDetected(format!(
            "cycle detected in workflow involving node '{}'",
            cycle.node_id()
        ))),
    }
}
