// src/config/model.rs

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::engine::executor::{DEFAULT_EVENT_BUFFER, ExecutorOptions};
use crate::graph::model::Position;

/// Workflow file as read from TOML (or JSON), before validation.
///
/// ```toml
/// [config]
/// project = "storyboard"
/// node_timeout_secs = 30
///
/// [node.idea]
/// kind = "text"
/// params = { prompt = "a lighthouse at dusk" }
///
/// [node.poster]
/// kind = "image"
///
/// [[edge]]
/// from = "idea.text"
/// to = "poster.prompt"
/// ```
///
/// All sections are optional at this level; [`WorkflowFile`] enforces the
/// invariants.
#[derive(Debug, Clone, Deserialize)]
pub struct RawWorkflowFile {
    #[serde(default)]
    pub config: ConfigSection,

    /// Nodes keyed by their id in the file.
    #[serde(default)]
    pub node: BTreeMap<String, NodeSpec>,

    #[serde(default)]
    pub edge: Vec<EdgeSpec>,
}

/// A validated workflow.
///
/// Only constructed through `TryFrom<RawWorkflowFile>` (see
/// `validate.rs`) or [`WorkflowFile::new_unchecked`].
#[derive(Debug, Clone)]
pub struct WorkflowFile {
    pub config: ConfigSection,
    pub node: BTreeMap<String, NodeSpec>,
    pub edge: Vec<EdgeSpec>,
}

impl WorkflowFile {
    /// Assemble a workflow without running validation.
    pub fn new_unchecked(
        config: ConfigSection,
        node: BTreeMap<String, NodeSpec>,
        edge: Vec<EdgeSpec>,
    ) -> Self {
        Self { config, node, edge }
    }
}

/// `[config]` section: engine options.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConfigSection {
    /// Scope label attached to runs.
    #[serde(default)]
    pub project: Option<String>,

    /// Per-node time limit; unset means no limit.
    #[serde(default)]
    pub node_timeout_secs: Option<u64>,

    /// Capacity of the run event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_event_buffer() -> usize {
    DEFAULT_EVENT_BUFFER
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            project: None,
            node_timeout_secs: None,
            event_buffer: default_event_buffer(),
        }
    }
}

impl ConfigSection {
    pub fn executor_options(&self) -> ExecutorOptions {
        ExecutorOptions {
            project: self.project.clone(),
            node_timeout: self.node_timeout_secs.map(Duration::from_secs),
            event_buffer: self.event_buffer,
        }
    }
}

/// `[node.<id>]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NodeSpec {
    /// Node kind, e.g. `"text"` or `"transform"`. Unknown kinds are allowed.
    pub kind: String,

    /// Display label; defaults to the node's id in the file.
    #[serde(default)]
    pub label: Option<String>,

    /// Kind-specific parameters.
    #[serde(default)]
    pub params: Value,

    /// Manual values for input ports, keyed by port name.
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,

    #[serde(default)]
    pub position: Option<Position>,
}

/// `[[edge]]` entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EdgeSpec {
    pub from: PortRef,
    pub to: PortRef,
}

/// Reference to a node's port, written either as `"node.port"` or as
/// `{ node = "...", port = "..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "PortRefRepr")]
pub struct PortRef {
    pub node: String,
    pub port: String,
}

impl PortRef {
    pub fn new(node: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            port: port.into(),
        }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.port)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PortRefRepr {
    Dotted(String),
    Table { node: String, port: String },
}

impl TryFrom<PortRefRepr> for PortRef {
    type Error = String;

    fn try_from(repr: PortRefRepr) -> Result<Self, Self::Error> {
        match repr {
            PortRefRepr::Table { node, port } => Ok(PortRef { node, port }),
            PortRefRepr::Dotted(raw) => match raw.rsplit_once('.') {
                Some((node, port)) if !node.is_empty() && !port.is_empty() => {
                    Ok(PortRef::new(node, port))
                }
                _ => Err(format!("expected \"<node>.<port>\", got \"{raw}\"")),
            },
        }
    }
}
