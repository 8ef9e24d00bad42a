// src/graph/model.rs

//! Nodes, ports and edges as held by the graph store.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dag::status::{NodeStatus, StatusTransitionError, validate_status_transition};
use crate::graph::ids::port_id;
use crate::types::{Cardinality, DataType, NodeOutput, PortDirection, PortPosition};

/// Canonical identifier types used throughout the graph.
pub type NodeId = String;
pub type PortId = String;
pub type EdgeId = String;

/// Tag selecting a node's execution behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    Text,
    Image,
    Video,
    Audio,
    Upload,
    Transform,
    Combine,
    Output,
    /// A kind this engine has no handler for; executed as a passthrough.
    Other(String),
}

impl NodeKind {
    pub fn as_str(&self) -> &str {
        match self {
            NodeKind::Text => "text",
            NodeKind::Image => "image",
            NodeKind::Video => "video",
            NodeKind::Audio => "audio",
            NodeKind::Upload => "upload",
            NodeKind::Transform => "transform",
            NodeKind::Combine => "combine",
            NodeKind::Output => "output",
            NodeKind::Other(name) => name.as_str(),
        }
    }
}

impl From<String> for NodeKind {
    fn from(raw: String) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "text" => NodeKind::Text,
            "image" => NodeKind::Image,
            "video" => NodeKind::Video,
            "audio" => NodeKind::Audio,
            "upload" => NodeKind::Upload,
            "transform" => NodeKind::Transform,
            "combine" => NodeKind::Combine,
            "output" => NodeKind::Output,
            _ => NodeKind::Other(raw),
        }
    }
}

impl From<&str> for NodeKind {
    fn from(raw: &str) -> Self {
        NodeKind::from(raw.to_string())
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for the text generation step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextParams {
    pub prompt: String,
    pub model: Option<String>,
    pub system: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageParams {
    pub prompt: String,
    pub model: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoParams {
    pub prompt: String,
    pub model: Option<String>,
    pub duration_secs: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioParams {
    pub prompt: String,
    pub model: Option<String>,
    pub voice: Option<String>,
}

/// An asset supplied from outside the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadParams {
    /// Location of the uploaded asset.
    pub source: String,
    #[serde(default)]
    pub media_type: Option<DataType>,
}

/// Operation applied by a transform node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformOp {
    #[default]
    Identity,
    Uppercase,
    Lowercase,
    Trim,
    /// Substitute `{input}` in `template`.
    Template,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformParams {
    pub operation: TransformOp,
    pub template: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombineParams {
    pub separator: String,
}

impl Default for CombineParams {
    fn default() -> Self {
        Self {
            separator: "\n".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputParams {
    pub format: Option<String>,
}

/// Kind-specific parameters, parsed once when a node enters the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NodeParams {
    Text(TextParams),
    Image(ImageParams),
    Video(VideoParams),
    Audio(AudioParams),
    Upload(UploadParams),
    Transform(TransformParams),
    Combine(CombineParams),
    Output(OutputParams),
    /// Raw fields of a kind without a typed parameter set.
    Unknown(serde_json::Map<String, Value>),
}

impl NodeParams {
    /// Parse a raw parameter bag for `kind`.
    ///
    /// `null` is treated as an empty object so kinds whose fields all have
    /// defaults can be created without parameters.
    pub fn parse(kind: &NodeKind, raw: Value) -> Result<Self, serde_json::Error> {
        let raw = if raw.is_null() {
            Value::Object(Default::default())
        } else {
            raw
        };

        let params = match kind {
            NodeKind::Text => NodeParams::Text(serde_json::from_value(raw)?),
            NodeKind::Image => NodeParams::Image(serde_json::from_value(raw)?),
            NodeKind::Video => NodeParams::Video(serde_json::from_value(raw)?),
            NodeKind::Audio => NodeParams::Audio(serde_json::from_value(raw)?),
            NodeKind::Upload => NodeParams::Upload(serde_json::from_value(raw)?),
            NodeKind::Transform => NodeParams::Transform(serde_json::from_value(raw)?),
            NodeKind::Combine => NodeParams::Combine(serde_json::from_value(raw)?),
            NodeKind::Output => NodeParams::Output(serde_json::from_value(raw)?),
            NodeKind::Other(_) => NodeParams::Unknown(serde_json::from_value(raw)?),
        };

        Ok(params)
    }

    /// Whether these params belong to `kind`.
    pub fn matches_kind(&self, kind: &NodeKind) -> bool {
        matches!(
            (self, kind),
            (NodeParams::Text(_), NodeKind::Text)
                | (NodeParams::Image(_), NodeKind::Image)
                | (NodeParams::Video(_), NodeKind::Video)
                | (NodeParams::Audio(_), NodeKind::Audio)
                | (NodeParams::Upload(_), NodeKind::Upload)
                | (NodeParams::Transform(_), NodeKind::Transform)
                | (NodeParams::Combine(_), NodeKind::Combine)
                | (NodeParams::Output(_), NodeKind::Output)
                | (NodeParams::Unknown(_), NodeKind::Other(_))
        )
    }

    /// Prompt text for the generation kinds.
    pub fn prompt(&self) -> Option<&str> {
        match self {
            NodeParams::Text(p) => Some(&p.prompt),
            NodeParams::Image(p) => Some(&p.prompt),
            NodeParams::Video(p) => Some(&p.prompt),
            NodeParams::Audio(p) => Some(&p.prompt),
            _ => None,
        }
    }
}

/// Typed attachment point on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub id: PortId,
    pub name: String,
    pub datatype: DataType,
    pub cardinality: Cardinality,
    #[serde(default)]
    pub position: PortPosition,
}

/// Static description of a port before it is bound to a node id.
#[derive(Debug, Clone, Copy)]
pub struct PortTemplate {
    pub name: &'static str,
    pub datatype: DataType,
    pub cardinality: Cardinality,
}

const fn port(name: &'static str, datatype: DataType, cardinality: Cardinality) -> PortTemplate {
    PortTemplate {
        name,
        datatype,
        cardinality,
    }
}

/// Input and output port templates allocated for each kind.
pub fn port_templates(kind: &NodeKind) -> (Vec<PortTemplate>, Vec<PortTemplate>) {
    use Cardinality::{Many, One};
    use DataType::*;

    match kind {
        NodeKind::Text => (
            vec![port("prompt", Text, Many), port("context", Any, Many)],
            vec![port("text", Text, Many)],
        ),
        NodeKind::Image => (
            vec![port("prompt", Text, One), port("reference", Image, Many)],
            vec![port("image", Image, Many)],
        ),
        NodeKind::Video => (
            vec![port("prompt", Text, One), port("frames", Image, Many)],
            vec![port("video", Video, Many)],
        ),
        NodeKind::Audio => (
            vec![port("prompt", Text, One)],
            vec![port("audio", Audio, Many)],
        ),
        NodeKind::Upload => (Vec::new(), vec![port("file", Any, Many)]),
        NodeKind::Transform => (
            vec![port("input", Any, One)],
            vec![port("output", Any, Many)],
        ),
        NodeKind::Combine => (
            vec![port("inputs", Any, Many)],
            vec![port("combined", Text, Many)],
        ),
        NodeKind::Output => (vec![port("result", Any, Many)], Vec::new()),
        NodeKind::Other(_) => (
            vec![port("input", Any, Many)],
            vec![port("output", Any, Many)],
        ),
    }
}

/// Canvas position of a node. Layout only.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A processing step in the graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub label: String,
    pub params: NodeParams,
    /// Values configured directly on input ports, keyed by port name.
    pub manual_inputs: BTreeMap<String, Value>,
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
    status: NodeStatus,
    pub progress: Option<u8>,
    pub output: Option<NodeOutput>,
    pub error: Option<String>,
    pub position: Position,
}

impl Node {
    /// Create a node and allocate its ports from the kind's templates.
    ///
    /// Port ids are derived from `id`, so they stay stable for the node's
    /// lifetime and can be traced to their owner.
    pub fn new(id: impl Into<NodeId>, kind: NodeKind, label: impl Into<String>, params: NodeParams) -> Self {
        let id = id.into();
        let (input_templates, output_templates) = port_templates(&kind);

        let bind = |templates: Vec<PortTemplate>, direction: PortDirection| -> Vec<Port> {
            let position = match direction {
                PortDirection::Input => PortPosition::Left,
                PortDirection::Output => PortPosition::Right,
            };
            templates
                .into_iter()
                .map(|t| Port {
                    id: port_id(&id, direction, t.name),
                    name: t.name.to_string(),
                    datatype: t.datatype,
                    cardinality: t.cardinality,
                    position,
                })
                .collect()
        };

        let inputs = bind(input_templates, PortDirection::Input);
        let outputs = bind(output_templates, PortDirection::Output);

        Self {
            id,
            kind,
            label: label.into(),
            params,
            manual_inputs: BTreeMap::new(),
            inputs,
            outputs,
            status: NodeStatus::Idle,
            progress: None,
            output: None,
            error: None,
            position: Position::default(),
        }
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    /// Guarded status setter. Illegal transitions leave the node untouched.
    pub fn set_status(&mut self, to: NodeStatus) -> Result<(), StatusTransitionError> {
        validate_status_transition(self.status, to).map_err(|e| e.for_node(&self.id))?;
        self.status = to;
        Ok(())
    }

    pub fn input_port(&self, port_id: &str) -> Option<&Port> {
        self.inputs.iter().find(|p| p.id == port_id)
    }

    pub fn output_port(&self, port_id: &str) -> Option<&Port> {
        self.outputs.iter().find(|p| p.id == port_id)
    }

    /// Find a port by name or id in the given direction.
    pub fn find_port(&self, direction: PortDirection, name_or_id: &str) -> Option<&Port> {
        let ports = match direction {
            PortDirection::Input => &self.inputs,
            PortDirection::Output => &self.outputs,
        };
        ports
            .iter()
            .find(|p| p.id == name_or_id || p.name == name_or_id)
    }
}

/// One side of an edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint {
    pub node: NodeId,
    pub port: PortId,
}

impl Endpoint {
    pub fn new(node: impl Into<NodeId>, port: impl Into<PortId>) -> Self {
        Self {
            node: node.into(),
            port: port.into(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.node, self.port)
    }
}

/// Display state of an edge, derived from its source node's last run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeStatus {
    #[default]
    Idle,
    /// The source node is running.
    Flowing,
    /// The source node produced a value.
    Delivered,
    /// The source node failed or was skipped.
    Blocked,
}

/// Directed, typed connection from an output port to an input port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: Endpoint,
    pub target: Endpoint,
    /// Resolved type of the connection, for display and logging only.
    pub data_type: DataType,
    #[serde(default)]
    pub status: EdgeStatus,
}
