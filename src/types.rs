// src/types.rs

//! Value types exchanged between nodes and the compatibility relation that
//! decides which output may feed which input.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Closed set of value types a port can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Text,
    Image,
    Video,
    Audio,
    Tensor,
    Json,
    Any,
}

impl DataType {
    /// Every member of the closed type set, in declaration order.
    pub const ALL: [DataType; 7] = [
        DataType::Text,
        DataType::Image,
        DataType::Video,
        DataType::Audio,
        DataType::Tensor,
        DataType::Json,
        DataType::Any,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Text => "text",
            DataType::Image => "image",
            DataType::Video => "video",
            DataType::Audio => "audio",
            DataType::Tensor => "tensor",
            DataType::Json => "json",
            DataType::Any => "any",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(DataType::Text),
            "image" => Ok(DataType::Image),
            "video" => Ok(DataType::Video),
            "audio" => Ok(DataType::Audio),
            "tensor" => Ok(DataType::Tensor),
            "json" => Ok(DataType::Json),
            "any" => Ok(DataType::Any),
            other => Err(format!("invalid data type: {other}")),
        }
    }
}

/// How many edges a port may take part in.
///
/// Serialized as `"1"` / `"n"` to match existing workflow documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    #[serde(rename = "1")]
    One,
    #[serde(rename = "n")]
    Many,
}

impl Default for Cardinality {
    fn default() -> Self {
        Cardinality::Many
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cardinality::One => f.write_str("1"),
            Cardinality::Many => f.write_str("n"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    Input,
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::Input => f.write_str("input"),
            PortDirection::Output => f.write_str("output"),
        }
    }
}

/// Layout hint for where a port handle is drawn. Never a correctness input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortPosition {
    #[default]
    Left,
    Right,
    Top,
    Bottom,
}

/// Why a (source, target) type pair is compatible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompatibilityReason {
    /// Both ports carry the same type.
    ExactMatch,
    /// Text can be converted into any target type.
    TextUniversal,
    /// One side is `any`.
    AnyAcceptsAll,
}

impl fmt::Display for CompatibilityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompatibilityReason::ExactMatch => f.write_str("exact type match"),
            CompatibilityReason::TextUniversal => {
                f.write_str("text output can feed any input")
            }
            CompatibilityReason::AnyAcceptsAll => f.write_str("`any` accepts every type"),
        }
    }
}

/// Explain why `source` may feed `target`, or `None` when it may not.
///
/// An exact match wins over the `any` rule, which wins over the text rule;
/// the order only affects the reported reason, never the verdict.
pub fn compatibility_reason(source: DataType, target: DataType) -> Option<CompatibilityReason> {
    if source == target {
        return Some(CompatibilityReason::ExactMatch);
    }
    if source == DataType::Any || target == DataType::Any {
        return Some(CompatibilityReason::AnyAcceptsAll);
    }
    if source == DataType::Text {
        return Some(CompatibilityReason::TextUniversal);
    }
    None
}

/// Directed compatibility relation between an output type and an input type.
pub fn compatible(source: DataType, target: DataType) -> bool {
    compatibility_reason(source, target).is_some()
}

/// Tagged value produced by a node handler: `{type, data, artifacts?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeOutput {
    /// Result tag, e.g. `"text"`, `"image"`, `"unknown"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,
}

impl NodeOutput {
    pub fn new(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            data,
            artifacts: Vec::new(),
        }
    }

    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }
}

/// Side product of a node run (a generated file, an uploaded asset).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<DataType>,
}
