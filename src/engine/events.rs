// src/engine/events.rs

//! Run event stream.
//!
//! Events travel over a typed channel in-process. Serialized, every event is
//! a `{"event": <name>, "data": {...}}` frame, which is the wire shape
//! existing stream consumers expect.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dag::status::NodeStatus;
use crate::graph::model::NodeId;
use crate::types::NodeOutput;

/// Per-node status as reported on the stream.
///
/// This is a superset of what a node can be in from the run's point of
/// view: `skipped` marks a node that was never executed because something
/// upstream failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRunStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Skipped,
    Canceled,
}

impl NodeRunStatus {
    /// Whether the node is finished for this run.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeRunStatus::Succeeded
                | NodeRunStatus::Failed
                | NodeRunStatus::Skipped
                | NodeRunStatus::Canceled
        )
    }

    /// Lifecycle status a node ends up in when this is reported.
    pub fn node_status(self) -> NodeStatus {
        match self {
            NodeRunStatus::Queued => NodeStatus::Queued,
            NodeRunStatus::Running => NodeStatus::Running,
            NodeRunStatus::Succeeded => NodeStatus::Succeeded,
            NodeRunStatus::Failed => NodeStatus::Failed,
            NodeRunStatus::Skipped | NodeRunStatus::Canceled => NodeStatus::Canceled,
        }
    }
}

impl fmt::Display for NodeRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeRunStatus::Queued => "queued",
            NodeRunStatus::Running => "running",
            NodeRunStatus::Succeeded => "succeeded",
            NodeRunStatus::Failed => "failed",
            NodeRunStatus::Skipped => "skipped",
            NodeRunStatus::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaEvent {
    pub run_id: Uuid,
    pub total_nodes: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default)]
    pub execution_order: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStatusEvent {
    pub node_id: NodeId,
    pub status: NodeRunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<NodeOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,
}

impl NodeStatusEvent {
    pub fn new(node_id: impl Into<NodeId>, status: NodeRunStatus) -> Self {
        Self {
            node_id: node_id.into(),
            status,
            output: None,
            error: None,
            processing_time_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeProgressEvent {
    pub node_id: NodeId,
    /// Percentage, 0–100.
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteEvent {
    pub run_id: Uuid,
    pub outputs: BTreeMap<NodeId, NodeOutput>,
    pub completed_nodes: usize,
    pub total_nodes: usize,
    pub failed_nodes: Vec<NodeId>,
    #[serde(default)]
    pub skipped_nodes: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    pub message: String,
    /// Set when the run stopped because it was canceled.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub canceled: bool,
}

/// One frame of a run's event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum RunEvent {
    Meta(MetaEvent),
    NodeStatus(NodeStatusEvent),
    NodeProgress(NodeProgressEvent),
    Complete(CompleteEvent),
    Error(ErrorEvent),
}

impl RunEvent {
    /// Frame name on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            RunEvent::Meta(_) => "meta",
            RunEvent::NodeStatus(_) => "node_status",
            RunEvent::NodeProgress(_) => "node_progress",
            RunEvent::Complete(_) => "complete",
            RunEvent::Error(_) => "error",
        }
    }

    /// Whether this is the last frame of a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::Complete(_) | RunEvent::Error(_))
    }
}
