// src/exec/handler.rs

//! Node handler abstraction.
//!
//! The executor talks to a `NodeHandler` per node kind instead of calling
//! model APIs, upload services or transforms directly. Production handlers
//! plug in here; tests provide scripted ones.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::engine::events::{NodeProgressEvent, RunEvent};
use crate::graph::model::{NodeId, NodeKind, NodeParams};
use crate::types::NodeOutput;

/// Why a node did not produce an output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    #[error("{0}")]
    Failed(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("handler panicked: {0}")]
    Panicked(String),

    #[error("canceled")]
    Canceled,
}

impl NodeError {
    pub fn failed(message: impl Into<String>) -> Self {
        NodeError::Failed(message.into())
    }
}

/// Normalized input values keyed by input port name.
///
/// A port fed by several edges holds one value per edge, in edge order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeInputs {
    values: BTreeMap<String, Vec<Value>>,
}

impl NodeInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, port: impl Into<String>, value: Value) {
        self.values.entry(port.into()).or_default().push(value);
    }

    /// Replace every value for `port`.
    pub fn set(&mut self, port: impl Into<String>, values: Vec<Value>) {
        self.values.insert(port.into(), values);
    }

    pub fn contains(&self, port: &str) -> bool {
        self.values.contains_key(port)
    }

    pub fn first(&self, port: &str) -> Option<&Value> {
        self.values.get(port).and_then(|v| v.first())
    }

    pub fn all(&self, port: &str) -> &[Value] {
        self.values.get(port).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Values of `port` rendered as text; strings verbatim, anything else as
    /// compact JSON.
    pub fn texts(&self, port: &str) -> Vec<String> {
        self.all(port).iter().map(value_to_text).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<Value>)> {
        self.values.iter()
    }

    /// All inputs as a JSON object. Single values are unwrapped.
    pub fn to_json(&self) -> Value {
        let map = self
            .values
            .iter()
            .map(|(port, values)| {
                let value = match values.as_slice() {
                    [single] => single.clone(),
                    many => Value::Array(many.to_vec()),
                };
                (port.clone(), value)
            })
            .collect();
        Value::Object(map)
    }
}

pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Everything a handler gets to see about the node it executes.
#[derive(Debug, Clone)]
pub struct NodeRequest {
    pub node_id: NodeId,
    pub kind: NodeKind,
    pub label: String,
    pub params: NodeParams,
    pub inputs: NodeInputs,
    /// Fired when the run is canceled. Long handlers may stop early and
    /// return [`NodeError::Canceled`].
    pub cancel: CancellationToken,
}

/// Side channel for intermediate progress of a long operation.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    node_id: NodeId,
    tx: Option<mpsc::Sender<RunEvent>>,
}

impl ProgressReporter {
    pub fn new(node_id: impl Into<NodeId>, tx: mpsc::Sender<RunEvent>) -> Self {
        Self {
            node_id: node_id.into(),
            tx: Some(tx),
        }
    }

    /// A reporter that drops everything (for calling handlers directly).
    pub fn disabled(node_id: impl Into<NodeId>) -> Self {
        Self {
            node_id: node_id.into(),
            tx: None,
        }
    }

    /// Report `progress` percent (clamped to 100).
    ///
    /// A closed stream is not an error for the handler; the report is
    /// dropped.
    pub async fn report(&self, progress: u8, message: Option<String>) {
        let Some(tx) = &self.tx else {
            return;
        };
        let event = RunEvent::NodeProgress(NodeProgressEvent {
            node_id: self.node_id.clone(),
            progress: progress.min(100),
            message,
        });
        if tx.send(event).await.is_err() {
            trace!(node = %self.node_id, "progress dropped; event stream closed");
        }
    }
}

/// Future returned by [`NodeHandler::execute`].
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<NodeOutput, NodeError>> + Send + 'a>>;

/// Trait abstracting how one kind of node is executed.
pub trait NodeHandler: Send + Sync {
    /// Execute a node with its normalized inputs and params.
    fn execute(&self, request: NodeRequest, progress: ProgressReporter) -> HandlerFuture<'_>;
}

/// Handler backed by a synchronous closure.
pub struct FnHandler<F> {
    f: F,
}

impl<F> NodeHandler for FnHandler<F>
where
    F: Fn(NodeRequest) -> Result<NodeOutput, NodeError> + Send + Sync,
{
    fn execute(&self, request: NodeRequest, _progress: ProgressReporter) -> HandlerFuture<'_> {
        let result = (self.f)(request);
        Box::pin(async move { result })
    }
}

/// Wrap a closure as a [`NodeHandler`].
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(NodeRequest) -> Result<NodeOutput, NodeError> + Send + Sync,
{
    FnHandler { f }
}
