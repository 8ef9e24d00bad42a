use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use studiograph::exec::{HandlerFuture, NodeError, NodeHandler, NodeInputs, NodeRequest, ProgressReporter};
use studiograph::graph::NodeId;
use studiograph::types::NodeOutput;

/// What a [`ScriptedHandler`] does for one node.
#[derive(Debug, Clone)]
pub enum Behaviour {
    /// Succeed with the given data.
    Succeed(Value),
    /// Fail with the given message.
    Fail(String),
    /// Sleep, then succeed with the given data.
    Delay(Duration, Value),
    /// Panic with the given message.
    Panic(String),
    /// Report progress, then succeed with the given data.
    Progress(Vec<u8>, Value),
    /// Block until the run is canceled.
    WaitForCancel,
}

/// A fake handler that:
/// - records which nodes were invoked, with their inputs
/// - behaves per node as scripted, succeeding with the node id by default.
#[derive(Debug, Clone, Default)]
pub struct ScriptedHandler {
    script: Arc<Mutex<HashMap<NodeId, Behaviour>>>,
    invoked: Arc<Mutex<Vec<(NodeId, NodeInputs)>>>,
}

impl ScriptedHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, node: &str, behaviour: Behaviour) -> Self {
        self.script
            .lock()
            .unwrap()
            .insert(node.to_string(), behaviour);
        self
    }

    /// Node ids in invocation order.
    pub fn invoked(&self) -> Vec<NodeId> {
        self.invoked
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn was_invoked(&self, node: &str) -> bool {
        self.invoked().iter().any(|id| id == node)
    }

    /// Inputs the node was invoked with, if it was.
    pub fn inputs_of(&self, node: &str) -> Option<NodeInputs> {
        self.invoked
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| id == node)
            .map(|(_, inputs)| inputs.clone())
    }
}

impl NodeHandler for ScriptedHandler {
    fn execute(&self, request: NodeRequest, progress: ProgressReporter) -> HandlerFuture<'_> {
        self.invoked
            .lock()
            .unwrap()
            .push((request.node_id.clone(), request.inputs.clone()));

        let behaviour = self
            .script
            .lock()
            .unwrap()
            .get(&request.node_id)
            .cloned()
            .unwrap_or_else(|| Behaviour::Succeed(Value::String(request.node_id.clone())));

        Box::pin(async move {
            let kind = request.kind.as_str().to_string();
            match behaviour {
                Behaviour::Succeed(data) => Ok(NodeOutput::new(kind, data)),
                Behaviour::Fail(message) => Err(NodeError::Failed(message)),
                Behaviour::Delay(delay, data) => {
                    tokio::time::sleep(delay).await;
                    Ok(NodeOutput::new(kind, data))
                }
                Behaviour::Panic(message) => panic!("{message}"),
                Behaviour::Progress(steps, data) => {
                    for step in steps {
                        progress.report(step, None).await;
                    }
                    Ok(NodeOutput::new(kind, data))
                }
                Behaviour::WaitForCancel => {
                    request.cancel.cancelled().await;
                    Err(NodeError::Canceled)
                }
            }
        })
    }
}
