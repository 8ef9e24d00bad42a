// src/client/mod.rs

//! Client-side view of a running execution.
//!
//! The projection is a second state machine, fed one way by run events. It
//! never applies a node transition the status machine rejects; such events
//! are logged and dropped.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dag::status::{NodeStatus, validate_status_transition};
use crate::engine::events::{CompleteEvent, NodeRunStatus, NodeStatusEvent, RunEvent};
use crate::engine::executor::RunHandle;
use crate::graph::model::NodeId;
use crate::types::NodeOutput;

/// Summary handed out when a run completes.
pub type CompletionSummary = CompleteEvent;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("run failed: {0}")]
    RunFailed(String),

    #[error("run canceled")]
    Canceled,

    #[error("event stream closed before the run finished")]
    StreamClosed,
}

/// Run status as the client sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientRunStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl ClientRunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ClientRunStatus::Completed | ClientRunStatus::Failed | ClientRunStatus::Canceled
        )
    }
}

/// Client-side state of one node.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct NodeView {
    pub status: NodeStatus,
    /// Last status reported on the stream; distinguishes `skipped` from a
    /// plain cancellation.
    pub reported: Option<NodeRunStatus>,
    pub progress: Option<u8>,
    pub output: Option<NodeOutput>,
    pub error: Option<String>,
    pub processing_time_ms: Option<u64>,
}

/// Everything the client knows about a run.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RunProjection {
    pub run_id: Option<Uuid>,
    pub status: ClientRunStatus,
    pub total_nodes: usize,
    pub completed_nodes: usize,
    pub nodes: BTreeMap<NodeId, NodeView>,
    pub outputs: BTreeMap<NodeId, NodeOutput>,
    pub failed_nodes: Vec<NodeId>,
    pub skipped_nodes: Vec<NodeId>,
    pub error: Option<String>,
    #[serde(skip)]
    counted: BTreeSet<NodeId>,
}

impl RunProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: &str) -> Option<&NodeView> {
        self.nodes.get(id)
    }

    /// Fold one event into the projection.
    ///
    /// Events arriving after the run reached a terminal status are ignored.
    pub fn apply(&mut self, event: &RunEvent) {
        if self.status.is_terminal() {
            debug!(event = event.name(), "ignoring event after run end");
            return;
        }

        match event {
            RunEvent::Meta(meta) => {
                self.run_id = Some(meta.run_id);
                self.total_nodes = meta.total_nodes;
                self.status = ClientRunStatus::Running;
            }
            RunEvent::NodeStatus(update) => self.apply_node_status(update),
            RunEvent::NodeProgress(progress) => {
                let view = self.nodes.entry(progress.node_id.clone()).or_default();
                if view.status == NodeStatus::Running {
                    view.progress = Some(progress.progress.min(100));
                }
            }
            RunEvent::Complete(complete) => {
                self.status = ClientRunStatus::Completed;
                self.outputs = complete.outputs.clone();
                self.completed_nodes = complete.completed_nodes;
                self.total_nodes = complete.total_nodes;
                self.failed_nodes = complete.failed_nodes.clone();
                self.skipped_nodes = complete.skipped_nodes.clone();
            }
            RunEvent::Error(err) => {
                self.status = if err.canceled {
                    ClientRunStatus::Canceled
                } else {
                    ClientRunStatus::Failed
                };
                self.error = Some(err.message.clone());
            }
        }
    }

    fn apply_node_status(&mut self, update: &NodeStatusEvent) {
        let view = self.nodes.entry(update.node_id.clone()).or_default();
        let to = update.status.node_status();

        if let Err(err) = validate_status_transition(view.status, to) {
            warn!(node = %update.node_id, error = %err, "ignoring illegal status update");
            return;
        }

        view.status = to;
        view.reported = Some(update.status);
        if update.output.is_some() {
            view.output = update.output.clone();
        }
        if update.error.is_some() {
            view.error = update.error.clone();
        }
        if update.processing_time_ms.is_some() {
            view.processing_time_ms = update.processing_time_ms;
        }

        match update.status {
            NodeRunStatus::Queued => {
                view.progress = None;
                view.output = None;
                view.error = None;
            }
            NodeRunStatus::Running => view.progress = Some(0),
            NodeRunStatus::Succeeded => view.progress = Some(100),
            _ => {}
        }

        let counts = matches!(
            update.status,
            NodeRunStatus::Succeeded | NodeRunStatus::Failed | NodeRunStatus::Skipped
        );
        if counts && self.counted.insert(update.node_id.clone()) {
            self.completed_nodes += 1;
        }
    }

    /// Mark the run canceled from the client side.
    ///
    /// Queued and running nodes move to `canceled`; everything else keeps
    /// its status.
    pub fn mark_canceled(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = ClientRunStatus::Canceled;
        self.error = Some("canceled by client".to_string());
        for (id, view) in self.nodes.iter_mut() {
            if validate_status_transition(view.status, NodeStatus::Canceled).is_ok()
                && !view.status.is_terminal()
            {
                debug!(node = %id, from = %view.status, "canceling node in client view");
                view.status = NodeStatus::Canceled;
                view.reported = Some(NodeRunStatus::Canceled);
            }
        }
    }
}

/// Consumes a run's event stream and keeps a [`RunProjection`] current.
#[derive(Debug)]
pub struct ExecutionClient {
    events: Option<mpsc::Receiver<RunEvent>>,
    cancel: CancellationToken,
    state: watch::Sender<RunProjection>,
}

impl ExecutionClient {
    pub fn new(events: mpsc::Receiver<RunEvent>, cancel: CancellationToken) -> Self {
        let (state, _) = watch::channel(RunProjection::new());
        Self {
            events: Some(events),
            cancel,
            state,
        }
    }

    /// Attach to a started run. The run task keeps going in the background.
    pub fn from_handle(handle: RunHandle) -> Self {
        Self::new(handle.events, handle.cancel)
    }

    /// Receiver notified on every projection change.
    pub fn subscribe(&self) -> watch::Receiver<RunProjection> {
        self.state.subscribe()
    }

    /// Current projection.
    pub fn state(&self) -> RunProjection {
        self.state.borrow().clone()
    }

    /// Receive the next event and fold it into the projection.
    ///
    /// Returns `None` once the stream ended or the client was canceled.
    pub async fn next(&mut self) -> Option<RunEvent> {
        let events = self.events.as_mut()?;
        let Some(event) = events.recv().await else {
            self.events = None;
            return None;
        };
        self.state.send_modify(|state| state.apply(&event));
        if event.is_terminal() {
            self.events = None;
        }
        Some(event)
    }

    /// Follow the stream until the run ends.
    pub async fn wait(&mut self) -> Result<CompletionSummary, ClientError> {
        while let Some(event) = self.next().await {
            match event {
                RunEvent::Complete(summary) => return Ok(summary),
                RunEvent::Error(err) if err.canceled => return Err(ClientError::Canceled),
                RunEvent::Error(err) => return Err(ClientError::RunFailed(err.message)),
                _ => {}
            }
        }

        if self.state.borrow().status == ClientRunStatus::Canceled {
            Err(ClientError::Canceled)
        } else {
            Err(ClientError::StreamClosed)
        }
    }

    /// Cancel the run and stop following it.
    ///
    /// The client-side state is `canceled` when this returns, regardless of
    /// how fast the executor winds down.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.events = None;
        self.state.send_modify(RunProjection::mark_canceled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::events::{ErrorEvent, MetaEvent};

    fn status(node: &str, status: NodeRunStatus) -> RunEvent {
        RunEvent::NodeStatus(NodeStatusEvent::new(node, status))
    }

    #[test]
    fn counts_terminal_statuses_once() {
        let mut p = RunProjection::new();
        p.apply(&RunEvent::Meta(MetaEvent {
            run_id: Uuid::new_v4(),
            total_nodes: 1,
            project: None,
            execution_order: vec!["a".into()],
        }));
        p.apply(&status("a", NodeRunStatus::Queued));
        p.apply(&status("a", NodeRunStatus::Running));
        p.apply(&status("a", NodeRunStatus::Succeeded));
        p.apply(&status("a", NodeRunStatus::Succeeded));
        assert_eq!(p.completed_nodes, 1);
        assert_eq!(p.node("a").unwrap().progress, Some(100));
    }

    #[test]
    fn ignores_illegal_transition() {
        let mut p = RunProjection::new();
        p.apply(&status("a", NodeRunStatus::Succeeded));
        let view = p.node("a").unwrap();
        assert_eq!(view.status, NodeStatus::Idle);
        assert_eq!(p.completed_nodes, 0);
    }

    #[test]
    fn error_event_fails_run() {
        let mut p = RunProjection::new();
        p.apply(&RunEvent::Error(ErrorEvent {
            run_id: None,
            message: "boom".into(),
            canceled: false,
        }));
        assert_eq!(p.status, ClientRunStatus::Failed);
        assert_eq!(p.error.as_deref(), Some("boom"));
    }

    #[test]
    fn mark_canceled_moves_live_nodes() {
        let mut p = RunProjection::new();
        p.apply(&status("a", NodeRunStatus::Queued));
        p.apply(&status("b", NodeRunStatus::Queued));
        p.apply(&status("b", NodeRunStatus::Running));
        p.apply(&status("c", NodeRunStatus::Queued));
        p.apply(&status("c", NodeRunStatus::Running));
        p.apply(&status("c", NodeRunStatus::Succeeded));
        p.mark_canceled();

        assert_eq!(p.status, ClientRunStatus::Canceled);
        assert_eq!(p.node("a").unwrap().status, NodeStatus::Canceled);
        assert_eq!(p.node("b").unwrap().status, NodeStatus::Canceled);
        assert_eq!(p.node("c").unwrap().status, NodeStatus::Succeeded);
    }
}
