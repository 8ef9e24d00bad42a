// src/engine/executor.rs

//! Level-parallel graph executor.
//!
//! A run works on an immutable [`GraphSnapshot`]. Levels execute strictly
//! in order; the nodes of one level run concurrently and the next level is
//! not dispatched before every node of the current one is terminal. Node
//! failures are recorded and propagated downstream as skips; only errors in
//! the executor's own bookkeeping end a run early. A level's nodes are queued
//! right before it is dispatched, so a run that ends early leaves unreached
//! nodes in the status they had before the run.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, error, info, warn};

use crate::dag::{DagGraph, NodeStatus, StateManager, compute_levels};
use crate::errors::{GraphError, Result};
use crate::exec::handler::{NodeError, NodeHandler, NodeRequest, ProgressReporter};
use crate::exec::registry::HandlerRegistry;
use crate::graph::model::{Node, NodeId};
use crate::graph::snapshot::GraphSnapshot;
use crate::types::NodeOutput;

use super::events::{
    CompleteEvent, ErrorEvent, MetaEvent, NodeRunStatus, NodeStatusEvent, RunEvent,
};
use super::inputs::collect_inputs;
use super::run::{Run, RunRecorder, RunStatus};

/// Default capacity of a run's event channel.
pub const DEFAULT_EVENT_BUFFER: usize = 64;

/// Engine options, usually taken from the workflow's `[config]` section.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Scope label attached to runs.
    pub project: Option<String>,
    /// Upper bound on a single handler invocation.
    pub node_timeout: Option<Duration>,
    /// Capacity of the event channel created by [`Executor::start`].
    pub event_buffer: usize,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            project: None,
            node_timeout: None,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

/// A run started with [`Executor::start`].
#[derive(Debug)]
pub struct RunHandle {
    pub events: mpsc::Receiver<RunEvent>,
    pub cancel: CancellationToken,
    pub join: JoinHandle<Run>,
}

impl RunHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Drain the event stream and return the events and the finalized run.
    pub async fn collect(mut self) -> Result<(Vec<RunEvent>, Run)> {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            events.push(event);
        }
        let run = self
            .join
            .await
            .map_err(|e| GraphError::Other(anyhow::anyhow!("executor task failed: {e}")))?;
        Ok((events, run))
    }
}

/// How the level loop ended when nothing went wrong in the bookkeeping.
enum Outcome {
    Completed,
    Canceled,
}

/// Sending side of a run's event stream.
///
/// A dropped receiver is remembered; the executor treats it as a
/// cancellation at the next level boundary.
struct Emitter {
    tx: mpsc::Sender<RunEvent>,
    closed: bool,
}

impl Emitter {
    fn new(tx: mpsc::Sender<RunEvent>) -> Self {
        Self { tx, closed: false }
    }

    async fn emit(&mut self, event: RunEvent) {
        if self.closed {
            return;
        }
        if self.tx.send(event).await.is_err() {
            warn!("event receiver dropped; run will be canceled");
            self.closed = true;
        }
    }

    async fn node_status(&mut self, event: NodeStatusEvent) {
        self.emit(RunEvent::NodeStatus(event)).await;
    }
}

/// What a node task reports back to the level loop.
struct NodeResult {
    node_id: NodeId,
    result: std::result::Result<NodeOutput, NodeError>,
    elapsed: Duration,
}

/// Runs graph snapshots with a set of node handlers.
#[derive(Clone)]
pub struct Executor {
    registry: Arc<HandlerRegistry>,
    options: ExecutorOptions,
    recorder: Option<Arc<dyn RunRecorder>>,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("registry", &self.registry)
            .field("options", &self.options)
            .field("recorder", &self.recorder.is_some())
            .finish()
    }
}

impl Executor {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            options: ExecutorOptions::default(),
            recorder: None,
        }
    }

    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn RunRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Spawn a run of `snapshot` and hand back its event stream.
    pub fn start(&self, snapshot: GraphSnapshot) -> RunHandle {
        let (tx, events) = mpsc::channel(self.options.event_buffer.max(1));
        let cancel = CancellationToken::new();
        let executor = self.clone();
        let token = cancel.clone();
        let join = tokio::spawn(async move { executor.execute(snapshot, tx, token).await });
        RunHandle {
            events,
            cancel,
            join,
        }
    }

    /// Execute `snapshot` to completion, reporting on `tx`.
    ///
    /// Always returns a finalized run. The last event sent is either
    /// `complete` or `error`.
    pub async fn execute(
        &self,
        snapshot: GraphSnapshot,
        tx: mpsc::Sender<RunEvent>,
        cancel: CancellationToken,
    ) -> Run {
        let mut emitter = Emitter::new(tx);
        let mut run = Run::new(self.options.project.clone(), snapshot.len());
        info!(run_id = %run.run_id, nodes = snapshot.len(), "run started");

        let mut recorded = false;
        let outcome = self
            .drive(&snapshot, &mut run, &mut emitter, &cancel, &mut recorded)
            .await;

        match outcome {
            Ok(Outcome::Completed) => {
                run.finalize(RunStatus::Completed, None);
                info!(
                    run_id = %run.run_id,
                    completed = run.completed,
                    failed = run.failed_nodes.len(),
                    skipped = run.skipped_nodes.len(),
                    "run completed"
                );
                let complete = CompleteEvent {
                    run_id: run.run_id,
                    outputs: run.outputs.clone(),
                    completed_nodes: run.completed,
                    total_nodes: run.total,
                    failed_nodes: run.failed_nodes.iter().cloned().collect(),
                    skipped_nodes: run.skipped_nodes.iter().cloned().collect(),
                };
                emitter.emit(RunEvent::Complete(complete)).await;
            }
            Ok(Outcome::Canceled) => {
                let message = "run canceled".to_string();
                run.finalize(RunStatus::Canceled, Some(message.clone()));
                info!(run_id = %run.run_id, canceled = run.canceled_nodes.len(), "run canceled");
                emitter
                    .emit(RunEvent::Error(ErrorEvent {
                        run_id: Some(run.run_id),
                        message,
                        canceled: true,
                    }))
                    .await;
            }
            Err(err) => {
                error!(run_id = %run.run_id, error = %err, "run failed");
                run.finalize(RunStatus::Failed, Some(err.to_string()));
                emitter
                    .emit(RunEvent::Error(ErrorEvent {
                        run_id: Some(run.run_id),
                        message: err.to_string(),
                        canceled: false,
                    }))
                    .await;
            }
        }

        if recorded {
            if let Some(recorder) = &self.recorder {
                if let Err(err) = recorder.finish(&run) {
                    warn!(run_id = %run.run_id, error = %err, "failed to record finished run");
                }
            }
        }

        run
    }

    async fn drive(
        &self,
        snapshot: &GraphSnapshot,
        run: &mut Run,
        emitter: &mut Emitter,
        cancel: &CancellationToken,
        recorded: &mut bool,
    ) -> Result<Outcome> {
        let graph = DagGraph::from_snapshot(snapshot)?;
        let levels = compute_levels(&graph)?;
        run.execution_order = levels.flatten();
        run.levels = levels.clone().into_inner();

        let mut state = StateManager::from_snapshot(snapshot);
        for node_id in &run.execution_order {
            state.check_requeue(node_id)?;
        }

        if let Some(recorder) = &self.recorder {
            recorder.begin(run)?;
            *recorded = true;
        }

        emitter
            .emit(RunEvent::Meta(MetaEvent {
                run_id: run.run_id,
                total_nodes: run.total,
                project: run.project_scope.clone(),
                execution_order: run.execution_order.clone(),
            }))
            .await;

        // Failed, skipped and canceled nodes; their dependents never run.
        let mut blocked: HashSet<NodeId> = HashSet::new();

        for (index, level) in levels.iter().enumerate() {
            if emitter.closed && !cancel.is_cancelled() {
                cancel.cancel();
            }
            if cancel.is_cancelled() {
                let unreached: Vec<NodeId> =
                    levels.iter().skip(index).flatten().cloned().collect();
                self.cancel_unreached(&unreached, run, &mut state, emitter)
                    .await?;
                return Ok(Outcome::Canceled);
            }

            debug!(run_id = %run.run_id, level = index, nodes = ?level, "dispatching level");
            for node_id in level {
                state.requeue(node_id)?;
                emitter
                    .node_status(NodeStatusEvent::new(node_id.clone(), NodeRunStatus::Queued))
                    .await;
            }

            let mut tasks: JoinSet<NodeResult> = JoinSet::new();
            for node_id in level {
                let node = snapshot.node(node_id).ok_or_else(|| {
                    GraphError::CorruptSnapshot(format!("node '{node_id}' missing from snapshot"))
                })?;

                let upstream_blocked = graph
                    .dependencies_of(node_id)
                    .iter()
                    .any(|dep| blocked.contains(dep));
                if upstream_blocked {
                    state.transition(node_id, NodeStatus::Canceled)?;
                    blocked.insert(node_id.clone());
                    run.skipped_nodes.insert(node_id.clone());
                    run.completed += 1;
                    info!(run_id = %run.run_id, node = %node_id, "skipping node; upstream did not succeed");
                    let mut event = NodeStatusEvent::new(node_id.clone(), NodeRunStatus::Skipped);
                    event.error = Some("upstream dependency failed".to_string());
                    emitter.node_status(event).await;
                    continue;
                }

                state.transition(node_id, NodeStatus::Running)?;
                emitter
                    .node_status(NodeStatusEvent::new(node_id.clone(), NodeRunStatus::Running))
                    .await;
                self.spawn_node(&mut tasks, node, snapshot, run, emitter, cancel);
            }

            while let Some(joined) = tasks.join_next().await {
                let NodeResult {
                    node_id,
                    result,
                    elapsed,
                } = joined.map_err(|e| {
                    GraphError::Other(anyhow::anyhow!("node task could not be joined: {e}"))
                })?;
                let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

                match result {
                    Ok(output) => {
                        state.transition(&node_id, NodeStatus::Succeeded)?;
                        run.completed += 1;
                        run.outputs.insert(node_id.clone(), output.clone());
                        info!(run_id = %run.run_id, node = %node_id, elapsed_ms, "node succeeded");
                        let mut event =
                            NodeStatusEvent::new(node_id.clone(), NodeRunStatus::Succeeded);
                        event.output = Some(output);
                        event.processing_time_ms = Some(elapsed_ms);
                        emitter.node_status(event).await;
                    }
                    Err(NodeError::Canceled) => {
                        state.transition(&node_id, NodeStatus::Canceled)?;
                        blocked.insert(node_id.clone());
                        run.canceled_nodes.insert(node_id.clone());
                        info!(run_id = %run.run_id, node = %node_id, "node canceled");
                        let mut event =
                            NodeStatusEvent::new(node_id.clone(), NodeRunStatus::Canceled);
                        event.processing_time_ms = Some(elapsed_ms);
                        emitter.node_status(event).await;
                    }
                    Err(err) => {
                        state.transition(&node_id, NodeStatus::Failed)?;
                        blocked.insert(node_id.clone());
                        run.failed_nodes.insert(node_id.clone());
                        run.completed += 1;
                        warn!(run_id = %run.run_id, node = %node_id, error = %err, "node failed");
                        let mut event = NodeStatusEvent::new(node_id.clone(), NodeRunStatus::Failed);
                        event.error = Some(err.to_string());
                        event.processing_time_ms = Some(elapsed_ms);
                        emitter.node_status(event).await;
                    }
                }
            }
        }

        if cancel.is_cancelled() && !run.canceled_nodes.is_empty() {
            return Ok(Outcome::Canceled);
        }
        Ok(Outcome::Completed)
    }

    fn spawn_node(
        &self,
        tasks: &mut JoinSet<NodeResult>,
        node: &Node,
        snapshot: &GraphSnapshot,
        run: &Run,
        emitter: &Emitter,
        cancel: &CancellationToken,
    ) {
        let handler = self.registry.resolve(&node.kind);
        let request = NodeRequest {
            node_id: node.id.clone(),
            kind: node.kind.clone(),
            label: node.label.clone(),
            params: node.params.clone(),
            inputs: collect_inputs(node, snapshot, &run.outputs),
            cancel: cancel.child_token(),
        };
        let progress = ProgressReporter::new(node.id.clone(), emitter.tx.clone());
        let timeout = self.options.node_timeout;
        let cancel = cancel.clone();
        let node_id = node.id.clone();

        tasks.spawn(async move {
            let started = Instant::now();
            let result = run_handler(handler, request, progress, timeout, cancel).await;
            NodeResult {
                node_id,
                result,
                elapsed: started.elapsed(),
            }
        });
    }

    /// Queue and cancel the nodes of levels that were never dispatched.
    async fn cancel_unreached(
        &self,
        unreached: &[NodeId],
        run: &mut Run,
        state: &mut StateManager,
        emitter: &mut Emitter,
    ) -> Result<()> {
        for node_id in unreached {
            state.requeue(node_id)?;
            emitter
                .node_status(NodeStatusEvent::new(node_id.clone(), NodeRunStatus::Queued))
                .await;
            state.transition(node_id, NodeStatus::Canceled)?;
            run.canceled_nodes.insert(node_id.clone());
            emitter
                .node_status(NodeStatusEvent::new(node_id.clone(), NodeRunStatus::Canceled))
                .await;
        }
        Ok(())
    }
}

/// Run one handler on its own task.
///
/// The extra task keeps a panicking handler from taking the level loop
/// down with it. The handler task is aborted on timeout, on cancellation,
/// and whenever this future is dropped before the handler finishes.
async fn run_handler(
    handler: Arc<dyn NodeHandler>,
    request: NodeRequest,
    progress: ProgressReporter,
    timeout: Option<Duration>,
    cancel: CancellationToken,
) -> std::result::Result<NodeOutput, NodeError> {
    let mut handle =
        AbortOnDropHandle::new(tokio::spawn(async move { handler.execute(request, progress).await }));

    let deadline = async {
        match timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };

    let joined = tokio::select! {
        biased;
        joined = &mut handle => joined,
        _ = cancel.cancelled() => return Err(NodeError::Canceled),
        _ = deadline => return Err(NodeError::Timeout(timeout.unwrap_or_default())),
    };

    match joined {
        Ok(result) => result,
        Err(err) if err.is_panic() => {
            let payload = err.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            Err(NodeError::Panicked(message))
        }
        Err(_) => Err(NodeError::Canceled),
    }
}
