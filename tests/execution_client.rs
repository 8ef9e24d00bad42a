// tests/execution_client.rs

use std::error::Error;
use std::sync::Arc;

use serde_json::json;
use studiograph::client::{ClientError, ClientRunStatus, ExecutionClient, RunProjection};
use studiograph::dag::NodeStatus;
use studiograph::engine::events::{NodeRunStatus, NodeStatusEvent};
use studiograph::engine::{Executor, Run, RunEvent, RunRecorder};
use studiograph::errors::GraphError;
use studiograph::exec::HandlerRegistry;
use studiograph::graph::NodeKind;
use studiograph_test_utils::builders::GraphBuilder;
use studiograph_test_utils::fake_handlers::{Behaviour, ScriptedHandler};
use studiograph_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn scripted(handler: &ScriptedHandler) -> Executor {
    let mut registry = HandlerRegistry::new();
    registry.register(NodeKind::Text, handler.clone());
    Executor::new(registry)
}

#[tokio::test]
async fn wait_returns_the_completion_summary() -> TestResult {
    init_tracing();
    let g = GraphBuilder::new()
        .text("a", "x")
        .text("b", "y")
        .edge("a", "text", "b", "prompt")
        .build();
    let (a, b) = (g.id("a"), g.id("b"));
    let handler = ScriptedHandler::new().on(&a, Behaviour::Progress(vec![50], json!("half")));

    let mut client = ExecutionClient::from_handle(scripted(&handler).start(g.snapshot()));
    let mut updates = client.subscribe();
    let summary = with_timeout(client.wait()).await?;

    assert_eq!(summary.completed_nodes, 2);
    assert_eq!(summary.outputs[&a].data, json!("half"));

    let state = client.state();
    assert_eq!(state.status, ClientRunStatus::Completed);
    assert_eq!(state.total_nodes, 2);
    assert_eq!(state.completed_nodes, 2);
    assert_eq!(state.node(&b).unwrap().status, NodeStatus::Succeeded);
    assert_eq!(state.node(&b).unwrap().progress, Some(100));
    assert!(updates.has_changed()?);
    assert_eq!(updates.borrow_and_update().status, ClientRunStatus::Completed);

    // The stream is finished.
    assert!(client.next().await.is_none());
    Ok(())
}

#[tokio::test]
async fn failed_nodes_still_complete_the_run() -> TestResult {
    let g = GraphBuilder::new()
        .text("a", "x")
        .text("b", "y")
        .edge("a", "text", "b", "prompt")
        .build();
    let (a, b) = (g.id("a"), g.id("b"));
    let handler = ScriptedHandler::new().on(&a, Behaviour::Fail("bad prompt".into()));

    let mut client = ExecutionClient::from_handle(scripted(&handler).start(g.snapshot()));
    let summary = with_timeout(client.wait()).await?;

    assert_eq!(summary.failed_nodes, vec![a.clone()]);
    assert_eq!(summary.skipped_nodes, vec![b.clone()]);
    let state = client.state();
    let skipped = state.node(&b).unwrap();
    assert_eq!(skipped.status, NodeStatus::Canceled);
    assert_eq!(skipped.reported, Some(NodeRunStatus::Skipped));
    assert_eq!(state.node(&a).unwrap().error.as_deref(), Some("bad prompt"));
    Ok(())
}

#[tokio::test]
async fn cancel_marks_the_client_view_canceled() -> TestResult {
    let g = GraphBuilder::new()
        .text("a", "x")
        .text("b", "y")
        .edge("a", "text", "b", "prompt")
        .build();
    let (a, b) = (g.id("a"), g.id("b"));
    let handler = ScriptedHandler::new().on(&a, Behaviour::WaitForCancel);

    let handle = scripted(&handler).start(g.snapshot());
    let token = handle.cancel.clone();
    let mut client = ExecutionClient::from_handle(handle);

    with_timeout(async {
        while let Some(event) = client.next().await {
            if matches!(&event, RunEvent::NodeStatus(s) if s.node_id == a && s.status == NodeRunStatus::Running)
            {
                break;
            }
        }
    })
    .await;
    client.cancel();

    assert!(token.is_cancelled());
    let state = client.state();
    assert_eq!(state.status, ClientRunStatus::Canceled);
    assert_eq!(state.node(&a).unwrap().status, NodeStatus::Canceled);
    // `b` sits on a level that was never queued.
    assert!(state.node(&b).is_none());
    assert_eq!(client.wait().await, Err(ClientError::Canceled));
    Ok(())
}

struct RefusingRecorder;

impl RunRecorder for RefusingRecorder {
    fn begin(&self, _run: &Run) -> studiograph::errors::Result<()> {
        Err(GraphError::Recorder("quota exceeded".into()))
    }

    fn finish(&self, _run: &Run) -> studiograph::errors::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn run_error_surfaces_as_run_failed() -> TestResult {
    let g = GraphBuilder::new().text("a", "x").build();
    let executor = scripted(&ScriptedHandler::new()).with_recorder(Arc::new(RefusingRecorder));

    let mut client = ExecutionClient::from_handle(executor.start(g.snapshot()));
    let err = with_timeout(client.wait()).await.unwrap_err();

    match err {
        ClientError::RunFailed(message) => assert!(message.contains("quota exceeded")),
        other => panic!("expected RunFailed, got {other:?}"),
    }
    assert_eq!(client.state().status, ClientRunStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn closed_stream_without_terminal_event() -> TestResult {
    let (tx, rx) = tokio::sync::mpsc::channel(4);
    let mut client = ExecutionClient::new(rx, Default::default());
    tx.send(RunEvent::NodeStatus(NodeStatusEvent::new(
        "node_0000000000000001",
        NodeRunStatus::Queued,
    )))
    .await?;
    drop(tx);

    assert_eq!(client.wait().await, Err(ClientError::StreamClosed));
    assert_eq!(client.state().status, ClientRunStatus::Pending);
    Ok(())
}

#[test]
fn projection_drops_illegal_updates() {
    let mut projection = RunProjection::new();
    projection.apply(&RunEvent::NodeStatus(NodeStatusEvent::new(
        "n",
        NodeRunStatus::Succeeded,
    )));
    let view = projection.node("n").unwrap();
    assert_eq!(view.status, NodeStatus::Idle);
    assert_eq!(view.reported, None);
    assert_eq!(projection.completed_nodes, 0);
}
