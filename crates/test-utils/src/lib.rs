pub mod builders;
pub mod fake_handlers;

use std::sync::Once;
use tracing_subscriber::{EnvFilter, fmt};

use studiograph::engine::{Executor, Run, RunEvent};
use studiograph::engine::events::NodeRunStatus;
use studiograph::graph::GraphSnapshot;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Start a run and collect every event plus the finalized run.
pub async fn run_to_end(executor: &Executor, snapshot: GraphSnapshot) -> (Vec<RunEvent>, Run) {
    with_timeout(executor.start(snapshot).collect())
        .await
        .expect("executor task failed")
}

/// `(node_id, status)` pairs of every `node_status` event, in stream order.
pub fn status_events(events: &[RunEvent]) -> Vec<(String, NodeRunStatus)> {
    events
        .iter()
        .filter_map(|e| match e {
            RunEvent::NodeStatus(s) => Some((s.node_id.clone(), s.status)),
            _ => None,
        })
        .collect()
}

/// Statuses reported for one node, in stream order.
pub fn statuses_of(events: &[RunEvent], node: &str) -> Vec<NodeRunStatus> {
    status_events(events)
        .into_iter()
        .filter(|(id, _)| id == node)
        .map(|(_, s)| s)
        .collect()
}
