// src/lib.rs

pub mod cli;
pub mod client;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod graph;
pub mod logging;
pub mod types;

use std::path::Path;

use anyhow::{Result, bail};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::WorkflowFile;
use crate::dag::{DagGraph, compute_levels};
use crate::engine::{Executor, RunStatus};
use crate::exec::HandlerRegistry;
use crate::fs::{FileSystem, RealFileSystem};
use crate::graph::{GraphSnapshot, GraphStore, LoadReport};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - workflow loading and validation
/// - the graph store (bulk load with id normalization)
/// - the executor with the built-in handlers
/// - Ctrl-C handling
///
/// Every run event is printed to stdout as one JSON line and written back
/// to the store.
pub async fn run(args: CliArgs) -> Result<()> {
    let workflow = load_and_validate(&args.workflow)?;

    let mut store = GraphStore::new();
    let report = store.load_workflow(&workflow)?;
    if !report.rejected.is_empty() {
        let reasons: Vec<String> = report
            .rejected
            .iter()
            .map(|(req, err)| format!("{} -> {}: {err}", req.source_node, req.target_node))
            .collect();
        bail!(
            "{} edge(s) in {} were rejected:\n  {}",
            reasons.len(),
            args.workflow,
            reasons.join("\n  ")
        );
    }

    let snapshot = scoped_snapshot(&store, &report, args.node.as_deref())?;

    if args.dry_run {
        print_dry_run(&workflow, &report, &snapshot)?;
        return Ok(());
    }

    let executor = Executor::new(HandlerRegistry::with_builtins())
        .with_options(workflow.config.executor_options());
    let mut handle = executor.start(snapshot);

    // Ctrl-C → cancel the run; remaining nodes are reported as canceled.
    {
        let cancel = handle.cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            cancel.cancel();
        });
    }

    while let Some(event) = handle.events.recv().await {
        println!("{}", serde_json::to_string(&event)?);
        if let Err(err) = store.apply_event(&event) {
            warn!(event = event.name(), error = %err, "could not write event back to graph");
        }
    }

    let run = handle.join.await?;

    if let Some(path) = args.results.as_deref() {
        write_results(&RealFileSystem, Path::new(path), &store)?;
        info!(path, "wrote node results");
    }

    match run.status {
        RunStatus::Completed => {
            if !run.failed_nodes.is_empty() {
                warn!(failed = ?run.failed_nodes, "run completed with failed nodes");
            }
            Ok(())
        }
        RunStatus::Canceled => bail!("run {} was canceled", run.run_id),
        RunStatus::Failed | RunStatus::Running => bail!(
            "run {} failed: {}",
            run.run_id,
            run.error.unwrap_or_else(|| "unknown error".to_string())
        ),
    }
}

/// Snapshot of the whole graph, or of `node` and its upstream closure.
fn scoped_snapshot(
    store: &GraphStore,
    report: &LoadReport,
    node: Option<&str>,
) -> Result<GraphSnapshot> {
    let snapshot = store.snapshot();
    let Some(node) = node else {
        return Ok(snapshot);
    };

    let id = report
        .id_map
        .get(node)
        .cloned()
        .unwrap_or_else(|| node.to_string());
    if store.node(&id).is_none() {
        bail!("node '{node}' is not part of the workflow");
    }
    debug!(node = %id, "restricting run to upstream closure");
    Ok(snapshot.upstream_closure([id]))
}

/// Serialize every node's final state.
pub fn write_results(fs: &dyn FileSystem, path: &Path, store: &GraphStore) -> Result<()> {
    let nodes: Vec<_> = store.nodes().collect();
    let json = serde_json::to_vec_pretty(&nodes)?;
    fs.write(path, &json)
}

/// Dry-run output: nodes, edges and execution levels.
fn print_dry_run(workflow: &WorkflowFile, report: &LoadReport, snapshot: &GraphSnapshot) -> Result<()> {
    let external: std::collections::BTreeMap<&str, &str> = report
        .id_map
        .iter()
        .map(|(ext, id)| (id.as_str(), ext.as_str()))
        .collect();
    let name = |id: &str| external.get(id).copied().unwrap_or(id).to_string();

    println!("studiograph dry-run");
    if let Some(project) = &workflow.config.project {
        println!("  config.project = {project}");
    }
    if let Some(secs) = workflow.config.node_timeout_secs {
        println!("  config.node_timeout_secs = {secs}");
    }
    println!("  config.event_buffer = {}", workflow.config.event_buffer);
    println!();

    println!("nodes ({}):", snapshot.len());
    for node in snapshot.nodes.values() {
        println!("  - {} [{}] ({})", name(&node.id), node.id, node.kind);
        if let Some(prompt) = node.params.prompt().filter(|p| !p.is_empty()) {
            println!("      prompt: {prompt}");
        }
    }

    println!("edges ({}):", snapshot.edges.len());
    for edge in &snapshot.edges {
        println!(
            "  - {} -> {} ({})",
            edge.source, edge.target, edge.data_type
        );
    }

    let graph = DagGraph::from_snapshot(snapshot)?;
    let levels = compute_levels(&graph)?;
    println!("levels ({}):", levels.len());
    for (index, level) in levels.iter().enumerate() {
        let names: Vec<String> = level.iter().map(|id| name(id)).collect();
        println!("  {index}: {}", names.join(", "));
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
