// tests/workflow_loading.rs

use std::error::Error;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{Value, json};
use studiograph::cli::CliArgs;
use studiograph::config::loader::{WorkflowFormat, parse_workflow};
use studiograph::config::{load_and_validate, load_and_validate_with_fs};
use studiograph::engine::{Executor, RunStatus};
use studiograph::errors::GraphError;
use studiograph::exec::HandlerRegistry;
use studiograph::fs::mock::MockFileSystem;
use studiograph::graph::{GraphStore, NodeKind};
use studiograph::write_results;
use studiograph_test_utils::builders::WorkflowBuilder;
use studiograph_test_utils::{init_tracing, run_to_end};
use tempfile::{NamedTempFile, tempdir};

type TestResult = Result<(), Box<dyn Error>>;

fn demo(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("demos")
        .join(name)
}

fn toml_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

fn args(workflow: &Path) -> CliArgs {
    CliArgs {
        workflow: workflow.to_string_lossy().into_owned(),
        node: None,
        results: None,
        log_level: None,
        dry_run: false,
    }
}

#[test]
fn storyboard_toml_loads_with_config() -> TestResult {
    let workflow = load_and_validate(demo("storyboard.toml"))?;

    assert_eq!(workflow.config.project.as_deref(), Some("storyboard"));
    let options = workflow.config.executor_options();
    assert_eq!(options.node_timeout, Some(Duration::from_secs(30)));
    assert_eq!(options.event_buffer, 64);
    assert_eq!(workflow.node.len(), 5);
    assert_eq!(workflow.node["idea"].label.as_deref(), Some("Idea"));
    assert_eq!(workflow.edge.len(), 6);
    // Dotted and table port references read the same way.
    assert_eq!(workflow.edge[3].from.to_string(), "poster.image");
    assert_eq!(workflow.edge[4].from.to_string(), "narration.audio");
    Ok(())
}

#[test]
fn storyboard_json_loads_by_extension() -> TestResult {
    let path = demo("storyboard.json");
    assert_eq!(WorkflowFormat::from_path(&path), WorkflowFormat::Json);

    let workflow = load_and_validate(&path)?;
    assert_eq!(workflow.config.project.as_deref(), Some("storyboard-json"));
    assert_eq!(workflow.node["caption"].inputs["context"], json!("harbor at night"));
    Ok(())
}

#[tokio::test]
async fn storyboard_runs_end_to_end() -> TestResult {
    init_tracing();
    let workflow = load_and_validate(demo("storyboard.toml"))?;
    let mut store = GraphStore::new();
    let report = store.load_workflow(&workflow)?;
    assert!(report.rejected.is_empty());

    let executor = Executor::new(HandlerRegistry::with_builtins())
        .with_options(workflow.config.executor_options());
    let (events, run) = run_to_end(&executor, store.snapshot()).await;
    for event in &events {
        store.apply_event(event)?;
    }

    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.failed_nodes.is_empty());
    assert_eq!(run.levels.len(), 3);

    let board = &run.outputs[&report.id_map["board"]];
    let results = board.data.as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert!(results[0].as_str().unwrap().starts_with("placeholder://image/"));
    assert!(results[1].as_str().unwrap().starts_with("placeholder://audio/"));
    assert!(results[2].as_str().unwrap().starts_with("Style notes: "));

    assert!(store.nodes().all(|n| n.progress == Some(100)));
    Ok(())
}

#[tokio::test]
async fn json_workflow_combines_in_edge_order() -> TestResult {
    let workflow = load_and_validate(demo("storyboard.json"))?;
    let mut store = GraphStore::new();
    let report = store.load_workflow(&workflow)?;

    let executor = Executor::new(HandlerRegistry::with_builtins());
    let (_, run) = run_to_end(&executor, store.snapshot()).await;

    let out = run.outputs[&report.id_map["out"]].data.as_str().unwrap().to_string();
    assert!(out.contains("caption this"), "{out}");
    assert!(out.ends_with(" | file://sketches/harbor.png"), "{out}");
    Ok(())
}

#[test]
fn unknown_node_in_edge_is_a_config_error() {
    let file = toml_file(
        r#"
[node.a]
kind = "text"

[[edge]]
from = "a.text"
to = "ghost.prompt"
"#,
    );

    match load_and_validate(file.path()) {
        Err(GraphError::ConfigError(msg)) => {
            assert!(msg.contains("unknown node"));
            assert!(msg.contains("ghost"));
        }
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn self_edge_is_a_config_error() {
    let file = toml_file(
        r#"
[node.a]
kind = "text"

[[edge]]
from = "a.text"
to = "a.context"
"#,
    );
    assert!(matches!(
        load_and_validate(file.path()),
        Err(GraphError::ConfigError(msg)) if msg.contains("itself")
    ));
}

#[test]
fn cyclic_workflow_is_rejected() {
    let file = toml_file(
        r#"
[node.a]
kind = "text"

[node.b]
kind = "text"

[[edge]]
from = "a.text"
to = "b.prompt"

[[edge]]
from = "b.text"
to = "a.prompt"
"#,
    );

    match load_and_validate(file.path()) {
        Err(GraphError::CycleDetected(msg)) => {
            assert!(msg.contains("cycle detected"));
            assert!(msg.contains('a') || msg.contains('b'));
        }
        Err(e) => panic!("Expected CycleDetected, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn zero_event_buffer_is_rejected() {
    let raw = WorkflowBuilder::new().node("a", "text", Value::Null).raw();
    let raw = studiograph::config::RawWorkflowFile {
        config: studiograph::config::ConfigSection {
            event_buffer: 0,
            ..raw.config
        },
        ..raw
    };
    assert!(matches!(
        studiograph::config::WorkflowFile::try_from(raw),
        Err(GraphError::ConfigError(msg)) if msg.contains("event_buffer")
    ));
}

#[test]
fn empty_workflow_and_blank_kind_are_rejected() {
    let empty = WorkflowBuilder::new().raw();
    assert!(matches!(
        studiograph::config::WorkflowFile::try_from(empty),
        Err(GraphError::ConfigError(_))
    ));

    let blank = WorkflowBuilder::new().node("a", "  ", Value::Null).raw();
    assert!(matches!(
        studiograph::config::WorkflowFile::try_from(blank),
        Err(GraphError::ConfigError(msg)) if msg.contains("empty `kind`")
    ));
}

#[test]
fn malformed_port_reference_fails_to_parse() {
    let err = parse_workflow(
        r#"
[node.a]
kind = "text"

[[edge]]
from = "a"
to = "a.prompt"
"#,
        WorkflowFormat::Toml,
    )
    .unwrap_err();
    assert!(matches!(err, GraphError::TomlError(_)));
}

#[test]
fn missing_file_is_reported_through_the_filesystem() {
    let fs = MockFileSystem::new();
    match load_and_validate_with_fs(&fs, "nowhere.toml") {
        Err(GraphError::ConfigError(msg)) => assert!(msg.contains("does not exist")),
        other => panic!("Expected ConfigError, got: {:?}", other),
    }
}

#[test]
fn mock_filesystem_serves_workflows() -> TestResult {
    let fs = MockFileSystem::new();
    fs.add_file(
        "flows/custom.json",
        r#"{ "node": { "x": { "kind": "mystery", "params": { "depth": 3 } } } }"#,
    );

    let workflow = load_and_validate_with_fs(&fs, "flows/custom.json")?;
    let mut store = GraphStore::new();
    let report = store.load_workflow(&workflow)?;
    let node = store.node(&report.id_map["x"]).unwrap();
    assert_eq!(node.kind, NodeKind::Other("mystery".into()));
    Ok(())
}

#[test]
fn results_are_written_as_json() -> TestResult {
    let workflow = WorkflowBuilder::new()
        .node("idea", "text", json!({ "prompt": "p" }))
        .build();
    let mut store = GraphStore::new();
    store.load_workflow(&workflow)?;

    let fs = MockFileSystem::new();
    write_results(&fs, Path::new("out/results.json"), &store)?;

    let written: Value = serde_json::from_slice(&fs.contents("out/results.json").unwrap())?;
    let nodes = written.as_array().unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0]["label"], "idea");
    assert_eq!(nodes[0]["status"], "idle");
    assert_eq!(nodes[0]["kind"], "text");
    Ok(())
}

#[tokio::test]
async fn dry_run_does_not_execute() -> TestResult {
    let mut args = args(&demo("storyboard.toml"));
    args.dry_run = true;
    studiograph::run(args).await?;
    Ok(())
}

#[tokio::test]
async fn cli_run_writes_final_node_states() -> TestResult {
    let dir = tempdir()?;
    let results = dir.path().join("nested").join("results.json");

    let mut args = args(&demo("storyboard.toml"));
    args.results = Some(results.to_string_lossy().into_owned());
    studiograph::run(args).await?;

    let written: Value = serde_json::from_str(&std::fs::read_to_string(&results)?)?;
    let nodes = written.as_array().unwrap();
    assert_eq!(nodes.len(), 5);
    assert!(nodes.iter().all(|n| n["status"] == "succeeded"));
    Ok(())
}

#[tokio::test]
async fn cli_run_can_target_a_single_node() -> TestResult {
    let dir = tempdir()?;
    let results = dir.path().join("results.json");

    let mut args = args(&demo("storyboard.toml"));
    args.node = Some("poster".into());
    args.results = Some(results.to_string_lossy().into_owned());
    studiograph::run(args).await?;

    let written: Value = serde_json::from_str(&std::fs::read_to_string(&results)?)?;
    let finished: Vec<&str> = written
        .as_array()
        .unwrap()
        .iter()
        .filter(|n| n["status"] == "succeeded")
        .filter_map(|n| n["label"].as_str())
        .collect();
    assert_eq!(finished.len(), 2);
    assert!(finished.contains(&"Idea") && finished.contains(&"poster"));
    Ok(())
}

#[tokio::test]
async fn cli_rejects_unknown_target_node() {
    let mut args = args(&demo("storyboard.toml"));
    args.node = Some("nope".into());
    let err = studiograph::run(args).await.unwrap_err();
    assert!(err.to_string().contains("not part of the workflow"));
}
