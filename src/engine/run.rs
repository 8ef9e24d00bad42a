// src/engine/run.rs

//! Run records and run history.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::errors::{GraphError, Result};
use crate::graph::model::NodeId;
use crate::types::NodeOutput;

/// Run-level status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    /// The whole graph was traversed. Individual nodes may still have failed.
    Completed,
    /// The scheduler itself hit an error and stopped.
    Failed,
    Canceled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// A single execution of a graph snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct Run {
    pub run_id: Uuid,
    pub project_scope: Option<String>,
    pub levels: Vec<Vec<NodeId>>,
    pub execution_order: Vec<NodeId>,
    pub outputs: BTreeMap<NodeId, NodeOutput>,
    pub failed_nodes: BTreeSet<NodeId>,
    pub skipped_nodes: BTreeSet<NodeId>,
    /// Nodes stopped or never dispatched because the run was canceled.
    pub canceled_nodes: BTreeSet<NodeId>,
    /// Nodes that reached succeeded, failed or skipped.
    pub completed: usize,
    pub total: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub error: Option<String>,
}

impl Run {
    pub fn new(project_scope: Option<String>, total: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            project_scope,
            levels: Vec::new(),
            execution_order: Vec::new(),
            outputs: BTreeMap::new(),
            failed_nodes: BTreeSet::new(),
            skipped_nodes: BTreeSet::new(),
            canceled_nodes: BTreeSet::new(),
            completed: 0,
            total,
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
            error: None,
        }
    }

    /// Nodes that produced an output.
    pub fn succeeded(&self) -> usize {
        self.outputs.len()
    }

    pub(crate) fn finalize(&mut self, status: RunStatus, error: Option<String>) {
        self.status = status;
        self.error = error;
        self.finished_at = Some(Utc::now());
    }
}

/// Hooks for keeping run metadata somewhere.
///
/// A failing `begin` aborts the run before any node is dispatched.
pub trait RunRecorder: Send + Sync {
    fn begin(&self, run: &Run) -> Result<()>;
    fn finish(&self, run: &Run) -> Result<()>;
}

/// In-memory run history. Finalized runs are stored as immutable copies.
#[derive(Debug, Clone, Default)]
pub struct RunHistory {
    active: Arc<Mutex<BTreeSet<Uuid>>>,
    finished: Arc<Mutex<Vec<Run>>>,
}

impl RunHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finalized runs, oldest first.
    pub fn runs(&self) -> Vec<Run> {
        match self.finished.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn get(&self, run_id: Uuid) -> Option<Run> {
        self.runs().into_iter().find(|r| r.run_id == run_id)
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().map(|g| g.len()).unwrap_or(0)
    }
}

impl RunRecorder for RunHistory {
    fn begin(&self, run: &Run) -> Result<()> {
        let mut active = self
            .active
            .lock()
            .map_err(|_| GraphError::Recorder("run history lock poisoned".to_string()))?;
        if !active.insert(run.run_id) {
            return Err(GraphError::Recorder(format!(
                "run {} already recorded",
                run.run_id
            )));
        }
        Ok(())
    }

    fn finish(&self, run: &Run) -> Result<()> {
        let mut active = self
            .active
            .lock()
            .map_err(|_| GraphError::Recorder("run history lock poisoned".to_string()))?;
        active.remove(&run.run_id);
        drop(active);

        let mut finished = self
            .finished
            .lock()
            .map_err(|_| GraphError::Recorder("run history lock poisoned".to_string()))?;
        finished.push(run.clone());
        Ok(())
    }
}
