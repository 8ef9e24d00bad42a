// src/dag/status.rs

//! Node lifecycle state machine.
//!
//! Every status change on a node, whether applied by the executor, the graph
//! store, or a client-side projection, goes through
//! [`validate_status_transition`]. Illegal transitions are reported as a
//! [`StatusTransitionError`]; they are never clamped to a nearby legal state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle status of a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Idle,
    Queued,
    Running,
    Succeeded,
    Failed,
    Canceled,
    Dirty,
}

impl NodeStatus {
    pub const ALL: [NodeStatus; 7] = [
        NodeStatus::Idle,
        NodeStatus::Queued,
        NodeStatus::Running,
        NodeStatus::Succeeded,
        NodeStatus::Failed,
        NodeStatus::Canceled,
        NodeStatus::Dirty,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeStatus::Idle => "idle",
            NodeStatus::Queued => "queued",
            NodeStatus::Running => "running",
            NodeStatus::Succeeded => "succeeded",
            NodeStatus::Failed => "failed",
            NodeStatus::Canceled => "canceled",
            NodeStatus::Dirty => "dirty",
        }
    }

    /// States a node may move to from `self` (excluding the no-op self loop).
    pub fn legal_next(self) -> &'static [NodeStatus] {
        use NodeStatus::*;
        match self {
            Idle => &[Queued],
            Queued => &[Running, Canceled],
            Running => &[Succeeded, Failed, Canceled],
            Succeeded => &[Dirty, Idle],
            Failed => &[Queued, Dirty, Idle],
            Canceled => &[Queued, Idle],
            Dirty => &[Queued, Idle],
        }
    }

    /// Whether a run has finished with this node.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeStatus::Succeeded | NodeStatus::Failed | NodeStatus::Canceled
        )
    }

    /// Legal path from `self` to `queued`, not including `self`.
    ///
    /// Returns `None` for `running`, which has to finish before it can be
    /// queued again.
    pub fn requeue_path(self) -> Option<&'static [NodeStatus]> {
        use NodeStatus::*;
        match self {
            Queued => Some(&[]),
            Idle | Failed | Canceled | Dirty => Some(&[Queued]),
            Succeeded => Some(&[Dirty, Queued]),
            Running => None,
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| format!("invalid node status: {s}"))
    }
}

/// Named action behind a legal transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionAction {
    Queue,
    Start,
    Cancel,
    Complete,
    Fail,
    Invalidate,
    Reset,
    Retry,
    Rerun,
    /// Same-state transition.
    Noop,
}

/// Rejected status transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}illegal status transition {from} -> {to} (legal next states: {})", node_prefix(.node), format_states(.allowed))]
pub struct StatusTransitionError {
    pub from: NodeStatus,
    pub to: NodeStatus,
    pub allowed: Vec<NodeStatus>,
    pub node: Option<String>,
}

impl StatusTransitionError {
    /// Attach a node id for context.
    pub fn for_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }
}

fn node_prefix(node: &Option<String>) -> String {
    match node {
        Some(id) => format!("node '{id}': "),
        None => String::new(),
    }
}

fn format_states(states: &[NodeStatus]) -> String {
    states
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Look up the named action for `from -> to`, or `None` if illegal.
pub fn transition_action(from: NodeStatus, to: NodeStatus) -> Option<TransitionAction> {
    use NodeStatus::*;
    use TransitionAction as A;

    if from == to {
        return Some(A::Noop);
    }

    let action = match (from, to) {
        (Idle, Queued) => A::Queue,
        (Queued, Running) => A::Start,
        (Queued, Canceled) => A::Cancel,
        (Running, Succeeded) => A::Complete,
        (Running, Failed) => A::Fail,
        (Running, Canceled) => A::Cancel,
        (Succeeded, Dirty) => A::Invalidate,
        (Succeeded, Idle) => A::Reset,
        (Failed, Queued) => A::Retry,
        (Failed, Dirty) => A::Invalidate,
        (Failed, Idle) => A::Reset,
        (Canceled, Queued) => A::Rerun,
        (Canceled, Idle) => A::Reset,
        (Dirty, Queued) => A::Queue,
        (Dirty, Idle) => A::Reset,
        _ => return None,
    };

    Some(action)
}

/// Check whether `from -> to` is a legal transition.
pub fn validate_status_transition(
    from: NodeStatus,
    to: NodeStatus,
) -> Result<TransitionAction, StatusTransitionError> {
    transition_action(from, to).ok_or_else(|| StatusTransitionError {
        from,
        to,
        allowed: from.legal_next().to_vec(),
        node: None,
    })
}

/// Every state that appears as the target of some legal, non-self transition.
pub fn reachable_states() -> Vec<NodeStatus> {
    let mut reachable: Vec<NodeStatus> = NodeStatus::ALL
        .into_iter()
        .flat_map(|s| s.legal_next().iter().copied())
        .collect();
    reachable.sort();
    reachable.dedup();
    reachable
}

/// Standing invariants of the automaton: every state can leave, and every
/// state other than the start state can be entered.
pub fn check_machine_invariants() -> Result<(), String> {
    let reachable = reachable_states();

    for state in NodeStatus::ALL {
        if state.legal_next().is_empty() {
            return Err(format!("state '{state}' has no outgoing transition"));
        }
        for next in state.legal_next() {
            if transition_action(state, *next).is_none() {
                return Err(format!(
                    "legal_next lists {state} -> {next} but the table rejects it"
                ));
            }
        }
        if state != NodeStatus::Idle && !reachable.contains(&state) {
            return Err(format!("state '{state}' is unreachable"));
        }
    }

    Ok(())
}
