// src/dag/mod.rs

//! DAG representation, leveling and node lifecycle.
//!
//! - [`graph`] holds node-level adjacency derived from a snapshot.
//! - [`levels`] partitions the graph into parallel-safe execution levels.
//! - [`status`] is the node status state machine.
//! - [`state_manager`] tracks per-run statuses on the executor side.

pub mod graph;
pub mod levels;
pub mod state_manager;
pub mod status;

pub use graph::DagGraph;
pub use levels::{Levels, compute_levels};
pub use state_manager::StateManager;
pub use status::{NodeStatus, StatusTransitionError, validate_status_transition};
