// src/engine/mod.rs

//! Execution engine.
//!
//! This module ties together:
//! - leveling of a graph snapshot (from [`crate::dag`])
//! - node dispatch through the handler registry (from [`crate::exec`])
//! - the run event stream consumed by clients and the CLI
//!
//! The level loop lives in [`executor`]; [`inputs`] gathers the values a
//! node receives, [`events`] defines the stream and [`run`] the run record.

pub mod events;
pub mod executor;
pub mod inputs;
pub mod run;

pub use events::{NodeRunStatus, RunEvent};
pub use executor::{Executor, ExecutorOptions, RunHandle};
pub use run::{Run, RunHistory, RunRecorder, RunStatus};
