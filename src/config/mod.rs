// src/config/mod.rs

//! Workflow file loading and validation.
//!
//! Responsibilities:
//! - Define the serde data model (`model.rs`).
//! - Load a workflow file through the [`crate::fs::FileSystem`] trait (`loader.rs`).
//! - Validate file-level invariants like acyclicity (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_and_validate_with_fs, load_from_path};
pub use model::{ConfigSection, EdgeSpec, NodeSpec, PortRef, RawWorkflowFile, WorkflowFile};
pub use validate::validate_workflow;
