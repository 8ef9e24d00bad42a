// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::dag::status::StatusTransitionError;
use crate::graph::validate::ConnectionError;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Edge not found: {0}")]
    EdgeNotFound(String),

    #[error("Node already exists: {0}")]
    DuplicateNode(String),

    #[error("Invalid params for node '{node}': {message}")]
    InvalidParams { node: String, message: String },

    #[error("Connection rejected: {0}")]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    IllegalTransition(#[from] StatusTransitionError),

    #[error("Cycle detected in graph: {0}")]
    CycleDetected(String),

    #[error("Corrupt graph snapshot: {0}")]
    CorruptSnapshot(String),

    #[error("Run recorder failed: {0}")]
    Recorder(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, GraphError>;
