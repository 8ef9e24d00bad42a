// src/config/loader.rs

use std::path::Path;

use tracing::debug;

use crate::config::model::{RawWorkflowFile, WorkflowFile};
use crate::errors::{GraphError, Result};
use crate::fs::{FileSystem, RealFileSystem};

/// On-disk format of a workflow file, picked by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowFormat {
    Toml,
    Json,
}

impl WorkflowFormat {
    /// `.json` is JSON; anything else is read as TOML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => WorkflowFormat::Json,
            _ => WorkflowFormat::Toml,
        }
    }
}

/// Parse workflow text without semantic validation.
pub fn parse_workflow(contents: &str, format: WorkflowFormat) -> Result<RawWorkflowFile> {
    let raw = match format {
        WorkflowFormat::Toml => toml::from_str(contents)?,
        WorkflowFormat::Json => serde_json::from_str(contents)?,
    };
    Ok(raw)
}

/// Load a workflow file from `path` and return the raw `RawWorkflowFile`.
///
/// This only deserializes; use [`load_and_validate`] for the checks.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawWorkflowFile> {
    load_from_path_with_fs(&RealFileSystem, path)
}

/// Like [`load_from_path`], reading through `fs`.
pub fn load_from_path_with_fs(
    fs: &dyn FileSystem,
    path: impl AsRef<Path>,
) -> Result<RawWorkflowFile> {
    let path = path.as_ref();
    if !fs.is_file(path) {
        return Err(GraphError::ConfigError(format!(
            "workflow file {:?} does not exist",
            path
        )));
    }
    let contents = fs.read_to_string(path)?;
    let format = WorkflowFormat::from_path(path);
    debug!(path = ?path, ?format, "parsing workflow file");
    parse_workflow(&contents, format)
}

/// Load a workflow file and run file-level validation.
///
/// This is the entry point the rest of the application uses:
///
/// - Reads TOML or JSON.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks for:
///   - edges naming unknown nodes or connecting a node to itself,
///   - cycles,
///   - basic `[config]` sanity.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<WorkflowFile> {
    load_and_validate_with_fs(&RealFileSystem, path)
}

pub fn load_and_validate_with_fs(
    fs: &dyn FileSystem,
    path: impl AsRef<Path>,
) -> Result<WorkflowFile> {
    let raw = load_from_path_with_fs(fs, path)?;
    WorkflowFile::try_from(raw)
}
