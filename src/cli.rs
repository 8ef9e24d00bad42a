// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `studiograph`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "studiograph",
    version,
    about = "Run a typed media-production workflow graph.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the workflow file (TOML, or JSON with a `.json` extension).
    #[arg(long, value_name = "PATH", default_value = "workflow.toml")]
    pub workflow: String,

    /// Run only this node and everything it depends on.
    ///
    /// Accepts the id used in the workflow file or the canonical node id.
    #[arg(long, value_name = "ID")]
    pub node: Option<String>,

    /// Write the final node states as JSON to this path.
    #[arg(long, value_name = "PATH")]
    pub results: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `STUDIOGRAPH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Load and validate, print execution levels, but don't run any node.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
