// src/exec/mod.rs

//! Node execution layer.
//!
//! The executor never knows what a node actually does; it resolves a
//! [`NodeHandler`] for the node's kind and awaits it.
//!
//! - [`handler`] defines the `NodeHandler` contract, requests and errors.
//! - [`registry`] maps node kinds to handlers, with a passthrough fallback.
//! - [`builtin`] holds the offline handlers used by the CLI.

pub mod builtin;
pub mod handler;
pub mod registry;

pub use handler::{
    HandlerFuture, NodeError, NodeHandler, NodeInputs, NodeRequest, ProgressReporter, handler_fn,
};
pub use registry::HandlerRegistry;
