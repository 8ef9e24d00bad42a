// src/graph/mod.rs

//! Graph data model and the store that owns it.
//!
//! - [`model`] defines nodes, ports and edges.
//! - [`ids`] generates and normalizes identifiers.
//! - [`validate`] decides whether a connection may be added.
//! - [`store`] owns a graph and applies validated mutations.
//! - [`snapshot`] is the frozen copy handed to the executor.

pub mod ids;
pub mod model;
pub mod snapshot;
pub mod store;
pub mod validate;

pub use model::{Edge, EdgeId, Endpoint, Node, NodeId, NodeKind, NodeParams, Port, PortId};
pub use snapshot::GraphSnapshot;
pub use store::{GraphStore, LoadReport, NodeUpdate};
pub use validate::{ConnectionError, ConnectionRequest, ConnectionValidator, ValidationResult};
