// src/graph/ids.rs

//! Canonical identifiers for nodes, ports and edges.
//!
//! Canonical node and edge ids are a prefix plus 16 lowercase hex chars
//! (`node_3f9c0a71d2b4e816`). Port ids are derived from their owning node id
//! so that every port can be traced back to its node:
//! `<node_id>:in:<name>` / `<node_id>:out:<name>`.
//!
//! Workflows produced elsewhere (generated by a prompt, pasted from another
//! project) may carry arbitrary ids. [`normalize_node_id`] maps those onto the
//! canonical format deterministically, so two references to the same external
//! id always resolve to the same node.

use std::sync::OnceLock;

use regex::Regex;
use uuid::Uuid;

use crate::types::PortDirection;

pub const NODE_PREFIX: &str = "node_";
pub const EDGE_PREFIX: &str = "edge_";

/// Length of the hex suffix of a canonical id.
const SUFFIX_LEN: usize = 16;

fn canonical_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(node|edge)_[0-9a-f]{16}$").expect("canonical id pattern is valid")
    })
}

/// Allocate a fresh random node id.
pub fn new_node_id() -> String {
    format!("{NODE_PREFIX}{}", random_suffix())
}

/// Allocate a fresh random edge id.
pub fn new_edge_id() -> String {
    format!("{EDGE_PREFIX}{}", random_suffix())
}

fn random_suffix() -> String {
    let simple = Uuid::new_v4().simple().to_string();
    simple[..SUFFIX_LEN].to_string()
}

pub fn is_canonical_node_id(id: &str) -> bool {
    id.starts_with(NODE_PREFIX) && canonical_re().is_match(id)
}

pub fn is_canonical_edge_id(id: &str) -> bool {
    id.starts_with(EDGE_PREFIX) && canonical_re().is_match(id)
}

/// Map an externally supplied node id onto the canonical format.
///
/// Canonical ids are returned unchanged; anything else is hashed.
pub fn normalize_node_id(raw: &str) -> String {
    if is_canonical_node_id(raw) {
        return raw.to_string();
    }
    format!("{NODE_PREFIX}{}", hashed_suffix(raw))
}

fn hashed_suffix(raw: &str) -> String {
    let hex = blake3::hash(raw.trim().as_bytes()).to_hex();
    hex.as_str()[..SUFFIX_LEN].to_string()
}

/// Port id for the port `name` on `node_id`.
pub fn port_id(node_id: &str, direction: PortDirection, name: &str) -> String {
    match direction {
        PortDirection::Input => format!("{node_id}:in:{name}"),
        PortDirection::Output => format!("{node_id}:out:{name}"),
    }
}

/// Split a derived port id into `(node_id, direction, name)`.
pub fn parse_port_id(port_id: &str) -> Option<(&str, PortDirection, &str)> {
    let mut parts = port_id.splitn(3, ':');
    let node = parts.next()?;
    let direction = match parts.next()? {
        "in" => PortDirection::Input,
        "out" => PortDirection::Output,
        _ => return None,
    };
    let name = parts.next()?;
    if node.is_empty() || name.is_empty() {
        return None;
    }
    Some((node, direction, name))
}
