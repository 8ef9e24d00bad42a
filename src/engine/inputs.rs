// src/engine/inputs.rs

//! Input collection for a node about to run.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::exec::handler::NodeInputs;
use crate::graph::ids::parse_port_id;
use crate::graph::model::{Node, NodeId};
use crate::graph::snapshot::GraphSnapshot;
use crate::types::NodeOutput;

/// Gather the values feeding `node`.
///
/// Manual inputs are the starting point. Every edge into the node adds the
/// producing node's output under the target port's name, in edge order; a
/// port supplied by at least one edge drops its manual value. Edges whose
/// producer has no recorded output contribute nothing.
pub fn collect_inputs(
    node: &Node,
    snapshot: &GraphSnapshot,
    outputs: &BTreeMap<NodeId, NodeOutput>,
) -> NodeInputs {
    let mut from_edges: BTreeMap<String, Vec<Value>> = BTreeMap::new();

    for edge in snapshot.edges_into(&node.id) {
        let Some(output) = outputs.get(&edge.source.node) else {
            continue;
        };
        let port = port_name(node, &edge.target.port);
        from_edges
            .entry(port)
            .or_default()
            .push(normalize_value(&output.data));
    }

    let mut inputs = NodeInputs::new();
    for (port, value) in &node.manual_inputs {
        if !from_edges.contains_key(port) {
            inputs.push(port.clone(), normalize_value(value));
        }
    }
    for (port, values) in from_edges {
        inputs.set(port, values);
    }
    inputs
}

/// Port name for a target port id, falling back to the raw id.
fn port_name(node: &Node, port: &str) -> String {
    if let Some(p) = node.inputs.iter().find(|p| p.id == port) {
        return p.name.clone();
    }
    match parse_port_id(port) {
        Some((_, _, name)) => name.to_string(),
        None => port.to_string(),
    }
}

/// Unwrap the envelopes values commonly arrive in.
///
/// A `{type, data}` node output becomes its `data`; an object carrying a
/// `preview` field becomes that field. Everything else is kept as is.
pub fn normalize_value(value: &Value) -> Value {
    let Value::Object(map) = value else {
        return value.clone();
    };

    if map.contains_key("type") && map.contains_key("data") {
        if let Some(data) = map.get("data") {
            return normalize_value(data);
        }
    }
    if let Some(preview) = map.get("preview") {
        return preview.clone();
    }
    value.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unwraps_node_output_envelope() {
        let v = json!({"type": "text", "data": "hello"});
        assert_eq!(normalize_value(&v), json!("hello"));
    }

    #[test]
    fn unwraps_preview() {
        let v = json!({"preview": "placeholder://image/abc", "prompt": "x"});
        assert_eq!(normalize_value(&v), json!("placeholder://image/abc"));
    }

    #[test]
    fn envelope_then_preview() {
        let v = json!({"type": "image", "data": {"preview": "p"}});
        assert_eq!(normalize_value(&v), json!("p"));
    }

    #[test]
    fn leaves_plain_objects_alone() {
        let v = json!({"a": 1});
        assert_eq!(normalize_value(&v), v);
    }
}
