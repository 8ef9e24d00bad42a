#![allow(dead_code)]

use std::collections::BTreeMap;

use serde_json::{Value, json};
use studiograph::config::{ConfigSection, EdgeSpec, NodeSpec, PortRef, RawWorkflowFile, WorkflowFile};
use studiograph::graph::{GraphSnapshot, GraphStore, NodeId, NodeKind};

/// Builder for a `GraphStore` where nodes are addressed by short test names.
pub struct GraphBuilder {
    store: GraphStore,
    ids: BTreeMap<String, NodeId>,
}

/// A built graph plus the name → id mapping used to build it.
pub struct TestGraph {
    pub store: GraphStore,
    pub ids: BTreeMap<String, NodeId>,
}

impl TestGraph {
    pub fn id(&self, name: &str) -> NodeId {
        self.ids
            .get(name)
            .cloned()
            .unwrap_or_else(|| panic!("no node named '{name}' in test graph"))
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        self.store.snapshot()
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            store: GraphStore::new(),
            ids: BTreeMap::new(),
        }
    }

    pub fn node(mut self, name: &str, kind: NodeKind, params: Value) -> Self {
        let id = self
            .store
            .create_node(kind, name, params)
            .expect("Failed to create node from builder");
        self.ids.insert(name.to_string(), id);
        self
    }

    /// Text generation node with a prompt.
    pub fn text(self, name: &str, prompt: &str) -> Self {
        self.node(name, NodeKind::Text, json!({ "prompt": prompt }))
    }

    /// Node of a kind without a registered built-in handler.
    pub fn custom(self, name: &str, kind: &str) -> Self {
        self.node(name, NodeKind::Other(kind.to_string()), Value::Null)
    }

    /// Connect `from.port` to `to.port` by port name; panics if rejected.
    pub fn edge(mut self, from: &str, from_port: &str, to: &str, to_port: &str) -> Self {
        let source = self.ids[from].clone();
        let target = self.ids[to].clone();
        self.store
            .connect(&source, from_port, &target, to_port)
            .unwrap_or_else(|e| panic!("edge {from}.{from_port} -> {to}.{to_port} rejected: {e}"));
        self
    }

    pub fn build(self) -> TestGraph {
        TestGraph {
            store: self.store,
            ids: self.ids,
        }
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `WorkflowFile` to simplify loader and store tests.
pub struct WorkflowBuilder {
    raw: RawWorkflowFile,
}

impl WorkflowBuilder {
    pub fn new() -> Self {
        Self {
            raw: RawWorkflowFile {
                config: ConfigSection::default(),
                node: BTreeMap::new(),
                edge: Vec::new(),
            },
        }
    }

    pub fn node(mut self, id: &str, kind: &str, params: Value) -> Self {
        self.raw.node.insert(
            id.to_string(),
            NodeSpec {
                kind: kind.to_string(),
                label: None,
                params,
                inputs: BTreeMap::new(),
                position: None,
            },
        );
        self
    }

    pub fn manual_input(mut self, id: &str, port: &str, value: Value) -> Self {
        self.raw
            .node
            .get_mut(id)
            .expect("manual_input on unknown node")
            .inputs
            .insert(port.to_string(), value);
        self
    }

    pub fn edge(mut self, from: &str, from_port: &str, to: &str, to_port: &str) -> Self {
        self.raw.edge.push(EdgeSpec {
            from: PortRef::new(from, from_port),
            to: PortRef::new(to, to_port),
        });
        self
    }

    pub fn project(mut self, project: &str) -> Self {
        self.raw.config.project = Some(project.to_string());
        self
    }

    pub fn raw(self) -> RawWorkflowFile {
        self.raw
    }

    pub fn build(self) -> WorkflowFile {
        WorkflowFile::try_from(self.raw).expect("Failed to build valid workflow from builder")
    }
}

impl Default for WorkflowBuilder {
    fn default() -> Self {
        Self::new()
    }
}
