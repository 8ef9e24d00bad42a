// src/exec/registry.rs

//! Node-kind dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::graph::model::NodeKind;

use super::builtin::{
    CombineHandler, OutputHandler, PassthroughHandler, PlaceholderGenerator, TransformHandler,
    UploadHandler,
};
use super::handler::NodeHandler;

/// Handlers keyed by node kind.
///
/// Kinds without a registered handler resolve to a passthrough that tags its
/// output `unknown`; they never fail a run.
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<NodeKind, Arc<dyn NodeHandler>>,
    fallback: Arc<dyn NodeHandler>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&str> = self.handlers.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("HandlerRegistry").field("kinds", &kinds).finish()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    /// Registry with no handlers; every kind falls through to passthrough.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: Arc::new(PassthroughHandler),
        }
    }

    /// Registry with the built-in offline handlers for every known kind.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let generator = Arc::new(PlaceholderGenerator::default());
        for kind in [NodeKind::Text, NodeKind::Image, NodeKind::Video, NodeKind::Audio] {
            registry.register_arc(kind, generator.clone());
        }
        registry.register(NodeKind::Upload, UploadHandler);
        registry.register(NodeKind::Transform, TransformHandler);
        registry.register(NodeKind::Combine, CombineHandler);
        registry.register(NodeKind::Output, OutputHandler);
        registry
    }

    /// Register (or replace) the handler for `kind`.
    pub fn register<H>(&mut self, kind: NodeKind, handler: H) -> &mut Self
    where
        H: NodeHandler + 'static,
    {
        self.register_arc(kind, Arc::new(handler))
    }

    pub fn register_arc(&mut self, kind: NodeKind, handler: Arc<dyn NodeHandler>) -> &mut Self {
        debug!(kind = %kind, "registering node handler");
        self.handlers.insert(kind, handler);
        self
    }

    pub fn contains(&self, kind: &NodeKind) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Handler for `kind`, or the passthrough fallback.
    pub fn resolve(&self, kind: &NodeKind) -> Arc<dyn NodeHandler> {
        self.handlers
            .get(kind)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}
