// src/exec/builtin.rs

//! Built-in offline handlers.
//!
//! None of these reach out to a model provider. Generation kinds get a
//! deterministic placeholder so a workflow can be run end to end without
//! credentials.

use std::time::Duration;

use serde_json::{Value, json};
use tracing::warn;

use crate::graph::model::{NodeKind, NodeParams, TransformOp};
use crate::types::{Artifact, DataType, NodeOutput};

use super::handler::{
    HandlerFuture, NodeError, NodeHandler, NodeInputs, NodeRequest, ProgressReporter,
    value_to_text,
};

/// Content address of a placeholder result.
fn content_address(kind: &NodeKind, prompt: &str, inputs: &NodeInputs) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(&[0]);
    hasher.update(prompt.as_bytes());
    hasher.update(&[0]);
    hasher.update(inputs.to_json().to_string().as_bytes());
    let hex = hasher.finalize().to_hex();
    hex.as_str()[..16].to_string()
}

fn media_type(kind: &NodeKind) -> DataType {
    match kind {
        NodeKind::Text => DataType::Text,
        NodeKind::Image => DataType::Image,
        NodeKind::Video => DataType::Video,
        NodeKind::Audio => DataType::Audio,
        _ => DataType::Any,
    }
}

/// Stand-in for the text/image/video/audio generation steps.
///
/// The prompt is the node's own prompt followed by any upstream text on the
/// `prompt` and `context` ports. Text nodes produce a plain string; the media
/// kinds produce `{preview, prompt, model}` plus a `placeholder://` artifact.
#[derive(Debug, Clone)]
pub struct PlaceholderGenerator {
    /// Simulated latency between progress reports.
    pub step_delay: Duration,
    pub steps: u8,
}

impl Default for PlaceholderGenerator {
    fn default() -> Self {
        Self {
            step_delay: Duration::ZERO,
            steps: 2,
        }
    }
}

impl PlaceholderGenerator {
    fn compose_prompt(request: &NodeRequest) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(own) = request.params.prompt() {
            if !own.trim().is_empty() {
                parts.push(own.trim().to_string());
            }
        }
        for port in ["prompt", "context"] {
            parts.extend(
                request
                    .inputs
                    .texts(port)
                    .into_iter()
                    .filter(|t| !t.trim().is_empty()),
            );
        }
        parts.join("\n")
    }

    fn model(params: &NodeParams) -> Option<&str> {
        match params {
            NodeParams::Text(p) => p.model.as_deref(),
            NodeParams::Image(p) => p.model.as_deref(),
            NodeParams::Video(p) => p.model.as_deref(),
            NodeParams::Audio(p) => p.model.as_deref(),
            _ => None,
        }
    }
}

impl NodeHandler for PlaceholderGenerator {
    fn execute(&self, request: NodeRequest, progress: ProgressReporter) -> HandlerFuture<'_> {
        Box::pin(async move {
            let prompt = Self::compose_prompt(&request);
            if prompt.is_empty() && request.inputs.is_empty() {
                return Err(NodeError::InvalidInput(format!(
                    "{} node has no prompt and no inputs",
                    request.kind
                )));
            }

            let steps = self.steps.max(1);
            for step in 1..steps {
                if request.cancel.is_cancelled() {
                    return Err(NodeError::Canceled);
                }
                if !self.step_delay.is_zero() {
                    tokio::time::sleep(self.step_delay).await;
                }
                let pct = (u16::from(step) * 100 / u16::from(steps)) as u8;
                progress.report(pct, Some(format!("step {step}/{steps}"))).await;
            }

            let address = content_address(&request.kind, &prompt, &request.inputs);
            let kind = request.kind.as_str();

            if request.kind == NodeKind::Text {
                let text = format!("[{address}] {prompt}");
                return Ok(NodeOutput::new(kind, Value::String(text)));
            }

            let uri = format!("placeholder://{kind}/{address}");
            let data = json!({
                "preview": uri,
                "prompt": prompt,
                "model": Self::model(&request.params),
            });
            Ok(NodeOutput::new(kind, data).with_artifact(Artifact {
                name: format!("{}.{kind}", request.node_id),
                uri,
                media_type: Some(media_type(&request.kind)),
            }))
        })
    }
}

/// Hands the configured source to downstream nodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct UploadHandler;

impl NodeHandler for UploadHandler {
    fn execute(&self, request: NodeRequest, _progress: ProgressReporter) -> HandlerFuture<'_> {
        Box::pin(async move {
            let NodeParams::Upload(params) = &request.params else {
                return Err(NodeError::InvalidInput("upload node without upload params".into()));
            };
            if params.source.trim().is_empty() {
                return Err(NodeError::InvalidInput("upload source is empty".into()));
            }
            let output = NodeOutput::new("upload", Value::String(params.source.clone()));
            Ok(output.with_artifact(Artifact {
                name: request.label.clone(),
                uri: params.source.clone(),
                media_type: params.media_type,
            }))
        })
    }
}

/// Text operations on the single `input` value.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformHandler;

impl TransformHandler {
    fn apply(op: TransformOp, template: Option<&str>, input: &Value) -> Result<Value, NodeError> {
        let text = value_to_text(input);
        let out = match op {
            TransformOp::Identity => return Ok(input.clone()),
            TransformOp::Uppercase => text.to_uppercase(),
            TransformOp::Lowercase => text.to_lowercase(),
            TransformOp::Trim => text.trim().to_string(),
            TransformOp::Template => {
                let template = template.ok_or_else(|| {
                    NodeError::InvalidInput("template operation requires `template`".into())
                })?;
                template.replace("{input}", &text)
            }
        };
        Ok(Value::String(out))
    }
}

impl NodeHandler for TransformHandler {
    fn execute(&self, request: NodeRequest, _progress: ProgressReporter) -> HandlerFuture<'_> {
        Box::pin(async move {
            let NodeParams::Transform(params) = &request.params else {
                return Err(NodeError::InvalidInput(
                    "transform node without transform params".into(),
                ));
            };
            let input = request
                .inputs
                .first("input")
                .ok_or_else(|| NodeError::InvalidInput("transform has no input".into()))?;
            let data = Self::apply(params.operation, params.template.as_deref(), input)?;
            Ok(NodeOutput::new("transform", data))
        })
    }
}

/// Joins every value on `inputs` into one text.
#[derive(Debug, Clone, Copy, Default)]
pub struct CombineHandler;

impl NodeHandler for CombineHandler {
    fn execute(&self, request: NodeRequest, _progress: ProgressReporter) -> HandlerFuture<'_> {
        Box::pin(async move {
            let separator = match &request.params {
                NodeParams::Combine(p) => p.separator.as_str(),
                _ => "\n",
            };
            let joined = request.inputs.texts("inputs").join(separator);
            Ok(NodeOutput::new("combine", Value::String(joined)))
        })
    }
}

/// Terminal sink. Publishes whatever arrived on `result`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputHandler;

impl NodeHandler for OutputHandler {
    fn execute(&self, request: NodeRequest, _progress: ProgressReporter) -> HandlerFuture<'_> {
        Box::pin(async move {
            let data = match request.inputs.all("result") {
                [] => Value::Null,
                [single] => single.clone(),
                many => Value::Array(many.to_vec()),
            };
            Ok(NodeOutput::new("output", data))
        })
    }
}

/// Fallback for kinds nothing is registered for.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughHandler;

impl NodeHandler for PassthroughHandler {
    fn execute(&self, request: NodeRequest, _progress: ProgressReporter) -> HandlerFuture<'_> {
        Box::pin(async move {
            warn!(
                node = %request.node_id,
                kind = %request.kind,
                "no handler registered for node kind; passing inputs through"
            );
            Ok(NodeOutput::new("unknown", request.inputs.to_json()))
        })
    }
}
