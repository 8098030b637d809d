//! The five pipeline stages and the contract they share.

mod classify;
mod draft;
mod evaluate;
mod retrieve;
mod validate;

pub use classify::{Classification, ClassifyStage};
pub use draft::{DRAFT_FALLBACK, DraftStage};
pub use evaluate::{EvaluateStage, Evaluation, estimate_token_usage};
pub use retrieve::RetrieveStage;
pub use validate::{ValidateStage, Validation};

use async_trait::async_trait;
use supportpilot_shared::Result;

use crate::state::PipelineState;

/// One step of the pipeline: `PipelineState -> PipelineState`.
///
/// A stage absorbs its collaborators' failures into the state and appends
/// exactly one trace record. Returning `Err` (or panicking) means the step
/// itself failed and the harness may retry it.
#[async_trait]
pub trait Stage: Send + Sync {
    /// `agent_name` written to the trace.
    fn agent_name(&self) -> &'static str;

    /// `step_name` written to the trace.
    fn step_name(&self) -> &'static str;

    async fn run(&self, state: PipelineState) -> Result<PipelineState>;
}

/// Result of calling a collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome<T> {
    Completed(T),
    Failed { error: String },
}

impl<T, E: std::fmt::Display> From<std::result::Result<T, E>> for CallOutcome<T> {
    fn from(result: std::result::Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Completed(value),
            Err(e) => Self::Failed {
                error: e.to_string(),
            },
        }
    }
}

/// Result of interpreting a structured completion reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedReply<T> {
    Valid(T),
    Unparsable,
}

/// Decode a reply that should be a JSON object. Models sometimes wrap the
/// object in a Markdown code fence; that wrapper is removed first.
pub(crate) fn json_object(reply: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    let mut text = reply.trim();
    if let Some(inner) = text.strip_prefix("```") {
        let inner = match inner.get(..4) {
            Some(tag) if tag.eq_ignore_ascii_case("json") => &inner[4..],
            _ => inner,
        };
        text = inner.strip_suffix("```").unwrap_or(inner).trim();
    }

    match serde_json::from_str(text) {
        Ok(serde_json::Value::Object(map)) => Some(map),
        _ => None,
    }
}
