use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use supportpilot_llm::{ChatMessage, CompletionService};
use supportpilot_shared::Result;
use tracing::{debug, instrument, warn};

use super::{CallOutcome, ParsedReply, Stage, json_object};
use crate::state::PipelineState;

/// Verdict on a drafted answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Validation {
    pub is_safe: bool,
    pub issues: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Validation {
    /// Adopted when the reply cannot be read. Passes the answer.
    pub fn unparsable() -> Self {
        Self {
            is_safe: true,
            issues: vec!["Unable to parse validation response".into()],
            confidence: Some(0.5),
        }
    }

    /// Adopted when the validation call itself fails. Blocks the answer.
    pub fn system_error() -> Self {
        Self {
            is_safe: false,
            issues: vec!["Validation failed due to system error".into()],
            confidence: None,
        }
    }

    /// A JSON object is valid; a missing `is_safe` counts as unsafe and
    /// non-string issues are dropped.
    pub fn parse(reply: &str) -> ParsedReply<Self> {
        let Some(map) = json_object(reply) else {
            return ParsedReply::Unparsable;
        };

        ParsedReply::Valid(Self {
            is_safe: map.get("is_safe").and_then(|v| v.as_bool()).unwrap_or(false),
            issues: map
                .get("issues")
                .and_then(|v| v.as_array())
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|i| i.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default(),
            confidence: map.get("confidence").and_then(|v| v.as_f64()),
        })
    }
}

pub struct ValidateStage {
    completion: Arc<dyn CompletionService>,
    system_prompt: String,
}

impl ValidateStage {
    pub fn new(completion: Arc<dyn CompletionService>, system_prompt: impl Into<String>) -> Self {
        Self {
            completion,
            system_prompt: system_prompt.into(),
        }
    }
}

fn validation_prompt(state: &PipelineState) -> String {
    let sources: Vec<_> = state
        .sources
        .iter()
        .map(|s| json!({ "title": s.title, "content": s.content }))
        .collect();
    let sources = serde_json::to_string_pretty(&sources).unwrap_or_else(|_| "[]".into());

    format!(
        "Original Request:\n{}\n\nGenerated Response:\n{}\n\nAvailable Knowledge Sources:\n{}\n\nPlease validate this response:",
        state.request_text(),
        state.answer.as_deref().unwrap_or_default(),
        sources,
    )
}

#[async_trait]
impl Stage for ValidateStage {
    fn agent_name(&self) -> &'static str {
        "GuardAgent"
    }

    fn step_name(&self) -> &'static str {
        "validate_response"
    }

    #[instrument(skip_all, fields(step = "validate_response"))]
    async fn run(&self, mut state: PipelineState) -> Result<PipelineState> {
        let start = Instant::now();
        let input = json!({
            "request_text": state.request_text(),
            "response_length": state.answer.as_deref().map_or(0, |a| a.chars().count()),
            "sources_count": state.sources.len(),
        });

        let messages = [
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(validation_prompt(&state)),
        ];

        let outcome: CallOutcome<String> = self.completion.chat(&messages, true).await.into();
        let (validation, output) = match outcome {
            CallOutcome::Completed(reply) => {
                let validation = match Validation::parse(&reply) {
                    ParsedReply::Valid(v) => v,
                    ParsedReply::Unparsable => {
                        debug!("validation reply was not a JSON object, passing answer");
                        Validation::unparsable()
                    }
                };
                let output = json!(validation);
                (validation, output)
            }
            CallOutcome::Failed { error } => {
                warn!(%error, "validation call failed, blocking answer");
                (Validation::system_error(), json!({ "error": error }))
            }
        };

        debug!(is_safe = validation.is_safe, issues = validation.issues.len(), "validated response");
        state.is_safe = Some(validation.is_safe);
        state.validation_reasons = Some(validation.issues);

        state.record(
            self.agent_name(),
            self.step_name(),
            input,
            output,
            start.elapsed(),
        );
        Ok(state)
    }
}
