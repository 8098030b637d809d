use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::json;
use supportpilot_llm::{ChatMessage, CompletionService};
use supportpilot_shared::Result;
use tracing::{debug, instrument, warn};

use super::{CallOutcome, Stage};
use crate::state::PipelineState;

/// Answer used when the completion call fails.
pub const DRAFT_FALLBACK: &str = "I apologize, but I'm unable to generate a response at this moment. Please try again or contact our support team directly.";

const PREVIEW_CHARS: usize = 200;

pub struct DraftStage {
    completion: Arc<dyn CompletionService>,
    system_prompt: String,
}

impl DraftStage {
    pub fn new(completion: Arc<dyn CompletionService>, system_prompt: impl Into<String>) -> Self {
        Self {
            completion,
            system_prompt: system_prompt.into(),
        }
    }
}

/// User prompt: the request, its classification and the numbered sources.
pub(crate) fn draft_prompt(state: &PipelineState) -> String {
    fn label(value: Option<impl std::fmt::Display>) -> String {
        value.map_or_else(|| "unknown".to_string(), |v| v.to_string())
    }

    let mut sources = String::new();
    if state.sources.is_empty() {
        sources.push_str("No specific knowledge sources were found for this request.");
    } else {
        sources.push_str("Knowledge Sources:\n");
        for (i, source) in state.sources.iter().enumerate() {
            let _ = write!(sources, "\n{}. {}\n{}\n", i + 1, source.title, source.content);
        }
    }

    format!(
        "Customer Request:\n{request}\n\nClassification:\n- Intent: {intent}\n- Sentiment: {sentiment}\n- Urgency: {urgency}\n\n{sources}\n\nPlease write a helpful response:",
        request = state.request_text(),
        intent = label(state.intent),
        sentiment = label(state.sentiment),
        urgency = label(state.urgency),
    )
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[async_trait]
impl Stage for DraftStage {
    fn agent_name(&self) -> &'static str {
        "WriterAgent"
    }

    fn step_name(&self) -> &'static str {
        "generate_response"
    }

    #[instrument(skip_all, fields(step = "generate_response", sources = state.sources.len()))]
    async fn run(&self, mut state: PipelineState) -> Result<PipelineState> {
        let start = Instant::now();
        let input = json!({
            "request_text": state.request_text(),
            "intent": state.intent,
            "sources_count": state.sources.len(),
        });

        let messages = [
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(draft_prompt(&state)),
        ];

        let outcome: CallOutcome<String> = self.completion.chat(&messages, false).await.into();
        let output = match outcome {
            CallOutcome::Completed(answer) => {
                let output = json!({
                    "response_length": answer.chars().count(),
                    "response_preview": preview(&answer),
                });
                debug!(chars = answer.chars().count(), "drafted response");
                state.answer = Some(answer);
                output
            }
            CallOutcome::Failed { error } => {
                warn!(%error, "drafting call failed, using fallback answer");
                state.answer = Some(DRAFT_FALLBACK.to_string());
                json!({ "error": error })
            }
        };

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

#[cfg(test)]
mod tests {
    use super::*;
    use supportpilot_shared::{Intent, Source};

    #[test]
    fn prompt_marks_missing_classification_unknown() {
        let state = PipelineState::new("Where is my invoice?");
        let prompt = draft_prompt(&state);
        assert!(prompt.contains("Customer Request:\nWhere is my invoice?"));
        assert!(prompt.contains("- Intent: unknown"));
        assert!(prompt.contains("- Urgency: unknown"));
        assert!(prompt.contains("No specific knowledge sources were found"));
    }

    #[test]
    fn prompt_numbers_sources() {
        let mut state = PipelineState::new("reset password");
        state.intent = Some(Intent::AccountIssue);
        state.sources = vec![
            Source {
                id: "1".into(),
                title: "Password Reset Guide".into(),
                content: "Click 'Forgot Password'.".into(),
                similarity_score: 0.85,
            },
            Source {
                id: "2".into(),
                title: "Login Issues".into(),
                content: "Clear your cache.".into(),
                similarity_score: 0.72,
            },
        ];
        let prompt = draft_prompt(&state);
        assert!(prompt.contains("- Intent: account_issue"));
        assert!(prompt.contains("\n1. Password Reset Guide\nClick 'Forgot Password'.\n"));
        assert!(prompt.contains("\n2. Login Issues\nClear your cache.\n"));
        assert!(!prompt.contains("No specific knowledge sources"));
    }

    #[test]
    fn preview_truncates_long_text_on_char_boundary() {
        assert_eq!(preview("short"), "short");
        let long = "é".repeat(250);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 3);
        assert_eq!(preview(&"a".repeat(PREVIEW_CHARS)), "a".repeat(PREVIEW_CHARS));
    }
}
