use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use supportpilot_llm::{ChatMessage, CompletionService};
use supportpilot_shared::{Intent, Result, Sentiment, Urgency};
use tracing::{debug, instrument, warn};

use super::{CallOutcome, ParsedReply, Stage, json_object};
use crate::state::PipelineState;

/// Intent, sentiment and urgency of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Classification {
    pub intent: Intent,
    pub sentiment: Sentiment,
    pub urgency: Urgency,
}

impl Classification {
    /// `(general_question, neutral, medium)`.
    pub const FALLBACK: Self = Self {
        intent: Intent::GeneralQuestion,
        sentiment: Sentiment::Neutral,
        urgency: Urgency::Medium,
    };

    /// A JSON object is valid; each missing or unknown label takes its
    /// fallback value. Anything else is unparsable.
    pub fn parse(reply: &str) -> ParsedReply<Self> {
        let Some(map) = json_object(reply) else {
            return ParsedReply::Unparsable;
        };
        let label = |key: &str| map.get(key).and_then(|v| v.as_str());

        ParsedReply::Valid(Self {
            intent: label("intent").and_then(Intent::from_label).unwrap_or_default(),
            sentiment: label("sentiment")
                .and_then(Sentiment::from_label)
                .unwrap_or_default(),
            urgency: label("urgency").and_then(Urgency::from_label).unwrap_or_default(),
        })
    }
}

pub struct ClassifyStage {
    completion: Arc<dyn CompletionService>,
    system_prompt: String,
}

impl ClassifyStage {
    pub fn new(completion: Arc<dyn CompletionService>, system_prompt: impl Into<String>) -> Self {
        Self {
            completion,
            system_prompt: system_prompt.into(),
        }
    }
}

#[async_trait]
impl Stage for ClassifyStage {
    fn agent_name(&self) -> &'static str {
        "ClassifierAgent"
    }

    fn step_name(&self) -> &'static str {
        "classify_request"
    }

    #[instrument(skip_all, fields(step = "classify_request"))]
    async fn run(&self, mut state: PipelineState) -> Result<PipelineState> {
        let start = Instant::now();
        let messages = [
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(format!(
                "Please classify this support request:\n\n{}",
                state.request_text()
            )),
        ];

        let outcome: CallOutcome<String> = self.completion.chat(&messages, true).await.into();
        let (classification, output) = match outcome {
            CallOutcome::Completed(reply) => {
                let classification = match Classification::parse(&reply) {
                    ParsedReply::Valid(c) => c,
                    ParsedReply::Unparsable => {
                        debug!("classification reply was not a JSON object, using fallback");
                        Classification::FALLBACK
                    }
                };
                (classification, json!(classification))
            }
            CallOutcome::Failed { error } => {
                warn!(%error, "classification call failed, using fallback");
                (Classification::FALLBACK, json!({ "error": error }))
            }
        };

        debug!(
            intent = %classification.intent,
            sentiment = %classification.sentiment,
            urgency = %classification.urgency,
            "classified request"
        );

        state.intent = Some(classification.intent);
        state.sentiment = Some(classification.sentiment);
        state.urgency = Some(classification.urgency);

        let input = json!({ "request_text": state.request_text() });
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
