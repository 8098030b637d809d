//! Per-request pipeline state.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde_json::Value;
use supportpilot_shared::{Intent, Metrics, ProcessResult, Sentiment, Source, StepRecord, Urgency};

/// Answer reported when a run finishes without a draft.
pub const NO_RESPONSE: &str = "No response generated.";

/// Everything the stages know about one request.
///
/// Each stage takes the state by value and hands back the next one. A run
/// owns its state exclusively; nothing is shared between concurrent runs.
#[derive(Debug, Clone)]
pub struct PipelineState {
    request_text: String,
    pub intent: Option<Intent>,
    pub sentiment: Option<Sentiment>,
    pub urgency: Option<Urgency>,
    /// Best match first.
    pub sources: Vec<Source>,
    pub answer: Option<String>,
    pub is_safe: Option<bool>,
    pub validation_reasons: Option<Vec<String>>,
    trace: Vec<StepRecord>,
    pub metrics: Metrics,
    start_time: Instant,
    started_at: DateTime<Utc>,
}

impl PipelineState {
    pub fn new(request_text: impl Into<String>) -> Self {
        Self {
            request_text: request_text.into(),
            intent: None,
            sentiment: None,
            urgency: None,
            sources: Vec::new(),
            answer: None,
            is_safe: None,
            validation_reasons: None,
            trace: Vec::new(),
            metrics: Metrics::default(),
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }

    pub fn request_text(&self) -> &str {
        &self.request_text
    }

    pub fn trace(&self) -> &[StepRecord] {
        &self.trace
    }

    /// Wall-clock time the run was created.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Time since the state was created.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Append one stage's audit record. The trace is append-only.
    pub fn record(
        &mut self,
        agent_name: &str,
        step_name: &str,
        input: Value,
        output: Value,
        duration: Duration,
    ) {
        self.trace
            .push(StepRecord::new(agent_name, step_name, input, output, duration));
    }

    /// Project the final state into what callers receive.
    pub fn into_result(self) -> ProcessResult {
        ProcessResult {
            answer: self.answer.unwrap_or_else(|| NO_RESPONSE.to_string()),
            sources: self.sources,
            trace: self.trace,
            metrics: self.metrics,
        }
    }
}
