use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use supportpilot_shared::{Metrics, Result, SupportPilotError};
use tracing::{info, instrument, warn};

use super::Stage;
use crate::state::PipelineState;

const TOKENS_PER_STEP: u64 = 50;
const CHARS_PER_TOKEN: u64 = 4;
const MIN_TOKEN_USAGE: u64 = 100;

/// Summary of how the run went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    /// Non-empty answer that passed validation.
    pub success: bool,
    pub agents_executed: usize,
    pub sources_found: usize,
    pub classification_completed: bool,
    pub retrieval_completed: bool,
    pub response_generated: bool,
    pub validation_passed: bool,
    /// Validation issues, reported only when the answer did not pass.
    pub issues: Vec<String>,
}

impl Evaluation {
    pub fn of(state: &PipelineState) -> Self {
        let response_generated = state.answer.as_deref().is_some_and(|a| !a.is_empty());
        let validation_passed = state.is_safe.unwrap_or(false);

        Self {
            success: response_generated && validation_passed,
            agents_executed: state.trace().len(),
            sources_found: state.sources.len(),
            classification_completed: state.intent.is_some(),
            // Retrieval always completes; an empty result is still a result.
            retrieval_completed: true,
            response_generated,
            validation_passed,
            issues: if validation_passed {
                Vec::new()
            } else {
                state.validation_reasons.clone().unwrap_or_default()
            },
        }
    }
}

/// Rough token estimate: a fixed cost per recorded step plus a quarter of
/// the request, answer and source character counts. Never below 100.
pub fn estimate_token_usage(state: &PipelineState) -> u64 {
    let chars = |s: &str| s.chars().count() as u64;

    let steps = state.trace().len() as u64 * TOKENS_PER_STEP;
    let request = chars(state.request_text()) / CHARS_PER_TOKEN;
    let answer = state.answer.as_deref().map_or(0, chars) / CHARS_PER_TOKEN;
    let sources = state
        .sources
        .iter()
        .map(|s| chars(&s.content))
        .sum::<u64>()
        / CHARS_PER_TOKEN;

    (steps + request + answer + sources).max(MIN_TOKEN_USAGE)
}

/// Final stage: stamps metrics and the evaluation summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvaluateStage;

impl EvaluateStage {
    fn evaluate(state: &PipelineState) -> Result<(Metrics, Value)> {
        let metrics = Metrics {
            latency_ms: state.elapsed().as_millis() as u64,
            token_usage: estimate_token_usage(state),
        };
        let evaluation = serde_json::to_value(Evaluation::of(state))
            .map_err(|e| SupportPilotError::parse(format!("evaluation summary: {e}")))?;

        Ok((
            metrics,
            json!({ "final_metrics": metrics, "evaluation": evaluation }),
        ))
    }

    /// Stamp metrics and return the trace output. When evaluation failed,
    /// only latency is reported and token usage is zero.
    fn finish(state: &mut PipelineState, computed: Result<(Metrics, Value)>) -> Value {
        match computed {
            Ok((metrics, output)) => {
                info!(
                    latency_ms = metrics.latency_ms,
                    token_usage = metrics.token_usage,
                    "pipeline finished"
                );
                state.metrics = metrics;
                output
            }
            Err(e) => {
                warn!(error = %e, "evaluation failed, recording minimal metrics");
                state.metrics = Metrics {
                    latency_ms: state.elapsed().as_millis() as u64,
                    token_usage: 0,
                };
                json!({ "error": e.to_string() })
            }
        }
    }
}

#[async_trait]
impl Stage for EvaluateStage {
    fn agent_name(&self) -> &'static str {
        "LoggerAgent"
    }

    fn step_name(&self) -> &'static str {
        "final_evaluation"
    }

    #[instrument(skip_all, fields(step = "final_evaluation"))]
    async fn run(&self, mut state: PipelineState) -> Result<PipelineState> {
        let start = Instant::now();
        let input = json!({
            "total_steps": state.trace().len(),
            "sources_used": state.sources.len(),
            "response_generated": state.answer.as_deref().is_some_and(|a| !a.is_empty()),
            "validation_passed": state.is_safe.unwrap_or(false),
        });

        let computed = Self::evaluate(&state);
        let output = Self::finish(&mut state, computed);

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
