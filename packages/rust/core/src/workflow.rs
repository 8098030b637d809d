//! Orchestrator: classify → retrieve → draft → validate → evaluate.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use supportpilot_knowledge::KnowledgeStore;
use supportpilot_llm::CompletionService;
use supportpilot_shared::{AppConfig, Metrics, ProcessResult, StepRecord};
use tracing::{error, info, instrument};

use crate::prompts::PromptSet;
use crate::stages::{ClassifyStage, DraftStage, EvaluateStage, RetrieveStage, Stage, ValidateStage};
use crate::state::PipelineState;
use crate::step::{DEFAULT_STEP_TIMEOUT, StepError, StepPolicy, run_step};

/// Settings injected into the orchestrator.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub policy: StepPolicy,
    /// Maximum sources retrieved per request.
    pub search_limit: usize,
    /// Minimum similarity for a source to be retrieved.
    pub similarity_threshold: f64,
    pub prompts: PromptSet,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            policy: StepPolicy::default(),
            search_limit: 5,
            similarity_threshold: 0.7,
            prompts: PromptSet::default(),
        }
    }
}

impl From<&AppConfig> for WorkflowConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            policy: StepPolicy {
                timeout: Duration::try_from_secs_f64(config.pipeline.step_timeout_secs)
                    .unwrap_or(DEFAULT_STEP_TIMEOUT),
                max_retries: config.pipeline.max_retries,
            },
            search_limit: config.pipeline.search_limit as usize,
            similarity_threshold: config.pipeline.similarity_threshold,
            prompts: PromptSet::from(&config.prompts),
        }
    }
}

/// Progress callback for reporting which step is running.
pub trait ProgressReporter: Send + Sync {
    /// Called before each step starts.
    fn step_started(&self, agent_name: &str, step_name: &str);
    /// Called once the run has finished, on either path.
    fn done(&self, result: &ProcessResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn step_started(&self, _agent_name: &str, _step_name: &str) {}
    fn done(&self, _result: &ProcessResult) {}
}

/// Prefix of the answer returned when a run is abandoned.
pub const TERMINAL_ANSWER_PREFIX: &str = "An error occurred while processing your request: ";

/// The support pipeline. Cheap to share; every run owns its own state.
pub struct Workflow {
    stages: Vec<Arc<dyn Stage>>,
    policy: StepPolicy,
}

impl Workflow {
    /// Build the standard five-stage pipeline.
    pub fn new(
        completion: Arc<dyn CompletionService>,
        knowledge: Arc<dyn KnowledgeStore>,
        config: WorkflowConfig,
    ) -> Self {
        let WorkflowConfig {
            policy,
            search_limit,
            similarity_threshold,
            prompts,
        } = config;

        let stages: Vec<Arc<dyn Stage>> = vec![
            Arc::new(ClassifyStage::new(Arc::clone(&completion), prompts.classifier)),
            Arc::new(RetrieveStage::new(knowledge, search_limit, similarity_threshold)),
            Arc::new(DraftStage::new(Arc::clone(&completion), prompts.writer)),
            Arc::new(ValidateStage::new(completion, prompts.guard)),
            Arc::new(EvaluateStage),
        ];
        Self::from_stages(stages, policy)
    }

    /// Build a pipeline from an explicit, ordered list of stages.
    pub fn from_stages(stages: Vec<Arc<dyn Stage>>, policy: StepPolicy) -> Self {
        Self { stages, policy }
    }

    /// Run every stage in order. The first step that exhausts its
    /// attempts ends the run.
    #[instrument(skip_all, fields(request_chars = request_text.chars().count()))]
    pub async fn run(
        &self,
        request_text: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<PipelineState, StepError> {
        let mut state = PipelineState::new(request_text);
        info!(started_at = %state.started_at(), "processing request");

        for stage in &self.stages {
            progress.step_started(stage.agent_name(), stage.step_name());
            state = run_step(Arc::clone(stage), &state, self.policy).await?;
        }
        Ok(state)
    }

    /// Process a request. Never fails: an abandoned run yields a single
    /// `Workflow`/`error` record and an error answer.
    pub async fn process_request(&self, request_text: &str) -> ProcessResult {
        self.process_request_with(request_text, &SilentProgress).await
    }

    /// [`Self::process_request`] with progress reporting.
    pub async fn process_request_with(
        &self,
        request_text: &str,
        progress: &dyn ProgressReporter,
    ) -> ProcessResult {
        let result = match self.run(request_text, progress).await {
            Ok(state) => state.into_result(),
            Err(err) => {
                error!(error = %err, "pipeline aborted");
                terminal_result(request_text, &err)
            }
        };
        progress.done(&result);
        result
    }
}

fn terminal_result(request_text: &str, err: &StepError) -> ProcessResult {
    let message = err.to_string();
    ProcessResult {
        answer: format!("{TERMINAL_ANSWER_PREFIX}{message}"),
        sources: Vec::new(),
        trace: vec![StepRecord::new(
            "Workflow",
            "error",
            json!({ "request_text": request_text }),
            json!({ "error": message }),
            Duration::ZERO,
        )],
        metrics: Metrics::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_from_app_config() {
        let mut app = AppConfig::default();
        app.pipeline.max_retries = 4;
        app.pipeline.step_timeout_secs = 1.5;
        app.pipeline.search_limit = 3;
        app.prompts.writer = Some("Be brief.".into());

        let config = WorkflowConfig::from(&app);
        assert_eq!(config.policy.max_retries, 4);
        assert_eq!(config.policy.timeout, Duration::from_millis(1500));
        assert_eq!(config.search_limit, 3);
        assert_eq!(config.prompts.writer, "Be brief.");
    }

    #[test]
    fn invalid_timeout_falls_back_to_default() {
        let mut app = AppConfig::default();
        app.pipeline.step_timeout_secs = -1.0;
        assert_eq!(WorkflowConfig::from(&app).policy.timeout, DEFAULT_STEP_TIMEOUT);
    }

    #[test]
    fn terminal_result_shape() {
        let err = StepError::Panicked {
            step: "classify_request",
            message: "boom".into(),
        };
        let result = terminal_result("help", &err);
        assert_eq!(
            result.answer,
            "An error occurred while processing your request: classify_request panicked: boom"
        );
        assert!(result.sources.is_empty());
        assert_eq!(result.trace.len(), 1);
        assert_eq!(result.trace[0].agent_name, "Workflow");
        assert_eq!(result.trace[0].step_name, "error");
        assert_eq!(result.trace[0].input["request_text"], "help");
        assert_eq!(result.metrics, Metrics::default());
    }
}
