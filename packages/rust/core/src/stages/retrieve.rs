use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::json;
use supportpilot_knowledge::KnowledgeStore;
use supportpilot_shared::{Result, SearchHit, Source};
use tracing::{debug, instrument, warn};

use super::{CallOutcome, Stage};
use crate::state::PipelineState;

pub struct RetrieveStage {
    knowledge: Arc<dyn KnowledgeStore>,
    limit: usize,
    threshold: f64,
}

impl RetrieveStage {
    pub fn new(knowledge: Arc<dyn KnowledgeStore>, limit: usize, threshold: f64) -> Self {
        Self {
            knowledge,
            limit,
            threshold,
        }
    }
}

#[async_trait]
impl Stage for RetrieveStage {
    fn agent_name(&self) -> &'static str {
        "RetrieverAgent"
    }

    fn step_name(&self) -> &'static str {
        "retrieve_knowledge"
    }

    #[instrument(skip_all, fields(step = "retrieve_knowledge", backend = self.knowledge.name()))]
    async fn run(&self, mut state: PipelineState) -> Result<PipelineState> {
        let start = Instant::now();
        let input = json!({
            "request_text": state.request_text(),
            "intent": state.intent,
        });

        let outcome: CallOutcome<Vec<SearchHit>> = self
            .knowledge
            .search(state.request_text(), self.limit, self.threshold)
            .await
            .into();

        let output = match outcome {
            CallOutcome::Completed(hits) => {
                state.sources = hits.into_iter().map(Source::from).collect();
                debug!(sources = state.sources.len(), "retrieved knowledge");
                json!({
                    "sources_found": state.sources.len(),
                    "sources": state
                        .sources
                        .iter()
                        .map(|s| json!({ "id": s.id, "title": s.title, "score": s.similarity_score }))
                        .collect::<Vec<_>>(),
                })
            }
            CallOutcome::Failed { error } => {
                warn!(%error, "knowledge search failed, continuing without sources");
                state.sources = Vec::new();
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
