//! HTTP client for OpenAI-compatible and Azure OpenAI endpoints.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use supportpilot_shared::{CompletionConfig, CompletionProvider, Result, SupportPilotError};

use crate::types::{ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse};
use crate::{ChatMessage, CompletionService, EmbeddingService};

/// Chat + embedding client.
///
/// In OpenAI mode the model name goes in the request body and auth is a
/// bearer token. In Azure mode the model names are deployment names placed
/// in the URL, auth uses the `api-key` header and every call carries
/// `api-version`.
#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    api_key: String,
    base_url: String,
    provider: CompletionProvider,
    api_version: String,
    model: String,
    fast_model: String,
    embedding_model: String,
    temperature: f32,
    max_tokens: u32,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiClient {
    /// Build a client from the `[completion]` config section.
    pub fn from_config(config: &CompletionConfig, api_key: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("supportpilot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SupportPilotError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            provider: config.provider,
            api_version: config.api_version.clone(),
            model: config.model.clone(),
            fast_model: config.fast_model.clone(),
            embedding_model: config.embedding_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn endpoint(&self, model: &str, operation: &str) -> String {
        match self.provider {
            CompletionProvider::OpenAi => format!("{}/{operation}", self.base_url),
            CompletionProvider::Azure => {
                format!("{}/openai/deployments/{model}/{operation}", self.base_url)
            }
        }
    }

    /// Model name for the request body; Azure carries it in the URL instead.
    fn body_model<'a>(&self, model: &'a str) -> Option<&'a str> {
        match self.provider {
            CompletionProvider::OpenAi => Some(model),
            CompletionProvider::Azure => None,
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.provider {
            CompletionProvider::OpenAi => request.bearer_auth(&self.api_key),
            CompletionProvider::Azure => request
                .header("api-key", &self.api_key)
                .query(&[("api-version", self.api_version.as_str())]),
        }
    }

    async fn post_json<B, R>(&self, url: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .authorize(self.http.post(url))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, url, "completion request failed");
                SupportPilotError::Network(format!("{url}: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(%status, error = %error_text, "completion API error");
            return Err(SupportPilotError::Completion(format!(
                "HTTP {status}: {error_text}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| SupportPilotError::parse(format!("{url}: invalid response body: {e}")))
    }
}

#[async_trait]
impl CompletionService for OpenAiClient {
    async fn chat(&self, messages: &[ChatMessage], fast: bool) -> Result<String> {
        let start = Instant::now();
        let model = if fast { &self.fast_model } else { &self.model };
        let url = self.endpoint(model, "chat/completions");

        let request = ChatRequest {
            model: self.body_model(model),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response: ChatResponse = self.post_json(&url, &request).await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| SupportPilotError::Completion("no content in completion response".into()))?;

        debug!(
            model = %model,
            duration_ms = start.elapsed().as_millis() as u64,
            "chat completion"
        );

        Ok(content)
    }
}

#[async_trait]
impl EmbeddingService for OpenAiClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.endpoint(&self.embedding_model, "embeddings");
        let request = EmbeddingRequest {
            model: self.body_model(&self.embedding_model),
            input: texts,
        };

        let mut response: EmbeddingResponse = self.post_json(&url, &request).await?;
        if response.data.len() != texts.len() {
            return Err(SupportPilotError::Completion(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                response.data.len()
            )));
        }

        response.data.sort_by_key(|d| d.index);
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }
}
