//! Supabase backend: PostgREST over HTTP with a pgvector search function.
//!
//! Expects a `documents(id, title, content, embedding)` table and a
//! `search_documents(query_embedding, similarity_threshold, match_count)`
//! function returning `id, title, content, similarity`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use supportpilot_llm::EmbeddingService;
use supportpilot_shared::{NewDocument, Result, SearchHit, SupportPilotError};
use tracing::{debug, instrument, warn};

use crate::KnowledgeStore;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct SupabaseKnowledgeBase {
    http: Client,
    rest_url: String,
    key: String,
    embedder: Arc<dyn EmbeddingService>,
}

#[derive(Serialize)]
struct SearchParams<'a> {
    query_embedding: &'a [f32],
    similarity_threshold: f64,
    match_count: usize,
}

#[derive(Serialize)]
struct InsertRow<'a> {
    title: &'a str,
    content: &'a str,
    embedding: &'a [f32],
}

/// Row shape returned by the table endpoints. Ids may be integers or UUIDs.
#[derive(Deserialize)]
struct DocumentRow {
    id: serde_json::Value,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    similarity: Option<f64>,
}

impl From<DocumentRow> for SearchHit {
    fn from(row: DocumentRow) -> Self {
        let id = match row.id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        SearchHit {
            id,
            title: row.title,
            content: row.content,
            similarity: row.similarity,
        }
    }
}

impl SupabaseKnowledgeBase {
    /// `project_url` is the Supabase project URL (e.g. `https://xyz.supabase.co`).
    pub fn new(
        project_url: &str,
        key: impl Into<String>,
        embedder: Arc<dyn EmbeddingService>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SupportPilotError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            rest_url: format!("{}/rest/v1", project_url.trim_end_matches('/')),
            key: key.into(),
            embedder,
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| SupportPilotError::Network(format!("supabase {what}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, what, "supabase request failed");
            return Err(SupportPilotError::Knowledge(format!(
                "supabase {what} failed: HTTP {status}: {body}"
            )));
        }
        Ok(response)
    }

    async fn rows(response: Response, what: &str) -> Result<Vec<DocumentRow>> {
        response
            .json()
            .await
            .map_err(|e| SupportPilotError::parse(format!("supabase {what}: invalid body: {e}")))
    }
}

/// Total from a PostgREST `Content-Range` header such as `0-9/42` or `*/0`.
fn content_range_total(response: &Response) -> Option<u64> {
    response
        .headers()
        .get("content-range")?
        .to_str()
        .ok()?
        .rsplit('/')
        .next()?
        .parse()
        .ok()
}

#[async_trait]
impl KnowledgeStore for SupabaseKnowledgeBase {
    fn name(&self) -> &'static str {
        "supabase"
    }

    #[instrument(skip_all, fields(limit = limit, threshold = threshold))]
    async fn search(&self, query: &str, limit: usize, threshold: f64) -> Result<Vec<SearchHit>> {
        let query_embedding = self.embedder.embed_one(query).await?;
        let params = SearchParams {
            query_embedding: &query_embedding,
            similarity_threshold: threshold,
            match_count: limit,
        };

        let request = self
            .http
            .post(format!("{}/rpc/search_documents", self.rest_url))
            .json(&params);
        let rows = Self::rows(self.send(request, "search").await?, "search").await?;

        debug!(hits = rows.len(), "supabase search complete");
        Ok(rows.into_iter().map(SearchHit::from).collect())
    }

    async fn add_document(&self, doc: NewDocument) -> Result<Option<String>> {
        let embedding = self.embedder.embed_one(&doc.content).await?;
        let row = InsertRow {
            title: &doc.title,
            content: &doc.content,
            embedding: &embedding,
        };

        let request = self
            .http
            .post(format!("{}/documents", self.rest_url))
            .header("Prefer", "return=representation")
            .json(&row);
        let rows = Self::rows(self.send(request, "insert").await?, "insert").await?;

        Ok(rows.into_iter().next().map(|r| SearchHit::from(r).id))
    }

    async fn count(&self) -> Result<u64> {
        let request = self
            .http
            .get(format!("{}/documents", self.rest_url))
            .query(&[("select", "id"), ("limit", "1")])
            .header("Prefer", "count=exact");
        let response = self.send(request, "count").await?;

        content_range_total(&response).ok_or_else(|| {
            SupportPilotError::Knowledge("supabase count: missing Content-Range total".into())
        })
    }

    async fn clear(&self) -> Result<u64> {
        let request = self
            .http
            .delete(format!("{}/documents", self.rest_url))
            .query(&[("id", "not.is.null")])
            .header("Prefer", "count=exact");
        let response = self.send(request, "clear").await?;

        Ok(content_range_total(&response).unwrap_or(0))
    }

    async fn list(&self) -> Result<Vec<SearchHit>> {
        let request = self
            .http
            .get(format!("{}/documents", self.rest_url))
            .query(&[("select", "id,title,content"), ("order", "id")]);
        let rows = Self::rows(self.send(request, "list").await?, "list").await?;
        Ok(rows.into_iter().map(SearchHit::from).collect())
    }
}
