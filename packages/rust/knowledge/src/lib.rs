//! Knowledge store backends for SupportPilot.
//!
//! The pipeline talks to a [`KnowledgeStore`]. Three backends exist:
//! - [`LocalKnowledgeBase`]: libSQL file plus in-process cosine similarity
//! - [`SupabaseKnowledgeBase`]: PostgREST + pgvector `search_documents`
//! - [`DemoKnowledgeBase`]: two fixed articles, no embeddings needed

pub mod demo;
pub mod local;
pub mod seed;
pub mod supabase;

use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use supportpilot_llm::EmbeddingService;
use supportpilot_shared::{
    AppConfig, KnowledgeBackend, NewDocument, Result, SearchHit, supabase_credentials,
};
use supportpilot_storage::Storage;

pub use demo::DemoKnowledgeBase;
pub use local::LocalKnowledgeBase;
pub use seed::{SeedReport, clean, sample_articles, seed};
pub use supabase::SupabaseKnowledgeBase;

/// Searchable collection of support articles.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Articles whose similarity to `query` is strictly above `threshold`,
    /// best first, at most `limit` of them. No match is an empty vec.
    async fn search(&self, query: &str, limit: usize, threshold: f64) -> Result<Vec<SearchHit>>;

    /// Store one article. Returns its id, or `None` if an identical
    /// article is already present.
    async fn add_document(&self, doc: NewDocument) -> Result<Option<String>>;

    /// Store several articles. Backends that can batch embeddings override this.
    async fn add_documents(&self, docs: Vec<NewDocument>) -> Result<Vec<Option<String>>> {
        let mut ids = Vec::with_capacity(docs.len());
        for doc in docs {
            ids.push(self.add_document(doc).await?);
        }
        Ok(ids)
    }

    /// Number of stored articles.
    async fn count(&self) -> Result<u64>;

    /// Remove every article, returning how many were removed.
    async fn clear(&self) -> Result<u64>;

    /// Every stored article, without similarity scores.
    async fn list(&self) -> Result<Vec<SearchHit>>;
}

/// Open the backend selected by `[knowledge].backend`.
pub async fn open_store(
    config: &AppConfig,
    embedder: Arc<dyn EmbeddingService>,
) -> Result<Arc<dyn KnowledgeStore>> {
    let store: Arc<dyn KnowledgeStore> = match config.knowledge.backend {
        KnowledgeBackend::Local => {
            let path = config.knowledge_db_path()?;
            tracing::debug!(?path, "opening local knowledge base");
            let storage = Storage::open(&path).await?;
            Arc::new(LocalKnowledgeBase::new(storage, embedder))
        }
        KnowledgeBackend::Supabase => {
            let (url, key) = supabase_credentials(config)?;
            Arc::new(SupabaseKnowledgeBase::new(&url, key, embedder)?)
        }
        KnowledgeBackend::Demo => Arc::new(DemoKnowledgeBase),
    };
    Ok(store)
}

/// Cosine similarity of two vectors. `None` when dimensions differ or
/// either vector has zero length.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// SHA-256 of article content, used to skip duplicates.
pub(crate) fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
