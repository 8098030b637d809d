//! Local knowledge base: libSQL rows plus in-process cosine similarity.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use supportpilot_llm::EmbeddingService;
use supportpilot_shared::{KnowledgeDocument, NewDocument, Result, SearchHit};
use supportpilot_storage::Storage;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::{KnowledgeStore, content_hash, cosine_similarity};

pub struct LocalKnowledgeBase {
    storage: Storage,
    embedder: Arc<dyn EmbeddingService>,
}

impl LocalKnowledgeBase {
    pub fn new(storage: Storage, embedder: Arc<dyn EmbeddingService>) -> Self {
        Self { storage, embedder }
    }

    fn document(doc: NewDocument, embedding: Vec<f32>) -> KnowledgeDocument {
        let now = Utc::now();
        KnowledgeDocument {
            id: Uuid::now_v7().to_string(),
            content_hash: content_hash(&doc.content),
            title: doc.title,
            content: doc.content,
            embedding,
            created_at: now,
            updated_at: now,
        }
    }

    async fn insert(&self, doc: KnowledgeDocument) -> Result<Option<String>> {
        if self.storage.insert_document(&doc).await? {
            debug!(id = %doc.id, title = %doc.title, "added document");
            Ok(Some(doc.id))
        } else {
            debug!(title = %doc.title, "skipped duplicate document");
            Ok(None)
        }
    }
}

#[async_trait]
impl KnowledgeStore for LocalKnowledgeBase {
    fn name(&self) -> &'static str {
        "local"
    }

    #[instrument(skip_all, fields(limit = limit, threshold = threshold))]
    async fn search(&self, query: &str, limit: usize, threshold: f64) -> Result<Vec<SearchHit>> {
        let query_embedding = self.embedder.embed_one(query).await?;
        let documents = self.storage.list_documents().await?;

        let mut scored: Vec<(f64, KnowledgeDocument)> = documents
            .into_iter()
            .filter_map(|doc| match cosine_similarity(&query_embedding, &doc.embedding) {
                Some(score) => Some((score, doc)),
                None => {
                    warn!(id = %doc.id, "document embedding is missing or has a different dimension");
                    None
                }
            })
            .filter(|(score, _)| *score > threshold)
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        scored.truncate(limit);

        debug!(hits = scored.len(), "local search complete");

        Ok(scored
            .into_iter()
            .map(|(score, doc)| SearchHit {
                id: doc.id,
                title: doc.title,
                content: doc.content,
                similarity: Some(score),
            })
            .collect())
    }

    async fn add_document(&self, doc: NewDocument) -> Result<Option<String>> {
        let embedding = self.embedder.embed_one(&doc.content).await?;
        self.insert(Self::document(doc, embedding)).await
    }

    async fn add_documents(&self, docs: Vec<NewDocument>) -> Result<Vec<Option<String>>> {
        let texts: Vec<String> = docs.iter().map(|d| d.content.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;

        let mut ids = Vec::with_capacity(docs.len());
        for (doc, embedding) in docs.into_iter().zip(embeddings) {
            ids.push(self.insert(Self::document(doc, embedding)).await?);
        }
        Ok(ids)
    }

    async fn count(&self) -> Result<u64> {
        self.storage.count_documents().await
    }

    async fn clear(&self) -> Result<u64> {
        self.storage.clear_documents().await
    }

    async fn list(&self) -> Result<Vec<SearchHit>> {
        Ok(self
            .storage
            .list_documents()
            .await?
            .into_iter()
            .map(|doc| SearchHit {
                id: doc.id,
                title: doc.title,
                content: doc.content,
                similarity: None,
            })
            .collect())
    }
}
