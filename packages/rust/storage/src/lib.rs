//! libSQL storage for the local knowledge base.
//!
//! The [`Storage`] struct wraps a libSQL database holding support articles
//! and their embedding vectors. Similarity search happens one layer up in
//! `supportpilot-knowledge`; this crate only persists rows.

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, params};
use supportpilot_shared::{KnowledgeDocument, Result, SupportPilotError};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SupportPilotError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| SupportPilotError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| SupportPilotError::Storage(e.to_string()))?;

        let storage = Self { conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        SupportPilotError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 on a fresh database.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0,
        }
    }

    // -----------------------------------------------------------------------
    // Document operations
    // -----------------------------------------------------------------------

    /// Insert a document. Returns `false` when a document with the same
    /// content hash already exists and nothing was written.
    pub async fn insert_document(&self, doc: &KnowledgeDocument) -> Result<bool> {
        let embedding = serde_json::to_string(&doc.embedding)
            .map_err(|e| SupportPilotError::Storage(format!("encode embedding: {e}")))?;

        let affected = self
            .conn
            .execute(
                "INSERT INTO documents (id, title, content, content_hash, embedding, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(content_hash) DO NOTHING",
                params![
                    doc.id.as_str(),
                    doc.title.as_str(),
                    doc.content.as_str(),
                    doc.content_hash.as_str(),
                    embedding,
                    doc.created_at.to_rfc3339(),
                    doc.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| SupportPilotError::Storage(e.to_string()))?;

        Ok(affected > 0)
    }

    /// List every document, oldest first.
    pub async fn list_documents(&self) -> Result<Vec<KnowledgeDocument>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, title, content, content_hash, embedding, created_at, updated_at
                 FROM documents ORDER BY created_at, id",
                params![],
            )
            .await
            .map_err(|e| SupportPilotError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| SupportPilotError::Storage(e.to_string()))?
        {
            results.push(row_to_document(&row)?);
        }
        Ok(results)
    }

    /// Number of stored documents.
    pub async fn count_documents(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM documents", params![])
            .await
            .map_err(|e| SupportPilotError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map(|n| n as u64)
                .map_err(|e| SupportPilotError::Storage(e.to_string())),
            Ok(None) => Ok(0),
            Err(e) => Err(SupportPilotError::Storage(e.to_string())),
        }
    }

    /// Delete every document. Returns how many were removed.
    pub async fn clear_documents(&self) -> Result<u64> {
        self.conn
            .execute("DELETE FROM documents", params![])
            .await
            .map_err(|e| SupportPilotError::Storage(e.to_string()))
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SupportPilotError::Storage(format!("invalid date: {e}")))
}

/// Convert a database row to a [`KnowledgeDocument`].
fn row_to_document(row: &libsql::Row) -> Result<KnowledgeDocument> {
    let get = |idx: i32| {
        row.get::<String>(idx)
            .map_err(|e| SupportPilotError::Storage(e.to_string()))
    };

    let embedding_json = get(4)?;
    let embedding: Vec<f32> = serde_json::from_str(&embedding_json)
        .map_err(|e| SupportPilotError::Storage(format!("invalid embedding: {e}")))?;

    Ok(KnowledgeDocument {
        id: get(0)?,
        title: get(1)?,
        content: get(2)?,
        content_hash: get(3)?,
        embedding,
        created_at: parse_timestamp(&get(5)?)?,
        updated_at: parse_timestamp(&get(6)?)?,
    })
}
