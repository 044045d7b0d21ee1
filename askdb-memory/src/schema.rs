//! Schema memory: store table summaries as vectors, recall them by question.

use crate::embeddings::EmbeddingProvider;
use crate::traits::{ScoredRecord, VectorIndex, VectorRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A stored schema summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDocument {
    pub session_id: String,
    pub database: String,
    pub table: String,
    pub summary: String,
    /// Similarity to the recall question (0.0 when stored)
    #[serde(default)]
    pub score: f32,
}

impl SchemaDocument {
    pub fn new(
        session_id: impl Into<String>,
        database: impl Into<String>,
        table: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            database: database.into(),
            table: table.into(),
            summary: summary.into(),
            score: 0.0,
        }
    }

    /// Vector key: one record per session and table.
    pub fn key(&self) -> String {
        schema_key(&self.session_id, &self.table)
    }

    fn from_match(record: ScoredRecord) -> Option<Self> {
        Some(Self {
            session_id: record.metadata_str("session_id")?.to_string(),
            database: record.metadata_str("database")?.to_string(),
            table: record.metadata_str("table")?.to_string(),
            summary: record.metadata_str("summary")?.to_string(),
            score: record.score,
        })
    }
}

/// Key under which a table's summary is stored for a session.
pub fn schema_key(session_id: &str, table: &str) -> String {
    format!("{session_id}:{table}")
}

/// Embedding provider + vector index, scoped per session namespace.
#[derive(Clone)]
pub struct SchemaMemory {
    embedding: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
}

impl SchemaMemory {
    pub fn new(
        embedding: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        top_k: usize,
    ) -> Self {
        Self {
            embedding,
            index,
            top_k: top_k.max(1),
        }
    }

    /// Name of the backing index.
    pub fn backend(&self) -> &str {
        self.index.name()
    }

    /// Embed and upsert a schema summary.
    pub async fn store(&self, doc: &SchemaDocument) -> anyhow::Result<()> {
        let vector = self.embedding.embed_one(&doc.summary).await?;
        let record = VectorRecord::new(doc.key(), vector)
            .with_metadata("session_id", doc.session_id.as_str())
            .with_metadata("database", doc.database.as_str())
            .with_metadata("table", doc.table.as_str())
            .with_metadata("summary", doc.summary.as_str())
            .with_metadata("stored_at", chrono::Utc::now().timestamp_millis());

        self.index.upsert(&doc.session_id, vec![record]).await?;
        tracing::debug!(
            session_id = %doc.session_id,
            table = %doc.table,
            backend = self.index.name(),
            "Stored schema summary"
        );
        Ok(())
    }

    /// Recall the summaries closest to `question` for a session's current database.
    pub async fn recall(
        &self,
        session_id: &str,
        database: &str,
        question: &str,
    ) -> anyhow::Result<Vec<SchemaDocument>> {
        let vector = self.embedding.embed_one(question).await?;
        let matches = self.index.query(session_id, &vector, self.top_k).await?;

        Ok(matches
            .into_iter()
            .filter_map(SchemaDocument::from_match)
            .filter(|doc| doc.session_id == session_id && doc.database == database)
            .collect())
    }

    /// Drop everything stored for a session.
    pub async fn forget_session(&self, session_id: &str) -> anyhow::Result<()> {
        self.index.delete_namespace(session_id).await
    }

    /// Returns true if the index is reachable.
    pub async fn health_check(&self) -> bool {
        self.embedding.dimensions() > 0 && self.index.health_check().await
    }
}
