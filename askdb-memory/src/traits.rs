//! Core vector index trait and record types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A vector plus its metadata, keyed by a stable ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Unique key for this record within its namespace
    pub id: String,
    /// Embedding values
    pub values: Vec<f32>,
    /// Flat metadata stored alongside the vector
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl VectorRecord {
    /// Create a record with empty metadata.
    pub fn new(id: impl Into<String>, values: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            values,
            metadata: serde_json::Map::new(),
        }
    }

    /// Attach a metadata field.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A query match with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub id: String,
    /// Similarity score (higher is closer)
    pub score: f32,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ScoredRecord {
    /// Read a string metadata field.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

/// Vector index backend.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Backend name (e.g., "pinecone", "memory")
    fn name(&self) -> &str;

    /// Insert or replace records in a namespace.
    async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> anyhow::Result<()>;

    /// Return the `top_k` closest records in a namespace, best first.
    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> anyhow::Result<Vec<ScoredRecord>>;

    /// Delete every record in a namespace.
    async fn delete_namespace(&self, namespace: &str) -> anyhow::Result<()>;

    /// Returns true if the backend is operational.
    async fn health_check(&self) -> bool;
}
