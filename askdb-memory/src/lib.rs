//! askdb Memory - schema memory for similarity lookup.
//!
//! This crate stores table schema summaries as embeddings and recalls the
//! ones closest to a natural-language question:
//! - OpenAI-compatible embedding provider
//! - Pinecone vector index (REST data plane)
//! - In-process index for development and tests
//!
//! ## Architecture
//!
//! ```text
//! Schema summary → Embedding → VectorIndex::upsert
//! Question       → Embedding → VectorIndex::query → summaries
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod embeddings;
pub mod in_memory;
pub mod pinecone;
pub mod schema;
pub mod traits;

// Re-export commonly used types
pub use embeddings::{EmbeddingProvider, OpenAiEmbedding};
pub use in_memory::{cosine_similarity, InMemoryIndex};
pub use pinecone::PineconeIndex;
pub use schema::{SchemaDocument, SchemaMemory};
pub use traits::{ScoredRecord, VectorIndex, VectorRecord};
