//! askdb Gateway - natural-language questions over a connected MySQL database.
//!
//! This crate provides the HTTP service:
//! - Cookie-scoped sessions that own a MySQL connection
//! - Schema processing and vector-indexed schema recall
//! - SQL generation through a language model, with bounded retries
//! - Read-only, row-capped execution and optional result summaries
//!
//! ## Architecture
//!
//! ```text
//! Client → session → schema context → LLM → SQL → MySQL (read-only) → summary
//!                         ↑
//!                   vector index
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod composer;
pub mod database;
pub mod generator;
pub mod performance;
pub mod pipeline;
pub mod provider;
pub mod routes;
pub mod schema;
pub mod session;

pub use database::{ConnectParams, Connector, Database, MySqlConnector};
pub use performance::{PerformanceConfig, PerformanceUpdate};
pub use provider::{ChatRequest, ChatResponse, OpenAIProvider, Provider, ProviderError};
pub use routes::AppState;

use askdb_common::{Config, VectorBackend};
use askdb_memory::{InMemoryIndex, OpenAiEmbedding, PineconeIndex, SchemaMemory, VectorIndex};
use axum::http::StatusCode;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum accepted request body.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Build schema memory from the vector section, or `None` when it cannot run.
fn build_schema_memory(config: &Config) -> Option<SchemaMemory> {
    if !config.vector.enabled {
        tracing::info!("Vector search disabled");
        return None;
    }
    let Some(openai_key) = config.openai_key() else {
        tracing::warn!("Vector search needs an OpenAI key for embeddings; using direct schema only");
        return None;
    };

    let index: Arc<dyn VectorIndex> = match config.vector.backend {
        VectorBackend::Memory => Arc::new(InMemoryIndex::new()),
        VectorBackend::Pinecone => {
            let (Some(key), Some(host)) =
                (config.pinecone_key(), config.vector.index_host.as_deref())
            else {
                tracing::warn!("Pinecone key or index host missing; using direct schema only");
                return None;
            };
            match PineconeIndex::new(key, host) {
                Ok(index) => Arc::new(index),
                Err(e) => {
                    tracing::warn!(error = %e, "Pinecone client setup failed; using direct schema only");
                    return None;
                }
            }
        }
    };

    let embedding = Arc::new(OpenAiEmbedding::with_base_url(
        openai_key,
        config.llm.base_url.as_str(),
        config.llm.embedding_model.as_str(),
        config.vector.dimensions,
    ));
    tracing::info!(backend = index.name(), "Vector search enabled");
    Some(SchemaMemory::new(embedding, index, config.vector.top_k))
}

/// Build application state with the production clients.
pub fn build_state(config: &Config) -> AppState {
    let provider: Arc<dyn Provider> = Arc::new(OpenAIProvider::with_base_url(
        config.openai_key(),
        config.llm.base_url.as_str(),
        Duration::from_secs(config.llm.timeout_secs),
    ));
    if !provider.is_configured() {
        tracing::warn!("OPENAI_API_KEY is not set; queries will fail until it is configured");
    }

    let connector: Arc<dyn Connector> = Arc::new(MySqlConnector::new(
        Duration::from_secs(config.database.connect_timeout_secs),
        Duration::from_secs(config.database.query_timeout_secs),
    ));

    AppState::new(config, provider, connector, build_schema_memory(config))
}

/// Requests running past `timeout` get `408 Request Timeout`.
fn request_timeout_layer(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}

/// Wrap routes with CORS, body limit and a request timeout.
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    routes::build_routes(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(request_timeout_layer(request_timeout))
        .layer(cors)
}

/// Start the gateway server and run until Ctrl-C.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr: std::net::SocketAddr = config.bind_address().parse()?;
    let state = build_state(config);
    let sessions = state.sessions.clone();

    // Each generation attempt and the summary may each take a full LLM timeout
    let llm_calls = u64::from(config.query.max_retries) + 2;
    let request_timeout = Duration::from_secs(
        config.llm.timeout_secs * llm_calls + config.database.query_timeout_secs * 2,
    );
    let router = build_router(state, request_timeout);

    tracing::info!("Starting askdb gateway on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        })
        .await?;

    sessions.close_all().await;
    tracing::info!("All sessions closed");
    Ok(())
}
