//! Route definitions for the askdb gateway.
//!
//! `/api/*` endpoints are session-scoped through [`session_middleware`];
//! `/health` is not.

use crate::composer::Summarizer;
use crate::database::{ConnectParams, Connector};
use crate::generator::SqlGenerator;
use crate::performance::{PerformanceConfig, PerformanceUpdate};
use crate::pipeline::{QueryResponse, QueryService};
use crate::provider::Provider;
use crate::schema::SchemaProcessor;
use crate::session::{session_middleware, SessionCookie, SessionId, SessionStats, SessionStore};
use askdb_common::logging::{Metrics, MetricsSummary};
use askdb_common::{Config, Error, Result};
use askdb_memory::SchemaMemory;
use axum::{
    extract::{rejection::JsonRejection, Extension, State},
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionStore,
    pub cookies: SessionCookie,
    pub connector: Arc<dyn Connector>,
    pub provider: Arc<dyn Provider>,
    pub queries: QueryService,
    pub schema_memory: Option<SchemaMemory>,
    pub vector_enabled: bool,
    pub metrics: Metrics,
    pub default_port: u16,
}

impl AppState {
    /// Wire the services from configuration and the given external clients.
    pub fn new(
        config: &Config,
        provider: Arc<dyn Provider>,
        connector: Arc<dyn Connector>,
        schema_memory: Option<SchemaMemory>,
    ) -> Self {
        let vector_enabled = config.vector.enabled;
        let schema_memory = schema_memory.filter(|_| vector_enabled);
        let defaults =
            PerformanceConfig::from_query_config(&config.query, schema_memory.is_some());

        let queries = QueryService::new(
            SchemaProcessor::new(schema_memory.clone()),
            SqlGenerator::new(provider.clone(), &config.llm),
            Summarizer::new(provider.clone(), &config.llm),
        );

        Self {
            sessions: SessionStore::new(
                Duration::from_secs(config.server.session_ttl_secs),
                defaults,
            ),
            cookies: SessionCookie::new(config.secret_key(), config.server.cookie_secure),
            connector,
            provider,
            queries,
            schema_memory,
            vector_enabled,
            metrics: Metrics::new(),
            default_port: config.database.default_port,
        }
    }
}

/// Map a body extraction failure onto `INVALID_INPUT`.
fn parse_body<T>(body: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    body.map(|Json(value)| value)
        .map_err(|rejection| Error::InvalidInput(rejection.body_text()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Request / response types
// ─────────────────────────────────────────────────────────────────────────────

/// Connect request body. Not `Debug`: it carries a password.
#[derive(Default, Deserialize)]
#[serde(default)]
pub struct ConnectRequest {
    pub host: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub port: Option<u16>,
}

impl ConnectRequest {
    fn into_params(self, default_port: u16) -> Result<ConnectParams> {
        let missing: Vec<&str> = [
            ("host", &self.host),
            ("user", &self.user),
            ("database", &self.database),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();
        if !missing.is_empty() {
            return Err(Error::InvalidInput(format!(
                "Missing required field(s): {}",
                missing.join(", ")
            )));
        }

        Ok(ConnectParams {
            host: self.host.trim().to_string(),
            port: self.port.filter(|p| *p != 0).unwrap_or(default_port),
            user: self.user,
            password: self.password,
            database: self.database.trim().to_string(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectResponse {
    pub success: bool,
    pub message: String,
    pub database: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DisconnectResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub database: Option<String>,
    pub host: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TablesResponse {
    pub tables: Vec<String>,
    pub database: String,
    pub connection_id: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProcessTableRequest {
    pub table_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessTableResponse {
    pub success: bool,
    pub message: String,
    pub table_name: String,
    pub column_count: usize,
    pub vector_indexed: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct QueryRequest {
    pub question: String,
    pub table_name: Option<String>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
    pub dependencies: DependencyStatus,
    pub sessions: SessionStats,
    pub metrics: MetricsSummary,
}

#[derive(Debug, Serialize)]
pub struct DependencyStatus {
    /// `ok` or `unconfigured`
    pub llm: String,
    /// `ok`, `unavailable` or `disabled`
    pub vector_search: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn connect_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
    body: std::result::Result<Json<ConnectRequest>, JsonRejection>,
) -> Result<Json<ConnectResponse>> {
    let params = parse_body(body)?.into_params(state.default_port)?;
    let db = state.connector.connect(&params).await?;
    let database = db.database_name().to_string();

    if let Some(previous) = state.sessions.attach(session.as_str(), db).await {
        previous.close().await;
    }

    tracing::info!(
        session_id = %session.as_str(),
        host = %params.host,
        database = %database,
        "Session connected"
    );
    Ok(Json(ConnectResponse {
        success: true,
        message: format!("Connected to database '{}'", database),
        database,
    }))
}

async fn disconnect_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
) -> Json<DisconnectResponse> {
    let message = match state.sessions.detach(session.as_str()).await {
        Some(db) => {
            db.close().await;
            tracing::info!(session_id = %session.as_str(), "Session disconnected");
            "Disconnected".to_string()
        }
        None => "No active connection".to_string(),
    };
    Json(DisconnectResponse {
        success: true,
        message,
    })
}

async fn connection_status_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
) -> Json<ConnectionStatus> {
    Json(match state.sessions.database(session.as_str()).await {
        Ok(db) => ConnectionStatus {
            connected: true,
            database: Some(db.database_name().to_string()),
            host: Some(db.host().to_string()),
            message: format!("Connected to database '{}'", db.database_name()),
        },
        Err(_) => ConnectionStatus {
            connected: false,
            database: None,
            host: None,
            message: "No active connection".to_string(),
        },
    })
}

async fn get_tables_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
) -> Result<Json<TablesResponse>> {
    let db = state.sessions.database(session.as_str()).await?;
    let tables = db
        .list_tables()
        .await
        .map_err(|e| e.with_context("Listing tables"))?;
    let connection_id = db.connection_id().await?;
    Ok(Json(TablesResponse {
        tables,
        database: db.database_name().to_string(),
        connection_id,
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Schema and query handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn process_table_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
    body: std::result::Result<Json<ProcessTableRequest>, JsonRejection>,
) -> Result<Json<ProcessTableResponse>> {
    let request = parse_body(body)?;
    let db = state.sessions.database(session.as_str()).await?;
    let perf = state.sessions.performance(session.as_str()).await;

    let outcome = state
        .queries
        .schema()
        .process_table(
            session.as_str(),
            db.as_ref(),
            &request.table_name,
            perf.use_vector_search,
        )
        .await?;

    let message = if outcome.vector_indexed {
        format!("Table '{}' processed and indexed", outcome.table_name)
    } else {
        format!("Table '{}' processed", outcome.table_name)
    };
    Ok(Json(ProcessTableResponse {
        success: true,
        message,
        table_name: outcome.table_name,
        column_count: outcome.column_count,
        vector_indexed: outcome.vector_indexed,
    }))
}

async fn query_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
    body: std::result::Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>> {
    let request = parse_body(body)?;
    let db = state.sessions.database(session.as_str()).await?;
    let perf = state.sessions.performance(session.as_str()).await;

    let response = state
        .queries
        .answer(
            session.as_str(),
            db.as_ref(),
            &request.question,
            request.table_name.as_deref(),
            &perf,
        )
        .await?;
    Ok(Json(response))
}

// ─────────────────────────────────────────────────────────────────────────────
// Performance configuration
// ─────────────────────────────────────────────────────────────────────────────

async fn get_performance_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
) -> Json<PerformanceConfig> {
    Json(state.sessions.performance(session.as_str()).await)
}

async fn update_performance_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
    body: std::result::Result<Json<PerformanceUpdate>, JsonRejection>,
) -> Result<Json<PerformanceConfig>> {
    let update = parse_body(body)?;
    let updated = state
        .sessions
        .update_performance(session.as_str(), &update)
        .await?;
    tracing::debug!(session_id = %session.as_str(), ?updated, "Performance config updated");
    Ok(Json(updated))
}

// ─────────────────────────────────────────────────────────────────────────────
// Health
// ─────────────────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let llm_ok = state.provider.is_configured();
    let vector_search = match (&state.schema_memory, state.vector_enabled) {
        (Some(memory), true) => {
            if memory.health_check().await {
                "ok"
            } else {
                "unavailable"
            }
        }
        _ => "disabled",
    };
    let status = if llm_ok && vector_search != "unavailable" {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.into(),
        version: env!("CARGO_PKG_VERSION").into(),
        service: "askdb-gateway".into(),
        dependencies: DependencyStatus {
            llm: if llm_ok { "ok" } else { "unconfigured" }.into(),
            vector_search: vector_search.into(),
        },
        sessions: state.sessions.stats().await,
        metrics: state.metrics.summary().await,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Router builders
// ─────────────────────────────────────────────────────────────────────────────

/// Session-scoped API routes.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/connect", post(connect_handler))
        .route("/api/disconnect", post(disconnect_handler))
        .route("/api/connection_status", get(connection_status_handler))
        .route("/api/get_tables", get(get_tables_handler))
        .route("/api/process_table", post(process_table_handler))
        .route("/api/query", post(query_handler))
        .route(
            "/api/performance_config",
            get(get_performance_handler).post(update_performance_handler),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            session_middleware,
        ))
        .with_state(state)
}

/// Build health check routes.
pub fn health_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Build the complete router for the given state.
pub fn build_routes(state: AppState) -> Router {
    Router::new()
        .merge(api_routes(state.clone()))
        .merge(health_routes(state.clone()))
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            askdb_common::logging::trace_middleware,
        ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_request_requires_fields() {
        let request = ConnectRequest {
            host: "db".into(),
            user: " ".into(),
            ..Default::default()
        };
        let err = request.into_params(3306).err().unwrap();
        assert_eq!(err.code(), "INVALID_INPUT");
        assert!(err.to_string().contains("user"));
        assert!(err.to_string().contains("database"));
    }

    #[test]
    fn connect_request_defaults_port() {
        let request: ConnectRequest = serde_json::from_str(
            r#"{"host": "db", "user": "app", "password": "pw", "database": "shop"}"#,
        )
        .unwrap();
        let params = request.into_params(3307).unwrap();
        assert_eq!(params.port, 3307);
        assert_eq!(params.database, "shop");
    }
}
