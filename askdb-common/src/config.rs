//! Configuration management for askdb.
//!
//! The gateway reads `~/.askdb/config.json`, merged with `~/.askdb/secrets.json`
//! (see [`crate::config_loader`]).
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `ASKDB_CONFIG_DIR` → location of the config directory
//! - `ASKDB_HOST` → server.host
//! - `ASKDB_PORT` → server.port
//! - `ASKDB_SECRET_KEY` (or `SECRET_KEY`) → secrets.secret_key
//! - `ASKDB_MAX_RESULTS` → query.max_results
//! - `ASKDB_LOG_LEVEL` → observability.log_level
//! - `ASKDB_LOG_FORMAT` → observability.log_format
//! - `OPENAI_API_KEY` → secrets.openai
//! - `OPENAI_BASE_URL` → llm.base_url
//! - `PINECONE_API_KEY` → secrets.pinecone
//! - `PINECONE_INDEX_HOST` → vector.index_host

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("ASKDB_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".askdb"),
        |dirs| dirs.home_dir().join(".askdb"),
    )
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Server
// ============================================================================

/// HTTP server and session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Set the `Secure` flag on the session cookie
    #[serde(default)]
    pub cookie_secure: bool,

    /// Idle time after which a session and its database handle are dropped
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cookie_secure: false,
            session_ttl_secs: default_session_ttl(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    5000
}

fn default_session_ttl() -> u64 {
    3600
}

// ============================================================================
// Secrets
// ============================================================================

/// Credentials for external services.
///
/// Usually kept in `secrets.json` rather than `config.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretsConfig {
    /// OpenAI (or compatible) API key
    #[serde(default)]
    pub openai: Option<String>,

    /// Pinecone API key
    #[serde(default)]
    pub pinecone: Option<String>,

    /// Key used to sign session cookies
    #[serde(default)]
    pub secret_key: Option<String>,
}

// ============================================================================
// LLM
// ============================================================================

/// Language-model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible API
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Model used for SQL generation and summaries
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Model used when a session enables `use_faster_model`
    #[serde(default = "default_fast_model")]
    pub fast_model: String,

    /// Model used to embed schema summaries
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Sampling temperature for SQL generation
    #[serde(default)]
    pub temperature: f64,

    /// Completion token cap
    #[serde(default = "default_max_tokens")]
    pub max_tokens: i64,

    /// Request timeout
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            fast_model: default_fast_model(),
            embedding_model: default_embedding_model(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_llm_base_url() -> String {
    "https://api.openai.com".into()
}

fn default_llm_model() -> String {
    "gpt-4o".into()
}

fn default_fast_model() -> String {
    "gpt-4o-mini".into()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

fn default_max_tokens() -> i64 {
    1024
}

fn default_llm_timeout() -> u64 {
    60
}

// ============================================================================
// Vector search
// ============================================================================

/// Which vector index implementation backs schema similarity lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    /// Hosted Pinecone index
    #[default]
    Pinecone,
    /// Process-local index, for development
    Memory,
}

/// Vector search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    /// Allow sessions to use vector search at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub backend: VectorBackend,

    /// Pinecone index host, e.g. `https://schemas-abc123.svc.us-east-1.pinecone.io`
    #[serde(default)]
    pub index_host: Option<String>,

    /// Number of schema summaries recalled per question
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Embedding dimensions (must match the index)
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: VectorBackend::default(),
            index_host: None,
            top_k: default_top_k(),
            dimensions: default_dimensions(),
        }
    }
}

fn default_top_k() -> usize {
    3
}

fn default_dimensions() -> usize {
    1536
}

// ============================================================================
// Database
// ============================================================================

/// MySQL connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Port used when the client omits one
    #[serde(default = "default_mysql_port")]
    pub default_port: u16,

    /// Connect timeout
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Server-side cap on a single SELECT (`max_execution_time`)
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            default_port: default_mysql_port(),
            connect_timeout_secs: default_connect_timeout(),
            query_timeout_secs: default_query_timeout(),
        }
    }
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_query_timeout() -> u64 {
    30
}

// ============================================================================
// Query defaults
// ============================================================================

/// Defaults for the per-session performance configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Default row cap
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Upper bound a session may raise `max_results` to
    #[serde(default = "default_max_results_limit")]
    pub max_results_limit: usize,

    /// Extra generation attempts after the first
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Characters of schema context placed in the prompt
    #[serde(default = "default_max_context_length")]
    pub max_context_length: usize,

    /// Dry-run generated statements with `EXPLAIN`
    #[serde(default = "default_true")]
    pub validate_queries: bool,

    /// Ask the model for a prose summary of results
    #[serde(default = "default_true")]
    pub generate_summary: bool,

    /// Use the fast model by default
    #[serde(default)]
    pub use_faster_model: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            max_results_limit: default_max_results_limit(),
            max_retries: default_max_retries(),
            max_context_length: default_max_context_length(),
            validate_queries: true,
            generate_summary: true,
            use_faster_model: false,
        }
    }
}

fn default_max_results() -> usize {
    100
}

fn default_max_results_limit() -> usize {
    10_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_max_context_length() -> usize {
    4000
}

// ============================================================================
// Observability
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Base log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub secrets: SecretsConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub vector: VectorConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default directory, then apply environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from_dir(&config_dir())
    }

    /// Load configuration from a specific directory, then apply environment overrides.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let mut config = Self::load_files(dir)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load `config.json` + `secrets.json` from `dir` without looking at the environment.
    pub fn load_files(dir: &Path) -> Result<Self> {
        let value = crate::config_loader::load_modular_config(Some(dir.to_path_buf()))?;
        if value.as_object().is_some_and(|o| o.is_empty()) {
            tracing::info!("Config file not found, using defaults");
        }
        serde_json::from_value(value)
            .with_context(|| format!("Failed to parse config from {}", dir.display()))
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("ASKDB_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("ASKDB_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Ok(key) = std::env::var("ASKDB_SECRET_KEY").or_else(|_| std::env::var("SECRET_KEY")) {
            self.secrets.secret_key = Some(key);
        }
        if let Ok(max) = std::env::var("ASKDB_MAX_RESULTS") {
            if let Ok(m) = max.parse() {
                self.query.max_results = m;
            }
        }
        if let Ok(level) = std::env::var("ASKDB_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Ok(format) = std::env::var("ASKDB_LOG_FORMAT") {
            self.observability.log_format = format;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.secrets.openai = Some(key);
        }
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Ok(key) = std::env::var("PINECONE_API_KEY") {
            self.secrets.pinecone = Some(key);
        }
        if let Ok(host) = std::env::var("PINECONE_INDEX_HOST") {
            self.vector.index_host = Some(host);
        }
    }

    /// Address the HTTP server binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// OpenAI API key, if configured and non-empty.
    pub fn openai_key(&self) -> Option<&str> {
        self.secrets.openai.as_deref().filter(|k| !k.is_empty())
    }

    /// Pinecone API key, if configured and non-empty.
    pub fn pinecone_key(&self) -> Option<&str> {
        self.secrets.pinecone.as_deref().filter(|k| !k.is_empty())
    }

    /// Session cookie signing key, if configured and non-empty.
    pub fn secret_key(&self) -> Option<&str> {
        self.secrets.secret_key.as_deref().filter(|k| !k.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.fast_model, "gpt-4o-mini");
        assert_eq!(config.query.max_results, 100);
        assert_eq!(config.vector.backend, VectorBackend::Pinecone);
        assert!(config.secret_key().is_none());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(
            r#"{ "server": { "port": 8080 }, "vector": { "backend": "memory" } }"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.vector.backend, VectorBackend::Memory);
        assert_eq!(config.vector.top_k, 3);
    }

    #[test]
    fn test_load_files_merges_secrets() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{ "query": { "max_results": 25 } }"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("secrets.json"),
            r#"{ "openai": "sk-test", "secret_key": "" }"#,
        )
        .unwrap();

        let config = Config::load_files(dir.path()).unwrap();
        assert_eq!(config.query.max_results, 25);
        assert_eq!(config.openai_key(), Some("sk-test"));
        assert!(config.secret_key().is_none());
    }

    #[test]
    fn test_load_files_missing_dir_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_files(&dir.path().join("nope")).unwrap();
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn test_bind_address() {
        let config = Config::default();
        assert_eq!(config.bind_address(), "127.0.0.1:5000");
    }
}
