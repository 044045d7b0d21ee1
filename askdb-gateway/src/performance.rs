//! Per-session performance configuration.

use askdb_common::validation::{
    check_range, collect_errors, MAX_CONTEXT_LENGTH, MAX_RETRIES_LIMIT, MIN_CONTEXT_LENGTH,
};
use askdb_common::{QueryConfig, Validate, ValidationResult};
use serde::{Deserialize, Serialize};

/// Flags a client may read and change for its own session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub use_faster_model: bool,
    pub max_context_length: usize,
    pub use_vector_search: bool,
    pub validate_queries: bool,
    pub max_retries: u32,
    pub generate_summary: bool,
    pub max_results: usize,
    /// Server-wide ceiling for `max_results`; read-only for clients
    pub max_results_limit: usize,
}

impl PerformanceConfig {
    /// Session defaults derived from the server's query section.
    pub fn from_query_config(query: &QueryConfig, vector_available: bool) -> Self {
        Self {
            use_faster_model: query.use_faster_model,
            max_context_length: query.max_context_length,
            use_vector_search: vector_available,
            validate_queries: query.validate_queries,
            max_retries: query.max_retries,
            generate_summary: query.generate_summary,
            max_results: query.max_results,
            max_results_limit: query.max_results_limit,
        }
    }

    /// Apply a partial update. Nothing changes unless every field validates.
    pub fn apply(&self, update: &PerformanceUpdate) -> ValidationResult<Self> {
        let mut next = self.clone();
        if let Some(v) = update.use_faster_model {
            next.use_faster_model = v;
        }
        if let Some(v) = update.max_context_length {
            next.max_context_length = v;
        }
        if let Some(v) = update.use_vector_search {
            next.use_vector_search = v;
        }
        if let Some(v) = update.validate_queries {
            next.validate_queries = v;
        }
        if let Some(v) = update.max_retries {
            next.max_retries = v;
        }
        if let Some(v) = update.generate_summary {
            next.generate_summary = v;
        }
        if let Some(v) = update.max_results {
            next.max_results = v;
        }
        next.validate()?;
        Ok(next)
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self::from_query_config(&QueryConfig::default(), false)
    }
}

impl Validate for PerformanceConfig {
    fn validate(&self) -> ValidationResult<()> {
        let checks = [
            check_range(
                "max_context_length",
                self.max_context_length,
                MIN_CONTEXT_LENGTH,
                MAX_CONTEXT_LENGTH,
            ),
            check_range("max_retries", self.max_retries, 0, MAX_RETRIES_LIMIT),
            check_range("max_results", self.max_results, 1, self.max_results_limit.max(1)),
        ];
        collect_errors(checks.into_iter().filter_map(Result::err).collect())
    }
}

/// Partial update body for `POST /api/performance_config`. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PerformanceUpdate {
    pub use_faster_model: Option<bool>,
    pub max_context_length: Option<usize>,
    pub use_vector_search: Option<bool>,
    pub validate_queries: Option<bool>,
    pub max_retries: Option<u32>,
    pub generate_summary: Option<bool>,
    pub max_results: Option<usize>,
}
