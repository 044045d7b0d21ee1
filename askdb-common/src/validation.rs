//! Configuration validation.
//!
//! Provides validation logic for configuration fields to ensure
//! all required values are present and within valid ranges.

use thiserror::Error;

use crate::config::{
    Config, DatabaseConfig, LlmConfig, ObservabilityConfig, QueryConfig, ServerConfig,
    VectorBackend, VectorConfig,
};

/// Upper bound for per-request generation retries.
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Bounds for the schema context placed in a prompt, in characters.
pub const MIN_CONTEXT_LENGTH: usize = 256;
pub const MAX_CONTEXT_LENGTH: usize = 32_000;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port {port}: must be between 1 and 65535")]
    InvalidPort { port: u16, field: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    /// Shorthand for an out-of-range or malformed value.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

/// Collapse a list of errors into a single result.
pub fn collect_errors(mut errors: Vec<ValidationError>) -> ValidationResult<()> {
    if errors.is_empty() {
        Ok(())
    } else if errors.len() == 1 {
        Err(errors.remove(0))
    } else {
        Err(ValidationError::Multiple(errors))
    }
}

/// Check that `value` lies in `[min, max]`.
pub fn check_range<T: PartialOrd + std::fmt::Display>(
    field: &str,
    value: T,
    min: T,
    max: T,
) -> ValidationResult<()> {
    if value < min || value > max {
        return Err(ValidationError::invalid(
            field,
            format!("{value} is outside [{min}, {max}]"),
        ));
    }
    Ok(())
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let sections: [&dyn Validate; 6] = [
            &self.server,
            &self.llm,
            &self.vector,
            &self.database,
            &self.query,
            &self.observability,
        ];
        let errors = sections
            .iter()
            .filter_map(|section| section.validate().err())
            .collect();
        collect_errors(errors)
    }

    /// Load and validate configuration.
    pub fn load_and_validate() -> anyhow::Result<Self> {
        let config = Self::load()?;
        config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(config)
    }
}

impl Validate for ServerConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort {
                port: self.port,
                field: "server.port".into(),
            });
        }
        if self.host.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "server.host".into(),
            });
        }
        if self.session_ttl_secs == 0 {
            return Err(ValidationError::invalid(
                "server.session_ttl_secs",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Validate for LlmConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        if self.model.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "llm.model".into(),
            });
        }
        if self.fast_model.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "llm.fast_model".into(),
            });
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            errors.push(ValidationError::invalid(
                "llm.base_url",
                "must start with http:// or https://",
            ));
        }
        if let Err(e) = check_range("llm.temperature", self.temperature, 0.0, 2.0) {
            errors.push(e);
        }
        if self.max_tokens <= 0 {
            errors.push(ValidationError::invalid(
                "llm.max_tokens",
                "must be greater than 0",
            ));
        }
        collect_errors(errors)
    }
}

impl Validate for VectorConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.top_k == 0 {
            return Err(ValidationError::invalid("vector.top_k", "must be at least 1"));
        }
        if self.dimensions == 0 {
            return Err(ValidationError::invalid(
                "vector.dimensions",
                "must be at least 1",
            ));
        }
        if let Some(host) = &self.index_host {
            if self.backend == VectorBackend::Pinecone && !host.starts_with("https://") {
                return Err(ValidationError::invalid(
                    "vector.index_host",
                    "Pinecone index host must be an https:// URL",
                ));
            }
        }
        Ok(())
    }
}

impl Validate for DatabaseConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.default_port == 0 {
            return Err(ValidationError::InvalidPort {
                port: self.default_port,
                field: "database.default_port".into(),
            });
        }
        if self.connect_timeout_secs == 0 {
            return Err(ValidationError::invalid(
                "database.connect_timeout_secs",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Validate for QueryConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        if self.max_results_limit == 0 {
            errors.push(ValidationError::invalid(
                "query.max_results_limit",
                "must be at least 1",
            ));
        }
        if let Err(e) = check_range(
            "query.max_results",
            self.max_results,
            1,
            self.max_results_limit.max(1),
        ) {
            errors.push(e);
        }
        if let Err(e) = check_range("query.max_retries", self.max_retries, 0, MAX_RETRIES_LIMIT) {
            errors.push(e);
        }
        if let Err(e) = check_range(
            "query.max_context_length",
            self.max_context_length,
            MIN_CONTEXT_LENGTH,
            MAX_CONTEXT_LENGTH,
        ) {
            errors.push(e);
        }
        collect_errors(errors)
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::invalid(
                "observability.log_level",
                format!("expected one of {}", LOG_LEVELS.join(", ")),
            ));
        }
        if self.log_format != "json" && self.log_format != "pretty" {
            return Err(ValidationError::invalid(
                "observability.log_format",
                "expected \"json\" or \"pretty\"",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_port() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidPort { .. })
        ));
    }

    #[test]
    fn rejects_max_results_above_limit() {
        let mut config = Config::default();
        config.query.max_results = 50;
        config.query.max_results_limit = 10;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("query.max_results"));
    }

    #[test]
    fn collects_multiple_errors() {
        let mut config = Config::default();
        config.llm.model = String::new();
        config.observability.log_format = "xml".into();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::Multiple(errs)) if errs.len() == 2
        ));
    }

    #[test]
    fn pinecone_host_must_be_https() {
        let config = VectorConfig {
            index_host: Some("http://localhost:5080".into()),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let memory = VectorConfig {
            backend: VectorBackend::Memory,
            index_host: Some("http://localhost:5080".into()),
            ..Default::default()
        };
        assert!(memory.validate().is_ok());
    }

    #[test]
    fn check_range_bounds_are_inclusive() {
        assert!(check_range("x", 1, 1, 5).is_ok());
        assert!(check_range("x", 5, 1, 5).is_ok());
        assert!(check_range("x", 6, 1, 5).is_err());
    }
}
