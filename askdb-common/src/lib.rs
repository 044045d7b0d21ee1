//! askdb Common - Shared types, utilities, and configuration for the askdb services.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Configuration validation
//! - Error types and their HTTP mapping
//! - Logging setup and request tracing helpers

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod config_loader;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{
    Config, DatabaseConfig, LlmConfig, ObservabilityConfig, QueryConfig, SecretsConfig,
    ServerConfig, VectorBackend, VectorConfig,
};
pub use error::{Error, ExecutionErrorKind, Result};
pub use validation::{Validate, ValidationError, ValidationResult};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, ExecutionErrorKind, Result};
    pub use crate::logging::init_logging;
    pub use crate::validation::{Validate, ValidationError};
}
