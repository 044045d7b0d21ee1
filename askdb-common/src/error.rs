//! Error types for the askdb services.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using the askdb error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a statement rejected by the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionErrorKind {
    Syntax,
    Permission,
    Timeout,
    NotFound,
    Other,
}

impl std::fmt::Display for ExecutionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Syntax => "syntax",
            Self::Permission => "permission",
            Self::Timeout => "timeout",
            Self::NotFound => "not_found",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

/// Unified error type for askdb services.
#[derive(Error, Debug)]
pub enum Error {
    /// Database credentials rejected
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Resource not found (database, table)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input or request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The session has no live database handle
    #[error("No active database connection")]
    NoConnection,

    /// External service (database host, language model, vector index) unreachable
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// No usable SQL statement after all generation attempts
    #[error("Failed to generate a valid query after {attempts} attempt(s): {reason}")]
    Generation { attempts: u32, reason: String },

    /// The database rejected the statement
    #[error("Query execution failed ({kind}): {message}")]
    Execution {
        kind: ExecutionErrorKind,
        message: String,
    },

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Shorthand for an execution error.
    pub fn execution(kind: ExecutionErrorKind, message: impl Into<String>) -> Self {
        Self::Execution {
            kind,
            message: message.into(),
        }
    }

    /// Check if this is an authentication error.
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Check if this error means an upstream service could not be reached.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::WithContext { source, .. } => source.is_unavailable(),
            _ => false,
        }
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Auth(_) => 401,
            Self::NotFound(_) => 404,
            Self::InvalidInput(_) | Self::NoConnection | Self::Execution { .. } => 400,
            Self::Generation { .. } => 422,
            Self::Unavailable(_) => 503,
            Self::WithContext { source, .. } => source.status_code(),
        }
    }

    /// Machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Auth(_) => "AUTH_FAILED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::NoConnection => "NO_CONNECTION",
            Self::Unavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Generation { .. } => "GENERATION_FAILED",
            Self::Execution { .. } => "EXECUTION_FAILED",
            Self::WithContext { source, .. } => source.code(),
        }
    }

    /// Structured details attached to the error body, if any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Execution { kind, .. } => Some(serde_json::json!({ "kind": kind })),
            Self::Generation { attempts, .. } => {
                Some(serde_json::json!({ "attempts": attempts }))
            }
            Self::WithContext { source, .. } => source.details(),
            _ => None,
        }
    }

    /// Build the JSON error body for this error.
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            success: false,
            error: self.to_string(),
            code: self.code().to_string(),
            details: self.details(),
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let status = axum::http::StatusCode::from_u16(self.status_code())
            .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "Request failed");
        } else {
            tracing::debug!(error = %self, code = self.code(), "Request rejected");
        }
        (status, axum::Json(self.to_response())).into_response()
    }
}
