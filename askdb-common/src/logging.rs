//! Logging utilities for askdb services.
//!
//! Provides structured JSON or pretty logging with trace IDs for observability.
//!
//! # Noise Filtering
//!
//! Library targets in [`NOISY_MODULES`] are held at `warn` so request logs
//! stay readable at `debug`.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Header used to propagate the trace ID.
pub const TRACE_ID_HEADER: &str = "X-Trace-Id";

/// Library targets held at `warn` unless `RUST_LOG` says otherwise.
pub const NOISY_MODULES: &[&str] = &[
    "hyper",
    "hyper_util",
    "reqwest",
    "h2",
    "rustls",
    "tower_http",
    "sqlx",
];

/// Filter directives for `log_level` with the noisy targets pinned to `warn`.
fn default_directives(log_level: &str) -> String {
    NOISY_MODULES
        .iter()
        .fold(log_level.to_string(), |acc, module| format!("{acc},{module}=warn"))
}

/// Install the global subscriber.
///
/// `log_format` is `json` for one JSON object per event, anything else for
/// human-readable lines. `RUST_LOG` replaces the level and noise filter.
pub fn init_logging(log_level: &str, log_format: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(log_level)));

    let fmt = tracing_subscriber::fmt::layer().with_target(true);
    let fmt = if log_format == "json" {
        fmt.json().with_current_span(true).boxed()
    } else {
        fmt.boxed()
    };

    if tracing_subscriber::registry()
        .with(filter)
        .with(fmt)
        .try_init()
        .is_ok()
    {
        tracing::info!(log_level, log_format, "Logging initialized");
    }
}

/// Generate a new trace ID for request tracing.
pub fn generate_trace_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Read the trace ID from incoming headers, or mint a new one.
pub fn trace_id_from_headers(headers: &http::HeaderMap) -> String {
    headers
        .get(TRACE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(String::from)
        .unwrap_or_else(generate_trace_id)
}

// ============================================================================
// Metrics
// ============================================================================

/// Simple request metrics collector.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    inner: Arc<RwLock<MetricsInner>>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    request_count: u64,
    error_count: u64,
    total_duration_ms: u64,
}

impl Metrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request.
    pub async fn record_request(&self, duration_ms: u64, success: bool) {
        let mut inner = self.inner.write().await;
        inner.request_count += 1;
        inner.total_duration_ms += duration_ms;
        if !success {
            inner.error_count += 1;
        }
    }

    /// Get current metrics summary.
    pub async fn summary(&self) -> MetricsSummary {
        let inner = self.inner.read().await;
        MetricsSummary {
            request_count: inner.request_count,
            error_count: inner.error_count,
            avg_duration_ms: if inner.request_count > 0 {
                inner.total_duration_ms / inner.request_count
            } else {
                0
            },
        }
    }
}

/// Metrics summary for reporting.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MetricsSummary {
    pub request_count: u64,
    pub error_count: u64,
    pub avg_duration_ms: u64,
}

// ============================================================================
// HTTP tracing middleware
// ============================================================================

/// Per-request tracing: assigns a trace ID, logs the outcome, records metrics.
#[cfg(feature = "axum")]
pub async fn trace_middleware(
    axum::extract::State(metrics): axum::extract::State<Metrics>,
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    use tracing::Instrument;

    let start = std::time::Instant::now();
    let trace_id = trace_id_from_headers(request.headers());
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let span = tracing::info_span!("request", trace_id = %trace_id, method = %method, path = %path);
    let mut response = next.run(request).instrument(span.clone()).await;

    let duration_ms = start.elapsed().as_millis() as u64;
    let status = response.status();
    // 4xx are client outcomes (bad input, no connection), not service errors
    metrics
        .record_request(duration_ms, !status.is_server_error())
        .await;

    span.in_scope(|| {
        tracing::info!(status = status.as_u16(), duration_ms, "Request completed");
    });

    if let Ok(value) = http::HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert(TRACE_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noisy_modules_list() {
        assert!(NOISY_MODULES.contains(&"hyper"));
        assert!(NOISY_MODULES.contains(&"sqlx"));
        assert!(!NOISY_MODULES.contains(&"askdb_gateway"));
    }

    #[test]
    fn test_default_directives() {
        let directives = default_directives("debug");
        assert!(directives.starts_with("debug,"));
        assert!(directives.contains(",sqlx=warn"));
        assert!(EnvFilter::try_new(&directives).is_ok());
    }

    #[test]
    fn test_generate_trace_id() {
        let a = generate_trace_id();
        let b = generate_trace_id();
        assert_eq!(a.len(), 36);
        assert_ne!(a, b);
    }

    #[test]
    fn test_trace_id_from_headers() {
        let mut headers = http::HeaderMap::new();
        headers.insert(TRACE_ID_HEADER, "abc-123".parse().unwrap());
        assert_eq!(trace_id_from_headers(&headers), "abc-123");

        let empty = http::HeaderMap::new();
        assert_eq!(trace_id_from_headers(&empty).len(), 36);
    }

    #[tokio::test]
    async fn test_metrics_recording() {
        let metrics = Metrics::new();
        metrics.record_request(100, true).await;
        metrics.record_request(300, false).await;

        let summary = metrics.summary().await;
        assert_eq!(summary.request_count, 2);
        assert_eq!(summary.error_count, 1);
        assert_eq!(summary.avg_duration_ms, 200);
    }
}
