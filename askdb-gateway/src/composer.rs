//! Response composition: optional prose summary and timing report.

use crate::database::Row;
use crate::provider::{ChatRequest, Provider};
use crate::schema::{truncate_chars, ContextSource};
use askdb_common::LlmConfig;
use serde::Serialize;
use std::sync::Arc;

/// Rows shown to the model when summarizing.
pub const SUMMARY_ROW_LIMIT: usize = 20;

const SUMMARY_PROMPT: &str = "You summarize SQL query results for a non-technical reader. \
Answer the question in two or three sentences using only the rows provided.";

/// Per-phase wall-clock timings attached to a query response.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub context_ms: u64,
    pub generation_ms: u64,
    pub execution_ms: u64,
    pub summary_ms: u64,
    pub total_ms: u64,
    pub attempts: u32,
    pub model: String,
    pub context_source: ContextSource,
}

/// Asks the language model for a short description of a result set.
#[derive(Clone)]
pub struct Summarizer {
    provider: Arc<dyn Provider>,
    max_tokens: i64,
}

impl Summarizer {
    pub fn new(provider: Arc<dyn Provider>, llm: &LlmConfig) -> Self {
        Self {
            provider,
            max_tokens: llm.max_tokens,
        }
    }

    /// Summary of at most the first [`SUMMARY_ROW_LIMIT`] rows; `None` on any failure.
    pub async fn summarize(
        &self,
        model: &str,
        question: &str,
        sql: &str,
        rows: &[Row],
        total_count: Option<u64>,
        max_chars: usize,
    ) -> Option<String> {
        let sample = &rows[..rows.len().min(SUMMARY_ROW_LIMIT)];
        let serialized = match serde_json::to_string(sample) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "Could not serialize rows for summary");
                return None;
            }
        };

        let total = total_count.map_or_else(|| "unknown".to_string(), |n| n.to_string());
        let message = format!(
            "Question: {}\nSQL: {}\nTotal rows: {}\nRows (JSON, first {}):\n{}",
            question,
            sql,
            total,
            sample.len(),
            truncate_chars(&serialized, max_chars)
        );

        let request = ChatRequest::single_turn(model, SUMMARY_PROMPT, message)
            .with_max_tokens(self.max_tokens)
            .with_temperature(0.2);

        match self.provider.chat(request).await {
            Ok(response) => {
                let text = response.content.trim();
                if text.is_empty() {
                    tracing::warn!(model, "Summary response was empty");
                    None
                } else {
                    Some(text.to_string())
                }
            }
            Err(e) => {
                tracing::warn!(model, error = %e, "Summary generation failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ChatResponse, ProviderError, TokenUsage};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct EchoProvider {
        fail: bool,
        last_message: Mutex<String>,
    }

    #[async_trait]
    impl Provider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
            *self.last_message.lock().unwrap() = request.messages[0].content.clone();
            if self.fail {
                return Err(ProviderError {
                    provider: "echo".into(),
                    model: request.model,
                    message: "boom".into(),
                    status_code: Some(500),
                });
            }
            Ok(ChatResponse {
                provider: "echo".into(),
                model: request.model,
                content: "  There are 3 users.  ".into(),
                usage: TokenUsage::default(),
                finish_reason: None,
                latency_ms: 0,
            })
        }
    }

    fn rows(n: usize) -> Vec<Row> {
        (0..n)
            .map(|i| {
                let mut row = Row::new();
                row.insert("id".into(), serde_json::json!(i));
                row
            })
            .collect()
    }

    #[tokio::test]
    async fn summary_uses_first_twenty_rows() {
        let provider = Arc::new(EchoProvider {
            fail: false,
            last_message: Mutex::new(String::new()),
        });
        let summarizer = Summarizer::new(provider.clone(), &LlmConfig::default());
        let summary = summarizer
            .summarize("gpt-4o", "how many?", "SELECT id FROM t", &rows(30), Some(30), 4000)
            .await;
        assert_eq!(summary.as_deref(), Some("There are 3 users."));

        let sent = provider.last_message.lock().unwrap().clone();
        assert!(sent.contains("first 20"));
        assert!(sent.contains(r#"{"id":19}"#));
        assert!(!sent.contains(r#"{"id":20}"#));
    }

    #[tokio::test]
    async fn failure_yields_none() {
        let provider = Arc::new(EchoProvider {
            fail: true,
            last_message: Mutex::new(String::new()),
        });
        let summarizer = Summarizer::new(provider, &LlmConfig::default());
        assert!(summarizer
            .summarize("gpt-4o", "q", "SELECT 1", &rows(1), Some(1), 4000)
            .await
            .is_none());
    }
}
