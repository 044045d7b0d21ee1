//! Pinecone-backed vector index.
//!
//! Talks to the index's data-plane host over REST. The index must already
//! exist with a dimension matching the embedding provider.

use crate::traits::{ScoredRecord, VectorIndex, VectorRecord};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

const API_VERSION: &str = "2024-07";

/// Pinecone index client.
pub struct PineconeIndex {
    client: reqwest::Client,
    host: String,
}

impl PineconeIndex {
    /// Create a client for the index served at `host`.
    ///
    /// # Example
    /// ```ignore
    /// let index = PineconeIndex::new("pc-key", "https://schemas-abc123.svc.us-east-1.pinecone.io")?;
    /// ```
    pub fn new(api_key: &str, host: &str) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("Api-Key", HeaderValue::from_str(api_key)?);
        headers.insert("X-Pinecone-API-Version", HeaderValue::from_static(API_VERSION));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
        })
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> anyhow::Result<R> {
        let url = format!("{}{}", self.host, path);
        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Pinecone {} failed ({}): {}", path, status.as_u16(), body);
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    fn name(&self) -> &str {
        "pinecone"
    }

    async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> anyhow::Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let count = records.len();
        let response: UpsertResponse = self
            .post(
                "/vectors/upsert",
                &UpsertRequest {
                    vectors: records,
                    namespace,
                },
            )
            .await?;
        tracing::debug!(
            namespace,
            requested = count,
            upserted = response.upserted_count,
            "Pinecone upsert"
        );
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> anyhow::Result<Vec<ScoredRecord>> {
        let response: QueryResponse = self
            .post(
                "/query",
                &QueryRequest {
                    namespace,
                    vector,
                    top_k,
                    include_metadata: true,
                    include_values: false,
                },
            )
            .await?;
        Ok(response.matches)
    }

    async fn delete_namespace(&self, namespace: &str) -> anyhow::Result<()> {
        let _: serde_json::Value = self
            .post(
                "/vectors/delete",
                &DeleteRequest {
                    delete_all: true,
                    namespace,
                },
            )
            .await?;
        Ok(())
    }

    async fn health_check(&self) -> bool {
        match self
            .post::<_, serde_json::Value>("/describe_index_stats", &serde_json::json!({}))
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Pinecone health check failed");
                false
            }
        }
    }
}

// ============================================================================
// Pinecone API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<VectorRecord>,
    namespace: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    namespace: &'a str,
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<ScoredRecord>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteRequest<'a> {
    delete_all: bool,
    namespace: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn upsert_sends_namespace_and_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/vectors/upsert"))
            .and(header("Api-Key", "pc-test"))
            .and(body_partial_json(serde_json::json!({
                "namespace": "sess-1",
                "vectors": [{ "id": "sess-1:orders" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "upsertedCount": 1 })))
            .expect(1)
            .mount(&server)
            .await;

        let index = PineconeIndex::new("pc-test", &server.uri()).unwrap();
        index
            .upsert(
                "sess-1",
                vec![VectorRecord::new("sess-1:orders", vec![0.5, 0.5]).with_metadata("table", "orders")],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn query_parses_matches() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .and(body_partial_json(serde_json::json!({ "topK": 2, "includeMetadata": true })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "matches": [
                    { "id": "s:orders", "score": 0.92, "metadata": { "table": "orders" } },
                    { "id": "s:users", "score": 0.41 }
                ],
                "namespace": "s"
            })))
            .mount(&server)
            .await;

        let index = PineconeIndex::new("pc-test", &server.uri()).unwrap();
        let matches = index.query("s", &[1.0, 0.0], 2).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].metadata_str("table"), Some("orders"));
        assert!(matches[1].metadata.is_empty());
    }

    #[tokio::test]
    async fn errors_and_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let index = PineconeIndex::new("pc-test", &server.uri()).unwrap();
        assert!(index.query("s", &[1.0], 1).await.is_err());
        assert!(!index.health_check().await);
    }
}
