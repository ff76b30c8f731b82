//! Milvus RESTful (v2) backend.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::{Connector, SearchSession};
use crate::error::BackendError;

const SEARCH_PATH: &str = "/v2/vectordb/entities/search";
const DESCRIBE_PATH: &str = "/v2/vectordb/collections/describe";

/// Connection settings for a Milvus endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilvusConfig {
    /// Base URI, e.g. `http://localhost:19530`
    pub uri: String,
    /// Bearer token (`user:password` or API key); empty disables the header
    pub token: String,
    /// Collection to search
    pub collection_name: String,
    /// Vector field the searches run against
    pub vector_field: String,
    /// Connect and request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for MilvusConfig {
    fn default() -> Self {
        Self {
            uri: "http://localhost:19530".to_string(),
            token: "root:Milvus".to_string(),
            collection_name: "conc_bench".to_string(),
            vector_field: "vector".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Request body for `entities/search`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    collection_name: &'a str,
    anns_field: &'a str,
    limit: usize,
    data: [&'a [f32]; 1],
}

/// Request body for `collections/describe`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DescribeRequest<'a> {
    collection_name: &'a str,
}

/// Envelope shared by every Milvus REST response
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: Option<String>,
}

/// Connector that opens one HTTP client per worker
pub struct MilvusConnector {
    config: Arc<MilvusConfig>,
}

impl MilvusConnector {
    pub fn new(config: MilvusConfig) -> Self {
        Self {
            config: Arc::new(MilvusConfig {
                uri: config.uri.trim_end_matches('/').to_string(),
                ..config
            }),
        }
    }

    pub fn config(&self) -> &MilvusConfig {
        &self.config
    }
}

#[async_trait]
impl Connector for MilvusConnector {
    async fn connect(&self, worker_id: usize) -> Result<Box<dyn SearchSession>, BackendError> {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .pool_max_idle_per_host(1)
            .build()
            .map_err(|e| BackendError::Connect(format!("failed to create HTTP client: {}", e)))?;

        let session = MilvusSession {
            client,
            search_url: format!("{}{}", self.config.uri, SEARCH_PATH),
            config: self.config.clone(),
        };

        // Probe the collection so the worker only reports ready with a live session
        session
            .post(
                &format!("{}{}", self.config.uri, DESCRIBE_PATH),
                &DescribeRequest {
                    collection_name: &self.config.collection_name,
                },
            )
            .await
            .map_err(|e| BackendError::Connect(e.to_string()))?;

        tracing::debug!(
            worker = worker_id,
            uri = %self.config.uri,
            collection = %self.config.collection_name,
            "Milvus session established"
        );

        Ok(Box::new(session))
    }

    fn name(&self) -> &str {
        "milvus"
    }
}

/// A worker's private Milvus session
pub struct MilvusSession {
    client: Client,
    search_url: String,
    config: Arc<MilvusConfig>,
}

impl MilvusSession {
    async fn post<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<(), BackendError> {
        let mut request = self.client.post(url).json(body);
        if !self.config.token.is_empty() {
            request = request.bearer_auth(&self.config.token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Query(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| BackendError::Query(format!("invalid response body: {}", e)))?;

        if envelope.code != 0 {
            return Err(BackendError::Query(format!(
                "code {}: {}",
                envelope.code,
                envelope.message.unwrap_or_default()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl SearchSession for MilvusSession {
    async fn search(&mut self, query: &[f32], top_k: usize) -> Result<(), BackendError> {
        let body = SearchRequest {
            collection_name: &self.config.collection_name,
            anns_field: &self.config.vector_field,
            limit: top_k,
            data: [query],
        };
        self.post(&self.search_url, &body).await
    }
}
