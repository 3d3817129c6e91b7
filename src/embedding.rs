// src/embedding.rs - Optional semantic-embedding capability.
//
// The backend is an explicit capability with an availability flag decided at
// construction, not a try/catch around every call: detection degrades to
// text-only scoring when no backend is reachable, and that degradation is a
// first-class, testable branch.

use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::store::MatchingError;

#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Decided once at construction; callers must not probe per call.
    fn is_available(&self) -> bool;

    /// Encodes many contexts in one call. Detection always batches a whole
    /// population rather than encoding per pair.
    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MatchingError>;
}

/// Stand-in when no backend is configured.
pub struct DisabledEmbeddingBackend;

#[async_trait]
impl EmbeddingBackend for DisabledEmbeddingBackend {
    fn is_available(&self) -> bool {
        false
    }

    async fn encode_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, MatchingError> {
        Err(MatchingError::InvalidInput(
            "embedding backend is disabled".to_string(),
        ))
    }
}

#[derive(Serialize)]
struct EncodeRequest<'a> {
    texts: &'a [String],
}

#[derive(Deserialize)]
struct EncodeResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Client for an external sentence-embedding service.
pub struct HttpEmbeddingBackend {
    client: reqwest::Client,
    endpoint: String,
    available: bool,
}

impl HttpEmbeddingBackend {
    /// Probes the service health endpoint once. An unreachable service is not
    /// an error: the backend reports unavailable and detection runs text-only.
    pub async fn connect(endpoint: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();

        let health_url = format!("{}/health", endpoint.trim_end_matches('/'));
        let available = match client.get(&health_url).send().await {
            Ok(response) if response.status().is_success() => {
                info!("Embedding service reachable at {}", endpoint);
                true
            }
            Ok(response) => {
                warn!(
                    "Embedding service at {} answered {}; semantic scoring disabled",
                    endpoint,
                    response.status()
                );
                false
            }
            Err(e) => {
                warn!(
                    "Embedding service at {} unreachable ({}); semantic scoring disabled",
                    endpoint, e
                );
                false
            }
        };

        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            available,
        }
    }
}

#[async_trait]
impl EmbeddingBackend for HttpEmbeddingBackend {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MatchingError> {
        let url = format!("{}/encode", self.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&EncodeRequest { texts })
            .send()
            .await
            .map_err(|e| MatchingError::Storage(anyhow::anyhow!("encode request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| MatchingError::Storage(anyhow::anyhow!("encode request rejected: {}", e)))?;

        let body: EncodeResponse = response
            .json()
            .await
            .map_err(|e| MatchingError::Storage(anyhow::anyhow!("malformed encode response: {}", e)))?;
        Ok(body.embeddings)
    }
}

/// Builds the backend the environment asks for: `EMBEDDING_SERVICE_URL` set
/// means HTTP, unset means disabled.
pub async fn backend_from_env() -> Arc<dyn EmbeddingBackend> {
    match std::env::var("EMBEDDING_SERVICE_URL") {
        Ok(url) if !url.trim().is_empty() => Arc::new(HttpEmbeddingBackend::connect(&url).await),
        _ => Arc::new(DisabledEmbeddingBackend),
    }
}
