//! Text embedding.
//!
//! The `Embedder` trait is the seam between the retrieval core and the
//! embedding model. The production implementation talks to an
//! OpenAI-compatible `/v1/embeddings` endpoint; tests substitute a
//! deterministic in-process implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::core::config::EmbeddingConfig;
use crate::core::errors::RagError;
use crate::vector_math::l2_normalize;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Output vector dimension.
    fn dim(&self) -> usize;

    /// Encode a single text into an L2-normalized vector.
    async fn encode(&self, text: &str) -> Result<Vec<f32>, RagError>;

    /// Encode a batch of texts, preserving order.
    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;
}

/// Embedder backed by an OpenAI-compatible embeddings endpoint.
pub struct HttpEmbedder {
    base_url: String,
    model: String,
    dim: usize,
    client: Client,
}

impl HttpEmbedder {
    /// Connect to the embedding service, probing it once.
    ///
    /// An unreachable service is a fatal initialization error
    /// (`EmbeddingUnavailable`), never a per-request retry condition.
    pub async fn connect(config: &EmbeddingConfig, dim: usize) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(RagError::internal)?;

        let embedder = Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dim,
            client,
        };

        let url = format!("{}/v1/models", embedder.base_url);
        let reachable = match embedder.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        };
        if !reachable {
            tracing::error!("Embedding service unreachable at {}", embedder.base_url);
            return Err(RagError::EmbeddingUnavailable);
        }

        tracing::info!(
            "Embedding service ready at {} (model {}, dim {})",
            embedder.base_url,
            embedder.model,
            embedder.dim
        );
        Ok(embedder)
    }
}

/// Extract embedding vectors from an OpenAI-style response payload.
fn parse_embeddings(payload: &Value, expected: usize, dim: usize) -> Result<Vec<Vec<f32>>, RagError> {
    let data = payload["data"]
        .as_array()
        .ok_or_else(|| RagError::Internal("embeddings response missing data array".to_string()))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let values = item["embedding"]
            .as_array()
            .ok_or_else(|| RagError::Internal("embeddings response missing vector".to_string()))?;
        let vector: Vec<f32> = values
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();
        if vector.len() != dim {
            return Err(RagError::Internal(format!(
                "embedding dimension mismatch: got {}, expected {}",
                vector.len(),
                dim
            )));
        }
        embeddings.push(vector);
    }

    if embeddings.len() != expected {
        return Err(RagError::Internal(format!(
            "embeddings response count mismatch: got {}, expected {}",
            embeddings.len(),
            expected
        )));
    }

    Ok(embeddings)
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn encode(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let mut batch = self.encode_batch(std::slice::from_ref(&text.to_string())).await?;
        batch
            .pop()
            .ok_or_else(|| RagError::Internal("empty embeddings response".to_string()))
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.base_url);
        let body = json!({
            "model": self.model,
            "input": texts,
        });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(RagError::internal)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Internal(format!("embeddings error: {}", text)));
        }

        let payload: Value = res.json().await.map_err(RagError::internal)?;
        let mut embeddings = parse_embeddings(&payload, texts.len(), self.dim)?;
        for vector in embeddings.iter_mut() {
            l2_normalize(vector);
        }

        Ok(embeddings)
    }
}
