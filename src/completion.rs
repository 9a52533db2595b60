//! Remote text-completion service client.
//!
//! The wire contract is the Anthropic-style messages API: request
//! `{model, max_tokens, temperature, messages}`, response carrying a
//! top-level `content` list whose first element's `text` is the answer.
//! Any other shape, or a non-2xx status, is a failure.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::config::CompletionConfig;
use crate::core::errors::RagError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub messages: Vec<ChatTurn>,
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, RagError>;
}

pub struct HttpCompletionClient {
    base_url: String,
    api_key: String,
    client: Client,
}

impl HttpCompletionClient {
    pub fn new(config: &CompletionConfig) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(RagError::internal)?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client,
        })
    }
}

/// Pull the answer text out of a messages-API response payload.
fn extract_text(payload: &Value) -> Option<&str> {
    payload["content"].as_array()?.first()?["text"].as_str()
}

#[async_trait]
impl CompletionService for HttpCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, RagError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": request.messages,
        });

        let res = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::Completion(e.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Completion(format!("{}: {}", status, text)));
        }

        let payload: Value = res.json().await.map_err(|e| RagError::Completion(e.to_string()))?;
        extract_text(&payload)
            .map(str::to_string)
            .ok_or_else(|| RagError::Completion("unexpected response shape".to_string()))
    }
}
