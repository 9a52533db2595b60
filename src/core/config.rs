//! Crate configuration.
//!
//! All components are constructed from a single `RagConfig` value, which can
//! be built programmatically or loaded from a TOML file. Every field has a
//! working default so a bare `RagConfig::default()` yields a usable
//! in-memory deployment (no remote index, no prompt database).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::RagError;

/// Vector dimension of the reference embedding model.
pub const EMBEDDING_DIM: usize = 384;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub index: IndexConfig,
    pub embedding: EmbeddingConfig,
    pub completion: CompletionConfig,
    pub prompts: PromptDefaults,
    /// Optional SQLite database holding per-collection prompts.
    /// When absent, prompt resolution always uses the process-wide defaults.
    pub prompt_db: Option<PathBuf>,
}

impl RagConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, RagError> {
        let raw = std::fs::read_to_string(path).map_err(RagError::internal)?;
        toml::from_str(&raw).map_err(RagError::internal)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Base URL of the remote similarity-search service. When unset (or
    /// unreachable at startup) the in-process fallback backend is used.
    pub url: Option<String>,
    /// Logical collection name on the remote service.
    pub collection: String,
    pub vector_size: usize,
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: None,
            collection: "fragments".to_string(),
            vector_size: EMBEDDING_DIM,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            model: "all-MiniLM-L6-v2".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".to_string(),
            api_key: String::new(),
            timeout_secs: 20,
        }
    }
}

/// Process-wide prompt defaults, used when a collection has no stored prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptDefaults {
    pub system_prompt: String,
    pub model_name: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for PromptDefaults {
    fn default() -> Self {
        Self {
            system_prompt: "You are a helpful assistant. Answer the question using only the \
                            provided context."
                .to_string(),
            model_name: "claude-3-5-haiku-latest".to_string(),
            max_tokens: 1024,
            temperature: 0.3,
        }
    }
}
