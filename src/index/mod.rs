//! Searchable vector index.
//!
//! One logical index per deployment, shared across tenants; isolation is
//! expressed purely through metadata filters over fragment payloads. Two
//! interchangeable backends satisfy the same contract:
//! - `QdrantIndex`: remote similarity-search service, filters pushed down
//! - `MemoryIndex`: in-process brute-force scan, used when the remote
//!   service is unreachable at startup

mod memory;
mod qdrant;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use memory::MemoryIndex;
pub use qdrant::QdrantIndex;

use crate::core::config::IndexConfig;
use crate::core::errors::RagError;
use crate::embedding::Embedder;

/// Metadata stored alongside each fragment vector.
///
/// `collection_id`/`website_id` are the tenant-scoping fields. Fragments
/// written without them are inadmissible under any scoped query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentPayload {
    pub text: String,
    pub file_id: String,
    pub file_name: String,
    pub chunk_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_id: Option<String>,
}

/// Exact-match conjunction over payload fields.
#[derive(Debug, Clone, Default)]
pub struct ScopeFilter {
    pub collection_id: Option<String>,
    pub website_id: Option<String>,
    pub file_id: Option<String>,
}

impl ScopeFilter {
    pub fn collection(collection_id: impl Into<String>) -> Self {
        Self {
            collection_id: Some(collection_id.into()),
            ..Self::default()
        }
    }

    pub fn file(file_id: impl Into<String>) -> Self {
        Self {
            file_id: Some(file_id.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.collection_id.is_none() && self.website_id.is_none() && self.file_id.is_none()
    }

    /// Fail-closed payload predicate: a required scope field that is missing
    /// on the payload is a mismatch, never a wildcard.
    pub fn matches(&self, payload: &FragmentPayload) -> bool {
        if let Some(expected) = &self.collection_id {
            if payload.collection_id.as_ref() != Some(expected) {
                return false;
            }
        }
        if let Some(expected) = &self.website_id {
            if payload.website_id.as_ref() != Some(expected) {
                return false;
            }
        }
        if let Some(expected) = &self.file_id {
            if &payload.file_id != expected {
                return false;
            }
        }
        true
    }
}

/// One search result: payload plus cosine similarity score.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub payload: FragmentPayload,
    pub score: f32,
}

enum IndexBackend {
    Remote(QdrantIndex),
    Memory(MemoryIndex),
}

/// Process-wide vector index handle.
///
/// Embeds query/fragment text internally so callers only deal in text and
/// payloads. Backend selection happens once at construction and is not
/// re-attempted per request.
pub struct VectorIndex {
    embedder: Arc<dyn Embedder>,
    backend: IndexBackend,
}

impl VectorIndex {
    /// Connect to the configured remote index, degrading to the in-process
    /// backend (with a logged warning) when it is unreachable.
    pub async fn connect(config: &IndexConfig, embedder: Arc<dyn Embedder>) -> Self {
        let backend = match &config.url {
            Some(url) => match QdrantIndex::connect(url, &config.collection, config).await {
                Ok(remote) => {
                    tracing::info!(
                        "Vector index using remote backend at {} (collection {})",
                        url,
                        config.collection
                    );
                    IndexBackend::Remote(remote)
                }
                Err(err) => {
                    tracing::warn!(
                        "Remote vector index unavailable ({}), falling back to in-memory backend",
                        err
                    );
                    IndexBackend::Memory(MemoryIndex::new())
                }
            },
            None => {
                tracing::info!("No remote index configured, using in-memory backend");
                IndexBackend::Memory(MemoryIndex::new())
            }
        };

        Self { embedder, backend }
    }

    /// Construct directly on the in-process backend.
    pub fn in_memory(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            backend: IndexBackend::Memory(MemoryIndex::new()),
        }
    }

    /// Embed `text` and store it with `payload`, returning the assigned id.
    pub async fn upsert(&self, text: &str, payload: FragmentPayload) -> Result<String, RagError> {
        let vector = self.embedder.encode(text).await?;
        let id = Uuid::new_v4().to_string();
        match &self.backend {
            IndexBackend::Remote(remote) => remote.upsert(&id, &vector, &payload).await?,
            IndexBackend::Memory(memory) => memory.upsert(&id, vector, payload).await,
        }
        Ok(id)
    }

    /// Remove a fragment by id. Deleting a non-existent id is a no-op.
    pub async fn delete(&self, id: &str) -> Result<(), RagError> {
        match &self.backend {
            IndexBackend::Remote(remote) => remote.delete(id).await,
            IndexBackend::Memory(memory) => {
                memory.delete(id).await;
                Ok(())
            }
        }
    }

    /// Remove every fragment whose payload matches `filter`.
    pub async fn delete_by_filter(&self, filter: &ScopeFilter) -> Result<(), RagError> {
        if filter.is_empty() {
            return Err(RagError::BadRequest(
                "refusing to delete with an empty filter".to_string(),
            ));
        }
        match &self.backend {
            IndexBackend::Remote(remote) => remote.delete_by_filter(filter).await,
            IndexBackend::Memory(memory) => {
                let removed = memory.delete_by_filter(filter).await;
                tracing::debug!("Deleted {} fragments by filter", removed);
                Ok(())
            }
        }
    }

    /// Top-k cosine similarity search restricted to payloads matching
    /// `filter`, ranked descending.
    ///
    /// Results are re-checked against the filter after retrieval so a
    /// misbehaving backend can never surface an out-of-scope fragment.
    pub async fn search(
        &self,
        query_text: &str,
        top_k: usize,
        filter: &ScopeFilter,
    ) -> Result<Vec<SearchHit>, RagError> {
        let query_vector = self.embedder.encode(query_text).await?;
        let hits = match &self.backend {
            IndexBackend::Remote(remote) => remote.search(&query_vector, top_k, filter).await?,
            IndexBackend::Memory(memory) => memory.search(&query_vector, top_k, filter).await?,
        };

        let mut admissible = Vec::with_capacity(hits.len());
        for hit in hits {
            if filter.matches(&hit.payload) {
                admissible.push(hit);
            } else {
                tracing::warn!(
                    file_id = %hit.payload.file_id,
                    "Dropping out-of-scope fragment returned by index backend"
                );
            }
        }
        Ok(admissible)
    }

    /// Current index population.
    pub async fn count(&self) -> Result<usize, RagError> {
        match &self.backend {
            IndexBackend::Remote(remote) => remote.count().await,
            IndexBackend::Memory(memory) => Ok(memory.count().await),
        }
    }
}
