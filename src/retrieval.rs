//! Retrieval pipeline.
//!
//! Orchestrates the vector index and the access filter to produce a ranked,
//! access-filtered list of fragments for a query. Two independent fail-closed
//! boundaries compose here: the collection scope (pushed into the index
//! search) and the caller's per-file entitlement (applied after).

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::access::restrict_to_allowed;
use crate::completion::ChatTurn;
use crate::index::{ScopeFilter, VectorIndex};

pub const DEFAULT_TOP_K: usize = 5;
pub const MAX_TOP_K: usize = 20;

/// One answer request. Ephemeral, never persisted.
#[derive(Debug, Clone)]
pub struct Query {
    pub text: String,
    pub top_k: usize,
    /// Tenant scope; when absent the search is unscoped (trusted callers only).
    pub collection_id: Option<String>,
    /// Access entitlement computed upstream. `None` means unrestricted.
    pub allowed_file_ids: Option<HashSet<String>>,
    /// Prior conversation, oldest first.
    pub history: Vec<ChatTurn>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            top_k: DEFAULT_TOP_K,
            collection_id: None,
            allowed_file_ids: None,
            history: Vec::new(),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_collection(mut self, collection_id: impl Into<String>) -> Self {
        self.collection_id = Some(collection_id.into());
        self
    }

    pub fn with_allowed_files(mut self, allowed: HashSet<String>) -> Self {
        self.allowed_file_ids = Some(allowed);
        self
    }

    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.history = history;
        self
    }
}

/// Caller-visible retrieval result; vector and raw score are dropped.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedFragment {
    pub text: String,
    pub file_name: String,
    pub file_id: String,
    pub chunk_index: usize,
}

pub struct RetrievalPipeline {
    index: Arc<VectorIndex>,
}

impl RetrievalPipeline {
    pub fn new(index: Arc<VectorIndex>) -> Self {
        Self { index }
    }

    /// Ranked, access-filtered fragments for a query.
    ///
    /// An empty result means "insufficient grounding", never an error:
    /// per-query index failures are logged and degrade to empty.
    pub async fn retrieve(&self, query: &Query) -> Vec<RetrievedFragment> {
        let limit = query.top_k.clamp(1, MAX_TOP_K);
        let filter = match &query.collection_id {
            Some(collection_id) => ScopeFilter::collection(collection_id.clone()),
            None => ScopeFilter::default(),
        };

        let hits = match self.index.search(&query.text, limit, &filter).await {
            Ok(hits) => hits,
            Err(err) => {
                tracing::warn!("Retrieval search failed, treating as no grounding: {}", err);
                Vec::new()
            }
        };

        let hits = restrict_to_allowed(hits, query.allowed_file_ids.as_ref());

        hits.into_iter()
            .map(|hit| RetrievedFragment {
                text: hit.payload.text,
                file_name: hit.payload.file_name,
                file_id: hit.payload.file_id,
                chunk_index: hit.payload.chunk_index,
            })
            .collect()
    }
}
