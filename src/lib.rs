//! Multi-tenant retrieval and grounded answering core.
//!
//! Retrieves semantically relevant document fragments for a query, enforces
//! tenant and per-file access boundaries on the retrieved set, and assembles
//! a grounded answer with deterministic source attribution. The HTTP layer,
//! authentication, file chunking, and storage live in the embedding host;
//! this crate is the retrieval/answering core they call into.

pub mod access;
pub mod completion;
pub mod core;
pub mod embedding;
pub mod index;
pub mod logging;
pub mod prompts;
pub mod retrieval;
pub mod synthesis;
pub mod vector_math;

mod service;

pub use completion::{ChatTurn, CompletionRequest, CompletionService, HttpCompletionClient};
pub use crate::core::config::{RagConfig, EMBEDDING_DIM};
pub use crate::core::errors::RagError;
pub use embedding::{Embedder, HttpEmbedder};
pub use index::{FragmentPayload, ScopeFilter, SearchHit, VectorIndex};
pub use prompts::{PromptConfig, PromptProvider, PromptResolver, SqlitePromptStore};
pub use retrieval::{Query, RetrievalPipeline, RetrievedFragment, DEFAULT_TOP_K, MAX_TOP_K};
pub use service::RagService;
pub use synthesis::{Answer, AnswerSynthesizer, NO_GROUNDING_REPLY};
