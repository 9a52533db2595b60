use thiserror::Error;

/// Crate-wide error type.
///
/// User-visible answer text never carries these messages directly; the
/// synthesis layer maps every failure to a fixed friendly template and
/// logs the underlying error.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("embedding model unavailable")]
    EmbeddingUnavailable,
    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),
    #[error("completion service error: {0}")]
    Completion(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl RagError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        RagError::Internal(err.to_string())
    }
}
