//! Error types for the Chroma adapter

use thiserror::Error;

/// Error type for vector index operations
#[derive(Debug, Error)]
pub enum ChromaError {
    /// The server could not be reached or answered with a server error
    #[error("Chroma unavailable: {0}")]
    Unavailable(String),

    /// Caller passed mismatched chunk/vector batches
    #[error("chunks and embeddings length mismatch: {chunks} vs {vectors}")]
    LengthMismatch { chunks: usize, vectors: usize },

    /// The server answered with an unexpected shape or status
    #[error("unexpected Chroma response: {0}")]
    UnexpectedResponse(String),
}

impl From<reqwest::Error> for ChromaError {
    fn from(err: reqwest::Error) -> Self {
        ChromaError::Unavailable(err.to_string())
    }
}

impl From<ChromaError> for crate::error::Error {
    fn from(err: ChromaError) -> Self {
        crate::error::Error::VectorIndexUnavailable(err.to_string())
    }
}
