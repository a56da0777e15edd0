//! Error types for the vectorizer module

use thiserror::Error;

use crate::chroma::ChromaError;
use crate::ollama::OllamaError;

/// Error type for the embed pipeline
#[derive(Debug, Error)]
pub enum VectorizeError {
    /// Cannot embed an empty string
    #[error("cannot embed empty text")]
    EmptyText,

    /// The cleaned text produced no chunks
    #[error("no chunks generated from content")]
    NoChunks,

    /// Embedding call failed
    #[error("embedding failed: {0}")]
    Embedding(#[from] OllamaError),

    /// Vector index call failed
    #[error("vector index failed: {0}")]
    Index(#[from] ChromaError),
}

impl From<VectorizeError> for crate::error::Error {
    fn from(err: VectorizeError) -> Self {
        match err {
            VectorizeError::Embedding(e) => crate::error::Error::EmbedUnavailable(e.to_string()),
            VectorizeError::Index(e) => e.into(),
            other => crate::error::Error::Other(other.to_string()),
        }
    }
}
