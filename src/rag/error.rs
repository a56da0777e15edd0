//! Error types for the RAG orchestrator

use thiserror::Error;

use crate::ollama::OllamaError;
use crate::vectorizer::VectorizeError;

/// Error type for RAG queries
#[derive(Debug, Error)]
pub enum RagError {
    /// The query string was empty
    #[error("query cannot be empty")]
    EmptyQuery,

    /// Retrieval (embedding or index) failed
    #[error("retrieval failed: {0}")]
    Retrieval(#[from] VectorizeError),

    /// Generation failed before any token was streamed
    #[error("generation failed: {0}")]
    Generation(#[from] OllamaError),

    /// The stream consumer went away
    #[error("stream closed: {0}")]
    StreamClosed(String),
}

impl From<RagError> for crate::error::Error {
    fn from(err: RagError) -> Self {
        match err {
            RagError::EmptyQuery => {
                crate::error::Error::Other("query cannot be empty".to_string())
            }
            RagError::Retrieval(e) => e.into(),
            RagError::Generation(e) => crate::error::Error::LlmUnavailable(e.to_string()),
            RagError::StreamClosed(_) => crate::error::Error::Cancelled,
        }
    }
}
