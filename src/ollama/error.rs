//! Error types for the Ollama client

use thiserror::Error;

/// Error type for Ollama operations
#[derive(Debug, Error)]
pub enum OllamaError {
    /// The server could not be reached
    #[error("Ollama unreachable: {0}")]
    RemoteUnavailable(String),

    /// The requested model is not loaded on the server
    #[error("model not loaded: {0}")]
    ModelNotLoaded(String),

    /// The request exceeded its deadline
    #[error("Ollama request timed out")]
    Timeout,

    /// The server answered with an unexpected shape or status
    #[error("unexpected Ollama response: {0}")]
    UnexpectedResponse(String),

    /// The stream consumer asked to stop
    #[error("stream cancelled by consumer: {0}")]
    Cancelled(String),
}

impl From<reqwest::Error> for OllamaError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            OllamaError::Timeout
        } else if err.is_connect() {
            OllamaError::RemoteUnavailable(err.to_string())
        } else {
            OllamaError::UnexpectedResponse(err.to_string())
        }
    }
}
