//! Error types for the quarry crate

/// Result type for quarry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for quarry operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// URL failed to parse
    #[error("malformed URL: {0}")]
    MalformedUrl(String),

    /// HTTP fetch of a page failed
    #[error("fetch failed: {0}")]
    FetchFailed(String),

    /// Extracted content fell below the quality floor
    #[error("extraction rejected: {0}")]
    ExtractionRejected(String),

    /// Object store put/get/delete failed
    #[error("object store unavailable: {0}")]
    ObjectStoreUnavailable(String),

    /// Vector index call failed
    #[error("vector index unavailable: {0}")]
    VectorIndexUnavailable(String),

    /// Embedding service call failed
    #[error("embedder unavailable: {0}")]
    EmbedUnavailable(String),

    /// Chat model call failed
    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    /// Task queue operation failed
    #[error("queue unavailable: {0}")]
    QueueUnavailable(String),

    /// Relational store error
    #[error("database error: {0}")]
    Database(String),

    /// A crawl for this website is already in flight
    #[error("crawl already running for website {0}")]
    AlreadyRunning(i64),

    /// Record does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation was cancelled
    #[error("cancelled")]
    Cancelled,

    /// Operation exceeded its deadline
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("row not found".to_string()),
            other => Error::Database(other.to_string()),
        }
    }
}
