//! Error types for the crawler module

use thiserror::Error;

/// Error type for crawl runs.
///
/// Only whole-crawl failures appear here; individual page problems are
/// absorbed into the failure counter inside the loop.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// The website row is already in `crawling` on a first attempt
    #[error("crawl already running for website {0}")]
    AlreadyRunning(i64),

    /// The website row does not exist
    #[error("website {0} not found")]
    WebsiteNotFound(i64),

    /// Pre-loop setup failed (bucket, start URL); not worth retrying
    #[error("crawl setup failed: {0}")]
    Setup(String),

    /// Relational store failure outside the per-page path
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl CrawlError {
    /// Whether the queue should re-run the task after this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CrawlError::Database(_))
    }
}

impl From<CrawlError> for crate::error::Error {
    fn from(err: CrawlError) -> Self {
        match err {
            CrawlError::AlreadyRunning(id) => crate::error::Error::AlreadyRunning(id),
            CrawlError::WebsiteNotFound(id) => {
                crate::error::Error::NotFound(format!("website {id}"))
            }
            CrawlError::Setup(msg) => crate::error::Error::Other(msg),
            CrawlError::Database(e) => e.into(),
        }
    }
}
