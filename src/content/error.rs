//! Error types for the content module

use thiserror::Error;

/// Error type for content processing operations
#[derive(Debug, Error)]
pub enum ContentError {
    /// URL failed to parse
    #[error("malformed URL: {0}")]
    MalformedUrl(String),

    /// Input document was empty
    #[error("HTML content is empty")]
    EmptyHtml,

    /// HTTP error while fetching robots.txt
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<ContentError> for crate::error::Error {
    fn from(err: ContentError) -> Self {
        match err {
            ContentError::MalformedUrl(msg) => crate::error::Error::MalformedUrl(msg),
            ContentError::EmptyHtml => {
                crate::error::Error::ExtractionRejected("empty HTML".to_string())
            }
            ContentError::Http(e) => crate::error::Error::FetchFailed(e.to_string()),
        }
    }
}
