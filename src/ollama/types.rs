//! Request and response types for the Ollama API

use serde::{Deserialize, Serialize};

/// Request body for `/api/embed`
#[derive(Debug, Clone, Serialize)]
pub struct EmbedRequest {
    /// Embedding model name
    pub model: String,
    /// Texts to embed; order is preserved in the response
    pub input: Vec<String>,
}

/// Response body for `/api/embed`
#[derive(Debug, Clone, Deserialize)]
pub struct EmbedResponse {
    /// One vector per input, in input order
    #[serde(default)]
    pub embeddings: Vec<Vec<f32>>,
}

/// Request body for `/api/generate`
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    /// Chat model name
    pub model: String,
    /// Full prompt text
    pub prompt: String,
    /// Whether the server should stream NDJSON fragments
    pub stream: bool,
}

/// One response object from `/api/generate`.
///
/// Non-streaming calls receive exactly one with `done = true`; streaming
/// calls receive one per token fragment.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
}
