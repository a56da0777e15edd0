//! Embedding generation over the Ollama client.

use tracing::{debug, instrument};

use crate::ollama;
use crate::vectorizer::error::VectorizeError;

/// Turns text into fixed-dimension vectors with a configured model.
///
/// Deterministic for a fixed model version; the output dimension is whatever
/// the model produces.
#[derive(Debug, Clone)]
pub struct Embedder {
    client: ollama::Client,
    model: String,
}

impl Embedder {
    pub fn new(client: ollama::Client, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// Embed a single text.
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>, VectorizeError> {
        if text.is_empty() {
            return Err(VectorizeError::EmptyText);
        }

        let mut vectors = self
            .client
            .embed(&self.model, vec![text.to_string()])
            .await?;
        vectors
            .pop()
            .ok_or_else(|| VectorizeError::Embedding(ollama::OllamaError::UnexpectedResponse(
                "no embedding returned".to_string(),
            )))
    }

    /// Embed chunks one at a time, preserving order.
    ///
    /// Fails fast on the first chunk that errors; the caller treats the whole
    /// page as failed and nothing partial is kept.
    #[instrument(skip(self, chunks), fields(chunks = chunks.len()))]
    pub async fn embed_chunks(&self, chunks: &[String]) -> Result<Vec<Vec<f32>>, VectorizeError> {
        if chunks.is_empty() {
            return Err(VectorizeError::NoChunks);
        }

        let mut embeddings = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.iter().enumerate() {
            let vector = self.embed_text(chunk).await.map_err(|e| {
                debug!(chunk_index = index, "chunk embedding failed");
                e
            })?;
            embeddings.push(vector);
        }

        debug!(
            total = embeddings.len(),
            dimensions = embeddings.first().map(Vec::len).unwrap_or(0),
            "embedded all chunks"
        );

        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_embed_text_rejects_empty() {
        let embedder = Embedder::new(ollama::Client::new("http://localhost:1"), "m");
        assert!(matches!(
            embedder.embed_text("").await,
            Err(VectorizeError::EmptyText)
        ));
    }

    #[tokio::test]
    async fn test_embed_chunks_rejects_empty_batch() {
        let embedder = Embedder::new(ollama::Client::new("http://localhost:1"), "m");
        assert!(matches!(
            embedder.embed_chunks(&[]).await,
            Err(VectorizeError::NoChunks)
        ));
    }

    #[tokio::test]
    async fn test_embed_chunks_sequential_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embeddings": [[0.5, 0.5]]
            })))
            .expect(3)
            .mount(&server)
            .await;

        let embedder = Embedder::new(ollama::Client::new(server.uri()), "m");
        let chunks = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let embeddings = embedder.embed_chunks(&chunks).await.unwrap();
        assert_eq!(embeddings.len(), 3);
    }

    #[tokio::test]
    async fn test_embed_chunks_fails_fast() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let embedder = Embedder::new(ollama::Client::new(server.uri()), "m");
        let chunks = vec!["a".to_string(), "b".to_string()];
        assert!(embedder.embed_chunks(&chunks).await.is_err());
    }
}
