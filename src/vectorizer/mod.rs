//! # Embed Pipeline
//!
//! Chunk → embed → index, triggered by an `EmbedPage` task. Chunks embed
//! sequentially in ascending index order; nothing is inserted unless every
//! chunk embedded, and inserts overwrite by deterministic chunk id, so
//! re-running the pipeline for the same `(page_id, cleaned_text)` leaves the
//! index in the same state.

pub mod chunk;
mod embedder;
mod error;

pub use chunk::{chunk_text, CHUNK_SIZE, OVERLAP_SIZE};
pub use embedder::Embedder;
pub use error::VectorizeError;

use tracing::{info, instrument, warn};

use crate::chroma::{QueryResult, VectorStore};

/// Orchestrates the vectorization pipeline for page content.
#[derive(Debug, Clone)]
pub struct Service {
    embedder: Embedder,
    vector_store: VectorStore,
}

impl Service {
    pub fn new(embedder: Embedder, vector_store: VectorStore) -> Self {
        Self {
            embedder,
            vector_store,
        }
    }

    /// Run the full pipeline for one page's cleaned text.
    ///
    /// All-or-nothing from the caller's perspective: an embedding failure
    /// inserts nothing, an insert failure is retried wholesale by the queue
    /// and overwrites cleanly.
    #[instrument(skip(self, content), fields(content_len = content.len()))]
    pub async fn process_page_content(
        &self,
        website_id: i64,
        page_id: i64,
        page_url: &str,
        content: &str,
    ) -> Result<usize, VectorizeError> {
        let chunks = chunk_text(content);
        if chunks.is_empty() {
            warn!(page_id, "no chunks generated from content");
            return Err(VectorizeError::NoChunks);
        }

        let embeddings = self.embedder.embed_chunks(&chunks).await?;

        self.vector_store.ensure_collection(website_id).await?;
        self.vector_store
            .insert(website_id, page_id, page_url, &chunks, embeddings)
            .await?;

        info!(website_id, page_id, chunks = chunks.len(), "vectorization completed");
        Ok(chunks.len())
    }

    /// Semantic search for chunks similar to a query.
    #[instrument(skip(self, query))]
    pub async fn query_similar(
        &self,
        website_id: i64,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<QueryResult>, VectorizeError> {
        let query_embedding = self.embedder.embed_text(query).await?;
        let results = self
            .vector_store
            .query(website_id, &query_embedding, top_k)
            .await?;
        Ok(results)
    }

    /// Remove all vectors for one page.
    pub async fn delete_page_vectors(
        &self,
        website_id: i64,
        page_id: i64,
    ) -> Result<(), VectorizeError> {
        self.vector_store.delete_by_page(website_id, page_id).await?;
        Ok(())
    }

    /// Remove a website's entire collection.
    pub async fn delete_website_vectors(&self, website_id: i64) -> Result<(), VectorizeError> {
        self.vector_store.drop_collection(website_id).await?;
        Ok(())
    }

    /// Number of vectors stored for a website.
    pub async fn vector_count(&self, website_id: i64) -> Result<usize, VectorizeError> {
        Ok(self.vector_store.count(website_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ollama;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(ollama_uri: String, chroma_uri: String) -> Service {
        let embedder = Embedder::new(ollama::Client::new(ollama_uri), "test-embed");
        Service::new(embedder, VectorStore::new(chroma_uri))
    }

    #[tokio::test]
    async fn test_process_rejects_empty_content() {
        let svc = service("http://localhost:1".into(), "http://localhost:1".into());
        let result = svc.process_page_content(1, 9, "https://example.test/", "").await;
        assert!(matches!(result, Err(VectorizeError::NoChunks)));
    }

    #[tokio::test]
    async fn test_embed_failure_inserts_nothing() {
        let ollama_server = MockServer::start().await;
        let chroma_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&ollama_server)
            .await;
        // No chroma expectations mounted: any insert call would 404 loudly,
        // and the strict expect(0) below asserts it never happens.
        Mock::given(method("POST"))
            .and(path_regex(r"^/api/v1/collections/.*/upsert$"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&chroma_server)
            .await;

        let svc = service(ollama_server.uri(), chroma_server.uri());
        let result = svc
            .process_page_content(1, 9, "https://example.test/", "Some text to embed.")
            .await;
        assert!(matches!(result, Err(VectorizeError::Embedding(_))));
    }

    #[tokio::test]
    async fn test_full_pipeline_inserts_chunks() {
        let ollama_server = MockServer::start().await;
        let chroma_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embeddings": [[0.1, 0.2]]
            })))
            .mount(&ollama_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v1/collections/website_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "col-1", "name": "website_1"
            })))
            .mount(&chroma_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/collections"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "col-1", "name": "website_1"
            })))
            .mount(&chroma_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/collections/col-1/upsert"))
            .and(body_partial_json(json!({"ids": ["page-9-chunk-0"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(true)))
            .expect(1)
            .mount(&chroma_server)
            .await;

        let svc = service(ollama_server.uri(), chroma_server.uri());
        let count = svc
            .process_page_content(1, 9, "https://example.test/doc", "A short page body.")
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
