//! HTTP client for the Chroma REST API

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::chroma::error::ChromaError;
use crate::chroma::types::{
    ChunkMetadata, CollectionResponse, CreateCollectionRequest, DeleteRequest, QueryRequest,
    QueryResponse, QueryResult, UpsertRequest,
};
use crate::chroma::{chunk_id, collection_name};

/// Default timeout for Chroma requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Per-website vector collections over a Chroma server.
#[derive(Debug, Clone)]
pub struct VectorStore {
    http: reqwest::Client,
    base_url: String,
}

impl VectorStore {
    /// Create an adapter for the given base URL, e.g. `http://localhost:8000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("failed to build Chroma HTTP client");

        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Create the website's collection if it does not exist. Idempotent.
    #[instrument(skip(self))]
    pub async fn ensure_collection(&self, website_id: i64) -> Result<(), ChromaError> {
        let name = collection_name(website_id);
        let request = CreateCollectionRequest {
            name: &name,
            metadata: json!({ "hnsw:space": "cosine" }),
            get_or_create: true,
        };

        let response = self
            .http
            .post(format!("{}/api/v1/collections", self.base_url))
            .json(&request)
            .send()
            .await?;

        Self::expect_success(response).await?;
        debug!(collection = %name, "collection ensured");
        Ok(())
    }

    /// Insert a page's chunks with their vectors.
    ///
    /// `chunks` and `vectors` must have equal length. Ids are deterministic
    /// per `(page_id, chunk_index)`, so re-running an insert overwrites the
    /// previous records instead of duplicating them.
    #[instrument(skip(self, page_url, chunks, vectors), fields(chunks = chunks.len()))]
    pub async fn insert(
        &self,
        website_id: i64,
        page_id: i64,
        page_url: &str,
        chunks: &[String],
        vectors: Vec<Vec<f32>>,
    ) -> Result<(), ChromaError> {
        if chunks.len() != vectors.len() {
            return Err(ChromaError::LengthMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }
        if chunks.is_empty() {
            return Ok(());
        }

        let collection_id = self.ensure_collection_id(website_id).await?;

        let mut ids = Vec::with_capacity(chunks.len());
        let mut metadatas = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.iter().enumerate() {
            ids.push(chunk_id(page_id, index));
            metadatas.push(ChunkMetadata {
                website_id,
                page_id,
                page_url: page_url.to_string(),
                chunk_index: index,
                chunk_size: chunk.len(),
            });
        }

        let request = UpsertRequest {
            ids,
            embeddings: vectors,
            metadatas,
            documents: chunks.to_vec(),
        };

        let response = self
            .http
            .post(format!(
                "{}/api/v1/collections/{}/upsert",
                self.base_url, collection_id
            ))
            .json(&request)
            .send()
            .await?;

        Self::expect_success(response).await?;

        info!(
            collection = %collection_name(website_id),
            page_id,
            chunks = chunks.len(),
            "stored chunks"
        );
        Ok(())
    }

    /// Top-k similarity search over a website's collection.
    ///
    /// Distances come back ascending. A collection that does not exist or
    /// holds nothing yields an empty list, not an error.
    #[instrument(skip(self, vector))]
    pub async fn query(
        &self,
        website_id: i64,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<QueryResult>, ChromaError> {
        let collection_id = match self.collection_id(website_id).await? {
            Some(id) => id,
            None => return Ok(Vec::new()),
        };

        let request = QueryRequest {
            query_embeddings: vec![vector.to_vec()],
            n_results: top_k,
            include: vec!["documents", "metadatas", "distances"],
        };

        let response = self
            .http
            .post(format!(
                "{}/api/v1/collections/{}/query",
                self.base_url, collection_id
            ))
            .json(&request)
            .send()
            .await?;

        let response = Self::expect_success(response).await?;
        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| ChromaError::UnexpectedResponse(e.to_string()))?;

        let Some(ids) = body.ids.into_iter().next() else {
            return Ok(Vec::new());
        };
        let mut documents = body.documents.into_iter().next().unwrap_or_default();
        let mut metadatas = body.metadatas.into_iter().next().unwrap_or_default();
        let mut distances = body.distances.into_iter().next().unwrap_or_default();

        let mut results = Vec::with_capacity(ids.len());
        for (index, id) in ids.into_iter().enumerate() {
            results.push(QueryResult {
                id,
                document: documents
                    .get_mut(index)
                    .and_then(Option::take)
                    .unwrap_or_default(),
                metadata: metadatas.get_mut(index).and_then(Option::take),
                distance: distances.get(index).copied().unwrap_or(0.0),
            });
        }

        debug!(results = results.len(), "query completed");
        Ok(results)
    }

    /// Remove every chunk whose metadata names this page.
    #[instrument(skip(self))]
    pub async fn delete_by_page(&self, website_id: i64, page_id: i64) -> Result<(), ChromaError> {
        let collection_id = match self.collection_id(website_id).await? {
            Some(id) => id,
            None => return Ok(()),
        };

        let request = DeleteRequest {
            filter: json!({ "page_id": page_id }),
        };

        let response = self
            .http
            .post(format!(
                "{}/api/v1/collections/{}/delete",
                self.base_url, collection_id
            ))
            .json(&request)
            .send()
            .await?;

        Self::expect_success(response).await?;
        info!(page_id, "deleted page chunks");
        Ok(())
    }

    /// Drop a website's whole collection.
    #[instrument(skip(self))]
    pub async fn drop_collection(&self, website_id: i64) -> Result<(), ChromaError> {
        let name = collection_name(website_id);
        let response = self
            .http
            .delete(format!("{}/api/v1/collections/{}", self.base_url, name))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::expect_success(response).await?;
        info!(collection = %name, "dropped collection");
        Ok(())
    }

    /// Number of records in a website's collection; 0 when it does not exist.
    #[instrument(skip(self))]
    pub async fn count(&self, website_id: i64) -> Result<usize, ChromaError> {
        let collection_id = match self.collection_id(website_id).await? {
            Some(id) => id,
            None => return Ok(0),
        };

        let response = self
            .http
            .get(format!(
                "{}/api/v1/collections/{}/count",
                self.base_url, collection_id
            ))
            .send()
            .await?;

        let response = Self::expect_success(response).await?;
        response
            .json::<usize>()
            .await
            .map_err(|e| ChromaError::UnexpectedResponse(e.to_string()))
    }

    /// Resolve a collection name to its server-side id, if it exists.
    async fn collection_id(&self, website_id: i64) -> Result<Option<String>, ChromaError> {
        let name = collection_name(website_id);
        let response = self
            .http
            .get(format!("{}/api/v1/collections/{}", self.base_url, name))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::expect_success(response).await?;
        let body: CollectionResponse = response
            .json()
            .await
            .map_err(|e| ChromaError::UnexpectedResponse(e.to_string()))?;
        Ok(Some(body.id))
    }

    /// Resolve a collection id, creating the collection when missing.
    async fn ensure_collection_id(&self, website_id: i64) -> Result<String, ChromaError> {
        if let Some(id) = self.collection_id(website_id).await? {
            return Ok(id);
        }
        self.ensure_collection(website_id).await?;
        self.collection_id(website_id).await?.ok_or_else(|| {
            ChromaError::UnexpectedResponse("collection missing after create".to_string())
        })
    }

    async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response, ChromaError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            return Err(ChromaError::Unavailable(format!("{status}: {body}")));
        }
        Err(ChromaError::UnexpectedResponse(format!("{status}: {body}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_collection(server: &MockServer, name: &str, id: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/api/v1/collections/{name}")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "id": id, "name": name })),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_insert_upserts_with_deterministic_ids() {
        let server = MockServer::start().await;
        mock_collection(&server, "website_1", "col-1").await;

        Mock::given(method("POST"))
            .and(path("/api/v1/collections/col-1/upsert"))
            .and(body_partial_json(json!({
                "ids": ["page-9-chunk-0", "page-9-chunk-1"],
                "documents": ["first chunk", "second chunk"],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(true)))
            .expect(1)
            .mount(&server)
            .await;

        let store = VectorStore::new(server.uri());
        store
            .insert(
                1,
                9,
                "https://example.test/doc",
                &["first chunk".to_string(), "second chunk".to_string()],
                vec![vec![0.1, 0.2], vec![0.3, 0.4]],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_insert_length_mismatch() {
        let store = VectorStore::new("http://localhost:1");
        let result = store
            .insert(1, 9, "https://example.test/", &["one".to_string()], vec![])
            .await;
        assert!(matches!(
            result,
            Err(ChromaError::LengthMismatch { chunks: 1, vectors: 0 })
        ));
    }

    #[tokio::test]
    async fn test_query_missing_collection_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/collections/website_5"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = VectorStore::new(server.uri());
        let results = store.query(5, &[0.1, 0.2], 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_query_parses_nested_results() {
        let server = MockServer::start().await;
        mock_collection(&server, "website_1", "col-1").await;

        Mock::given(method("POST"))
            .and(path("/api/v1/collections/col-1/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ids": [["page-9-chunk-0", "page-9-chunk-1"]],
                "documents": [["first", "second"]],
                "metadatas": [[
                    {"website_id": 1, "page_id": 9, "page_url": "https://example.test/doc",
                     "chunk_index": 0, "chunk_size": 5},
                    {"website_id": 1, "page_id": 9, "page_url": "https://example.test/doc",
                     "chunk_index": 1, "chunk_size": 6}
                ]],
                "distances": [[0.05, 0.2]]
            })))
            .mount(&server)
            .await;

        let store = VectorStore::new(server.uri());
        let results = store.query(1, &[0.1, 0.2], 5).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "page-9-chunk-0");
        assert_eq!(results[0].document, "first");
        assert!(results[0].distance < results[1].distance);
        let metadata = results[1].metadata.as_ref().unwrap();
        assert_eq!(metadata.chunk_index, 1);
        assert_eq!(metadata.page_url, "https://example.test/doc");
    }

    #[tokio::test]
    async fn test_delete_by_page_filters_on_page_id() {
        let server = MockServer::start().await;
        mock_collection(&server, "website_1", "col-1").await;

        Mock::given(method("POST"))
            .and(path("/api/v1/collections/col-1/delete"))
            .and(body_partial_json(json!({"where": {"page_id": 9}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let store = VectorStore::new(server.uri());
        store.delete_by_page(1, 9).await.unwrap();
    }

    #[tokio::test]
    async fn test_drop_missing_collection_is_ok() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/collections/website_3"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = VectorStore::new(server.uri());
        store.drop_collection(3).await.unwrap();
    }
}
