//! Wire types for the Chroma REST API

use serde::{Deserialize, Serialize};

/// Metadata attached to every chunk record in a collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    pub website_id: i64,
    pub page_id: i64,
    pub page_url: String,
    pub chunk_index: usize,
    pub chunk_size: usize,
}

/// One hit from a similarity query, distances ascending.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub id: String,
    pub document: String,
    pub metadata: Option<ChunkMetadata>,
    pub distance: f32,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateCollectionRequest<'a> {
    pub name: &'a str,
    pub metadata: serde_json::Value,
    pub get_or_create: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CollectionResponse {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct UpsertRequest {
    pub ids: Vec<String>,
    pub embeddings: Vec<Vec<f32>>,
    pub metadatas: Vec<ChunkMetadata>,
    pub documents: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct QueryRequest {
    pub query_embeddings: Vec<Vec<f32>>,
    pub n_results: usize,
    pub include: Vec<&'static str>,
}

/// Chroma nests query results one level per query embedding.
#[derive(Debug, Deserialize)]
pub(crate) struct QueryResponse {
    #[serde(default)]
    pub ids: Vec<Vec<String>>,
    #[serde(default)]
    pub documents: Vec<Vec<Option<String>>>,
    #[serde(default)]
    pub metadatas: Vec<Vec<Option<ChunkMetadata>>>,
    #[serde(default)]
    pub distances: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct DeleteRequest {
    #[serde(rename = "where")]
    pub filter: serde_json::Value,
}
