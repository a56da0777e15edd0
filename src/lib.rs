//! # Quarry - Website Ingestion and RAG Core
//!
//! Quarry turns a website URL into a semantically searchable corpus and
//! answers natural-language questions about it with cited sources. The
//! heart of the crate is a durable asynchronous pipeline:
//!
//! - **Crawler**: per-site BFS fetch loop with politeness delays, robots.txt
//!   gating, URL canonicalization, and quality filtering
//! - **Content**: readability-style extraction, cleaning, and scoring
//! - **Storage**: cleaned page bodies in an S3-compatible object store
//! - **Vectorizer**: sentence-aware chunking, Ollama embeddings, and a
//!   per-site Chroma collection
//! - **Task Queue**: durable typed tasks over Postgres with weighted
//!   queues, retries, and an archived set
//! - **RAG**: retrieve-then-generate answering, blocking or token-streamed
//!
//! Two processes share this library: a thin API process that enqueues work
//! and queries, and a worker process that consumes the queue.
//!
//! ## Example
//!
//! ```rust,no_run
//! use quarry::config::Config;
//! use quarry::{chroma, ollama, rag, vectorizer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env();
//!
//!     let embedder = vectorizer::Embedder::new(
//!         ollama::Client::new(&config.ollama_url),
//!         &config.embed_model,
//!     );
//!     let vectorizer = vectorizer::Service::new(
//!         embedder,
//!         chroma::VectorStore::new(&config.chroma_url),
//!     );
//!     let rag = rag::RagService::new(
//!         vectorizer,
//!         ollama::Client::new(&config.ollama_url),
//!         &config.llm_model,
//!         config.rag.top_k,
//!         config.rag.context_chunks,
//!     );
//!
//!     let response = rag.query(1, "What is this site about?").await?;
//!     println!("{}", response.answer);
//!     Ok(())
//! }
//! ```

pub mod chroma;
pub mod config;
pub mod content;
pub mod crawler;
pub mod db;
mod error;
pub mod jobs;
pub mod ollama;
pub mod rag;
pub mod storage;
pub mod telemetry;
pub mod vectorizer;

pub use error::{Error, Result};

/// Re-export of the common types for public use
pub mod prelude {
    pub use crate::error::Error;
    pub use crate::error::Result;
}
