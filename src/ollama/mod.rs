//! # Ollama API Client Module
//!
//! Minimal client for a hosted Ollama server, covering the two endpoints the
//! pipeline needs: `/api/embed` for embedding generation and `/api/generate`
//! for blocking and token-streamed text generation.
//!
//! ## Key Components
//!
//! - `Client`: the HTTP client wrapper with model-agnostic calls
//! - `OllamaError`: failure modes distinguished for the callers
//!
//! The embed pipeline and the RAG orchestrator share one `Client`; it is
//! cheap to clone and safe to use concurrently.

mod client;
mod error;
mod types;

pub use client::Client;
pub use error::OllamaError;
pub use types::{EmbedRequest, EmbedResponse, GenerateRequest, GenerateResponse};
