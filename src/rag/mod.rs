//! # RAG Orchestrator
//!
//! Query → embed → retrieve → prompt → answer. The blocking variant returns
//! the full answer with cited sources; the streaming variant pushes tokens
//! through a callback as they arrive and finishes with a metadata record.
//! Tokens are never buffered here.

mod error;

pub use error::RagError;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::chroma::QueryResult;
use crate::ollama;
use crate::vectorizer;

/// Answer returned when retrieval finds nothing.
const NO_CONTENT_ANSWER: &str = "I couldn't find any relevant information to answer your \
     question. The website might not have been crawled yet, or there's no content matching \
     your query.";

/// A source document cited by an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySource {
    pub page_url: String,
    pub page_id: i64,
    pub chunk_text: String,
    pub chunk_index: usize,
    /// `1 - distance`; holds for cosine distance on unit vectors
    pub similarity: f32,
}

/// The response to a RAG query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<QuerySource>,
    pub retrieved_chunks: usize,
    pub query: String,
}

/// Events emitted by the streaming variant, in order: `Start`, zero or more
/// `Chunk`s, then exactly one of `Metadata` + `Done` or `Error`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum StreamEvent {
    Start {
        query: String,
    },
    Chunk {
        text: String,
    },
    Metadata {
        sources: Vec<QuerySource>,
        retrieved_chunks: usize,
    },
    Done,
    Error {
        message: String,
    },
}

/// Orchestrates retrieval-augmented answering for one query at a time.
#[derive(Debug, Clone)]
pub struct RagService {
    vectorizer: vectorizer::Service,
    llm: ollama::Client,
    llm_model: String,
    top_k: usize,
    context_chunks: usize,
}

impl RagService {
    pub fn new(
        vectorizer: vectorizer::Service,
        llm: ollama::Client,
        llm_model: impl Into<String>,
        top_k: usize,
        context_chunks: usize,
    ) -> Self {
        Self {
            vectorizer,
            llm,
            llm_model: llm_model.into(),
            top_k,
            context_chunks: context_chunks.min(top_k).max(1),
        }
    }

    /// Answer a question about a website's content.
    #[instrument(skip(self, query))]
    pub async fn query(&self, website_id: i64, query: &str) -> Result<QueryResponse, RagError> {
        let (results, sources) = match self.retrieve(website_id, query).await? {
            Some(retrieved) => retrieved,
            None => return Ok(self.no_content_response(query)),
        };

        let prompt = build_prompt(query, &context_texts(&results, self.context_chunks));
        let answer = self.llm.generate(&self.llm_model, &prompt).await?;

        info!(website_id, retrieved = results.len(), "rag query completed");

        Ok(QueryResponse {
            answer,
            retrieved_chunks: results.len(),
            sources,
            query: query.to_string(),
        })
    }

    /// Streaming variant: identical retrieval, then tokens flow through
    /// `emit` in arrival order, followed by one metadata record.
    ///
    /// Pre-stream failures (empty query, embedding) return an error before
    /// any event; once `Start` has been emitted every failure is delivered
    /// as an `Error` event and the stream closes.
    #[instrument(skip(self, query, emit))]
    pub async fn query_stream<F>(
        &self,
        website_id: i64,
        query: &str,
        mut emit: F,
    ) -> Result<(), RagError>
    where
        F: FnMut(StreamEvent) -> Result<(), String> + Send,
    {
        if query.trim().is_empty() {
            return Err(RagError::EmptyQuery);
        }

        let retrieved = self.retrieve(website_id, query).await?;

        emit(StreamEvent::Start {
            query: query.to_string(),
        })
        .map_err(RagError::StreamClosed)?;

        let (results, sources) = match retrieved {
            Some(retrieved) => retrieved,
            None => {
                emit(StreamEvent::Chunk {
                    text: NO_CONTENT_ANSWER.to_string(),
                })
                .map_err(RagError::StreamClosed)?;
                emit(StreamEvent::Metadata {
                    sources: Vec::new(),
                    retrieved_chunks: 0,
                })
                .map_err(RagError::StreamClosed)?;
                emit(StreamEvent::Done).map_err(RagError::StreamClosed)?;
                return Ok(());
            }
        };

        let prompt = build_prompt(query, &context_texts(&results, self.context_chunks));

        let stream_result = self
            .llm
            .generate_stream(&self.llm_model, &prompt, |fragment| {
                emit(StreamEvent::Chunk {
                    text: fragment.to_string(),
                })
                .map_err(|e| e.to_string())
            })
            .await;

        match stream_result {
            Ok(()) => {
                emit(StreamEvent::Metadata {
                    sources,
                    retrieved_chunks: results.len(),
                })
                .map_err(RagError::StreamClosed)?;
                emit(StreamEvent::Done).map_err(RagError::StreamClosed)?;
                Ok(())
            }
            Err(e) => {
                // Already-delivered tokens stand; the error terminates the
                // stream in-band.
                warn!(error = %e, "generation failed mid-stream");
                let _ = emit(StreamEvent::Error {
                    message: e.to_string(),
                });
                Ok(())
            }
        }
    }

    /// Embed the query and fetch the top-k chunks with their sources.
    ///
    /// `None` means retrieval succeeded but found nothing.
    async fn retrieve(
        &self,
        website_id: i64,
        query: &str,
    ) -> Result<Option<(Vec<QueryResult>, Vec<QuerySource>)>, RagError> {
        if query.trim().is_empty() {
            return Err(RagError::EmptyQuery);
        }

        let results = self
            .vectorizer
            .query_similar(website_id, query, self.top_k)
            .await?;

        if results.is_empty() {
            warn!(website_id, "no similar content found");
            return Ok(None);
        }

        let sources = results.iter().map(to_source).collect();
        Ok(Some((results, sources)))
    }

    fn no_content_response(&self, query: &str) -> QueryResponse {
        QueryResponse {
            answer: NO_CONTENT_ANSWER.to_string(),
            sources: Vec::new(),
            retrieved_chunks: 0,
            query: query.to_string(),
        }
    }
}

/// The chunk texts inlined into the prompt, at most `limit` of them.
fn context_texts(results: &[QueryResult], limit: usize) -> Vec<String> {
    results
        .iter()
        .take(limit)
        .map(|r| r.document.clone())
        .collect()
}

fn to_source(result: &QueryResult) -> QuerySource {
    let (page_url, page_id, chunk_index) = match &result.metadata {
        Some(meta) => (meta.page_url.clone(), meta.page_id, meta.chunk_index),
        None => (String::new(), 0, 0),
    };

    QuerySource {
        page_url,
        page_id,
        chunk_text: result.document.clone(),
        chunk_index,
        similarity: 1.0 - result.distance,
    }
}

/// Build the generation prompt from numbered context chunks and the query.
fn build_prompt(query: &str, context_chunks: &[String]) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are a helpful assistant that answers questions based on the provided context.\n\n",
    );

    if !context_chunks.is_empty() {
        prompt.push_str("Context:\n");
        for (index, chunk) in context_chunks.iter().enumerate() {
            prompt.push_str(&format!("[{}] {}\n\n", index + 1, chunk));
        }
    }

    prompt.push_str(&format!("Question: {query}\n\n"));
    prompt.push_str(
        "Answer the question based on the context provided above. If the context doesn't \
         contain relevant information, say so. Be concise and accurate.\n\nAnswer: ",
    );

    prompt
}
