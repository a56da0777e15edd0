//! HTTP client for the Ollama API

use std::time::Duration;

use futures::StreamExt;
use reqwest::StatusCode;
use tracing::{debug, instrument};

use crate::ollama::error::OllamaError;
use crate::ollama::types::{EmbedRequest, EmbedResponse, GenerateRequest, GenerateResponse};

/// Default timeout for Ollama requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Client for a hosted Ollama server.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    /// Create a client for the given base URL, e.g. `http://localhost:11434`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("failed to build Ollama HTTP client");

        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Create a client with a custom request timeout.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build Ollama HTTP client");

        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Generate embeddings for a batch of texts.
    ///
    /// Output order matches input order; the server embeds the whole batch
    /// or fails the request.
    #[instrument(skip(self, input), fields(batch = input.len()))]
    pub async fn embed(&self, model: &str, input: Vec<String>) -> Result<Vec<Vec<f32>>, OllamaError> {
        let expected = input.len();
        let request = EmbedRequest {
            model: model.to_string(),
            input,
        };

        let response = self
            .http
            .post(format!("{}/api/embed", self.base_url))
            .json(&request)
            .send()
            .await?;

        let response = Self::check_status(response, model).await?;
        let body: EmbedResponse = response.json().await?;

        if body.embeddings.len() != expected {
            return Err(OllamaError::UnexpectedResponse(format!(
                "expected {} embeddings, got {}",
                expected,
                body.embeddings.len()
            )));
        }

        debug!(
            model,
            dimensions = body.embeddings.first().map(Vec::len).unwrap_or(0),
            "generated embeddings"
        );

        Ok(body.embeddings)
    }

    /// Generate a completion for a prompt, blocking until it finishes.
    #[instrument(skip(self, prompt), fields(prompt_len = prompt.len()))]
    pub async fn generate(&self, model: &str, prompt: &str) -> Result<String, OllamaError> {
        let request = GenerateRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            stream: false,
        };

        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await?;

        let response = Self::check_status(response, model).await?;
        let body: GenerateResponse = response.json().await?;

        debug!(model, response_len = body.response.len(), "generated completion");

        Ok(body.response)
    }

    /// Generate a completion, streaming fragments through `emit`.
    ///
    /// `emit` is called once per fragment in generation order. If `emit`
    /// returns an error the stream is dropped and generation stops; fragments
    /// already emitted stand. A transport error mid-stream likewise leaves
    /// earlier fragments with the consumer and surfaces the error.
    #[instrument(skip(self, prompt, emit), fields(prompt_len = prompt.len()))]
    pub async fn generate_stream<F>(
        &self,
        model: &str,
        prompt: &str,
        mut emit: F,
    ) -> Result<(), OllamaError>
    where
        F: FnMut(&str) -> Result<(), String> + Send,
    {
        let request = GenerateRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            stream: true,
        };

        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await?;

        let response = Self::check_status(response, model).await?;

        // The server sends one JSON object per line.
        let mut stream = response.bytes_stream();
        let mut buffer = Vec::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buffer.extend_from_slice(&chunk);

            while let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                let line = String::from_utf8_lossy(&line);
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let fragment: GenerateResponse = serde_json::from_str(line)
                    .map_err(|e| OllamaError::UnexpectedResponse(format!("bad stream line: {e}")))?;

                if !fragment.response.is_empty() {
                    emit(&fragment.response).map_err(OllamaError::Cancelled)?;
                }
                if fragment.done {
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    /// Map error statuses onto the client's failure modes.
    async fn check_status(
        response: reqwest::Response,
        model: &str,
    ) -> Result<reqwest::Response, OllamaError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(OllamaError::ModelNotLoaded(format!("{model}: {body}")));
        }
        if status.is_server_error() {
            return Err(OllamaError::RemoteUnavailable(format!("{status}: {body}")));
        }
        Err(OllamaError::UnexpectedResponse(format!("{status}: {body}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_embed_batch_preserves_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embeddings": [[0.1, 0.2], [0.3, 0.4]]
            })))
            .mount(&server)
            .await;

        let client = Client::new(server.uri());
        let vectors = client
            .embed("test-model", vec!["first".into(), "second".into()])
            .await
            .unwrap();

        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], vec![0.1, 0.2]);
        assert_eq!(vectors[1], vec![0.3, 0.4]);
    }

    #[tokio::test]
    async fn test_embed_count_mismatch_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embeddings": [[0.1]]
            })))
            .mount(&server)
            .await;

        let client = Client::new(server.uri());
        let result = client
            .embed("test-model", vec!["a".into(), "b".into()])
            .await;
        assert!(matches!(result, Err(OllamaError::UnexpectedResponse(_))));
    }

    #[tokio::test]
    async fn test_model_not_loaded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
            .mount(&server)
            .await;

        let client = Client::new(server.uri());
        let result = client.generate("missing-model", "hello").await;
        assert!(matches!(result, Err(OllamaError::ModelNotLoaded(_))));
    }

    #[tokio::test]
    async fn test_generate_blocking() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({"stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": "the answer",
                "done": true
            })))
            .mount(&server)
            .await;

        let client = Client::new(server.uri());
        let answer = client.generate("test-model", "question?").await.unwrap();
        assert_eq!(answer, "the answer");
    }

    #[tokio::test]
    async fn test_generate_stream_emits_in_order() {
        let server = MockServer::start().await;
        let ndjson = concat!(
            "{\"response\":\"Hello\",\"done\":false}\n",
            "{\"response\":\" world\",\"done\":false}\n",
            "{\"response\":\"\",\"done\":true}\n",
        );
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ndjson))
            .mount(&server)
            .await;

        let client = Client::new(server.uri());
        let mut collected = Vec::new();
        client
            .generate_stream("test-model", "hi", |fragment| {
                collected.push(fragment.to_string());
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(collected, vec!["Hello", " world"]);
    }

    #[tokio::test]
    async fn test_generate_stream_consumer_cancel() {
        let server = MockServer::start().await;
        let ndjson = concat!(
            "{\"response\":\"one\",\"done\":false}\n",
            "{\"response\":\"two\",\"done\":false}\n",
            "{\"response\":\"\",\"done\":true}\n",
        );
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ndjson))
            .mount(&server)
            .await;

        let client = Client::new(server.uri());
        let mut seen = 0;
        let result = client
            .generate_stream("test-model", "hi", |_| {
                seen += 1;
                if seen >= 1 {
                    Err("consumer went away".to_string())
                } else {
                    Ok(())
                }
            })
            .await;

        assert!(matches!(result, Err(OllamaError::Cancelled(_))));
        assert_eq!(seen, 1);
    }
}
