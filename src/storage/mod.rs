//! # Object Store Adapter
//!
//! Stores cleaned page bodies in an S3-compatible object store (MinIO,
//! Garage) using path-style requests signed with SigV4 (`sign`). Keys are
//! deterministic per URL, so a re-crawl of the same page overwrites its
//! previous body and concurrent writers for one URL are benign.

mod sign;

use chrono::Utc;
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};
use url::Url;

use sign::{authorization_header, hex_sha256, uri_encode, SignedHeader, SigningContext};

/// Default timeout for object store requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// MIME type for stored page bodies
const CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Error type for object store operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// The store could not be reached or answered with a failure status
    #[error("object store unavailable: {0}")]
    Unavailable(String),

    /// The requested object does not exist
    #[error("object not found: {0}")]
    NotFound(String),
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        StorageError::Unavailable(err.to_string())
    }
}

impl From<StorageError> for crate::error::Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => crate::error::Error::NotFound(key),
            other => crate::error::Error::ObjectStoreUnavailable(other.to_string()),
        }
    }
}

/// Configuration for the object store connection.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Endpoint base URL, e.g. `http://localhost:9000`
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
}

/// S3-compatible object store client for page bodies.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    http: reqwest::Client,
    config: StorageConfig,
}

impl ObjectStore {
    pub fn new(config: StorageConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("failed to build object store HTTP client");

        Self { http, config }
    }

    /// Create the bucket if it does not exist. Idempotent and safe to call
    /// concurrently: a racing create that loses reports conflict, which is
    /// treated as success.
    #[instrument(skip(self))]
    pub async fn ensure_bucket(&self) -> Result<(), StorageError> {
        let status = self.request("HEAD", "", &[], Vec::new()).await?.status();
        if status.is_success() {
            return Ok(());
        }

        let response = self.request("PUT", "", &[], Vec::new()).await?;
        match response.status() {
            status if status.is_success() => {
                info!(bucket = %self.config.bucket, "created bucket");
                Ok(())
            }
            StatusCode::CONFLICT => Ok(()),
            status => Err(StorageError::Unavailable(format!(
                "bucket create failed: {status}"
            ))),
        }
    }

    /// Store a page body, returning the object key.
    #[instrument(skip(self, content), fields(size = content.len()))]
    pub async fn put_page(
        &self,
        website_id: i64,
        page_url: &str,
        content: &str,
    ) -> Result<String, StorageError> {
        let key = object_key(website_id, page_url);

        let extra_headers = [
            ("content-type".to_string(), CONTENT_TYPE.to_string()),
            (
                "x-amz-meta-website-id".to_string(),
                website_id.to_string(),
            ),
            ("x-amz-meta-page-url".to_string(), page_url.to_string()),
        ];

        let response = self
            .request("PUT", &key, &extra_headers, content.as_bytes().to_vec())
            .await?;

        if !response.status().is_success() {
            return Err(StorageError::Unavailable(format!(
                "put {key} failed: {}",
                response.status()
            )));
        }

        info!(key = %key, url = page_url, "saved page content");
        Ok(key)
    }

    /// Read a stored page body back by its object key.
    #[instrument(skip(self))]
    pub async fn get(&self, object_key: &str) -> Result<String, StorageError> {
        let response = self.request("GET", object_key, &[], Vec::new()).await?;

        match response.status() {
            status if status.is_success() => Ok(response.text().await?),
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(object_key.to_string())),
            status => Err(StorageError::Unavailable(format!(
                "get {object_key} failed: {status}"
            ))),
        }
    }

    /// Delete an object. Deleting a missing object succeeds.
    #[instrument(skip(self))]
    pub async fn delete(&self, object_key: &str) -> Result<(), StorageError> {
        let response = self.request("DELETE", object_key, &[], Vec::new()).await?;

        match response.status() {
            status if status.is_success() => {
                debug!(key = %object_key, "deleted object");
                Ok(())
            }
            StatusCode::NOT_FOUND => Ok(()),
            status => Err(StorageError::Unavailable(format!(
                "delete {object_key} failed: {status}"
            ))),
        }
    }

    /// Issue one signed path-style request against the bucket.
    async fn request(
        &self,
        method: &str,
        key: &str,
        extra_headers: &[SignedHeader],
        body: Vec<u8>,
    ) -> Result<reqwest::Response, StorageError> {
        let endpoint = Url::parse(&self.config.endpoint)
            .map_err(|e| StorageError::Unavailable(format!("bad endpoint: {e}")))?;
        let host = match endpoint.port() {
            Some(port) => format!("{}:{port}", endpoint.host_str().unwrap_or_default()),
            None => endpoint.host_str().unwrap_or_default().to_string(),
        };

        let path = if key.is_empty() {
            format!("/{}", self.config.bucket)
        } else {
            format!("/{}/{}", self.config.bucket, key)
        };
        let canonical_uri = uri_encode(&path, false);

        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let payload_hash = hex_sha256(&body);

        let mut headers: Vec<SignedHeader> = vec![
            ("host".to_string(), host.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
        ];
        headers.extend_from_slice(extra_headers);

        let ctx = SigningContext {
            access_key: &self.config.access_key,
            secret_key: &self.config.secret_key,
            region: &self.config.region,
        };
        let authorization =
            authorization_header(&ctx, method, &canonical_uri, "", &mut headers, &payload_hash, now);

        let url = format!("{}{}", self.config.endpoint.trim_end_matches('/'), canonical_uri);
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|e| StorageError::Unavailable(format!("bad method: {e}")))?;

        let mut request = self
            .http
            .request(method, &url)
            .header("authorization", authorization)
            .header("x-amz-date", amz_date)
            .header("x-amz-content-sha256", payload_hash);
        for (name, value) in extra_headers {
            request = request.header(name, value);
        }

        Ok(request.body(body).send().await?)
    }
}

/// Deterministic object key for a page body.
///
/// Layout: `websites/{website_id}/{host}/{cleanpath}_{sha8}.txt` where
/// `cleanpath` is the URL path without its leading slash (`index` for the
/// root) and `sha8` is the first 8 hex chars of the SHA-256 of the full URL.
pub fn object_key(website_id: i64, page_url: &str) -> String {
    let url_hash = hex_sha256(page_url.as_bytes());
    let sha8 = &url_hash[..8];

    let Ok(parsed) = Url::parse(page_url) else {
        // Unparseable URLs still get a stable key from the hash alone.
        return format!("websites/{website_id}/{url_hash}.txt");
    };

    let host = parsed.host_str().unwrap_or("unknown");
    let path = parsed.path();
    let clean_path = if path.is_empty() || path == "/" {
        "index".to_string()
    } else {
        path.trim_matches('/').to_string()
    };

    format!("websites/{website_id}/{host}/{clean_path}_{sha8}.txt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method as http_method, path as http_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(endpoint: String) -> StorageConfig {
        StorageConfig {
            endpoint,
            region: "garage".to_string(),
            access_key: "test-access".to_string(),
            secret_key: "test-secret".to_string(),
            bucket: "website-content".to_string(),
        }
    }

    #[test]
    fn test_object_key_layout() {
        let key = object_key(3, "https://example.test/docs/intro");
        assert!(key.starts_with("websites/3/example.test/docs/intro_"));
        assert!(key.ends_with(".txt"));
        // host/cleanpath + an 8-char hash suffix
        let suffix = key.rsplit('_').next().unwrap();
        assert_eq!(suffix.len(), "12345678.txt".len());
    }

    #[test]
    fn test_object_key_root_is_index() {
        let key = object_key(3, "https://example.test/");
        assert!(key.starts_with("websites/3/example.test/index_"));
    }

    #[test]
    fn test_object_key_is_deterministic_and_url_sensitive() {
        let a = object_key(1, "https://example.test/a");
        let b = object_key(1, "https://example.test/a");
        let c = object_key(1, "https://example.test/b");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_put_page_sends_metadata_headers() {
        let server = MockServer::start().await;
        let expected_key = object_key(1, "https://example.test/doc");

        Mock::given(http_method("PUT"))
            .and(http_path(format!("/website-content/{expected_key}")))
            .and(header_exists("authorization"))
            .and(header_exists("x-amz-meta-website-id"))
            .and(header_exists("x-amz-meta-page-url"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let store = ObjectStore::new(test_config(server.uri()));
        let key = store
            .put_page(1, "https://example.test/doc", "cleaned text")
            .await
            .unwrap();
        assert_eq!(key, expected_key);
    }

    #[tokio::test]
    async fn test_get_roundtrip() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(http_path("/website-content/websites/1/k.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("stored body"))
            .mount(&server)
            .await;

        let store = ObjectStore::new(test_config(server.uri()));
        let body = store.get("websites/1/k.txt").await.unwrap();
        assert_eq!(body, "stored body");
    }

    #[tokio::test]
    async fn test_get_missing_object() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = ObjectStore::new(test_config(server.uri()));
        assert!(matches!(
            store.get("websites/1/missing.txt").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_ensure_bucket_creates_when_missing() {
        let server = MockServer::start().await;
        Mock::given(http_method("HEAD"))
            .and(http_path("/website-content"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(http_method("PUT"))
            .and(http_path("/website-content"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let store = ObjectStore::new(test_config(server.uri()));
        store.ensure_bucket().await.unwrap();
    }

    #[tokio::test]
    async fn test_ensure_bucket_conflict_is_success() {
        let server = MockServer::start().await;
        Mock::given(http_method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(http_method("PUT"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let store = ObjectStore::new(test_config(server.uri()));
        store.ensure_bucket().await.unwrap();
    }
}
