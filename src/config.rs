//! Application configuration loaded from environment variables.
//!
//! Both processes (API and worker) read the same configuration. A `.env`
//! file is honored outside production.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

/// Configuration for the ingestion and retrieval core.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string
    pub database_url: String,
    /// Max open connections in the pool
    pub db_max_connections: u32,
    /// Min idle connections kept in the pool
    pub db_min_connections: u32,
    /// Max lifetime of a pooled connection
    pub db_conn_max_lifetime: Duration,

    /// S3-compatible endpoint, e.g. `http://localhost:9000`
    pub s3_endpoint: String,
    pub s3_region: String,
    pub s3_access_key: String,
    pub s3_secret_key: String,
    pub s3_bucket: String,

    /// Chroma server base URL
    pub chroma_url: String,
    /// Ollama server base URL
    pub ollama_url: String,
    /// Embedding model name
    pub embed_model: String,
    /// Chat model name
    pub llm_model: String,

    pub crawler: CrawlerSettings,
    pub content: ContentSettings,
    pub rag: RagSettings,
    pub queue: QueueSettings,
}

/// Crawler knobs (`CRAWLER_*` environment keys).
#[derive(Debug, Clone)]
pub struct CrawlerSettings {
    /// BFS depth cutoff
    pub max_depth: u32,
    /// Per-site page cap
    pub max_pages: u32,
    /// Base inter-request delay
    pub delay_ms: u64,
    /// HTTP user agent, also the robots lookup key
    pub user_agent: String,
    /// Whether robots.txt is consulted at all
    pub respect_robots: bool,
    /// Per-request timeout
    pub timeout: Duration,
}

/// Content acceptance thresholds (`CONTENT_*` environment keys).
#[derive(Debug, Clone)]
pub struct ContentSettings {
    pub min_length: usize,
    pub min_quality: f64,
}

/// Retrieval knobs (`RAG_*` environment keys).
#[derive(Debug, Clone)]
pub struct RagSettings {
    pub top_k: usize,
    pub context_chunks: usize,
}

/// Worker pool sizing and queue weights (`QUEUE_*` environment keys).
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub concurrency: usize,
    /// Queue name -> integer weight; workers pick proportionally
    pub weights: HashMap<String, u32>,
}

impl Config {
    /// Load configuration from the environment.
    pub fn from_env() -> Self {
        if env::var("APP_ENV").as_deref() != Ok("production") {
            let _ = dotenvy::dotenv();
        }

        let mut weights = HashMap::new();
        weights.insert("critical".to_string(), get_env_u32("QUEUE_WEIGHT_CRITICAL", 6));
        weights.insert("crawl".to_string(), get_env_u32("QUEUE_WEIGHT_CRAWL", 4));
        weights.insert("vectorize".to_string(), get_env_u32("QUEUE_WEIGHT_VECTORIZE", 3));
        weights.insert("default".to_string(), get_env_u32("QUEUE_WEIGHT_DEFAULT", 2));
        weights.insert(
            "maintenance".to_string(),
            get_env_u32("QUEUE_WEIGHT_MAINTENANCE", 1),
        );

        Self {
            database_url: get_env("DATABASE_URL", ""),
            db_max_connections: get_env_u32("DB_MAX_CONNECTIONS", 25),
            db_min_connections: get_env_u32("DB_MIN_CONNECTIONS", 5),
            db_conn_max_lifetime: Duration::from_secs(
                60 * get_env_u64("DB_CONN_MAX_LIFETIME_MINUTES", 5),
            ),

            s3_endpoint: get_env("S3_ENDPOINT", "http://localhost:9000"),
            s3_region: get_env("S3_REGION", "us-east-1"),
            s3_access_key: get_env("S3_ACCESS_KEY", ""),
            s3_secret_key: get_env("S3_SECRET_KEY", ""),
            s3_bucket: get_env("S3_BUCKET", "website-content"),

            chroma_url: get_env("CHROMA_URL", "http://localhost:8000"),
            ollama_url: get_env("OLLAMA_URL", "http://localhost:11434"),
            embed_model: get_env("EMBED_MODEL", "mxbai-embed-large"),
            llm_model: get_env("LLM_MODEL", "llama3.1"),

            crawler: CrawlerSettings {
                max_depth: get_env_u32("CRAWLER_MAX_DEPTH", 10),
                max_pages: get_env_u32("CRAWLER_MAX_PAGES", 1000),
                delay_ms: get_env_u64("CRAWLER_DELAY_MS", 500),
                user_agent: get_env(
                    "CRAWLER_USER_AGENT",
                    concat!("quarry-crawler/", env!("CARGO_PKG_VERSION")),
                ),
                respect_robots: get_env_bool("CRAWLER_RESPECT_ROBOTS", true),
                timeout: Duration::from_secs(get_env_u64("CRAWLER_TIMEOUT_S", 30)),
            },
            content: ContentSettings {
                min_length: get_env_u32("CONTENT_MIN_LENGTH", 100) as usize,
                min_quality: get_env_f64("CONTENT_MIN_QUALITY", 0.3),
            },
            rag: RagSettings {
                top_k: get_env_u32("RAG_TOP_K", 5) as usize,
                context_chunks: get_env_u32("RAG_CONTEXT_CHUNKS", 3) as usize,
            },
            queue: QueueSettings {
                concurrency: get_env_u32("QUEUE_CONCURRENCY", 10) as usize,
                weights,
            },
        }
    }
}

fn get_env(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn get_env_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn get_env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn get_env_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn get_env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_env();
        assert_eq!(config.rag.top_k, 5);
        assert_eq!(config.rag.context_chunks, 3);
        assert_eq!(config.content.min_length, 100);
        assert!(config.crawler.user_agent.starts_with("quarry-crawler/"));
        assert_eq!(config.queue.weights.get("critical"), Some(&6));
        assert_eq!(config.queue.weights.get("maintenance"), Some(&1));
    }
}
