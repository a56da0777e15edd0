//! # Relational Store Adapter
//!
//! Typed repositories over Postgres for the two persisted aggregates:
//! websites (ingestion subjects with their crawl state machine) and pages
//! (fetched URLs). Schema is created on startup; every write is a single
//! statement or an explicit transaction.

pub mod pages;
pub mod schema;
pub mod websites;

pub use pages::PageRepository;
pub use websites::WebsiteRepository;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::Config;

/// Crawl-state automaton for a website.
///
/// Progression: `idle -> queued -> crawling -> (completed | failed)`, then
/// back to `queued` on a recrawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlPhase {
    Idle,
    Queued,
    Crawling,
    Completed,
    Failed,
}

impl CrawlPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlPhase::Idle => "idle",
            CrawlPhase::Queued => "queued",
            CrawlPhase::Crawling => "crawling",
            CrawlPhase::Completed => "completed",
            CrawlPhase::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(CrawlPhase::Idle),
            "queued" => Some(CrawlPhase::Queued),
            "crawling" => Some(CrawlPhase::Crawling),
            "completed" => Some(CrawlPhase::Completed),
            "failed" => Some(CrawlPhase::Failed),
            _ => None,
        }
    }
}

/// A website row: one ingestion subject.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Website {
    pub id: i64,
    pub url: String,
    pub user_handle: Option<String>,
    pub phase: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub pages_ok: i32,
    pub pages_failed: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Website {
    /// The parsed crawl phase; unknown values read as `Idle`.
    pub fn crawl_phase(&self) -> CrawlPhase {
        CrawlPhase::parse(&self.phase).unwrap_or(CrawlPhase::Idle)
    }
}

/// A page row: one fetched URL under a website.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Page {
    pub id: i64,
    pub website_id: i64,
    pub url: String,
    pub normalized_url: String,
    pub object_key: Option<String>,
    pub content_hash: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub crawled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Open a bounded connection pool and initialize the schema.
pub async fn connect(config: &Config) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .min_connections(config.db_min_connections)
        .max_lifetime(config.db_conn_max_lifetime)
        .connect(&config.database_url)
        .await?;

    schema::initialize_schema(&pool).await?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_round_trip() {
        for phase in [
            CrawlPhase::Idle,
            CrawlPhase::Queued,
            CrawlPhase::Crawling,
            CrawlPhase::Completed,
            CrawlPhase::Failed,
        ] {
            assert_eq!(CrawlPhase::parse(phase.as_str()), Some(phase));
        }
        assert_eq!(CrawlPhase::parse("bogus"), None);
    }
}
