//! # Crawler Engine
//!
//! Per-site BFS fetch loop driven by a `CrawlSite` task. The engine owns the
//! website's crawl state machine for the duration of one run: it transitions
//! the row to `crawling`, walks same-host links with politeness delays and
//! robots.txt gating, persists accepted pages (row, stored body, success
//! transition), and hands each accepted page to the embed pipeline through
//! the [`EmbedSink`] port.
//!
//! Per-page failures are counted, not raised; only pre-loop setup errors
//! fail the crawl as a whole.

mod engine;
mod error;

pub use engine::Crawler;
pub use error::CrawlError;

use async_trait::async_trait;

/// Outbound port for handing accepted pages to the embed pipeline.
///
/// The crawler's correctness does not depend on what the sink does; the
/// production implementation enqueues an `EmbedPage` task.
#[async_trait]
pub trait EmbedSink: Send + Sync {
    async fn enqueue_embed(
        &self,
        website_id: i64,
        page_id: i64,
        page_url: &str,
        cleaned_text: &str,
    ) -> Result<(), crate::error::Error>;
}
