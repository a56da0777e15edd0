//! Enqueue-side client for the task queue.
//!
//! This is the only queue surface the request path touches: handlers call
//! these methods, the worker process consumes. Queuing a crawl also moves
//! the website into `queued` so status reads reflect the dispatch.

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::crawler::EmbedSink;
use crate::db::WebsiteRepository;
use crate::error::Error;
use crate::jobs::queue::TaskQueue;
use crate::jobs::task::{
    CrawlSitePayload, EmbedPagePayload, RecrawlSitePayload, SweepPagesPayload, SweepTargets,
    TaskKind,
};

/// Ingestion dispatcher: bridges "crawl requested" into the queue.
#[derive(Debug, Clone)]
pub struct Client {
    queue: TaskQueue,
    websites: WebsiteRepository,
}

impl Client {
    pub fn new(queue: TaskQueue, websites: WebsiteRepository) -> Self {
        Self { queue, websites }
    }

    /// Enqueue the initial crawl of a website.
    #[instrument(skip(self))]
    pub async fn enqueue_crawl(&self, website_id: i64, start_url: &str) -> Result<Uuid, Error> {
        let payload = CrawlSitePayload {
            website_id,
            start_url: start_url.to_string(),
        };
        let task_id = self
            .queue
            .enqueue(TaskKind::CrawlSite, serde_json::to_value(payload)?)
            .await
            .map_err(|e| Error::QueueUnavailable(e.to_string()))?;

        self.websites.mark_queued(website_id).await?;

        info!(website_id, task_id = %task_id, "enqueued crawl");
        Ok(task_id)
    }

    /// Enqueue a full re-ingest of a website.
    ///
    /// The API layer rejects recrawls of a site already `crawling`; the
    /// engine still self-guards.
    #[instrument(skip(self))]
    pub async fn enqueue_recrawl(&self, website_id: i64) -> Result<Uuid, Error> {
        let payload = RecrawlSitePayload { website_id };
        let task_id = self
            .queue
            .enqueue(TaskKind::RecrawlSite, serde_json::to_value(payload)?)
            .await
            .map_err(|e| Error::QueueUnavailable(e.to_string()))?;

        self.websites.mark_queued(website_id).await?;

        info!(website_id, task_id = %task_id, "enqueued recrawl");
        Ok(task_id)
    }

    /// Enqueue vectorization of one accepted page.
    #[instrument(skip(self, cleaned_text), fields(text_len = cleaned_text.len()))]
    pub async fn enqueue_embed_page(
        &self,
        website_id: i64,
        page_id: i64,
        page_url: &str,
        cleaned_text: &str,
    ) -> Result<Uuid, Error> {
        let payload = EmbedPagePayload {
            website_id,
            page_id,
            page_url: page_url.to_string(),
            cleaned_text: cleaned_text.to_string(),
        };
        self.queue
            .enqueue(TaskKind::EmbedPage, serde_json::to_value(payload)?)
            .await
            .map_err(|e| Error::QueueUnavailable(e.to_string()))
    }

    /// Enqueue a maintenance sweep of old page artifacts.
    #[instrument(skip(self))]
    pub async fn enqueue_sweep(
        &self,
        website_id: Option<i64>,
        older_than_days: i64,
        targets: SweepTargets,
    ) -> Result<Uuid, Error> {
        let payload = SweepPagesPayload {
            website_id,
            older_than_days,
            targets,
        };
        self.queue
            .enqueue(TaskKind::SweepPages, serde_json::to_value(payload)?)
            .await
            .map_err(|e| Error::QueueUnavailable(e.to_string()))
    }

    /// Health probe used by the API process readiness check.
    pub async fn healthy(&self) -> serde_json::Value {
        json!({ "queue": self.queue.healthy().await })
    }
}

#[async_trait]
impl EmbedSink for Client {
    async fn enqueue_embed(
        &self,
        website_id: i64,
        page_id: i64,
        page_url: &str,
        cleaned_text: &str,
    ) -> Result<(), Error> {
        self.enqueue_embed_page(website_id, page_id, page_url, cleaned_text)
            .await?;
        Ok(())
    }
}
