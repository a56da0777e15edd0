//! Task handlers: the worker-side dispatch table.
//!
//! Each handler is a function of its payload plus idempotent side effects,
//! so the queue may re-deliver any task safely.

use chrono::{Duration as ChronoDuration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::crawler::{CrawlError, Crawler};
use crate::db::{PageRepository, WebsiteRepository};
use crate::jobs::task::{
    CrawlSitePayload, EmbedPagePayload, RecrawlSitePayload, SweepPagesPayload, Task, TaskKind,
};
use crate::storage::ObjectStore;
use crate::vectorizer;

/// A handler failure with the queue's retry decision attached.
#[derive(Debug)]
pub struct TaskFailure {
    pub message: String,
    pub retryable: bool,
}

impl TaskFailure {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

/// All task handlers with their shared dependencies.
pub struct Handlers {
    crawler: Crawler,
    vectorizer: vectorizer::Service,
    websites: WebsiteRepository,
    pages: PageRepository,
    storage: ObjectStore,
}

impl Handlers {
    pub fn new(
        crawler: Crawler,
        vectorizer: vectorizer::Service,
        websites: WebsiteRepository,
        pages: PageRepository,
        storage: ObjectStore,
    ) -> Self {
        Self {
            crawler,
            vectorizer,
            websites,
            pages,
            storage,
        }
    }

    /// Route one claimed task to its handler.
    #[instrument(skip(self, task, cancel), fields(task_id = %task.id, kind = %task.kind))]
    pub async fn dispatch(&self, task: &Task, cancel: &CancellationToken) -> Result<(), TaskFailure> {
        let Some(kind) = task.task_kind() else {
            return Err(TaskFailure::fatal(format!("unknown task kind: {}", task.kind)));
        };

        match kind {
            TaskKind::CrawlSite => {
                let payload: CrawlSitePayload = parse_payload(task)?;
                self.handle_crawl(payload, task.attempts, cancel).await
            }
            TaskKind::RecrawlSite => {
                let payload: RecrawlSitePayload = parse_payload(task)?;
                self.handle_recrawl(payload, task.attempts, cancel).await
            }
            TaskKind::EmbedPage => {
                let payload: EmbedPagePayload = parse_payload(task)?;
                self.handle_embed(payload).await
            }
            TaskKind::SweepPages => {
                let payload: SweepPagesPayload = parse_payload(task)?;
                self.handle_sweep(payload, cancel).await
            }
        }
    }

    async fn handle_crawl(
        &self,
        payload: CrawlSitePayload,
        attempt: i32,
        cancel: &CancellationToken,
    ) -> Result<(), TaskFailure> {
        info!(website_id = payload.website_id, url = %payload.start_url, "crawl task started");

        match self
            .crawler
            .crawl(payload.website_id, &payload.start_url, attempt, cancel)
            .await
        {
            Ok(()) => Ok(()),
            Err(e @ CrawlError::AlreadyRunning(_)) => Err(TaskFailure::fatal(e.to_string())),
            Err(e) if e.is_retryable() => Err(TaskFailure::retryable(e.to_string())),
            Err(e) => Err(TaskFailure::fatal(e.to_string())),
        }
    }

    async fn handle_recrawl(
        &self,
        payload: RecrawlSitePayload,
        attempt: i32,
        cancel: &CancellationToken,
    ) -> Result<(), TaskFailure> {
        let website = self
            .websites
            .get(payload.website_id)
            .await
            .map_err(|e| TaskFailure::retryable(e.to_string()))?
            .ok_or_else(|| {
                TaskFailure::fatal(format!("website {} not found", payload.website_id))
            })?;

        info!(website_id = website.id, url = %website.url, "recrawl task started");

        let start_url = website.url.clone();
        self.handle_crawl(
            CrawlSitePayload {
                website_id: payload.website_id,
                start_url,
            },
            attempt,
            cancel,
        )
        .await
    }

    async fn handle_embed(&self, payload: EmbedPagePayload) -> Result<(), TaskFailure> {
        info!(
            website_id = payload.website_id,
            page_id = payload.page_id,
            url = %payload.page_url,
            "embed task started"
        );

        self.vectorizer
            .process_page_content(
                payload.website_id,
                payload.page_id,
                &payload.page_url,
                &payload.cleaned_text,
            )
            .await
            .map_err(|e| {
                error!(page_id = payload.page_id, error = %e, "embed task failed");
                TaskFailure::retryable(e.to_string())
            })?;

        Ok(())
    }

    /// Tear down derived artifacts of pages older than the cutoff.
    ///
    /// Order per page: vectors, then stored body, then the row. A partial
    /// failure keeps the row as a tombstone for the next sweep; the task
    /// reports failure so the queue re-runs it.
    async fn handle_sweep(
        &self,
        payload: SweepPagesPayload,
        cancel: &CancellationToken,
    ) -> Result<(), TaskFailure> {
        if !payload.targets.storage && !payload.targets.vectors {
            return Ok(());
        }

        let cutoff = Utc::now() - ChronoDuration::days(payload.older_than_days.max(0));
        let pages = self
            .pages
            .list_crawled_before(payload.website_id, cutoff)
            .await
            .map_err(|e| TaskFailure::retryable(e.to_string()))?;

        info!(
            candidates = pages.len(),
            older_than_days = payload.older_than_days,
            "sweep started"
        );

        let mut swept = 0usize;
        let mut errors = 0usize;

        for page in pages {
            if cancel.is_cancelled() {
                break;
            }

            if payload.targets.vectors {
                if let Err(e) = self
                    .vectorizer
                    .delete_page_vectors(page.website_id, page.id)
                    .await
                {
                    warn!(page_id = page.id, error = %e, "vector sweep failed, leaving tombstone");
                    errors += 1;
                    continue;
                }
            }

            if payload.targets.storage {
                if let Some(object_key) = &page.object_key {
                    if let Err(e) = self.storage.delete(object_key).await {
                        warn!(page_id = page.id, error = %e, "body sweep failed, leaving tombstone");
                        errors += 1;
                        continue;
                    }
                }
            }

            let row_result = if payload.targets.storage && payload.targets.vectors {
                self.pages.delete(page.id).await
            } else if payload.targets.storage {
                self.pages.clear_object_key(page.id).await
            } else {
                Ok(())
            };

            match row_result {
                Ok(()) => swept += 1,
                Err(e) => {
                    warn!(page_id = page.id, error = %e, "row sweep failed");
                    errors += 1;
                }
            }
        }

        info!(swept, errors, "sweep completed");

        if errors > 0 {
            return Err(TaskFailure::retryable(format!(
                "sweep left {errors} pages behind"
            )));
        }
        Ok(())
    }
}

fn parse_payload<P: serde::de::DeserializeOwned>(task: &Task) -> Result<P, TaskFailure> {
    task.payload_as()
        .map_err(|e| TaskFailure::fatal(format!("invalid payload: {e}")))
}
