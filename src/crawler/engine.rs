//! The per-site BFS fetch loop.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use scraper::{Html, Selector};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::{ContentSettings, CrawlerSettings};
use crate::content::{self, normalize_url, RobotsCache};
use crate::crawler::error::CrawlError;
use crate::crawler::EmbedSink;
use crate::db::{CrawlPhase, PageRepository, WebsiteRepository};
use crate::storage::ObjectStore;

/// Website crawler: fetches, filters, persists, and dispatches embeds.
pub struct Crawler {
    http: reqwest::Client,
    websites: WebsiteRepository,
    pages: PageRepository,
    storage: ObjectStore,
    robots: RobotsCache,
    embed_sink: Arc<dyn EmbedSink>,
    settings: CrawlerSettings,
    content: ContentSettings,
}

/// Outcome of processing one fetched page body.
enum PageOutcome {
    Accepted,
    Rejected(&'static str),
}

impl Crawler {
    pub fn new(
        websites: WebsiteRepository,
        pages: PageRepository,
        storage: ObjectStore,
        robots: RobotsCache,
        embed_sink: Arc<dyn EmbedSink>,
        settings: CrawlerSettings,
        content: ContentSettings,
    ) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(settings.timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .expect("failed to build crawler HTTP client");

        Self {
            http,
            websites,
            pages,
            storage,
            robots,
            embed_sink,
            settings,
            content,
        }
    }

    /// Run one crawl of a website.
    ///
    /// `attempt` is the task's retry counter; a retry is allowed to take over
    /// a website left in `crawling` by a dead prior attempt, a first attempt
    /// is not.
    #[instrument(skip(self, cancel))]
    pub async fn crawl(
        &self,
        website_id: i64,
        start_url: &str,
        attempt: i32,
        cancel: &CancellationToken,
    ) -> Result<(), CrawlError> {
        info!(website_id, url = start_url, "crawl started");

        let website = self
            .websites
            .get(website_id)
            .await?
            .ok_or(CrawlError::WebsiteNotFound(website_id))?;
        if website.crawl_phase() == CrawlPhase::Crawling && attempt == 0 {
            return Err(CrawlError::AlreadyRunning(website_id));
        }

        self.websites.start_crawl(website_id).await?;

        if let Err(e) = self.storage.ensure_bucket().await {
            let message = format!("failed to ensure bucket: {e}");
            self.websites.fail_crawl(website_id, &message).await?;
            return Err(CrawlError::Setup(message));
        }

        let allowed_host = match Url::parse(start_url).ok().and_then(|u| {
            u.host_str().map(str::to_string)
        }) {
            Some(host) => host,
            None => {
                let message = format!("failed to parse start URL: {start_url}");
                self.websites.fail_crawl(website_id, &message).await?;
                return Err(CrawlError::Setup(message));
            }
        };

        let (pages_ok, pages_failed) = self
            .fetch_loop(website_id, start_url, &allowed_host, cancel)
            .await?;

        self.websites
            .complete_crawl(website_id, pages_ok, pages_failed)
            .await?;

        info!(website_id, pages_ok, pages_failed, "crawl completed");
        Ok(())
    }

    /// The BFS over same-host links. Returns `(pages_ok, pages_failed)`.
    async fn fetch_loop(
        &self,
        website_id: i64,
        start_url: &str,
        allowed_host: &str,
        cancel: &CancellationToken,
    ) -> Result<(i32, i32), CrawlError> {
        let mut pages_ok: i32 = 0;
        let mut pages_failed: i32 = 0;

        // `seen` holds every normalized URL ever enqueued this run, so a URL
        // is attempted at most once.
        let mut seen: HashSet<String> = HashSet::new();
        let mut frontier: VecDeque<(String, u32)> = VecDeque::new();

        let start = match normalize_url(start_url) {
            Ok(normalized) => normalized,
            // crawl() already parsed the start URL; unreachable in practice.
            Err(_) => return Ok((0, 0)),
        };
        seen.insert(start.clone());
        frontier.push_back((start, 0));

        let mut attempted: u32 = 0;

        while let Some((url, depth)) = frontier.pop_front() {
            if cancel.is_cancelled() {
                info!(website_id, "crawl cancelled, stopping fetch loop");
                break;
            }
            if self.settings.max_pages > 0 && attempted >= self.settings.max_pages {
                info!(website_id, max_pages = self.settings.max_pages, "page cap reached");
                break;
            }

            // Politeness: base delay with jitter after the first request,
            // stretched to the robots crawl-delay when that is larger.
            if attempted > 0 {
                self.polite_sleep(&url).await;
            }
            attempted += 1;

            debug!(url = %url, depth, attempted, "visiting");

            let body = match self.fetch_html(&url).await {
                Ok(body) => body,
                Err(message) => {
                    warn!(url = %url, error = %message, "request failed");
                    pages_failed += 1;
                    self.websites.increment_page_count(website_id, false).await?;
                    continue;
                }
            };

            match self.process_page(website_id, &url, &body).await? {
                PageOutcome::Accepted => {
                    pages_ok += 1;
                    self.websites.increment_page_count(website_id, true).await?;
                }
                PageOutcome::Rejected(reason) => {
                    debug!(url = %url, reason, "page rejected");
                    pages_failed += 1;
                    self.websites.increment_page_count(website_id, false).await?;
                }
            }

            if depth >= self.settings.max_depth {
                continue;
            }

            for link in extract_links(&body, &url, allowed_host) {
                let Ok(normalized) = normalize_url(&link) else {
                    continue;
                };
                if seen.contains(&normalized) {
                    continue;
                }

                if self.settings.respect_robots {
                    match self.robots.can_fetch(&normalized).await {
                        Ok(true) => {}
                        Ok(false) => {
                            debug!(url = %normalized, "disallowed by robots.txt");
                            continue;
                        }
                        Err(e) => {
                            warn!(url = %normalized, error = %e, "robots check failed, skipping");
                            continue;
                        }
                    }
                }

                seen.insert(normalized.clone());
                frontier.push_back((normalized, depth + 1));
            }
        }

        Ok((pages_ok, pages_failed))
    }

    /// Fetch one URL, insisting on an HTML success response.
    async fn fetch_html(&self, url: &str) -> Result<String, String> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| format!("fetch failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {status}"));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.is_empty() && !content_type.to_lowercase().starts_with("text/html") {
            return Err(format!("content-type not html: {content_type}"));
        }

        response.text().await.map_err(|e| format!("body read failed: {e}"))
    }

    /// Extract, filter, persist, and dispatch one page.
    ///
    /// Every rejection path inside is a counted per-page failure; only
    /// website-row write failures propagate.
    async fn process_page(
        &self,
        website_id: i64,
        normalized_url: &str,
        html: &str,
    ) -> Result<PageOutcome, CrawlError> {
        let processed = match content::extract(html, normalized_url) {
            Ok(processed) => processed,
            Err(e) => {
                warn!(url = normalized_url, error = %e, "content extraction failed");
                return Ok(PageOutcome::Rejected("extraction failed"));
            }
        };

        if !processed.is_readable
            || !content::is_content_valid(&processed, self.content.min_length, self.content.min_quality)
        {
            return Ok(PageOutcome::Rejected("below quality floor"));
        }

        let cleaned = content::clean_text(&processed.text);

        let page = match self
            .pages
            .upsert(website_id, normalized_url, normalized_url)
            .await
        {
            Ok(page) => page,
            Err(e) => {
                warn!(url = normalized_url, error = %e, "page upsert failed");
                return Ok(PageOutcome::Rejected("upsert failed"));
            }
        };

        let content_hash = hash_content(&cleaned);

        let object_key = match self.storage.put_page(website_id, normalized_url, &cleaned).await {
            Ok(key) => key,
            Err(e) => {
                warn!(url = normalized_url, error = %e, "storing body failed");
                if let Err(db_err) = self.pages.mark_error(page.id, &e.to_string()).await {
                    warn!(page_id = page.id, error = %db_err, "failed to record page error");
                }
                return Ok(PageOutcome::Rejected("body store failed"));
            }
        };

        if let Err(e) = self
            .pages
            .mark_success(page.id, &object_key, &content_hash)
            .await
        {
            warn!(page_id = page.id, error = %e, "success transition failed");
            return Ok(PageOutcome::Rejected("success transition failed"));
        }

        info!(url = normalized_url, object_key = %object_key, "saved page");

        // The embed stage is decoupled: a queue hiccup here does not undo the
        // page, and a later recrawl re-enqueues it.
        if let Err(e) = self
            .embed_sink
            .enqueue_embed(website_id, page.id, normalized_url, &cleaned)
            .await
        {
            warn!(page_id = page.id, error = %e, "failed to enqueue embed task");
        }

        Ok(PageOutcome::Accepted)
    }

    /// Sleep the base inter-request delay with ±50% jitter, or the robots
    /// crawl-delay when that is larger.
    async fn polite_sleep(&self, url: &str) {
        let base = jittered_delay(self.settings.delay_ms);

        let mut delay = base;
        if self.settings.respect_robots {
            if let Ok(Some(robots_delay)) = self.robots.crawl_delay(url).await {
                if robots_delay > base {
                    debug!(url, delay = ?robots_delay, "respecting robots crawl-delay");
                    delay = robots_delay;
                }
            }
        }

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Base delay with ±50% jitter.
fn jittered_delay(delay_ms: u64) -> Duration {
    if delay_ms == 0 {
        return Duration::ZERO;
    }
    let factor = rand::thread_rng().gen_range(0.5..=1.5);
    Duration::from_millis((delay_ms as f64 * factor) as u64)
}

/// Same-host `<a href>` targets of a page, resolved against its URL.
fn extract_links(html: &str, base_url: &str, allowed_host: &str) -> Vec<String> {
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let anchor_sel = Selector::parse("a[href]").expect("static selector");

    let mut links = Vec::new();
    for element in document.select(&anchor_sel) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if href.starts_with('#') || href.starts_with("javascript:") || href.starts_with("mailto:") {
            continue;
        }

        let Ok(resolved) = base.join(href) else {
            continue;
        };
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            continue;
        }
        if resolved.host_str() != Some(allowed_host) {
            continue;
        }

        links.push(resolved.to_string());
    }

    links
}

/// SHA-256 of cleaned text, hex encoded.
fn hash_content(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_content_is_stable_hex() {
        let hash = hash_content("hello world");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_jittered_delay_bounds() {
        for _ in 0..100 {
            let delay = jittered_delay(500);
            assert!(delay >= Duration::from_millis(250), "got {delay:?}");
            assert!(delay <= Duration::from_millis(750), "got {delay:?}");
        }
        assert_eq!(jittered_delay(0), Duration::ZERO);
    }

    #[test]
    fn test_extract_links_same_host_only() {
        let html = r##"
            <html><body>
                <a href="/about">About</a>
                <a href="contact">Contact</a>
                <a href="https://example.test/deep/page">Deep</a>
                <a href="https://other.test/away">Other host</a>
                <a href="#section">Anchor</a>
                <a href="mailto:hi@example.test">Mail</a>
                <a href="javascript:void(0)">JS</a>
                <a href="ftp://example.test/file">FTP</a>
            </body></html>
        "##;

        let links = extract_links(html, "https://example.test/", "example.test");
        assert_eq!(
            links,
            vec![
                "https://example.test/about",
                "https://example.test/contact",
                "https://example.test/deep/page",
            ]
        );
    }

    #[test]
    fn test_extract_links_resolves_relative_against_page() {
        let links = extract_links(
            r#"<a href="sibling">x</a>"#,
            "https://example.test/docs/page",
            "example.test",
        );
        assert_eq!(links, vec!["https://example.test/docs/sibling"]);
    }
}
