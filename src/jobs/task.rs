//! Task kinds, payloads, and per-kind queue policy.
//!
//! A task's payload is immutable after enqueue; everything the handler needs
//! travels inside it. `EmbedPage` deliberately carries the cleaned text
//! inline so the embed stage stays stateless and replays are idempotent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// The four durable task kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    CrawlSite,
    RecrawlSite,
    EmbedPage,
    SweepPages,
}

impl TaskKind {
    /// Wire name stored in the queue record.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::CrawlSite => "crawl:site",
            TaskKind::RecrawlSite => "recrawl:site",
            TaskKind::EmbedPage => "embed:page",
            TaskKind::SweepPages => "sweep:pages",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "crawl:site" => Some(TaskKind::CrawlSite),
            "recrawl:site" => Some(TaskKind::RecrawlSite),
            "embed:page" => Some(TaskKind::EmbedPage),
            "sweep:pages" => Some(TaskKind::SweepPages),
            _ => None,
        }
    }

    /// Queue this kind is dispatched on.
    pub fn queue(&self) -> &'static str {
        match self {
            TaskKind::CrawlSite | TaskKind::RecrawlSite => "crawl",
            TaskKind::EmbedPage => "vectorize",
            TaskKind::SweepPages => "maintenance",
        }
    }

    /// Retry budget before a task is archived.
    pub fn max_retry(&self) -> i32 {
        match self {
            TaskKind::CrawlSite | TaskKind::RecrawlSite => 3,
            TaskKind::EmbedPage => 5,
            TaskKind::SweepPages => 2,
        }
    }

    /// Hard execution deadline for one attempt.
    pub fn timeout(&self) -> Duration {
        match self {
            TaskKind::CrawlSite | TaskKind::RecrawlSite => Duration::from_secs(30 * 60),
            TaskKind::EmbedPage => Duration::from_secs(10 * 60),
            TaskKind::SweepPages => Duration::from_secs(20 * 60),
        }
    }
}

/// Lifecycle state of a queue record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Ready to run now
    Pending,
    /// Claimed by a worker
    Active,
    /// Waiting for a future `run_at`
    Scheduled,
    /// Failed, waiting for its backoff to elapse
    Retry,
    /// Retry budget exhausted; kept for operator inspection
    Archived,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Active => "active",
            TaskState::Scheduled => "scheduled",
            TaskState::Retry => "retry",
            TaskState::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskState::Pending),
            "active" => Some(TaskState::Active),
            "scheduled" => Some(TaskState::Scheduled),
            "retry" => Some(TaskState::Retry),
            "archived" => Some(TaskState::Archived),
            _ => None,
        }
    }
}

/// A durable queue record.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    pub id: Uuid,
    pub kind: String,
    pub payload: serde_json::Value,
    pub queue: String,
    pub state: String,
    /// How many attempts have already run
    pub attempts: i32,
    pub max_retry: i32,
    pub timeout_ms: i64,
    pub run_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn task_kind(&self) -> Option<TaskKind> {
        TaskKind::parse(&self.kind)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(0) as u64)
    }

    /// Deserialize the payload into its typed form.
    pub fn payload_as<P: serde::de::DeserializeOwned>(&self) -> Result<P, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Payload for `CrawlSite`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSitePayload {
    pub website_id: i64,
    pub start_url: String,
}

/// Payload for `RecrawlSite`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecrawlSitePayload {
    pub website_id: i64,
}

/// Payload for `EmbedPage`. The cleaned text rides in the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedPagePayload {
    pub website_id: i64,
    pub page_id: i64,
    pub page_url: String,
    pub cleaned_text: String,
}

/// Which derived artifacts a sweep removes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SweepTargets {
    #[serde(default)]
    pub storage: bool,
    #[serde(default)]
    pub vectors: bool,
}

/// Payload for `SweepPages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepPagesPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_id: Option<i64>,
    pub older_than_days: i64,
    pub targets: SweepTargets,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            TaskKind::CrawlSite,
            TaskKind::RecrawlSite,
            TaskKind::EmbedPage,
            TaskKind::SweepPages,
        ] {
            assert_eq!(TaskKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_kind_policy_table() {
        assert_eq!(TaskKind::CrawlSite.queue(), "crawl");
        assert_eq!(TaskKind::CrawlSite.max_retry(), 3);
        assert_eq!(TaskKind::CrawlSite.timeout(), Duration::from_secs(1800));

        assert_eq!(TaskKind::EmbedPage.queue(), "vectorize");
        assert_eq!(TaskKind::EmbedPage.max_retry(), 5);
        assert_eq!(TaskKind::EmbedPage.timeout(), Duration::from_secs(600));

        assert_eq!(TaskKind::SweepPages.queue(), "maintenance");
        assert_eq!(TaskKind::SweepPages.max_retry(), 2);
        assert_eq!(TaskKind::SweepPages.timeout(), Duration::from_secs(1200));
    }

    #[test]
    fn test_embed_payload_round_trip() {
        let payload = EmbedPagePayload {
            website_id: 1,
            page_id: 9,
            page_url: "https://example.test/doc".to_string(),
            cleaned_text: "cleaned text".to_string(),
        };
        let value = serde_json::to_value(&payload).unwrap();
        let back: EmbedPagePayload = serde_json::from_value(value).unwrap();
        assert_eq!(back.page_id, 9);
        assert_eq!(back.cleaned_text, "cleaned text");
    }

    #[test]
    fn test_sweep_payload_optional_website() {
        let json = r#"{"older_than_days": 30, "targets": {"vectors": true}}"#;
        let payload: SweepPagesPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.website_id, None);
        assert!(payload.targets.vectors);
        assert!(!payload.targets.storage);
    }
}
