//! Database operations for pages.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use crate::db::Page;

/// Repository for page rows.
#[derive(Debug, Clone)]
pub struct PageRepository {
    pool: PgPool,
}

impl PageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create or refresh the page row for a normalized URL.
    ///
    /// `(website_id, normalized_url)` is the identity; a conflict refreshes
    /// the raw URL and timestamp and returns the existing row.
    #[instrument(skip(self))]
    pub async fn upsert(
        &self,
        website_id: i64,
        url: &str,
        normalized_url: &str,
    ) -> Result<Page, sqlx::Error> {
        sqlx::query_as::<_, Page>(
            r#"
            INSERT INTO pages (website_id, url, normalized_url, status)
            VALUES ($1, $2, $3, 'pending')
            ON CONFLICT (website_id, normalized_url)
            DO UPDATE SET url = EXCLUDED.url, updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(website_id)
        .bind(url)
        .bind(normalized_url)
        .fetch_one(&self.pool)
        .await
    }

    /// Record a successful crawl of this page.
    #[instrument(skip(self, object_key, content_hash))]
    pub async fn mark_success(
        &self,
        page_id: i64,
        object_key: &str,
        content_hash: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE pages
            SET object_key = $2,
                content_hash = $3,
                status = 'success',
                error_message = NULL,
                crawled_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(page_id)
        .bind(object_key)
        .bind(content_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a per-page failure.
    #[instrument(skip(self, error_message))]
    pub async fn mark_error(&self, page_id: i64, error_message: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE pages
            SET status = 'error', error_message = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(page_id)
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get a page by id.
    pub async fn get(&self, page_id: i64) -> Result<Option<Page>, sqlx::Error> {
        sqlx::query_as::<_, Page>("SELECT * FROM pages WHERE id = $1")
            .bind(page_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Get a page by its normalized URL under a website.
    pub async fn get_by_url(
        &self,
        website_id: i64,
        normalized_url: &str,
    ) -> Result<Option<Page>, sqlx::Error> {
        sqlx::query_as::<_, Page>(
            "SELECT * FROM pages WHERE website_id = $1 AND normalized_url = $2",
        )
        .bind(website_id)
        .bind(normalized_url)
        .fetch_optional(&self.pool)
        .await
    }

    /// All pages for one website, newest first.
    pub async fn list_for_website(&self, website_id: i64) -> Result<Vec<Page>, sqlx::Error> {
        sqlx::query_as::<_, Page>(
            "SELECT * FROM pages WHERE website_id = $1 ORDER BY created_at DESC",
        )
        .bind(website_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Pages crawled before the cutoff, optionally scoped to one website.
    ///
    /// Used by the sweep task; only pages that were actually crawled
    /// qualify.
    pub async fn list_crawled_before(
        &self,
        website_id: Option<i64>,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Page>, sqlx::Error> {
        match website_id {
            Some(id) => {
                sqlx::query_as::<_, Page>(
                    r#"
                    SELECT * FROM pages
                    WHERE website_id = $1 AND crawled_at IS NOT NULL AND crawled_at < $2
                    ORDER BY crawled_at
                    "#,
                )
                .bind(id)
                .bind(cutoff)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, Page>(
                    r#"
                    SELECT * FROM pages
                    WHERE crawled_at IS NOT NULL AND crawled_at < $1
                    ORDER BY crawled_at
                    "#,
                )
                .bind(cutoff)
                .fetch_all(&self.pool)
                .await
            }
        }
    }

    /// Delete a page row. The caller is responsible for having removed the
    /// stored body and vectors first.
    #[instrument(skip(self))]
    pub async fn delete(&self, page_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM pages WHERE id = $1")
            .bind(page_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Detach a stored body from a page after a storage-only sweep.
    pub async fn clear_object_key(&self, page_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE pages SET object_key = NULL, updated_at = NOW() WHERE id = $1")
            .bind(page_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
