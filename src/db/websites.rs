//! Database operations for websites and the crawl state machine.

use sqlx::PgPool;
use tracing::instrument;

use crate::db::Website;

/// Repository for website rows.
#[derive(Debug, Clone)]
pub struct WebsiteRepository {
    pool: PgPool,
}

impl WebsiteRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Add a new website in phase `idle`.
    pub async fn create(
        &self,
        url: &str,
        user_handle: Option<&str>,
    ) -> Result<Website, sqlx::Error> {
        sqlx::query_as::<_, Website>(
            r#"
            INSERT INTO websites (url, user_handle, phase)
            VALUES ($1, $2, 'idle')
            RETURNING *
            "#,
        )
        .bind(url)
        .bind(user_handle)
        .fetch_one(&self.pool)
        .await
    }

    /// Get a website by id.
    pub async fn get(&self, id: i64) -> Result<Option<Website>, sqlx::Error> {
        sqlx::query_as::<_, Website>("SELECT * FROM websites WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Get a website by its canonical start URL.
    pub async fn get_by_url(&self, url: &str) -> Result<Option<Website>, sqlx::Error> {
        sqlx::query_as::<_, Website>("SELECT * FROM websites WHERE url = $1")
            .bind(url)
            .fetch_optional(&self.pool)
            .await
    }

    /// List all websites, newest first.
    pub async fn list(&self) -> Result<Vec<Website>, sqlx::Error> {
        sqlx::query_as::<_, Website>("SELECT * FROM websites ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
    }

    /// Update mutable attributes of a website.
    pub async fn update(&self, website: &Website) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE websites
            SET url = $1, user_handle = $2, phase = $3, last_error = $4, updated_at = NOW()
            WHERE id = $5
            "#,
        )
        .bind(&website.url)
        .bind(&website.user_handle)
        .bind(&website.phase)
        .bind(&website.last_error)
        .bind(website.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Transition to `queued` when a crawl or recrawl is dispatched.
    #[instrument(skip(self))]
    pub async fn mark_queued(&self, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE websites
            SET phase = 'queued', updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Transition to `crawling`, zeroing counters for the new run.
    #[instrument(skip(self))]
    pub async fn start_crawl(&self, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE websites
            SET phase = 'crawling',
                started_at = NOW(),
                completed_at = NULL,
                pages_ok = 0,
                pages_failed = 0,
                last_error = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Terminal transition to `completed` with final counters.
    #[instrument(skip(self))]
    pub async fn complete_crawl(
        &self,
        id: i64,
        pages_ok: i32,
        pages_failed: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE websites
            SET phase = 'completed',
                completed_at = NOW(),
                pages_ok = $2,
                pages_failed = $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(pages_ok)
        .bind(pages_failed)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Terminal transition to `failed` with the causing error.
    #[instrument(skip(self))]
    pub async fn fail_crawl(&self, id: i64, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE websites
            SET phase = 'failed',
                completed_at = NOW(),
                last_error = $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Bump one of the per-run counters while a crawl is in flight.
    pub async fn increment_page_count(&self, id: i64, success: bool) -> Result<(), sqlx::Error> {
        let query = if success {
            "UPDATE websites SET pages_ok = pages_ok + 1, updated_at = NOW() WHERE id = $1"
        } else {
            "UPDATE websites SET pages_failed = pages_failed + 1, updated_at = NOW() WHERE id = $1"
        };
        sqlx::query(query).bind(id).execute(&self.pool).await?;
        Ok(())
    }
}
