//! Schema initialization for the relational store.
//!
//! Tables are created on startup when absent. The task queue's tables live
//! here too; both processes call this on boot and the statements are
//! idempotent.

use sqlx::PgPool;

/// Initialize the database schema.
pub async fn initialize_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS websites (
            id BIGSERIAL PRIMARY KEY,
            url TEXT NOT NULL UNIQUE,
            user_handle TEXT,
            phase TEXT NOT NULL DEFAULT 'idle',
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            pages_ok INTEGER NOT NULL DEFAULT 0,
            pages_failed INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pages (
            id BIGSERIAL PRIMARY KEY,
            website_id BIGINT NOT NULL REFERENCES websites(id) ON DELETE CASCADE,
            url TEXT NOT NULL,
            normalized_url TEXT NOT NULL,
            object_key TEXT,
            content_hash TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            error_message TEXT,
            crawled_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (website_id, normalized_url)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_pages_website_id ON pages(website_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id UUID PRIMARY KEY,
            kind TEXT NOT NULL,
            payload JSONB NOT NULL,
            queue TEXT NOT NULL,
            state TEXT NOT NULL DEFAULT 'pending',
            attempts INTEGER NOT NULL DEFAULT 0,
            max_retry INTEGER NOT NULL,
            timeout_ms BIGINT NOT NULL,
            run_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            last_error TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tasks_queue_state_run_at ON tasks(queue, state, run_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS queue_state (
            queue TEXT PRIMARY KEY,
            paused BOOLEAN NOT NULL DEFAULT FALSE
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
