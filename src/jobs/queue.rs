//! Postgres-backed durable task queue.
//!
//! Claims use `FOR UPDATE SKIP LOCKED`, so any number of workers can share
//! the table safely. Failed tasks back off exponentially until their retry
//! budget runs out, then land in `archived` for operator inspection.

use chrono::{Duration as ChronoDuration, Utc};
use sqlx::PgPool;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::jobs::task::{Task, TaskKind, TaskState};

/// Per-queue counts for introspection.
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueueStats {
    pub queue: String,
    pub paused: bool,
    pub pending: i64,
    pub active: i64,
    pub scheduled: i64,
    pub retry: i64,
    pub archived: i64,
}

/// Durable typed task queue over Postgres.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    pool: PgPool,
}

impl TaskQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enqueue a task for immediate execution, returning its id.
    #[instrument(skip(self, payload))]
    pub async fn enqueue(
        &self,
        kind: TaskKind,
        payload: serde_json::Value,
    ) -> Result<Uuid, sqlx::Error> {
        self.enqueue_at(kind, payload, None).await
    }

    /// Enqueue a task to run after a delay.
    pub async fn enqueue_in(
        &self,
        kind: TaskKind,
        payload: serde_json::Value,
        delay: std::time::Duration,
    ) -> Result<Uuid, sqlx::Error> {
        let run_at = Utc::now()
            + ChronoDuration::from_std(delay).unwrap_or_else(|_| ChronoDuration::seconds(0));
        self.enqueue_at(kind, payload, Some(run_at)).await
    }

    async fn enqueue_at(
        &self,
        kind: TaskKind,
        payload: serde_json::Value,
        run_at: Option<chrono::DateTime<Utc>>,
    ) -> Result<Uuid, sqlx::Error> {
        let id = Uuid::new_v4();
        let state = if run_at.is_some() {
            TaskState::Scheduled
        } else {
            TaskState::Pending
        };

        sqlx::query(
            r#"
            INSERT INTO tasks (id, kind, payload, queue, state, attempts, max_retry, timeout_ms, run_at)
            VALUES ($1, $2, $3, $4, $5, 0, $6, $7, COALESCE($8, NOW()))
            "#,
        )
        .bind(id)
        .bind(kind.as_str())
        .bind(&payload)
        .bind(kind.queue())
        .bind(state.as_str())
        .bind(kind.max_retry())
        .bind(kind.timeout().as_millis() as i64)
        .bind(run_at)
        .execute(&self.pool)
        .await?;

        info!(task_id = %id, kind = kind.as_str(), queue = kind.queue(), "enqueued task");
        Ok(id)
    }

    /// Claim one ready task, trying queues in the given preference order.
    ///
    /// Paused queues are skipped. Returns `None` when nothing is ready.
    pub async fn claim(&self, queue_order: &[String]) -> Result<Option<Task>, sqlx::Error> {
        let paused = self.paused_queues().await?;

        for queue in queue_order {
            if paused.contains(queue) {
                continue;
            }

            let task = sqlx::query_as::<_, Task>(
                r#"
                UPDATE tasks
                SET state = 'active', updated_at = NOW()
                WHERE id = (
                    SELECT id FROM tasks
                    WHERE queue = $1
                      AND (state = 'pending'
                           OR (state IN ('scheduled', 'retry') AND run_at <= NOW()))
                    ORDER BY run_at
                    LIMIT 1
                    FOR UPDATE SKIP LOCKED
                )
                RETURNING *
                "#,
            )
            .bind(queue)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(task) = task {
                debug!(task_id = %task.id, queue = %task.queue, "claimed task");
                return Ok(Some(task));
            }
        }

        Ok(None)
    }

    /// Remove a finished task.
    #[instrument(skip(self))]
    pub async fn mark_succeeded(&self, task_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record a failed attempt.
    ///
    /// Retryable failures go back to `retry` with exponential backoff until
    /// the budget is spent; the rest (and non-retryable ones immediately)
    /// move to `archived`.
    #[instrument(skip(self, error))]
    pub async fn mark_failed(
        &self,
        task_id: Uuid,
        error: &str,
        retryable: bool,
    ) -> Result<(), sqlx::Error> {
        let task = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(task) = task else {
            return Ok(());
        };

        let attempts = task.attempts + 1;

        if retryable && attempts <= task.max_retry {
            let delay_secs = backoff_seconds(attempts);
            sqlx::query(
                r#"
                UPDATE tasks
                SET state = 'retry',
                    attempts = $2,
                    last_error = $3,
                    run_at = NOW() + ($4 || ' seconds')::INTERVAL,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(task_id)
            .bind(attempts)
            .bind(error)
            .bind(delay_secs.to_string())
            .execute(&self.pool)
            .await?;

            info!(task_id = %task_id, attempts, delay_secs, "task failed, scheduled retry");
        } else {
            sqlx::query(
                r#"
                UPDATE tasks
                SET state = 'archived', attempts = $2, last_error = $3, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(task_id)
            .bind(attempts)
            .bind(error)
            .execute(&self.pool)
            .await?;

            info!(task_id = %task_id, attempts, "task archived");
        }

        Ok(())
    }

    /// Remove a task that is not currently running.
    pub async fn cancel(&self, task_id: Uuid, queue: &str) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM tasks WHERE id = $1 AND queue = $2 AND state <> 'active'")
                .bind(task_id)
                .bind(queue)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Put an archived (or waiting) task back on the queue with a fresh
    /// attempt budget.
    pub async fn retry(&self, task_id: Uuid, queue: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET state = 'pending', attempts = 0, last_error = NULL, run_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND queue = $2 AND state IN ('archived', 'retry', 'scheduled')
            "#,
        )
        .bind(task_id)
        .bind(queue)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Stop handing out tasks from a queue.
    #[instrument(skip(self))]
    pub async fn pause(&self, queue: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO queue_state (queue, paused) VALUES ($1, TRUE)
            ON CONFLICT (queue) DO UPDATE SET paused = TRUE
            "#,
        )
        .bind(queue)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Resume a paused queue.
    #[instrument(skip(self))]
    pub async fn resume(&self, queue: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO queue_state (queue, paused) VALUES ($1, FALSE)
            ON CONFLICT (queue) DO UPDATE SET paused = FALSE
            "#,
        )
        .bind(queue)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Names of queues currently paused.
    pub async fn paused_queues(&self) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT queue FROM queue_state WHERE paused = TRUE")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(q,)| q).collect())
    }

    /// Stats for every queue that has tasks or explicit pause state.
    pub async fn list_queues(&self) -> Result<Vec<QueueStats>, sqlx::Error> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            r#"
            SELECT queue, state, COUNT(*) FROM tasks GROUP BY queue, state
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        let paused = self.paused_queues().await?;

        let empty_stats = |queue: &str, paused: bool| QueueStats {
            queue: queue.to_string(),
            paused,
            pending: 0,
            active: 0,
            scheduled: 0,
            retry: 0,
            archived: 0,
        };

        let mut stats: std::collections::BTreeMap<String, QueueStats> =
            std::collections::BTreeMap::new();
        for (queue, state, count) in rows {
            let is_paused = paused.contains(&queue);
            let stat = stats
                .entry(queue.clone())
                .or_insert_with(|| empty_stats(&queue, is_paused));
            match TaskState::parse(&state) {
                Some(TaskState::Pending) => stat.pending = count,
                Some(TaskState::Active) => stat.active = count,
                Some(TaskState::Scheduled) => stat.scheduled = count,
                Some(TaskState::Retry) => stat.retry = count,
                Some(TaskState::Archived) => stat.archived = count,
                None => {}
            }
        }
        for queue in &paused {
            stats
                .entry(queue.clone())
                .or_insert_with(|| empty_stats(queue, true));
        }

        Ok(stats.into_values().collect())
    }

    /// List tasks in one state of one queue, oldest first.
    pub async fn list_tasks(
        &self,
        queue: &str,
        state: TaskState,
        limit: i64,
    ) -> Result<Vec<Task>, sqlx::Error> {
        sqlx::query_as::<_, Task>(
            r#"
            SELECT * FROM tasks
            WHERE queue = $1 AND state = $2
            ORDER BY run_at
            LIMIT $3
            "#,
        )
        .bind(queue)
        .bind(state.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// Cheap readiness probe used by health wiring.
    pub async fn healthy(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

/// Exponential backoff for the nth attempt, capped at one hour.
pub fn backoff_seconds(attempts: i32) -> i64 {
    2i64.saturating_pow(attempts.max(0) as u32).min(3600)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_exponentially() {
        assert_eq!(backoff_seconds(1), 2);
        assert_eq!(backoff_seconds(2), 4);
        assert_eq!(backoff_seconds(3), 8);
        assert_eq!(backoff_seconds(5), 32);
    }

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(backoff_seconds(20), 3600);
        assert_eq!(backoff_seconds(63), 3600);
    }

    #[test]
    fn test_backoff_handles_nonpositive_attempts() {
        assert_eq!(backoff_seconds(0), 1);
        assert_eq!(backoff_seconds(-1), 1);
    }
}
