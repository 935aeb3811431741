//! Postgres-backed task store.
//!
//! The broker is a single `tasks` table. Claiming uses
//! `FOR UPDATE SKIP LOCKED` so concurrent workers never block each other or
//! hand out the same row twice; a crashed worker's claim expires via
//! `reap_stale` (lease on `locked_at`), which re-delivers the task and is
//! what makes the queue at-least-once.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use super::store::{TaskStore, TaskStoreError};
use super::types::{Queue, RetryPolicy, Task, TaskId, TaskStatus};

const TASK_COLUMNS: &str = "id, kind, payload, queue, status, last_error, retry_policy, attempt, \
     created_at, updated_at, scheduled_at";

#[derive(Debug, Clone)]
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn enqueue(&self, task: Task) -> Result<TaskId, TaskStoreError> {
        let retry_policy = serde_json::to_value(&task.retry_policy)
            .map_err(|e| TaskStoreError::Encoding(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO tasks (
                id, kind, payload, queue, status, retry_policy, attempt,
                created_at, updated_at, scheduled_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(task.id.0)
        .bind(&task.kind)
        .bind(&task.payload)
        .bind(task.queue.as_str())
        .bind(status_label(&task.status))
        .bind(&retry_policy)
        .bind(task.attempt as i32)
        .bind(task.created_at)
        .bind(task.updated_at)
        .bind(task.scheduled_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("enqueue", e))?;

        Ok(task.id)
    }

    async fn claim_next(&self, queue: Queue) -> Result<Option<Task>, TaskStoreError> {
        let sql = format!(
            r#"
            UPDATE tasks
            SET status = 'running',
                attempt = attempt + 1,
                locked_at = now(),
                updated_at = now()
            WHERE id = (
                SELECT id FROM tasks
                WHERE queue = $1
                    AND status IN ('pending', 'failed')
                    AND (scheduled_at IS NULL OR scheduled_at <= now())
                ORDER BY created_at
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING {TASK_COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(queue.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("claim_next", e))?;

        row.map(|r| task_from_row(&r)).transpose()
    }

    async fn update(&self, task: &Task) -> Result<(), TaskStoreError> {
        let (label, last_error) = match &task.status {
            TaskStatus::Failed { error, .. } => ("failed", Some(error.as_str())),
            TaskStatus::Terminal { error, .. } => ("terminal", Some(error.as_str())),
            other => (status_label(other), None),
        };

        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = $2,
                last_error = $3,
                attempt = $4,
                scheduled_at = $5,
                updated_at = $6,
                locked_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(task.id.0)
        .bind(label)
        .bind(last_error)
        .bind(task.attempt as i32)
        .bind(task.scheduled_at)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update", e))?;

        if result.rows_affected() == 0 {
            return Err(TaskStoreError::NotFound(task.id));
        }

        Ok(())
    }

    async fn remove(&self, id: TaskId) -> Result<(), TaskStoreError> {
        sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("remove", e))?;

        Ok(())
    }

    async fn reap_stale(&self, lease: Duration) -> Result<u64, TaskStoreError> {
        let cutoff = Utc::now() - chrono::Duration::from_std(lease).unwrap_or_default();

        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'pending',
                locked_at = NULL,
                scheduled_at = NULL,
                updated_at = now()
            WHERE status = 'running' AND locked_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("reap_stale", e))?;

        Ok(result.rows_affected())
    }

    async fn pending_count(&self, queue: Queue) -> Result<u64, TaskStoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS pending FROM tasks WHERE queue = $1 AND status IN ('pending', 'failed')",
        )
        .bind(queue.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("pending_count", e))?;

        let count: i64 = row
            .try_get("pending")
            .map_err(|e| TaskStoreError::Storage(e.to_string()))?;
        Ok(count as u64)
    }
}

fn status_label(status: &TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::Running => "running",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed { .. } => "failed",
        TaskStatus::Terminal { .. } => "terminal",
    }
}

fn task_from_row(row: &sqlx::postgres::PgRow) -> Result<Task, TaskStoreError> {
    let read = |e: sqlx::Error| TaskStoreError::Storage(format!("bad task row: {e}"));

    let id: uuid::Uuid = row.try_get("id").map_err(read)?;
    let kind: String = row.try_get("kind").map_err(read)?;
    let payload: serde_json::Value = row.try_get("payload").map_err(read)?;
    let queue: String = row.try_get("queue").map_err(read)?;
    let status: String = row.try_get("status").map_err(read)?;
    let last_error: Option<String> = row.try_get("last_error").map_err(read)?;
    let retry_policy: serde_json::Value = row.try_get("retry_policy").map_err(read)?;
    let attempt: i32 = row.try_get("attempt").map_err(read)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(read)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(read)?;
    let scheduled_at: Option<DateTime<Utc>> = row.try_get("scheduled_at").map_err(read)?;

    let queue = Queue::parse(&queue)
        .ok_or_else(|| TaskStoreError::Storage(format!("unknown queue: {queue}")))?;
    let retry_policy: RetryPolicy = serde_json::from_value(retry_policy)
        .map_err(|e| TaskStoreError::Storage(format!("bad retry policy: {e}")))?;

    let attempt = attempt as u32;
    let status = match status.as_str() {
        "pending" => TaskStatus::Pending,
        "running" => TaskStatus::Running,
        "completed" => TaskStatus::Completed,
        "failed" => TaskStatus::Failed {
            error: last_error.unwrap_or_default(),
            attempt,
        },
        "terminal" => TaskStatus::Terminal {
            error: last_error.unwrap_or_default(),
            attempts: attempt,
        },
        other => return Err(TaskStoreError::Storage(format!("unknown status: {other}"))),
    };

    Ok(Task {
        id: TaskId::from_uuid(id),
        kind,
        payload,
        queue,
        status,
        retry_policy,
        attempt,
        created_at,
        updated_at,
        scheduled_at,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> TaskStoreError {
    TaskStoreError::Storage(format!("{operation}: {err}"))
}
