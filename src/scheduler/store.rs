//! Task rows and the forward-only state machine over SQLite.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::storage::with_timeout;

/// Lifecycle of a task. Strictly forward:
/// `scheduled → running → completed | failed`. Terminal rows are never
/// re-opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Scheduled,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(Self::Scheduled),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One row of the persisted queue. Timestamps are unix seconds.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTask {
    pub id: String,
    pub title: String,
    /// Dispatch key interpreted by the runner.
    pub kind: String,
    /// JSON payload for the runner; shape depends on `kind`.
    pub payload: Option<String>,
    /// Lower is more urgent.
    pub priority: i64,
    pub status: String,
    pub scheduled_for: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: i64,
}

/// Parameters for scheduling a new task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub kind: String,
    pub payload: Option<serde_json::Value>,
    pub priority: i64,
    pub scheduled_for: i64,
}

pub(crate) fn now_ts() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Persisted task queue. Producers call [`schedule`](TaskStore::schedule);
/// the cycle engine drives selection and transitions.
#[derive(Clone)]
pub struct TaskStore {
    pool: SqlitePool,
}

impl TaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ─── Producing ───────────────────────────────────────────────────────────

    /// Insert a new `scheduled` task and return the stored row.
    pub async fn schedule(&self, task: NewTask) -> Result<ScheduledTask> {
        let id = Uuid::new_v4().to_string();
        let now = now_ts();
        let payload = task.payload.map(|p| p.to_string());
        sqlx::query(
            "INSERT INTO scheduled_tasks
               (id, title, kind, payload, priority, status, scheduled_for, created_at)
             VALUES (?, ?, ?, ?, ?, 'scheduled', ?, ?)",
        )
        .bind(&id)
        .bind(&task.title)
        .bind(&task.kind)
        .bind(payload)
        .bind(task.priority)
        .bind(task.scheduled_for)
        .bind(now)
        .execute(&self.pool)
        .await?;
        self.get(&id)
            .await?
            .ok_or_else(|| anyhow!("task not found after insert"))
    }

    pub async fn get(&self, id: &str) -> Result<Option<ScheduledTask>> {
        Ok(sqlx::query_as("SELECT * FROM scheduled_tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    // ─── Cycle selection ─────────────────────────────────────────────────────

    /// The batch for one cycle: due `scheduled` tasks, most urgent first,
    /// earliest deadline breaking priority ties, capped at `limit`.
    pub async fn due_tasks(&self, now: i64, limit: u32) -> Result<Vec<ScheduledTask>> {
        with_timeout(async {
            Ok(sqlx::query_as(
                "SELECT * FROM scheduled_tasks
                 WHERE status = 'scheduled' AND scheduled_for <= ?
                 ORDER BY priority ASC, scheduled_for ASC, created_at ASC
                 LIMIT ?",
            )
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
        })
        .await
    }

    /// Total due tasks right now, including any beyond the batch cap.
    pub async fn due_count(&self, now: i64) -> Result<u64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM scheduled_tasks
             WHERE status = 'scheduled' AND scheduled_for <= ?",
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 as u64)
    }

    // ─── Transitions ─────────────────────────────────────────────────────────

    /// Atomically claim a task for execution: `scheduled → running`. Returns
    /// false if the row was not in `scheduled` (raced, or already terminal) —
    /// a single guarded UPDATE, so there is no TOCTOU window.
    pub async fn claim_running(&self, id: &str) -> Result<bool> {
        let now = now_ts();
        let result = sqlx::query(
            "UPDATE scheduled_tasks SET status = 'running', started_at = ?
             WHERE id = ? AND status = 'scheduled'",
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// `running → completed`. Returns false if the row was not `running`.
    pub async fn mark_completed(&self, id: &str) -> Result<bool> {
        let now = now_ts();
        let result = sqlx::query(
            "UPDATE scheduled_tasks SET status = 'completed', completed_at = ?
             WHERE id = ? AND status = 'running'",
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// `running → failed`, capturing the execution error verbatim.
    pub async fn mark_failed(&self, id: &str, error: &str) -> Result<bool> {
        let now = now_ts();
        let result = sqlx::query(
            "UPDATE scheduled_tasks
             SET status = 'failed', completed_at = ?, error_message = ?
             WHERE id = ? AND status = 'running'",
        )
        .bind(now)
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Startup recovery: any task a previous (crashed/killed) process left
    /// `running` is failed with an explanatory message. Forward transition —
    /// interrupted tasks are never silently re-opened.
    pub async fn recover_interrupted(&self) -> Result<u64> {
        with_timeout(async {
            let now = now_ts();
            let n = sqlx::query(
                "UPDATE scheduled_tasks
                 SET status = 'failed', completed_at = ?,
                     error_message = 'interrupted by daemon restart'
                 WHERE status = 'running'",
            )
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected();
            Ok(n)
        })
        .await
    }

    // ─── Reporting ───────────────────────────────────────────────────────────

    pub async fn count_with_status(&self, status: TaskStatus) -> Result<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM scheduled_tasks WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 as u64)
    }

    /// Tasks completed at or after `since` (unix seconds).
    pub async fn completed_since(&self, since: i64) -> Result<u64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM scheduled_tasks
             WHERE status = 'completed' AND completed_at >= ?",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 as u64)
    }

    /// Tasks failed at or after `since` (unix seconds).
    pub async fn failed_since(&self, since: i64) -> Result<u64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM scheduled_tasks
             WHERE status = 'failed' AND completed_at >= ?",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 as u64)
    }

    /// Scheduled tasks whose deadline has already passed.
    pub async fn overdue_count(&self, now: i64) -> Result<u64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM scheduled_tasks
             WHERE status = 'scheduled' AND scheduled_for < ?",
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 as u64)
    }

    // ─── Maintenance ─────────────────────────────────────────────────────────

    /// Delete terminal tasks older than `days` days and return the count.
    /// Pass `0` to skip pruning.
    pub async fn prune_finished(&self, days: u32) -> Result<u64> {
        if days == 0 {
            return Ok(0);
        }
        with_timeout(async {
            let cutoff = now_ts() - (days as i64) * 86_400;
            let n = sqlx::query(
                "DELETE FROM scheduled_tasks
                 WHERE status IN ('completed', 'failed') AND completed_at < ?",
            )
            .bind(cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();
            Ok(n)
        })
        .await
    }
}
