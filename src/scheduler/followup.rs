//! In-memory follow-up queue — the scheduler's best-effort second pass.
//!
//! Follow-ups are reminders to re-examine a task (today: tasks whose action
//! failed) after a delay. The queue is deliberately non-persistent: losing
//! entries on restart is acceptable, failing the primary cycle because of
//! them is not.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// One queued follow-up.
#[derive(Debug, Clone)]
pub struct Followup {
    pub task_id: String,
    pub note: String,
    pub due_at: DateTime<Utc>,
    pub enqueued_at: DateTime<Utc>,
}

impl Ord for Followup {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert so the earliest due_at pops first.
        other
            .due_at
            .cmp(&self.due_at)
            // FIFO among follow-ups due at the same instant.
            .then_with(|| other.enqueued_at.cmp(&self.enqueued_at))
    }
}

impl PartialOrd for Followup {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Followup {
    fn eq(&self, other: &Self) -> bool {
        self.task_id == other.task_id
    }
}

impl Eq for Followup {}

/// Priority queue of pending follow-ups, earliest due first.
pub struct FollowupQueue {
    heap: Mutex<BinaryHeap<Followup>>,
}

impl FollowupQueue {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
        }
    }

    pub async fn push(&self, followup: Followup) {
        self.heap.lock().await.push(followup);
    }

    /// Pop the most overdue follow-up, or `None` if nothing is due by `now`.
    pub async fn pop_due(&self, now: DateTime<Utc>) -> Option<Followup> {
        let mut heap = self.heap.lock().await;
        match heap.peek() {
            Some(head) if head.due_at <= now => heap.pop(),
            _ => None,
        }
    }

    pub async fn len(&self) -> usize {
        self.heap.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.heap.lock().await.is_empty()
    }
}

impl Default for FollowupQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe shared queue.
pub type SharedFollowupQueue = Arc<FollowupQueue>;

/// Where due follow-ups are delivered.
#[async_trait]
pub trait FollowupSink: Send + Sync {
    async fn deliver(&self, followup: &Followup) -> Result<()>;
}

/// Default sink: escalate into the structured log.
pub struct LogSink;

#[async_trait]
impl FollowupSink for LogSink {
    async fn deliver(&self, followup: &Followup) -> Result<()> {
        info!(task_id = %followup.task_id, note = %followup.note, "task follow-up due");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn followup(task_id: &str, due_at: DateTime<Utc>, enqueued_at: DateTime<Utc>) -> Followup {
        Followup {
            task_id: task_id.into(),
            note: "re-examine".into(),
            due_at,
            enqueued_at,
        }
    }

    #[tokio::test]
    async fn pops_earliest_due_first() {
        let queue = FollowupQueue::new();
        let t0 = Utc::now();
        queue.push(followup("late", t0 + Duration::seconds(300), t0)).await;
        queue.push(followup("early", t0 + Duration::seconds(60), t0)).await;
        queue.push(followup("middle", t0 + Duration::seconds(120), t0)).await;

        let far_future = t0 + Duration::seconds(1_000);
        assert_eq!(queue.pop_due(far_future).await.unwrap().task_id, "early");
        assert_eq!(queue.pop_due(far_future).await.unwrap().task_id, "middle");
        assert_eq!(queue.pop_due(far_future).await.unwrap().task_id, "late");
        assert!(queue.pop_due(far_future).await.is_none());
    }

    #[tokio::test]
    async fn nothing_pops_before_it_is_due() {
        let queue = FollowupQueue::new();
        let t0 = Utc::now();
        queue.push(followup("a", t0 + Duration::seconds(60), t0)).await;

        assert!(queue.pop_due(t0).await.is_none());
        assert_eq!(queue.len().await, 1, "undue entries stay queued");
        assert!(queue.pop_due(t0 + Duration::seconds(60)).await.is_some());
    }

    #[tokio::test]
    async fn ties_on_due_time_pop_fifo() {
        let queue = FollowupQueue::new();
        let t0 = Utc::now();
        let due = t0 + Duration::seconds(30);
        queue.push(followup("first", due, t0)).await;
        queue.push(followup("second", due, t0 + Duration::seconds(1))).await;

        assert_eq!(queue.pop_due(due).await.unwrap().task_id, "first");
        assert_eq!(queue.pop_due(due).await.unwrap().task_id, "second");
    }
}
