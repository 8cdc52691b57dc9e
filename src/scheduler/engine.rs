//! The cycle engine — one façade call per scheduler tick.
//!
//! A cycle has two halves. The primary pass drives due persisted tasks
//! through the state machine, isolating each task's outcome. The secondary
//! pass drains due in-memory follow-ups. The two fail independently: a task
//! error is captured into its row, a follow-up error is logged and swallowed.

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::SharedHotConfig;
use crate::lease::{CycleGate, CycleKind};
use crate::observability::CycleTimer;
use crate::scheduler::followup::{Followup, FollowupQueue, FollowupSink};
use crate::scheduler::runner::TaskRunner;
use crate::scheduler::store::TaskStore;

/// Outcome of one cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    /// Tasks currently due, including any beyond the batch cap.
    pub due: u64,
    /// Tasks driven through the state machine this cycle.
    pub processed: u64,
    pub completed: u64,
    pub failed: u64,
    /// Follow-ups delivered by the secondary pass.
    pub followups: u64,
    pub duration_ms: u64,
}

/// Glues the persisted queue, the runner, and the follow-up queue together.
/// Holds no lock of its own — the invoking layer takes the cycle lease.
pub struct SchedulerEngine {
    store: TaskStore,
    runner: Arc<dyn TaskRunner>,
    followups: Arc<FollowupQueue>,
    sink: Arc<dyn FollowupSink>,
    hot: SharedHotConfig,
    followup_delay_secs: i64,
}

impl SchedulerEngine {
    pub fn new(
        store: TaskStore,
        runner: Arc<dyn TaskRunner>,
        followups: Arc<FollowupQueue>,
        sink: Arc<dyn FollowupSink>,
        hot: SharedHotConfig,
        followup_delay_secs: i64,
    ) -> Self {
        Self {
            store,
            runner,
            followups,
            sink,
            hot,
            followup_delay_secs,
        }
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// Run one cycle at the current time.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run one cycle against an explicit clock. The clock steers selection
    /// and follow-up due-ness; row timestamps still come from the real one.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        let timer = CycleTimer::start(CycleKind::Scheduler);
        let now_ts = now.timestamp();
        let cap = self.hot.read().await.batch_cap;

        let due = self.store.due_count(now_ts).await?;
        let batch = self.store.due_tasks(now_ts, cap).await?;

        let mut processed = 0u64;
        let mut completed = 0u64;
        let mut failed = 0u64;
        for task in &batch {
            match self.store.claim_running(&task.id).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(task_id = %task.id, "task no longer claimable — skipped");
                    continue;
                }
                Err(e) => {
                    // Storage hiccup on one row must not sink the batch.
                    warn!(task_id = %task.id, err = %e, "claim failed — task skipped");
                    continue;
                }
            }
            processed += 1;
            match self.runner.run(task).await {
                Ok(()) => match self.store.mark_completed(&task.id).await {
                    Ok(true) => {
                        completed += 1;
                        debug!(task_id = %task.id, title = %task.title, "task completed");
                    }
                    Ok(false) => {
                        debug!(task_id = %task.id, "task no longer running — completion not recorded");
                    }
                    Err(e) => {
                        warn!(task_id = %task.id, err = %e, "could not record completion");
                    }
                },
                Err(run_err) => {
                    failed += 1;
                    warn!(task_id = %task.id, err = %run_err, "task action failed");
                    if let Err(e) = self.store.mark_failed(&task.id, &run_err.to_string()).await {
                        warn!(task_id = %task.id, err = %e, "could not record failure");
                    }
                    self.followups
                        .push(Followup {
                            task_id: task.id.clone(),
                            note: format!("task '{}' failed: {run_err}", task.title),
                            due_at: now + ChronoDuration::seconds(self.followup_delay_secs),
                            enqueued_at: now,
                        })
                        .await;
                }
            }
        }

        // Secondary pass — best-effort by contract.
        let followups = match self.advance_followups(now).await {
            Ok(n) => n,
            Err(e) => {
                warn!(err = %e, "follow-up pass failed (ignored)");
                0
            }
        };

        let report = CycleReport {
            due,
            processed,
            completed,
            failed,
            followups,
            duration_ms: timer.finish(),
        };
        info!(
            due = report.due,
            processed = report.processed,
            completed = report.completed,
            failed = report.failed,
            followups = report.followups,
            "scheduler cycle complete"
        );
        Ok(report)
    }

    /// Deliver every follow-up due by `now`. Stops at the first sink error;
    /// entries not yet popped stay queued for a later cycle.
    async fn advance_followups(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut delivered = 0u64;
        while let Some(followup) = self.followups.pop_due(now).await {
            self.sink.deliver(&followup).await?;
            delivered += 1;
        }
        Ok(delivered)
    }
}

/// Background drive loop. Fires a cycle every `interval_secs`; ticks that
/// land while another invoker holds the scheduler lease are skipped. Pass
/// `0` to disable the internal drive (external triggers only).
pub async fn run_scheduler_job(
    engine: Arc<SchedulerEngine>,
    gate: Arc<CycleGate>,
    interval_secs: u64,
) {
    if interval_secs == 0 {
        info!("scheduler drive loop disabled — external triggers only");
        return;
    }
    let mut ticker = interval(Duration::from_secs(interval_secs));
    loop {
        ticker.tick().await;
        let _lease = match gate.try_acquire(CycleKind::Scheduler) {
            Ok(guard) => guard,
            Err(busy) => {
                debug!(err = %busy, "scheduler tick skipped");
                continue;
            }
        };
        if let Err(e) = engine.run_cycle().await {
            warn!("scheduler cycle error: {e}");
        }
    }
}
