//! Daily briefing — the once-a-day aggregate over tasks, agent health, and
//! the portal's business counters.
//!
//! Briefings are keyed by UTC calendar date and written with upsert
//! semantics: regenerating the same day replaces the row, so the manual
//! trigger and the scheduled job can both fire without duplicates.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::health::HealthEvaluator;
use crate::lease::{CycleGate, CycleKind};
use crate::observability::CycleTimer;
use crate::scheduler::store::{TaskStatus, TaskStore};
use crate::storage::{with_timeout, Storage};

/// Counters owned by the surrounding portal (projects, leads, campaigns).
#[derive(Debug, Clone, Copy, Default)]
pub struct BusinessCounters {
    pub active_projects: i64,
    pub at_risk_projects: i64,
    pub new_leads: i64,
    pub active_campaigns: i64,
}

/// Seam to the out-of-scope system that owns the business counters.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn counters(&self) -> Result<BusinessCounters>;
}

/// Default source when no portal is attached: all zeros.
pub struct NullMetrics;

#[async_trait]
impl MetricsSource for NullMetrics {
    async fn counters(&self) -> Result<BusinessCounters> {
        Ok(BusinessCounters::default())
    }
}

/// One generated briefing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyBriefing {
    /// UTC calendar date, `YYYY-MM-DD`.
    pub date: String,
    pub generated_at: i64,
    pub tasks_completed: i64,
    pub tasks_scheduled: i64,
    pub tasks_overdue: i64,
    pub active_projects: i64,
    pub at_risk_projects: i64,
    pub new_leads: i64,
    pub active_campaigns: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_score: Option<i64>,
    pub health_status: String,
    pub agents_online: i64,
    pub agents_total: i64,
    pub highlights: Vec<String>,
    pub concerns: Vec<String>,
    pub recommendations: Vec<String>,
    pub action_items: Vec<String>,
}

/// Raw row shape; the list columns hold JSON arrays as TEXT.
#[derive(Debug, Clone, sqlx::FromRow)]
struct BriefingRow {
    date: String,
    generated_at: i64,
    tasks_completed: i64,
    tasks_scheduled: i64,
    tasks_overdue: i64,
    active_projects: i64,
    at_risk_projects: i64,
    new_leads: i64,
    active_campaigns: i64,
    health_score: Option<i64>,
    health_status: String,
    agents_online: i64,
    agents_total: i64,
    highlights: String,
    concerns: String,
    recommendations: String,
    action_items: String,
}

fn parse_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

impl BriefingRow {
    fn into_briefing(self) -> DailyBriefing {
        DailyBriefing {
            date: self.date,
            generated_at: self.generated_at,
            tasks_completed: self.tasks_completed,
            tasks_scheduled: self.tasks_scheduled,
            tasks_overdue: self.tasks_overdue,
            active_projects: self.active_projects,
            at_risk_projects: self.at_risk_projects,
            new_leads: self.new_leads,
            active_campaigns: self.active_campaigns,
            health_score: self.health_score,
            health_status: self.health_status,
            agents_online: self.agents_online,
            agents_total: self.agents_total,
            highlights: parse_list(&self.highlights),
            concerns: parse_list(&self.concerns),
            recommendations: parse_list(&self.recommendations),
            action_items: parse_list(&self.action_items),
        }
    }
}

/// Persistence for briefings — one row per date, last write wins.
#[derive(Clone)]
pub struct BriefingStore {
    pool: SqlitePool,
}

impl BriefingStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace the briefing for its date.
    pub async fn upsert(&self, briefing: &DailyBriefing) -> Result<()> {
        let highlights = serde_json::to_string(&briefing.highlights)?;
        let concerns = serde_json::to_string(&briefing.concerns)?;
        let recommendations = serde_json::to_string(&briefing.recommendations)?;
        let action_items = serde_json::to_string(&briefing.action_items)?;
        with_timeout(async {
            sqlx::query(
                "INSERT INTO daily_briefings
                   (date, generated_at, tasks_completed, tasks_scheduled, tasks_overdue,
                    active_projects, at_risk_projects, new_leads, active_campaigns,
                    health_score, health_status, agents_online, agents_total,
                    highlights, concerns, recommendations, action_items)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(date) DO UPDATE SET
                   generated_at = excluded.generated_at,
                   tasks_completed = excluded.tasks_completed,
                   tasks_scheduled = excluded.tasks_scheduled,
                   tasks_overdue = excluded.tasks_overdue,
                   active_projects = excluded.active_projects,
                   at_risk_projects = excluded.at_risk_projects,
                   new_leads = excluded.new_leads,
                   active_campaigns = excluded.active_campaigns,
                   health_score = excluded.health_score,
                   health_status = excluded.health_status,
                   agents_online = excluded.agents_online,
                   agents_total = excluded.agents_total,
                   highlights = excluded.highlights,
                   concerns = excluded.concerns,
                   recommendations = excluded.recommendations,
                   action_items = excluded.action_items",
            )
            .bind(&briefing.date)
            .bind(briefing.generated_at)
            .bind(briefing.tasks_completed)
            .bind(briefing.tasks_scheduled)
            .bind(briefing.tasks_overdue)
            .bind(briefing.active_projects)
            .bind(briefing.at_risk_projects)
            .bind(briefing.new_leads)
            .bind(briefing.active_campaigns)
            .bind(briefing.health_score)
            .bind(&briefing.health_status)
            .bind(briefing.agents_online)
            .bind(briefing.agents_total)
            .bind(&highlights)
            .bind(&concerns)
            .bind(&recommendations)
            .bind(&action_items)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    /// Fetch the briefing stored for `date` (`YYYY-MM-DD`).
    pub async fn get(&self, date: &str) -> Result<Option<DailyBriefing>> {
        let row: Option<BriefingRow> =
            sqlx::query_as("SELECT * FROM daily_briefings WHERE date = ?")
                .bind(date)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(BriefingRow::into_briefing))
    }

    pub async fn count(&self) -> Result<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM daily_briefings")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 as u64)
    }
}

/// Composes briefings from the evaluator, the task store, and the injected
/// business counters.
pub struct BriefingGenerator {
    evaluator: Arc<HealthEvaluator>,
    tasks: TaskStore,
    metrics: Arc<dyn MetricsSource>,
    store: BriefingStore,
}

impl BriefingGenerator {
    pub fn new(
        evaluator: Arc<HealthEvaluator>,
        tasks: TaskStore,
        metrics: Arc<dyn MetricsSource>,
        store: BriefingStore,
    ) -> Self {
        Self {
            evaluator,
            tasks,
            metrics,
            store,
        }
    }

    pub fn store(&self) -> &BriefingStore {
        &self.store
    }

    /// Compose the briefing for `now`'s UTC date without storing it.
    pub async fn generate_at(&self, now: DateTime<Utc>) -> Result<DailyBriefing> {
        let date = now.format("%Y-%m-%d").to_string();
        let day_start = now.date_naive().and_time(NaiveTime::MIN).and_utc().timestamp();
        let now_ts = now.timestamp();

        let report = self.evaluator.system_health_check_at(now).await;
        // Auxiliary input — never fail the briefing over it.
        let counters = match self.metrics.counters().await {
            Ok(c) => c,
            Err(e) => {
                warn!(err = %e, "business counters unavailable — using zeros");
                BusinessCounters::default()
            }
        };

        let tasks_completed = self.tasks.completed_since(day_start).await? as i64;
        let tasks_failed = self.tasks.failed_since(day_start).await? as i64;
        let tasks_scheduled = self.tasks.count_with_status(TaskStatus::Scheduled).await? as i64;
        let tasks_overdue = self.tasks.overdue_count(now_ts).await? as i64;

        let mut highlights = Vec::new();
        let mut concerns = Vec::new();
        let mut recommendations = Vec::new();
        let mut action_items = Vec::new();

        if report.total_agents > 0 && report.online_count == report.total_agents {
            highlights.push(format!("All {} agents responsive", report.total_agents));
        }
        if tasks_completed > 0 {
            highlights.push(format!("{tasks_completed} task(s) completed today"));
        }
        if counters.new_leads > 0 {
            highlights.push(format!("{} new lead(s) captured", counters.new_leads));
        }
        for agent in report.agents.iter().filter(|a| !a.is_responsive) {
            concerns.push(format!("Agent '{}' is unresponsive", agent.name));
            if agent.critical {
                action_items.push(format!("Restart critical agent '{}'", agent.name));
            }
        }
        if tasks_overdue > 0 {
            concerns.push(format!("{tasks_overdue} task(s) overdue"));
            recommendations.push("Review the task backlog and re-prioritize overdue work".to_string());
        }
        if tasks_failed > 0 {
            concerns.push(format!("{tasks_failed} task(s) failed today"));
            recommendations
                .push("Inspect failed task error messages before re-scheduling".to_string());
        }
        if counters.at_risk_projects > 0 {
            concerns.push(format!("{} project(s) at risk", counters.at_risk_projects));
        }
        if report.agents.iter().any(|a| a.critical && !a.is_responsive) {
            recommendations
                .push("Run a fallback recovery pass for unresponsive critical agents".to_string());
        }
        if highlights.is_empty() {
            highlights.push("Quiet day — no notable activity".to_string());
        }

        Ok(DailyBriefing {
            date,
            generated_at: now_ts,
            tasks_completed,
            tasks_scheduled,
            tasks_overdue,
            active_projects: counters.active_projects,
            at_risk_projects: counters.at_risk_projects,
            new_leads: counters.new_leads,
            active_campaigns: counters.active_campaigns,
            health_score: report.health_score.map(i64::from),
            health_status: report.status.clone(),
            agents_online: report.online_count as i64,
            agents_total: report.total_agents as i64,
            highlights,
            concerns,
            recommendations,
            action_items,
        })
    }

    /// Generate and upsert today's briefing. Safe to call repeatedly — the
    /// row for the date is replaced each time.
    pub async fn generate_and_store(&self) -> Result<DailyBriefing> {
        self.generate_and_store_at(Utc::now()).await
    }

    pub async fn generate_and_store_at(&self, now: DateTime<Utc>) -> Result<DailyBriefing> {
        let briefing = self.generate_at(now).await?;
        self.store.upsert(&briefing).await?;
        info!(date = %briefing.date, health = %briefing.health_status, "daily briefing stored");
        Ok(briefing)
    }
}

/// Thread-safe shared generator.
pub type SharedBriefingGenerator = Arc<BriefingGenerator>;

/// Daily background job: generate the briefing (first tick fires at startup,
/// so a restarted daemon refreshes today's row) and prune terminal tasks
/// past retention.
pub async fn run_briefing_job(
    generator: Arc<BriefingGenerator>,
    gate: Arc<CycleGate>,
    tasks: TaskStore,
    storage: Arc<Storage>,
    retain_days: u32,
) {
    let mut ticker = interval(Duration::from_secs(24 * 60 * 60));
    loop {
        ticker.tick().await;
        {
            let _lease = match gate.try_acquire(CycleKind::Briefing) {
                Ok(guard) => guard,
                Err(busy) => {
                    debug!(err = %busy, "briefing tick skipped");
                    continue;
                }
            };
            let timer = CycleTimer::start(CycleKind::Briefing);
            match generator.generate_and_store().await {
                Ok(briefing) => info!(date = %briefing.date, "briefing job complete"),
                Err(e) => warn!("briefing job error: {e}"),
            }
            timer.finish();
        }

        if retain_days > 0 {
            match tasks.prune_finished(retain_days).await {
                Ok(0) => {}
                Ok(n) => {
                    info!(pruned = n, "old finished tasks pruned");
                    let _ = storage.vacuum().await;
                }
                Err(e) => warn!("task prune error: {e}"),
            }
        }
    }
}
