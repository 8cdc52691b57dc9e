//! Daily briefing tests: composition from live health + task state, and the
//! one-row-per-date upsert contract.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tempfile::TempDir;
use wardend::briefing::{BriefingGenerator, BriefingStore, BusinessCounters, MetricsSource};
use wardend::config::WardenConfig;
use wardend::heartbeat::AgentStatus;
use wardend::scheduler::NewTask;
use wardend::AppContext;

const BUILTIN_IDS: [&str; 5] = [
    "master-orchestrator",
    "scheduling-agent",
    "billing-agent",
    "marketing-agent",
    "support-agent",
];

async fn make_ctx(dir: &TempDir) -> Arc<AppContext> {
    let config = WardenConfig::new(
        Some(0),
        Some(dir.path().to_path_buf()),
        Some("error".to_string()),
        None,
    );
    AppContext::init(config).await.unwrap()
}

fn due_task(title: &str, scheduled_for: i64) -> NewTask {
    NewTask {
        title: title.to_string(),
        kind: "noop".to_string(),
        payload: None,
        priority: 5,
        scheduled_for,
    }
}

/// Source standing in for a portal that is down.
struct UnreachableMetrics;

#[async_trait::async_trait]
impl MetricsSource for UnreachableMetrics {
    async fn counters(&self) -> Result<BusinessCounters> {
        anyhow::bail!("portal unreachable")
    }
}

#[tokio::test]
async fn test_regenerating_same_date_replaces_the_row() {
    let dir = TempDir::new().unwrap();
    let ctx = make_ctx(&dir).await;
    let now = Utc::now();

    let first = ctx.briefing.generate_and_store_at(now).await.unwrap();
    assert_eq!(first.agents_online, 0);

    // State changes, same date: the stored row must be replaced, not doubled.
    ctx.heartbeats
        .record("billing-agent", AgentStatus::Online, None)
        .await
        .unwrap();
    let second = ctx.briefing.generate_and_store_at(now).await.unwrap();
    assert_eq!(second.agents_online, 1);

    assert_eq!(ctx.briefing.store().count().await.unwrap(), 1);
    let stored = ctx
        .briefing
        .store()
        .get(&second.date)
        .await
        .unwrap()
        .expect("briefing stored for the date");
    assert_eq!(stored.agents_online, 1, "last write wins");
}

#[tokio::test]
async fn test_silent_fleet_yields_critical_briefing() {
    let dir = TempDir::new().unwrap();
    let ctx = make_ctx(&dir).await;

    let briefing = ctx.briefing.generate_at(Utc::now()).await.unwrap();
    assert_eq!(briefing.health_status, "critical");
    assert_eq!(briefing.health_score, Some(0));
    assert_eq!(briefing.agents_total, 5);
    assert_eq!(
        briefing.concerns.len(),
        5,
        "every silent agent raises a concern: {:?}",
        briefing.concerns
    );
    assert_eq!(
        briefing.action_items.len(),
        3,
        "one restart item per critical agent: {:?}",
        briefing.action_items
    );
    assert!(
        briefing
            .recommendations
            .iter()
            .any(|r| r.contains("fallback recovery")),
        "got: {:?}",
        briefing.recommendations
    );
    assert_eq!(
        briefing.highlights,
        vec!["Quiet day — no notable activity".to_string()],
        "nothing positive happened, so the filler highlight stands in"
    );
}

#[tokio::test]
async fn test_responsive_fleet_briefing_is_ok_with_highlight() {
    let dir = TempDir::new().unwrap();
    let ctx = make_ctx(&dir).await;

    for id in BUILTIN_IDS {
        ctx.heartbeats
            .record(id, AgentStatus::Online, None)
            .await
            .unwrap();
    }

    let briefing = ctx.briefing.generate_at(Utc::now()).await.unwrap();
    assert_eq!(briefing.health_status, "ok");
    assert_eq!(briefing.health_score, Some(100));
    assert_eq!(briefing.agents_online, 5);
    assert!(briefing.concerns.is_empty(), "got: {:?}", briefing.concerns);
    assert!(briefing.action_items.is_empty());
    assert!(
        briefing
            .highlights
            .contains(&"All 5 agents responsive".to_string()),
        "got: {:?}",
        briefing.highlights
    );
}

#[tokio::test]
async fn test_task_counters_flow_into_briefing() {
    let dir = TempDir::new().unwrap();
    let ctx = make_ctx(&dir).await;
    let now = Utc::now();
    let store = ctx.engine.store();

    // One task completes in this cycle...
    store
        .schedule(due_task("done-today", now.timestamp() - 30))
        .await
        .unwrap();
    ctx.engine.run_cycle_at(now).await.unwrap();
    // ...one is overdue and unprocessed, one is scheduled for tomorrow.
    store
        .schedule(due_task("missed", now.timestamp() - 120))
        .await
        .unwrap();
    store
        .schedule(due_task("tomorrow", now.timestamp() + 86_400))
        .await
        .unwrap();

    let briefing = ctx.briefing.generate_at(now).await.unwrap();
    assert_eq!(briefing.tasks_completed, 1);
    assert_eq!(briefing.tasks_scheduled, 2);
    assert_eq!(briefing.tasks_overdue, 1);
    assert!(
        briefing.highlights.contains(&"1 task(s) completed today".to_string()),
        "got: {:?}",
        briefing.highlights
    );
    assert!(
        briefing.concerns.contains(&"1 task(s) overdue".to_string()),
        "got: {:?}",
        briefing.concerns
    );
    assert!(
        briefing
            .recommendations
            .iter()
            .any(|r| r.contains("backlog")),
        "got: {:?}",
        briefing.recommendations
    );
}

#[tokio::test]
async fn test_unreachable_metrics_source_does_not_fail_the_briefing() {
    let dir = TempDir::new().unwrap();
    let ctx = make_ctx(&dir).await;

    let generator = BriefingGenerator::new(
        ctx.evaluator.clone(),
        ctx.engine.store().clone(),
        Arc::new(UnreachableMetrics),
        BriefingStore::new(ctx.storage.pool()),
    );

    // Business counters are auxiliary input: when the portal is down the
    // briefing still composes, with those counters zeroed.
    let briefing = generator.generate_at(Utc::now()).await.unwrap();
    assert_eq!(briefing.active_projects, 0);
    assert_eq!(briefing.at_risk_projects, 0);
    assert_eq!(briefing.new_leads, 0);
    assert_eq!(briefing.active_campaigns, 0);
    assert_eq!(briefing.agents_total, 5, "health input still flows normally");
    assert!(
        !briefing.highlights.iter().any(|h| h.contains("lead")),
        "no phantom lead highlight from a dead source: {:?}",
        briefing.highlights
    );
}
