pub mod briefing;
pub mod config;
pub mod doctor;
pub mod fallback;
pub mod health;
pub mod heartbeat;
pub mod lease;
pub mod observability;
pub mod registry;
pub mod rest;
pub mod scheduler;
pub mod storage;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::RwLock;
use tracing::info;

use briefing::{BriefingGenerator, BriefingStore, NullMetrics};
use config::{HotConfig, SharedHotConfig, WardenConfig};
use fallback::{FallbackController, RestartSignal};
use health::{HealthEvaluator, SharedHealthEvaluator};
use heartbeat::{HeartbeatStore, SharedHeartbeatStore};
use lease::CycleGate;
use registry::SharedAgentRegistry;
use scheduler::{BuiltinRunner, FollowupQueue, LogSink, SchedulerEngine, TaskStore};
use storage::Storage;

/// Shared application state passed to every REST handler and background job.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<WardenConfig>,
    /// Hot-reloadable config subset (log level, staleness window, batch cap).
    pub hot: SharedHotConfig,
    pub storage: Arc<Storage>,
    /// The agent catalog: built-ins plus config.toml entries.
    pub registry: SharedAgentRegistry,
    /// In-memory last-heartbeat ledger.
    pub heartbeats: SharedHeartbeatStore,
    /// Per-agent responsiveness and the aggregate health report.
    pub evaluator: SharedHealthEvaluator,
    /// Recovery passes over unresponsive critical agents.
    pub fallback: Arc<FallbackController>,
    /// Due-task batch driver.
    pub engine: Arc<SchedulerEngine>,
    /// Daily briefing composer and its store.
    pub briefing: Arc<BriefingGenerator>,
    /// Per-kind cycle leases — one in-flight scheduler/health/fallback/briefing
    /// pass at a time.
    pub gate: Arc<CycleGate>,
    pub started_at: std::time::Instant,
}

impl AppContext {
    /// Wire the full daemon object graph from a resolved config.
    ///
    /// Opens (and migrates) the database, builds the agent catalog, and marks
    /// any tasks left `running` by a previous process as failed so the next
    /// cycle starts from a clean slate.
    pub async fn init(config: WardenConfig) -> Result<Arc<Self>> {
        let hot: SharedHotConfig = Arc::new(RwLock::new(HotConfig::from_config(&config)));

        let storage = Arc::new(
            Storage::new_with_slow_query(
                &config.data_dir,
                config.observability.slow_query_threshold_ms,
            )
            .await?,
        );

        let registry = Arc::new(config.agent_registry());
        let heartbeats = Arc::new(HeartbeatStore::new(registry.clone()));
        let evaluator = Arc::new(HealthEvaluator::new(
            registry.clone(),
            heartbeats.clone(),
            hot.clone(),
        ));
        let strategy = Arc::new(RestartSignal::new(heartbeats.clone()));
        let fallback = Arc::new(FallbackController::new(
            registry.clone(),
            evaluator.clone(),
            strategy,
        ));

        let tasks = TaskStore::new(storage.pool());
        let recovered = tasks.recover_interrupted().await?;
        if recovered > 0 {
            info!(
                count = recovered,
                "tasks left running by a previous process marked failed"
            );
        }

        let engine = Arc::new(SchedulerEngine::new(
            tasks.clone(),
            Arc::new(BuiltinRunner::new()),
            Arc::new(FollowupQueue::new()),
            Arc::new(LogSink),
            hot.clone(),
            config.scheduler.followup_delay_secs,
        ));

        let briefing = Arc::new(BriefingGenerator::new(
            evaluator.clone(),
            tasks,
            Arc::new(NullMetrics),
            BriefingStore::new(storage.pool()),
        ));

        Ok(Arc::new(Self {
            config: Arc::new(config),
            hot,
            storage,
            registry,
            heartbeats,
            evaluator,
            fallback,
            engine,
            briefing,
            gate: Arc::new(CycleGate::new()),
            started_at: std::time::Instant::now(),
        }))
    }
}
