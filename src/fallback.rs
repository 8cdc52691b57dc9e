//! Fallback recovery — restart signals for unresponsive critical agents.
//!
//! The controller reads the current health report, targets agents that are
//! both critical and unresponsive, and runs the injected [`RecoveryStrategy`]
//! against each one. Failures are isolated per agent; the pass always
//! finishes and reports a recovered/failed partition. Non-critical agents
//! are never touched.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::health::HealthEvaluator;
use crate::heartbeat::{AgentStatus, HeartbeatStore};
use crate::registry::{AgentDescriptor, AgentRegistry, AgentRole};

/// Pluggable recovery action, parameterized by the agent descriptor (and
/// through it the agent's role). Implementations may take as long as they
/// need; the controller isolates their failures per agent.
#[async_trait]
pub trait RecoveryStrategy: Send + Sync {
    async fn recover(&self, agent: &AgentDescriptor) -> Result<()>;
}

/// Default strategy: signal the agent's logical entry point to restart and
/// seed a `starting` heartbeat through the normal ingestion path, which is
/// what makes the recovery observable to the evaluator.
pub struct RestartSignal {
    heartbeats: Arc<HeartbeatStore>,
}

impl RestartSignal {
    pub fn new(heartbeats: Arc<HeartbeatStore>) -> Self {
        Self { heartbeats }
    }
}

#[async_trait]
impl RecoveryStrategy for RestartSignal {
    async fn recover(&self, agent: &AgentDescriptor) -> Result<()> {
        let entry_point = match agent.role {
            AgentRole::System => "supervisor",
            AgentRole::Service => "service-manager",
        };
        info!(agent_id = %agent.id, entry_point = entry_point, "sending restart signal");
        self.heartbeats
            .record(&agent.id, AgentStatus::Starting, None)
            .await?;
        Ok(())
    }
}

/// Outcome of one recovery pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackReport {
    pub generated_at: DateTime<Utc>,
    /// Agents whose recovery action succeeded and which reported a fresh
    /// responsive heartbeat on re-check.
    pub recovered: Vec<String>,
    /// Agents whose action failed, or which stayed silent after it.
    pub failed: Vec<String>,
}

/// Runs recovery for critical agents the evaluator considers down.
///
/// Idempotent by construction: once an agent is responsive again it is no
/// longer targeted, so a second consecutive run returns empty lists.
pub struct FallbackController {
    registry: Arc<AgentRegistry>,
    evaluator: Arc<HealthEvaluator>,
    strategy: Arc<dyn RecoveryStrategy>,
}

impl FallbackController {
    pub fn new(
        registry: Arc<AgentRegistry>,
        evaluator: Arc<HealthEvaluator>,
        strategy: Arc<dyn RecoveryStrategy>,
    ) -> Self {
        Self {
            registry,
            evaluator,
            strategy,
        }
    }

    /// Run one recovery pass over the current health report.
    pub async fn run(&self) -> FallbackReport {
        let now = Utc::now();
        let report = self.evaluator.system_health_check_at(now).await;

        let mut recovered = Vec::new();
        let mut failed = Vec::new();
        for agent in report.agents.iter().filter(|a| a.critical && !a.is_responsive) {
            let desc = match self.registry.get(&agent.id) {
                Some(d) => d,
                None => continue,
            };
            match self.strategy.recover(desc).await {
                Ok(()) => {
                    // Recovered means a fresh heartbeat actually arrived, not
                    // just that the action returned Ok.
                    if self.evaluator.is_agent_responsive(&desc.id).await {
                        info!(agent_id = %desc.id, role = desc.role.as_str(), "agent recovered");
                        recovered.push(desc.id.clone());
                    } else {
                        warn!(
                            agent_id = %desc.id,
                            "recovery action succeeded but no responsive heartbeat followed"
                        );
                        failed.push(desc.id.clone());
                    }
                }
                Err(e) => {
                    warn!(agent_id = %desc.id, err = %e, "recovery action failed");
                    failed.push(desc.id.clone());
                }
            }
        }

        if !recovered.is_empty() || !failed.is_empty() {
            info!(
                recovered = recovered.len(),
                failed = failed.len(),
                "fallback pass complete"
            );
        }
        FallbackReport {
            generated_at: now,
            recovered,
            failed,
        }
    }
}

/// Thread-safe shared controller.
pub type SharedFallbackController = Arc<FallbackController>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HotConfig, SharedHotConfig};
    use chrono::Duration;
    use tokio::sync::{Mutex, RwLock};

    /// Strategy that records which agents it was asked to recover and fails
    /// for ids in its deny list.
    struct RecordingStrategy {
        heartbeats: Arc<HeartbeatStore>,
        fail_ids: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RecoveryStrategy for RecordingStrategy {
        async fn recover(&self, agent: &AgentDescriptor) -> Result<()> {
            self.calls.lock().await.push(agent.id.clone());
            if self.fail_ids.contains(&agent.id) {
                anyhow::bail!("simulated supervisor failure");
            }
            self.heartbeats
                .record(&agent.id, AgentStatus::Starting, None)
                .await?;
            Ok(())
        }
    }

    fn harness() -> (Arc<AgentRegistry>, Arc<HeartbeatStore>, Arc<HealthEvaluator>) {
        let registry = Arc::new(AgentRegistry::from_entries(vec![
            AgentDescriptor::new("core-a", "Core A", AgentRole::System, true),
            AgentDescriptor::new("core-b", "Core B", AgentRole::System, true),
            AgentDescriptor::new("side-c", "Side C", AgentRole::Service, false),
        ]));
        let heartbeats = Arc::new(HeartbeatStore::new(registry.clone()));
        let hot: SharedHotConfig = Arc::new(RwLock::new(HotConfig::default()));
        let evaluator = Arc::new(HealthEvaluator::new(
            registry.clone(),
            heartbeats.clone(),
            hot,
        ));
        (registry, heartbeats, evaluator)
    }

    #[tokio::test]
    async fn partitions_recovered_and_failed_and_isolates_errors() {
        let (registry, heartbeats, evaluator) = harness();
        // Both critical agents are stale; the non-critical one too.
        let old = Utc::now() - Duration::seconds(900);
        for id in ["core-a", "core-b", "side-c"] {
            heartbeats
                .record_at(id, AgentStatus::Online, None, old)
                .await
                .unwrap();
        }

        let strategy = Arc::new(RecordingStrategy {
            heartbeats: heartbeats.clone(),
            fail_ids: vec!["core-b".to_string()],
            calls: Mutex::new(Vec::new()),
        });
        let controller =
            FallbackController::new(registry, evaluator, strategy.clone());

        let report = controller.run().await;
        assert_eq!(report.recovered, vec!["core-a".to_string()]);
        assert_eq!(report.failed, vec!["core-b".to_string()]);

        let calls = strategy.calls.lock().await;
        assert!(
            !calls.contains(&"side-c".to_string()),
            "non-critical agents must never be targeted"
        );
        assert_eq!(calls.len(), 2, "one attempt per unresponsive critical agent");
    }

    #[tokio::test]
    async fn second_run_after_successful_recovery_is_empty() {
        let (registry, heartbeats, evaluator) = harness();
        let old = Utc::now() - Duration::seconds(900);
        heartbeats
            .record_at("core-a", AgentStatus::Online, None, old)
            .await
            .unwrap();
        heartbeats
            .record("core-b", AgentStatus::Online, None)
            .await
            .unwrap();

        let strategy = Arc::new(RestartSignal::new(heartbeats.clone()));
        let controller = FallbackController::new(registry, evaluator, strategy);

        let first = controller.run().await;
        assert_eq!(first.recovered, vec!["core-a".to_string()]);
        assert!(first.failed.is_empty());

        let second = controller.run().await;
        assert!(second.recovered.is_empty(), "recovered agent must not be re-targeted");
        assert!(second.failed.is_empty());
    }

    #[tokio::test]
    async fn action_without_fresh_heartbeat_counts_as_failed() {
        let (registry, heartbeats, evaluator) = harness();
        let old = Utc::now() - Duration::seconds(900);
        heartbeats
            .record_at("core-a", AgentStatus::Online, None, old)
            .await
            .unwrap();
        heartbeats
            .record("core-b", AgentStatus::Online, None)
            .await
            .unwrap();

        /// Returns Ok but never produces a heartbeat.
        struct SilentStrategy;

        #[async_trait]
        impl RecoveryStrategy for SilentStrategy {
            async fn recover(&self, _agent: &AgentDescriptor) -> Result<()> {
                Ok(())
            }
        }

        let controller = FallbackController::new(registry, evaluator, Arc::new(SilentStrategy));
        let report = controller.run().await;
        assert!(report.recovered.is_empty());
        assert_eq!(report.failed, vec!["core-a".to_string()]);
    }

    #[tokio::test]
    async fn never_reported_critical_agent_is_targeted() {
        let (registry, heartbeats, evaluator) = harness();
        // core-a and core-b never report at all.
        let strategy = Arc::new(RestartSignal::new(heartbeats.clone()));
        let controller = FallbackController::new(registry, evaluator, strategy);

        let report = controller.run().await;
        let mut recovered = report.recovered.clone();
        recovered.sort();
        assert_eq!(recovered, vec!["core-a".to_string(), "core-b".to_string()]);
        assert_eq!(
            heartbeats.get("core-a").await.unwrap().status,
            AgentStatus::Starting
        );
    }
}
