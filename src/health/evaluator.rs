// SPDX-License-Identifier: MIT
//! Health evaluator — responsiveness checks and the system-wide report.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::config::SharedHotConfig;
use crate::heartbeat::{AgentStatus, HeartbeatRecord, HeartbeatStore};
use crate::registry::{AgentRegistry, AgentRole};

/// Per-agent line of the health report. Heartbeat-derived fields are `None`
/// for agents that never reported.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentHealth {
    pub id: String,
    pub name: String,
    pub role: AgentRole,
    pub critical: bool,
    pub has_heartbeat: bool,
    pub is_responsive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AgentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,
    #[serde(rename = "uptimeSeconds", skip_serializing_if = "Option::is_none")]
    pub uptime_secs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks_completed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_count: Option<u64>,
}

/// Aggregate snapshot over the full catalog. Derived on demand, never stored.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub generated_at: DateTime<Utc>,
    /// `ok` | `degraded` | `critical`.
    pub status: String,
    pub total_agents: usize,
    /// Number of responsive agents. The health score is this over the total.
    pub online_count: usize,
    pub critical_online: usize,
    pub critical_total: usize,
    /// `round(100 * online_count / total_agents)`; `None` for an empty
    /// catalog rather than dividing by zero.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_score: Option<u8>,
    pub agents: Vec<AgentHealth>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == "ok"
    }
}

/// True when the record is fresh enough and not self-reported down.
pub fn is_record_responsive(
    record: &HeartbeatRecord,
    now: DateTime<Utc>,
    staleness_secs: i64,
) -> bool {
    if record.status.is_down() {
        return false;
    }
    (now - record.last_heartbeat).num_seconds() <= staleness_secs
}

/// Judges responsiveness and builds [`HealthReport`]s. The staleness window
/// comes from the hot config, so edits to config.toml apply to the next
/// evaluation without a restart.
pub struct HealthEvaluator {
    registry: Arc<AgentRegistry>,
    heartbeats: Arc<HeartbeatStore>,
    hot: SharedHotConfig,
}

impl HealthEvaluator {
    pub fn new(
        registry: Arc<AgentRegistry>,
        heartbeats: Arc<HeartbeatStore>,
        hot: SharedHotConfig,
    ) -> Self {
        Self {
            registry,
            heartbeats,
            hot,
        }
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    async fn staleness_secs(&self) -> i64 {
        self.hot.read().await.staleness_secs
    }

    /// Whether a single agent currently counts as responsive. Unknown ids
    /// and never-reported agents are not responsive.
    pub async fn is_agent_responsive(&self, agent_id: &str) -> bool {
        self.is_agent_responsive_at(agent_id, Utc::now()).await
    }

    /// [`is_agent_responsive`](Self::is_agent_responsive) against an explicit
    /// clock, so staleness is testable without sleeping.
    pub async fn is_agent_responsive_at(&self, agent_id: &str, now: DateTime<Utc>) -> bool {
        if !self.registry.contains(agent_id) {
            return false;
        }
        let window = self.staleness_secs().await;
        match self.heartbeats.get(agent_id).await {
            Some(record) => is_record_responsive(&record, now, window),
            None => false,
        }
    }

    /// Build the system-wide report over the full catalog.
    pub async fn system_health_check(&self) -> HealthReport {
        self.system_health_check_at(Utc::now()).await
    }

    pub async fn system_health_check_at(&self, now: DateTime<Utc>) -> HealthReport {
        let window = self.staleness_secs().await;
        let records = self.heartbeats.snapshot().await;

        let mut agents: Vec<AgentHealth> = Vec::with_capacity(self.registry.len());
        for desc in self.registry.iter() {
            let record = records.get(&desc.id);
            let responsive = record
                .map(|r| is_record_responsive(r, now, window))
                .unwrap_or(false);
            agents.push(AgentHealth {
                id: desc.id.clone(),
                name: desc.name.clone(),
                role: desc.role,
                critical: desc.critical,
                has_heartbeat: record.is_some(),
                is_responsive: responsive,
                status: record.map(|r| r.status),
                last_heartbeat: record.map(|r| r.last_heartbeat),
                uptime_secs: record.map(|r| r.uptime_secs),
                tasks_completed: record.map(|r| r.tasks_completed),
                error_count: record.map(|r| r.error_count),
            });
        }
        // Stable output order for reports and API consumers.
        agents.sort_by(|a, b| a.id.cmp(&b.id));

        let total = agents.len();
        let online = agents.iter().filter(|a| a.is_responsive).count();
        let critical_total = agents.iter().filter(|a| a.critical).count();
        let critical_online = agents
            .iter()
            .filter(|a| a.critical && a.is_responsive)
            .count();
        let health_score = if total == 0 {
            None
        } else {
            Some(((online as f64 / total as f64) * 100.0).round() as u8)
        };
        let status = if critical_online < critical_total {
            "critical"
        } else if online < total {
            "degraded"
        } else {
            "ok"
        };

        HealthReport {
            generated_at: now,
            status: status.to_string(),
            total_agents: total,
            online_count: online,
            critical_online,
            critical_total,
            health_score,
            agents,
        }
    }
}

/// Thread-safe shared evaluator.
pub type SharedHealthEvaluator = Arc<HealthEvaluator>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HotConfig;
    use crate::registry::AgentDescriptor;
    use chrono::Duration;
    use tokio::sync::RwLock;

    fn make_evaluator(descriptors: Vec<AgentDescriptor>) -> (HealthEvaluator, Arc<HeartbeatStore>) {
        let registry = Arc::new(AgentRegistry::from_entries(descriptors));
        let heartbeats = Arc::new(HeartbeatStore::new(registry.clone()));
        let hot: SharedHotConfig = Arc::new(RwLock::new(HotConfig::default()));
        (
            HealthEvaluator::new(registry, heartbeats.clone(), hot),
            heartbeats,
        )
    }

    fn five_agents() -> Vec<AgentDescriptor> {
        vec![
            AgentDescriptor::new("a1", "A1", AgentRole::System, true),
            AgentDescriptor::new("a2", "A2", AgentRole::System, true),
            AgentDescriptor::new("a3", "A3", AgentRole::Service, false),
            AgentDescriptor::new("a4", "A4", AgentRole::Service, false),
            AgentDescriptor::new("a5", "A5", AgentRole::Service, false),
        ]
    }

    #[test]
    fn record_responsiveness_rules() {
        let now = Utc::now();
        let record = HeartbeatRecord {
            agent_id: "a".into(),
            status: AgentStatus::Online,
            last_heartbeat: now,
            first_seen: now,
            uptime_secs: 0,
            tasks_completed: 0,
            error_count: 0,
            version: None,
            last_error: None,
        };
        assert!(is_record_responsive(&record, now, 120));

        let stale = HeartbeatRecord {
            last_heartbeat: now - Duration::seconds(121),
            ..record.clone()
        };
        assert!(!is_record_responsive(&stale, now, 120));

        let offline = HeartbeatRecord {
            status: AgentStatus::Offline,
            ..record.clone()
        };
        assert!(!is_record_responsive(&offline, now, 120));

        let errored = HeartbeatRecord {
            status: AgentStatus::Error,
            ..record.clone()
        };
        assert!(!is_record_responsive(&errored, now, 120));

        // Degraded and starting are still responsive while fresh.
        let degraded = HeartbeatRecord {
            status: AgentStatus::Degraded,
            ..record
        };
        assert!(is_record_responsive(&degraded, now, 120));
    }

    #[tokio::test]
    async fn four_of_five_responsive_scores_eighty() {
        let (evaluator, heartbeats) = make_evaluator(five_agents());
        for id in ["a1", "a2", "a3", "a4"] {
            heartbeats.record(id, AgentStatus::Online, None).await.unwrap();
        }
        // a5 never reports.
        let report = evaluator.system_health_check().await;
        assert_eq!(report.total_agents, 5);
        assert_eq!(report.online_count, 4);
        assert_eq!(report.health_score, Some(80));
        assert_eq!(report.status, "degraded");
    }

    #[tokio::test]
    async fn never_reported_agent_has_no_heartbeat_and_is_unresponsive() {
        let (evaluator, heartbeats) = make_evaluator(five_agents());
        heartbeats.record("a1", AgentStatus::Online, None).await.unwrap();

        let report = evaluator.system_health_check().await;
        let silent = report.agents.iter().find(|a| a.id == "a5").unwrap();
        assert!(!silent.has_heartbeat);
        assert!(!silent.is_responsive);
        assert!(silent.status.is_none());
        assert!(silent.last_heartbeat.is_none());

        assert!(!evaluator.is_agent_responsive("a5").await);
        assert!(evaluator.is_agent_responsive("a1").await);
    }

    #[tokio::test]
    async fn stale_heartbeat_is_unresponsive() {
        let (evaluator, heartbeats) = make_evaluator(five_agents());
        let now = Utc::now();
        heartbeats
            .record_at("a1", AgentStatus::Online, None, now - Duration::seconds(600))
            .await
            .unwrap();

        assert!(!evaluator.is_agent_responsive_at("a1", now).await);
        let report = evaluator.system_health_check_at(now).await;
        let a1 = report.agents.iter().find(|a| a.id == "a1").unwrap();
        assert!(a1.has_heartbeat, "stale is not the same as never reported");
        assert!(!a1.is_responsive);
    }

    #[tokio::test]
    async fn empty_catalog_yields_no_score() {
        let (evaluator, _) = make_evaluator(vec![]);
        let report = evaluator.system_health_check().await;
        assert_eq!(report.total_agents, 0);
        assert_eq!(report.health_score, None);
        assert_eq!(report.status, "ok");
    }

    #[tokio::test]
    async fn unresponsive_critical_agent_makes_status_critical() {
        let (evaluator, heartbeats) = make_evaluator(five_agents());
        for id in ["a2", "a3", "a4", "a5"] {
            heartbeats.record(id, AgentStatus::Online, None).await.unwrap();
        }
        heartbeats.record("a1", AgentStatus::Error, None).await.unwrap();

        let report = evaluator.system_health_check().await;
        assert_eq!(report.status, "critical");
        assert_eq!(report.critical_total, 2);
        assert_eq!(report.critical_online, 1);
    }
}
