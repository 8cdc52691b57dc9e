//! Heartbeat store — per-agent liveness records pushed by the agents themselves.
//!
//! One record per registered agent, newest write wins. Records live for the
//! duration of the process only: a daemon restart deliberately starts every
//! agent from "never reported". Staleness is judged by the health evaluator;
//! records are never deleted here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::registry::AgentRegistry;

/// Self-reported lifecycle state carried by a heartbeat.
///
/// Closed set — unknown wire values fail deserialization at the ingestion
/// boundary instead of being stored as free-form strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Online,
    Offline,
    Degraded,
    Starting,
    Error,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Degraded => "degraded",
            Self::Starting => "starting",
            Self::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "online" => Some(Self::Online),
            "offline" => Some(Self::Offline),
            "degraded" => Some(Self::Degraded),
            "starting" => Some(Self::Starting),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Whether this status alone rules an agent out of being responsive,
    /// regardless of how fresh the heartbeat is.
    pub fn is_down(&self) -> bool {
        matches!(self, Self::Offline | Self::Error)
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Optional counters an agent may attach to a heartbeat. All fields are the
/// agent's own running totals, not deltas.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatMetrics {
    pub tasks_completed: Option<u64>,
    pub error_count: Option<u64>,
    pub version: Option<String>,
    pub last_error: Option<String>,
}

/// The stored state for one agent, replaced wholesale on every heartbeat.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRecord {
    pub agent_id: String,
    pub status: AgentStatus,
    pub last_heartbeat: DateTime<Utc>,
    pub first_seen: DateTime<Utc>,
    /// Seconds since the first heartbeat in this process lifetime.
    #[serde(rename = "uptimeSeconds")]
    pub uptime_secs: i64,
    pub tasks_completed: u64,
    pub error_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Errors surfaced to the ingestion boundary.
#[derive(Debug, Error)]
pub enum HeartbeatError {
    #[error("agent not found: {0}")]
    UnknownAgent(String),
}

/// In-memory heartbeat store. Writes are rejected for ids outside the
/// registry, so a record always corresponds to a cataloged agent.
pub struct HeartbeatStore {
    registry: Arc<AgentRegistry>,
    records: RwLock<HashMap<String, HeartbeatRecord>>,
}

impl HeartbeatStore {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self {
            registry,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Record a heartbeat for a registered agent, stamped with the current
    /// time. Metric fields present in `metrics` replace the stored values;
    /// absent fields keep whatever the previous heartbeat carried.
    pub async fn record(
        &self,
        agent_id: &str,
        status: AgentStatus,
        metrics: Option<HeartbeatMetrics>,
    ) -> Result<HeartbeatRecord, HeartbeatError> {
        self.record_at(agent_id, status, metrics, Utc::now()).await
    }

    /// `record` with an explicit timestamp, for callers that already hold a
    /// cycle timestamp and for tests that steer the clock.
    pub async fn record_at(
        &self,
        agent_id: &str,
        status: AgentStatus,
        metrics: Option<HeartbeatMetrics>,
        now: DateTime<Utc>,
    ) -> Result<HeartbeatRecord, HeartbeatError> {
        if !self.registry.contains(agent_id) {
            return Err(HeartbeatError::UnknownAgent(agent_id.to_string()));
        }
        let metrics = metrics.unwrap_or_default();
        let mut records = self.records.write().await;
        let record = match records.get_mut(agent_id) {
            Some(r) => {
                r.status = status;
                r.last_heartbeat = now;
                r.uptime_secs = (now - r.first_seen).num_seconds().max(0);
                if let Some(tasks) = metrics.tasks_completed {
                    r.tasks_completed = tasks;
                }
                if let Some(errors) = metrics.error_count {
                    r.error_count = errors;
                }
                if let Some(version) = metrics.version {
                    r.version = Some(version);
                }
                if let Some(last_error) = metrics.last_error {
                    r.last_error = Some(last_error);
                }
                r.clone()
            }
            None => {
                let record = HeartbeatRecord {
                    agent_id: agent_id.to_string(),
                    status,
                    last_heartbeat: now,
                    first_seen: now,
                    uptime_secs: 0,
                    tasks_completed: metrics.tasks_completed.unwrap_or(0),
                    error_count: metrics.error_count.unwrap_or(0),
                    version: metrics.version,
                    last_error: metrics.last_error,
                };
                records.insert(agent_id.to_string(), record.clone());
                record
            }
        };
        Ok(record)
    }

    /// Fetch a single record by agent id.
    pub async fn get(&self, agent_id: &str) -> Option<HeartbeatRecord> {
        self.records.read().await.get(agent_id).cloned()
    }

    /// Owned copy of every record — a snapshot, not a live view.
    pub async fn snapshot(&self) -> HashMap<String, HeartbeatRecord> {
        self.records.read().await.clone()
    }

    /// Number of agents that have reported at least once.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

/// Thread-safe shared store.
pub type SharedHeartbeatStore = Arc<HeartbeatStore>;
