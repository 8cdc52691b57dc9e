//! Agent registry — the static catalog of agents the warden is responsible for.
//!
//! The catalog is fixed at process start: the built-in set, optionally
//! overlaid with `[[agents]]` entries from config.toml. Nothing mutates it
//! afterwards; liveness state lives in the heartbeat store, not here.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Broad category an agent belongs to. Recovery strategies and reporting
/// are parameterized on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    /// Core coordination agents (orchestrator, scheduler). Usually critical.
    System,
    /// Line-of-business agents (marketing, support, billing).
    Service,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Service => "service",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Self::System),
            "service" => Some(Self::Service),
            _ => None,
        }
    }
}

/// One entry in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub id: String,
    pub name: String,
    pub role: AgentRole,
    /// Critical agents are eligible for fallback recovery; the others are
    /// only reported on.
    #[serde(default)]
    pub critical: bool,
}

impl AgentDescriptor {
    pub fn new(id: &str, name: &str, role: AgentRole, critical: bool) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            role,
            critical,
        }
    }
}

/// Immutable catalog of known agents, keyed by id.
pub struct AgentRegistry {
    agents: HashMap<String, AgentDescriptor>,
}

impl AgentRegistry {
    /// Build a registry from explicit entries. Later duplicates of an id
    /// replace earlier ones.
    pub fn from_entries(entries: Vec<AgentDescriptor>) -> Self {
        let mut agents = HashMap::with_capacity(entries.len());
        for entry in entries {
            agents.insert(entry.id.clone(), entry);
        }
        Self { agents }
    }

    /// The default catalog used when config.toml defines no `[[agents]]`
    /// entries.
    pub fn builtin() -> Self {
        Self::from_entries(vec![
            AgentDescriptor::new(
                "master-orchestrator",
                "Master Orchestrator",
                AgentRole::System,
                true,
            ),
            AgentDescriptor::new("scheduling-agent", "Scheduling Agent", AgentRole::System, true),
            AgentDescriptor::new("billing-agent", "Billing Agent", AgentRole::Service, true),
            AgentDescriptor::new("marketing-agent", "Marketing Agent", AgentRole::Service, false),
            AgentDescriptor::new("support-agent", "Support Agent", AgentRole::Service, false),
        ])
    }

    /// Get a descriptor by agent id.
    pub fn get(&self, agent_id: &str) -> Option<&AgentDescriptor> {
        self.agents.get(agent_id)
    }

    /// Whether an agent id is in the catalog.
    pub fn contains(&self, agent_id: &str) -> bool {
        self.agents.contains_key(agent_id)
    }

    /// Iterate over all descriptors (unordered).
    pub fn iter(&self) -> impl Iterator<Item = &AgentDescriptor> {
        self.agents.values()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Count of agents flagged critical.
    pub fn critical_count(&self) -> usize {
        self.agents.values().filter(|a| a.critical).count()
    }
}

/// Thread-safe shared catalog.
pub type SharedAgentRegistry = Arc<AgentRegistry>;
