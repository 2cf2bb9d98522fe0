//! Worker node domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::identity::NodeId;

/// Liveness status of a registered node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    Online,
    Offline,
    Stale,
}

/// Worker-declared status carried in heartbeats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerStatus {
    Idle,
    Busy,
    Draining,
}

/// Live resource metrics reported by a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetrics {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub active_jobs: u32,
}

/// Static machine facts reported once at authentication
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpecs {
    pub os: String,
    pub arch: String,
    pub cpu_cores: u32,
    #[serde(rename = "totalMemoryGB")]
    pub total_memory_gb: f64,
    pub runtime_version: String,
}

/// Registry entry for one authenticated worker.
///
/// Created by the connection supervisor on successful AUTH, mutated by the
/// registry under its lock, removed on disconnect.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub node_id: NodeId,
    pub capabilities: HashSet<String>,
    pub agent_types: HashSet<String>,
    pub wallet: Option<String>,
    pub version: String,
    pub status: NodeStatus,
    pub connected_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub metrics: NodeMetrics,
}

impl NodeRecord {
    /// Whether this node is online and not currently running anything
    pub fn is_idle(&self) -> bool {
        self.status == NodeStatus::Online && self.metrics.active_jobs == 0
    }

    /// Whether this node advertises every capability in `required`
    pub fn has_capabilities(&self, required: &HashSet<String>) -> bool {
        required.is_subset(&self.capabilities)
    }

    /// Whether this node may execute the given agent type.
    ///
    /// An empty `agent_types` set means the node accepts any agent.
    pub fn accepts_agent(&self, agent_id: &str) -> bool {
        self.agent_types.is_empty() || self.agent_types.contains(agent_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> NodeRecord {
        NodeRecord {
            node_id: NodeId::new("node-1"),
            capabilities: ["python-3.11".to_string(), "tool:webSearch".to_string()]
                .into_iter()
                .collect(),
            agent_types: HashSet::new(),
            wallet: None,
            version: "1.0".to_string(),
            status: NodeStatus::Online,
            connected_at: Utc::now(),
            last_heartbeat: Utc::now(),
            metrics: NodeMetrics::default(),
        }
    }

    #[test]
    fn idle_requires_online_and_no_jobs() {
        let mut r = record();
        assert!(r.is_idle());

        r.metrics.active_jobs = 1;
        assert!(!r.is_idle());

        r.metrics.active_jobs = 0;
        r.status = NodeStatus::Stale;
        assert!(!r.is_idle());
    }

    #[test]
    fn capability_subset_check() {
        let r = record();
        let required: HashSet<String> = ["python-3.11".to_string()].into_iter().collect();
        assert!(r.has_capabilities(&required));

        let missing: HashSet<String> = ["docker".to_string()].into_iter().collect();
        assert!(!r.has_capabilities(&missing));

        assert!(r.has_capabilities(&HashSet::new()));
    }

    #[test]
    fn empty_agent_types_accepts_all() {
        let mut r = record();
        assert!(r.accepts_agent("travel-planner"));

        r.agent_types.insert("budget-planner".to_string());
        assert!(!r.accepts_agent("travel-planner"));
        assert!(r.accepts_agent("budget-planner"));
    }
}
