//! Swarmlink Monitor - bounded observability buffers
//!
//! Keeps the last N log entries, a bounded connection history, and per-node
//! job counters. Everything here is read through cheap cloned snapshots; the
//! HTTP monitor endpoints never hold a lock across serialization.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use swarmlink_types::NodeId;

/// Default capacity of the log ring
pub const DEFAULT_LOG_CAPACITY: usize = 500;

/// Default capacity of the connection history
pub const DEFAULT_HISTORY_CAPACITY: usize = 200;

/// Severity of a monitor log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One entry in the bounded log ring
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub source: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

/// Kind of connection history event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionEventKind {
    Connected,
    Disconnected,
}

/// One connection lifecycle event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: ConnectionEventKind,
    pub node_id: NodeId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Completed/failed job tallies for one node
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCounters {
    pub completed: u64,
    pub failed: u64,
}

#[derive(Default)]
struct MonitorState {
    logs: VecDeque<LogEntry>,
    history: VecDeque<ConnectionEvent>,
    counters: HashMap<NodeId, JobCounters>,
}

/// Bounded observability store
pub struct Monitor {
    state: RwLock<MonitorState>,
    log_capacity: usize,
    history_capacity: usize,
}

impl Monitor {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY, DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_capacity(log_capacity: usize, history_capacity: usize) -> Self {
        Self {
            state: RwLock::new(MonitorState::default()),
            log_capacity,
            history_capacity,
        }
    }

    /// Append a log entry, evicting the oldest when full
    pub fn log(
        &self,
        level: LogLevel,
        source: impl Into<String>,
        message: impl Into<String>,
        node_id: Option<NodeId>,
        job_id: Option<String>,
    ) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            source: source.into(),
            message: message.into(),
            node_id,
            job_id,
        };
        let mut state = self.state.write();
        if state.logs.len() >= self.log_capacity {
            state.logs.pop_front();
        }
        state.logs.push_back(entry);
    }

    pub fn info(&self, source: impl Into<String>, message: impl Into<String>) {
        self.log(LogLevel::Info, source, message, None, None);
    }

    pub fn warn(&self, source: impl Into<String>, message: impl Into<String>) {
        self.log(LogLevel::Warn, source, message, None, None);
    }

    /// Record a node connection
    pub fn record_connected(&self, node_id: NodeId) {
        self.push_history(ConnectionEvent {
            timestamp: Utc::now(),
            kind: ConnectionEventKind::Connected,
            node_id,
            reason: None,
        });
    }

    /// Record a node disconnection with an optional reason
    pub fn record_disconnected(&self, node_id: NodeId, reason: Option<String>) {
        self.push_history(ConnectionEvent {
            timestamp: Utc::now(),
            kind: ConnectionEventKind::Disconnected,
            node_id,
            reason,
        });
    }

    fn push_history(&self, event: ConnectionEvent) {
        let mut state = self.state.write();
        if state.history.len() >= self.history_capacity {
            state.history.pop_front();
        }
        state.history.push_back(event);
    }

    /// Tally a completed or failed job against a node
    pub fn record_job_outcome(&self, node_id: &NodeId, success: bool) {
        let mut state = self.state.write();
        let counters = state.counters.entry(node_id.clone()).or_default();
        if success {
            counters.completed += 1;
        } else {
            counters.failed += 1;
        }
    }

    /// Snapshot of the log ring, oldest first
    pub fn logs(&self) -> Vec<LogEntry> {
        self.state.read().logs.iter().cloned().collect()
    }

    /// Snapshot of the connection history, oldest first
    pub fn history(&self) -> Vec<ConnectionEvent> {
        self.state.read().history.iter().cloned().collect()
    }

    /// Snapshot of per-node job counters
    pub fn counters(&self) -> HashMap<NodeId, JobCounters> {
        self.state.read().counters.clone()
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_ring_evicts_oldest_first() {
        let monitor = Monitor::with_capacity(3, 10);
        for i in 0..5 {
            monitor.info("test", format!("entry {i}"));
        }
        let logs = monitor.logs();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].message, "entry 2");
        assert_eq!(logs[2].message, "entry 4");
    }

    #[test]
    fn history_is_bounded() {
        let monitor = Monitor::with_capacity(10, 2);
        monitor.record_connected(NodeId::new("a"));
        monitor.record_connected(NodeId::new("b"));
        monitor.record_disconnected(NodeId::new("a"), Some("closed".to_string()));

        let history = monitor.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].node_id, NodeId::new("b"));
        assert_eq!(history[1].kind, ConnectionEventKind::Disconnected);
    }

    #[test]
    fn counters_accumulate_per_node() {
        let monitor = Monitor::new();
        let node = NodeId::new("n1");
        monitor.record_job_outcome(&node, true);
        monitor.record_job_outcome(&node, true);
        monitor.record_job_outcome(&node, false);

        let counters = monitor.counters();
        assert_eq!(counters[&node].completed, 2);
        assert_eq!(counters[&node].failed, 1);
    }
}
