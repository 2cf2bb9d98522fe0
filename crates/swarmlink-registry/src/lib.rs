//! Swarmlink Registry - live state of every authenticated worker
//!
//! The connection supervisor creates entries on successful AUTH and removes
//! them on disconnect; everything else reads or mutates under the registry
//! lock. Each live node id has exactly one outbound channel; re-registering
//! an id evicts the previous holder.
//!
//! Dispatchers never hold channel handles. They pass node ids and the
//! registry resolves `node id -> channel` at send time, so a closed channel
//! is simply a failed send rather than a dangling reference.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use swarmlink_protocol::Frame;
use swarmlink_types::{NodeId, NodeMetrics, NodeRecord, NodeStatus};

/// Heartbeats older than this mark the node STALE
pub const STALE_AFTER: Duration = Duration::from_secs(30);

/// Time a node may stay STALE before it is evicted
pub const EVICT_AFTER_STALE: Duration = Duration::from_secs(15);

/// Message handed to a connection's writer task
#[derive(Debug)]
pub enum Outbound {
    /// Deliver a frame to the peer
    Frame(Frame),
    /// Send a final ERROR frame (if any) and close the socket
    Close { reason: String },
}

/// Outbound channel for one worker connection
pub type NodeSender = mpsc::UnboundedSender<Outbound>;

/// Parameters supplied at registration
#[derive(Debug, Clone)]
pub struct Registration {
    pub capabilities: Vec<String>,
    pub agent_types: Vec<String>,
    pub wallet: Option<String>,
    pub version: String,
}

struct NodeEntry {
    record: NodeRecord,
    sender: NodeSender,
    /// Monotonic clock of the last heartbeat, used by the sweeper
    last_seen: Instant,
}

/// Summary counts for the status endpoint
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySummary {
    pub total: usize,
    pub online: usize,
    pub stale: usize,
    pub idle: usize,
}

/// Result of one staleness sweep
#[derive(Debug, Default)]
pub struct SweepOutcome {
    pub marked_stale: Vec<NodeId>,
    pub evicted: Vec<NodeId>,
}

/// Live worker registry
pub struct NodeRegistry {
    nodes: RwLock<HashMap<NodeId, NodeEntry>>,
    stale_after: Duration,
    evict_after_stale: Duration,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::with_timeouts(STALE_AFTER, EVICT_AFTER_STALE)
    }

    pub fn with_timeouts(stale_after: Duration, evict_after_stale: Duration) -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            stale_after,
            evict_after_stale,
        }
    }

    /// Register a node, evicting any previous holder of the same id.
    ///
    /// The evicted connection receives a close with reason `REPLACED`.
    pub async fn register(&self, node_id: NodeId, sender: NodeSender, reg: Registration) {
        let now = Utc::now();
        let record = NodeRecord {
            node_id: node_id.clone(),
            capabilities: reg.capabilities.into_iter().collect(),
            agent_types: reg.agent_types.into_iter().collect(),
            wallet: reg.wallet,
            version: reg.version,
            status: NodeStatus::Online,
            connected_at: now,
            last_heartbeat: now,
            metrics: NodeMetrics::default(),
        };

        let entry = NodeEntry {
            record,
            sender,
            last_seen: Instant::now(),
        };

        let mut nodes = self.nodes.write().await;
        if let Some(previous) = nodes.insert(node_id.clone(), entry) {
            warn!(node_id = %node_id, "node re-registered, evicting previous channel");
            let _ = previous.sender.send(Outbound::Close {
                reason: "REPLACED".to_string(),
            });
        } else {
            debug!(node_id = %node_id, "node registered");
        }
    }

    /// Apply a heartbeat. Returns `false` for unknown ids.
    pub async fn update_heartbeat(&self, node_id: &NodeId, metrics: NodeMetrics) -> bool {
        let mut nodes = self.nodes.write().await;
        match nodes.get_mut(node_id) {
            Some(entry) => {
                entry.record.last_heartbeat = Utc::now();
                entry.record.status = NodeStatus::Online;
                entry.record.metrics = metrics;
                entry.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Remove a node, returning its record if it was present
    pub async fn unregister(&self, node_id: &NodeId) -> Option<NodeRecord> {
        let mut nodes = self.nodes.write().await;
        nodes.remove(node_id).map(|e| e.record)
    }

    /// Remove a node only if it is still backed by `sender`.
    ///
    /// A connection that was evicted by re-registration must not tear down
    /// the entry now owned by its replacement, so teardown compares channel
    /// identity before removing.
    pub async fn unregister_channel(
        &self,
        node_id: &NodeId,
        sender: &NodeSender,
    ) -> Option<NodeRecord> {
        let mut nodes = self.nodes.write().await;
        match nodes.get(node_id) {
            Some(entry) if entry.sender.same_channel(sender) => {
                nodes.remove(node_id).map(|e| e.record)
            }
            _ => None,
        }
    }

    /// Whether the id is currently registered
    pub async fn contains(&self, node_id: &NodeId) -> bool {
        self.nodes.read().await.contains_key(node_id)
    }

    /// Snapshot of one node's record
    pub async fn get(&self, node_id: &NodeId) -> Option<NodeRecord> {
        self.nodes.read().await.get(node_id).map(|e| e.record.clone())
    }

    /// Resolve a node's outbound channel and send a frame.
    ///
    /// Returns `false` when the node is unknown or its channel has closed.
    pub async fn send_to(&self, node_id: &NodeId, frame: Frame) -> bool {
        let nodes = self.nodes.read().await;
        match nodes.get(node_id) {
            Some(entry) => entry.sender.send(Outbound::Frame(frame)).is_ok(),
            None => {
                warn!(node_id = %node_id, "send to unknown node dropped");
                false
            }
        }
    }

    /// All nodes currently ONLINE
    pub async fn online_nodes(&self) -> Vec<NodeRecord> {
        self.nodes
            .read()
            .await
            .values()
            .filter(|e| e.record.status == NodeStatus::Online)
            .map(|e| e.record.clone())
            .collect()
    }

    /// ONLINE nodes with no active jobs
    pub async fn idle_nodes(&self) -> Vec<NodeRecord> {
        self.nodes
            .read()
            .await
            .values()
            .filter(|e| e.record.is_idle())
            .map(|e| e.record.clone())
            .collect()
    }

    /// ONLINE nodes advertising the given capability
    pub async fn nodes_with_capability(&self, capability: &str) -> Vec<NodeRecord> {
        self.nodes
            .read()
            .await
            .values()
            .filter(|e| {
                e.record.status == NodeStatus::Online
                    && e.record.capabilities.contains(capability)
            })
            .map(|e| e.record.clone())
            .collect()
    }

    /// First idle node willing to run the given agent type
    pub async fn idle_node_for_agent(&self, agent_id: &str) -> Option<NodeRecord> {
        self.nodes
            .read()
            .await
            .values()
            .find(|e| e.record.is_idle() && e.record.accepts_agent(agent_id))
            .map(|e| e.record.clone())
    }

    /// Snapshot of every record, for the monitor endpoints
    pub async fn all_nodes(&self) -> Vec<NodeRecord> {
        self.nodes.read().await.values().map(|e| e.record.clone()).collect()
    }

    /// Summary counts for the status endpoint
    pub async fn summary(&self) -> RegistrySummary {
        let nodes = self.nodes.read().await;
        let mut summary = RegistrySummary {
            total: nodes.len(),
            ..Default::default()
        };
        for entry in nodes.values() {
            match entry.record.status {
                NodeStatus::Online => summary.online += 1,
                NodeStatus::Stale => summary.stale += 1,
                NodeStatus::Offline => {}
            }
            if entry.record.is_idle() {
                summary.idle += 1;
            }
        }
        summary
    }

    /// One staleness pass: mark quiet nodes STALE, evict long-stale ones.
    ///
    /// Evicted channels receive a close with reason `HEARTBEAT_TIMEOUT`.
    /// The caller runs this on an interval (5s in production).
    pub async fn sweep(&self) -> SweepOutcome {
        let now = Instant::now();
        let mut outcome = SweepOutcome::default();
        let mut nodes = self.nodes.write().await;

        let evict_after = self.stale_after + self.evict_after_stale;
        let mut to_evict = Vec::new();

        for (node_id, entry) in nodes.iter_mut() {
            let quiet_for = now.duration_since(entry.last_seen);
            if quiet_for > evict_after {
                to_evict.push(node_id.clone());
            } else if quiet_for > self.stale_after && entry.record.status == NodeStatus::Online {
                entry.record.status = NodeStatus::Stale;
                outcome.marked_stale.push(node_id.clone());
            }
        }

        for node_id in to_evict {
            if let Some(entry) = nodes.remove(&node_id) {
                warn!(node_id = %node_id, "evicting stale node");
                let _ = entry.sender.send(Outbound::Close {
                    reason: "HEARTBEAT_TIMEOUT".to_string(),
                });
                outcome.evicted.push(node_id);
            }
        }

        outcome
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarmlink_protocol::FramePayload;

    fn registration(caps: &[&str]) -> Registration {
        Registration {
            capabilities: caps.iter().map(|s| s.to_string()).collect(),
            agent_types: vec![],
            wallet: None,
            version: "1.0".to_string(),
        }
    }

    fn channel() -> (NodeSender, mpsc::UnboundedReceiver<Outbound>) {
        mpsc::unbounded_channel()
    }

    #[tokio::test]
    async fn register_sets_online_with_zero_metrics() {
        let registry = NodeRegistry::new();
        let (tx, _rx) = channel();
        registry
            .register(NodeId::new("n1"), tx, registration(&["docker"]))
            .await;

        let record = registry.get(&NodeId::new("n1")).await.unwrap();
        assert_eq!(record.status, NodeStatus::Online);
        assert_eq!(record.metrics.active_jobs, 0);
        assert!(record.capabilities.contains("docker"));
    }

    #[tokio::test]
    async fn reregistration_evicts_previous_channel() {
        let registry = NodeRegistry::new();
        let (tx1, mut rx1) = channel();
        let (tx2, _rx2) = channel();

        registry
            .register(NodeId::new("n1"), tx1, registration(&[]))
            .await;
        registry
            .register(NodeId::new("n1"), tx2, registration(&[]))
            .await;

        match rx1.recv().await {
            Some(Outbound::Close { reason }) => assert_eq!(reason, "REPLACED"),
            other => panic!("expected close, got {other:?}"),
        }
        assert_eq!(registry.all_nodes().await.len(), 1);
    }

    #[tokio::test]
    async fn channel_guarded_unregister_spares_the_replacement() {
        let registry = NodeRegistry::new();
        let (tx1, _rx1) = channel();
        let (tx2, _rx2) = channel();

        registry
            .register(NodeId::new("n1"), tx1.clone(), registration(&[]))
            .await;
        registry
            .register(NodeId::new("n1"), tx2.clone(), registration(&[]))
            .await;

        // The evicted connection's teardown must be a no-op
        assert!(registry
            .unregister_channel(&NodeId::new("n1"), &tx1)
            .await
            .is_none());
        assert!(registry.contains(&NodeId::new("n1")).await);

        // The current connection's teardown removes the entry
        assert!(registry
            .unregister_channel(&NodeId::new("n1"), &tx2)
            .await
            .is_some());
        assert!(!registry.contains(&NodeId::new("n1")).await);
    }

    #[tokio::test]
    async fn heartbeat_on_unknown_node_fails_silently() {
        let registry = NodeRegistry::new();
        assert!(
            !registry
                .update_heartbeat(&NodeId::new("ghost"), NodeMetrics::default())
                .await
        );
    }

    #[tokio::test]
    async fn idle_queries_track_active_jobs() {
        let registry = NodeRegistry::new();
        let (tx, _rx) = channel();
        registry
            .register(NodeId::new("n1"), tx, registration(&[]))
            .await;

        assert_eq!(registry.idle_nodes().await.len(), 1);

        registry
            .update_heartbeat(
                &NodeId::new("n1"),
                NodeMetrics {
                    cpu_percent: 50.0,
                    memory_percent: 20.0,
                    active_jobs: 2,
                },
            )
            .await;
        assert!(registry.idle_nodes().await.is_empty());
        assert_eq!(registry.online_nodes().await.len(), 1);
    }

    #[tokio::test]
    async fn capability_query_filters_online_only() {
        let registry = NodeRegistry::new();
        let (tx, _rx) = channel();
        registry
            .register(NodeId::new("n1"), tx, registration(&["tool:webSearch"]))
            .await;

        assert_eq!(registry.nodes_with_capability("tool:webSearch").await.len(), 1);
        assert!(registry.nodes_with_capability("tool:other").await.is_empty());
    }

    #[tokio::test]
    async fn send_resolves_channel_at_send_time() {
        let registry = NodeRegistry::new();
        let (tx, mut rx) = channel();
        registry
            .register(NodeId::new("n1"), tx, registration(&[]))
            .await;

        assert!(
            registry
                .send_to(&NodeId::new("n1"), Frame::new(FramePayload::HeartbeatAck { received: true }))
                .await
        );
        assert!(matches!(rx.recv().await, Some(Outbound::Frame(_))));

        // Unknown node: dropped, not an error
        assert!(
            !registry
                .send_to(&NodeId::new("ghost"), Frame::new(FramePayload::HeartbeatAck { received: true }))
                .await
        );
    }

    #[tokio::test]
    async fn sweep_marks_stale_then_evicts() {
        // Tight windows so the test runs in milliseconds
        let registry =
            NodeRegistry::with_timeouts(Duration::from_millis(20), Duration::from_millis(20));
        let (tx, mut rx) = channel();
        registry
            .register(NodeId::new("n1"), tx, registration(&[]))
            .await;

        tokio::time::sleep(Duration::from_millis(25)).await;
        let outcome = registry.sweep().await;
        assert_eq!(outcome.marked_stale, vec![NodeId::new("n1")]);
        assert!(outcome.evicted.is_empty());
        assert_eq!(
            registry.get(&NodeId::new("n1")).await.unwrap().status,
            NodeStatus::Stale
        );

        tokio::time::sleep(Duration::from_millis(25)).await;
        let outcome = registry.sweep().await;
        assert_eq!(outcome.evicted, vec![NodeId::new("n1")]);
        assert!(registry.get(&NodeId::new("n1")).await.is_none());
        match rx.recv().await {
            Some(Outbound::Close { reason }) => assert_eq!(reason, "HEARTBEAT_TIMEOUT"),
            other => panic!("expected close, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn heartbeat_recovers_stale_node() {
        let registry =
            NodeRegistry::with_timeouts(Duration::from_millis(20), Duration::from_secs(60));
        let (tx, _rx) = channel();
        registry
            .register(NodeId::new("n1"), tx, registration(&[]))
            .await;

        tokio::time::sleep(Duration::from_millis(25)).await;
        registry.sweep().await;
        assert_eq!(
            registry.get(&NodeId::new("n1")).await.unwrap().status,
            NodeStatus::Stale
        );

        registry
            .update_heartbeat(&NodeId::new("n1"), NodeMetrics::default())
            .await;
        assert_eq!(
            registry.get(&NodeId::new("n1")).await.unwrap().status,
            NodeStatus::Online
        );
    }
}
