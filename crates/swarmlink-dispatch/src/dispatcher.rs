//! Correlated job dispatch
//!
//! Every dispatch registers a pending entry keyed by run id holding a
//! oneshot completion. Whichever of {result arrival, deadline expiry}
//! removes the entry first publishes the outcome; the loser is a no-op.
//! Late JOB_RESULTs for unknown run ids are logged and discarded.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use swarmlink_agents::AgentStore;
use swarmlink_protocol::{Frame, FramePayload, ResultStatus};
use swarmlink_registry::NodeRegistry;
use swarmlink_types::{
    JobErrorDetail, JobId, JobRecord, JobRunMetrics, NodeId, Result, RunId, SwarmlinkError,
};

/// Default deadline for worker-side agent jobs
pub const AGENT_JOB_TIMEOUT: Duration = Duration::from_secs(60);

/// Payload published to a dispatch waiter
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub status: ResultStatus,
    pub output: Option<serde_json::Value>,
    pub logs: Vec<String>,
    pub error: Option<JobErrorDetail>,
    pub metrics: JobRunMetrics,
    pub memory: Option<serde_json::Value>,
}

/// Result returned to dispatch callers (and serialized by /api/run)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    pub success: bool,
    pub job_id: JobId,
    pub run_id: RunId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    pub logs: Vec<String>,
    pub metrics: JobRunMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DispatchResult {
    fn from_outcome(job: &JobRecord, outcome: JobOutcome) -> Self {
        Self {
            success: outcome.status == ResultStatus::Success,
            job_id: job.job_id,
            run_id: job.run_id,
            output: outcome.output,
            logs: outcome.logs,
            metrics: outcome.metrics,
            error: outcome.error.map(|e| e.message),
        }
    }
}

/// Outcome of a worker-side agent job
#[derive(Debug, Clone)]
pub struct AgentJobOutcome {
    pub success: bool,
    pub response: String,
    pub tools_used: Vec<String>,
    pub error: Option<String>,
}

struct PendingRun {
    tx: oneshot::Sender<JobOutcome>,
    agent_id: Option<String>,
}

/// The correlated dispatcher
pub struct Dispatcher {
    registry: Arc<NodeRegistry>,
    agents: Arc<AgentStore>,
    pending: Mutex<HashMap<RunId, PendingRun>>,
    pending_agent_jobs: Mutex<HashMap<JobId, oneshot::Sender<AgentJobOutcome>>>,
    agent_job_timeout: Duration,
}

impl Dispatcher {
    pub fn new(registry: Arc<NodeRegistry>, agents: Arc<AgentStore>) -> Self {
        Self {
            registry,
            agents,
            pending: Mutex::new(HashMap::new()),
            pending_agent_jobs: Mutex::new(HashMap::new()),
            agent_job_timeout: AGENT_JOB_TIMEOUT,
        }
    }

    #[cfg(test)]
    pub fn with_agent_job_timeout(mut self, timeout: Duration) -> Self {
        self.agent_job_timeout = timeout;
        self
    }

    /// Whether an idle node explicitly advertises this agent type.
    ///
    /// Empty `agent_types` (accept-anything sandbox workers) does not
    /// count: full agent turns go only to nodes that opted into the agent.
    pub async fn has_dedicated_agent_node(&self, agent_id: &str) -> bool {
        self.registry
            .idle_nodes()
            .await
            .iter()
            .any(|n| n.agent_types.contains(agent_id))
    }

    /// Pick a target node: prefer one that accepts the agent, else any idle
    pub async fn pick_idle_node(&self, agent_id: Option<&str>) -> Option<NodeId> {
        if let Some(agent_id) = agent_id {
            if let Some(node) = self.registry.idle_node_for_agent(agent_id).await {
                return Some(node.node_id);
            }
        }
        self.registry
            .idle_nodes()
            .await
            .into_iter()
            .next()
            .map(|n| n.node_id)
    }

    /// Dispatch a fresh job built from `input`
    pub async fn dispatch(
        &self,
        input: serde_json::Value,
        agent_id: Option<String>,
        timeout_ms: Option<u64>,
    ) -> Result<DispatchResult> {
        let node_id = self
            .pick_idle_node(agent_id.as_deref())
            .await
            .ok_or(SwarmlinkError::NoIdleNode)?;

        let mut job = JobRecord::new(input, agent_id);
        if let Some(timeout_ms) = timeout_ms {
            job.timeout_ms = timeout_ms;
        }
        self.dispatch_job(&job, &node_id).await
    }

    /// Dispatch a worker-bound tool call to an idle node advertising
    /// capability `tool:<name>`
    pub async fn dispatch_tool_call(
        &self,
        tool: &str,
        params: serde_json::Value,
        timeout_ms: u64,
    ) -> Result<DispatchResult> {
        let capability = format!("tool:{tool}");
        let node_id = self
            .registry
            .nodes_with_capability(&capability)
            .await
            .into_iter()
            .find(|n| n.is_idle())
            .map(|n| n.node_id)
            .ok_or(SwarmlinkError::CapabilityMismatch {
                required: capability.clone(),
            })?;

        let job = JobRecord::new(serde_json::Value::Null, None)
            .with_capabilities([capability])
            .with_timeout_ms(timeout_ms);
        let frame = Frame::new(FramePayload::JobAssign {
            job_id: job.job_id,
            run_id: job.run_id,
            agent_id: None,
            input: serde_json::Value::Null,
            timeout_ms: Some(job.timeout_ms),
            context: None,
            script: None,
            tool_call: Some(serde_json::json!({ "tool": tool, "params": params })),
        });
        self.send_and_await(&job, &node_id, frame).await
    }

    /// Dispatch a prepared job record to a specific node and await its
    /// single outcome
    pub async fn dispatch_job(&self, job: &JobRecord, node_id: &NodeId) -> Result<DispatchResult> {
        let frame = self.build_assignment(job);
        self.send_and_await(job, node_id, frame).await
    }

    async fn send_and_await(
        &self,
        job: &JobRecord,
        node_id: &NodeId,
        frame: Frame,
    ) -> Result<DispatchResult> {
        let (tx, mut rx) = oneshot::channel();
        self.pending.lock().insert(
            job.run_id,
            PendingRun {
                tx,
                agent_id: job.agent_id.clone(),
            },
        );

        if !self.registry.send_to(node_id, frame).await {
            self.pending.lock().remove(&job.run_id);
            return Err(SwarmlinkError::NoIdleNode);
        }
        debug!(job_id = %job.job_id, run_id = %job.run_id, node = %node_id, "job assigned");

        match tokio::time::timeout(Duration::from_millis(job.timeout_ms), &mut rx).await {
            Ok(Ok(outcome)) => Ok(DispatchResult::from_outcome(job, outcome)),
            Ok(Err(_)) => Err(SwarmlinkError::internal("dispatch completion dropped")),
            Err(_elapsed) => {
                // Single-consumer removal decides the race with a late result
                if self.pending.lock().remove(&job.run_id).is_some() {
                    Err(SwarmlinkError::JobTimeout {
                        run_id: job.run_id.to_string(),
                        timeout_ms: job.timeout_ms,
                    })
                } else {
                    // A result claimed the entry between expiry and removal;
                    // its send is already in flight
                    match rx.await {
                        Ok(outcome) => Ok(DispatchResult::from_outcome(job, outcome)),
                        Err(_) => Err(SwarmlinkError::JobTimeout {
                            run_id: job.run_id.to_string(),
                            timeout_ms: job.timeout_ms,
                        }),
                    }
                }
            }
        }
    }

    fn build_assignment(&self, job: &JobRecord) -> Frame {
        let (script, context) = match job.agent_id.as_deref() {
            Some(agent_id) => (
                self.agents.get(agent_id).and_then(|a| a.script),
                self.agents.memory_of(agent_id),
            ),
            None => (None, None),
        };

        Frame::new(FramePayload::JobAssign {
            job_id: job.job_id,
            run_id: job.run_id,
            agent_id: job.agent_id.clone(),
            input: job.input.clone(),
            timeout_ms: Some(job.timeout_ms),
            context,
            script,
            tool_call: None,
        })
    }

    /// Route an inbound JOB_RESULT to its waiter.
    ///
    /// Returns `false` for late replies (no pending entry), which are
    /// discarded. Any returned memory is persisted against the agent first.
    pub fn handle_job_result(&self, run_id: RunId, outcome: JobOutcome) -> bool {
        let entry = self.pending.lock().remove(&run_id);
        match entry {
            Some(pending) => {
                if let (Some(agent_id), Some(memory)) = (&pending.agent_id, &outcome.memory) {
                    self.agents.store_memory(agent_id, memory.clone());
                }
                // Waiter may have timed out concurrently; losing is a no-op
                let _ = pending.tx.send(outcome);
                true
            }
            None => {
                warn!(run_id = %run_id, "late job result discarded");
                false
            }
        }
    }

    /// Dispatch a full agent turn to a worker advertising the agent type
    pub async fn dispatch_agent_job(
        &self,
        agent_type: &str,
        user_query: &str,
    ) -> Result<AgentJobOutcome> {
        // Dedicated hosts first; generic idle nodes only as a fallback
        let dedicated = self
            .registry
            .idle_nodes()
            .await
            .into_iter()
            .find(|n| n.agent_types.contains(agent_type))
            .map(|n| n.node_id);
        let node_id = match dedicated {
            Some(node_id) => node_id,
            None => self
                .pick_idle_node(Some(agent_type))
                .await
                .ok_or(SwarmlinkError::NoIdleNode)?,
        };

        let job_id = JobId::new();
        let (tx, rx) = oneshot::channel();
        self.pending_agent_jobs.lock().insert(job_id, tx);

        let frame = Frame::new(FramePayload::AgentJob {
            job_id,
            agent_type: agent_type.to_string(),
            user_query: user_query.to_string(),
            context: self.agents.memory_of(agent_type),
        });
        if !self.registry.send_to(&node_id, frame).await {
            self.pending_agent_jobs.lock().remove(&job_id);
            return Err(SwarmlinkError::NoIdleNode);
        }

        match tokio::time::timeout(self.agent_job_timeout, rx).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => Err(SwarmlinkError::internal("agent job completion dropped")),
            Err(_elapsed) => {
                self.pending_agent_jobs.lock().remove(&job_id);
                Err(SwarmlinkError::JobTimeout {
                    run_id: job_id.to_string(),
                    timeout_ms: self.agent_job_timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Route an inbound AGENT_JOB_RESULT to its waiter
    pub fn handle_agent_job_result(&self, job_id: JobId, outcome: AgentJobOutcome) -> bool {
        match self.pending_agent_jobs.lock().remove(&job_id) {
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => {
                warn!(job_id = %job_id, "late agent job result discarded");
                false
            }
        }
    }

    /// Number of in-flight dispatches, for the status endpoint
    pub fn in_flight(&self) -> usize {
        self.pending.lock().len() + self.pending_agent_jobs.lock().len()
    }
}
