//! Capability-matched FIFO with retry accounting and dead-letter
//!
//! A run id lives in at most one place at a time: the pending FIFO, the
//! running map, the bounded completed ring, or the dead-letter list.
//! Requeued jobs keep their job id but get a fresh run id, so a stale
//! JOB_RESULT from a previous attempt can never match the new one.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use swarmlink_types::{JobId, JobRecord, JobStatus, NodeId, RunId};

/// Completed jobs kept for inspection before eviction
pub const DEFAULT_COMPLETED_CAPACITY: usize = 100;

struct RunningJob {
    job: JobRecord,
    #[allow(dead_code)]
    node_id: NodeId,
    started_at: Instant,
}

/// Terminal record of a finished job
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedJob {
    pub job: JobRecord,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

/// Terminal record of a job whose retries were exhausted
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadJob {
    pub job: JobRecord,
    pub error: String,
    pub dead_lettered_at: DateTime<Utc>,
}

/// What happened to a timed-out run
#[derive(Debug, Clone, PartialEq)]
pub enum TimeoutDisposition {
    /// Back at the tail of pending under a fresh run id
    Requeued { new_run_id: RunId },
    /// Retries exhausted
    DeadLettered { reason: String },
    /// The run id was not in the running map (already resolved); no-op
    Unknown,
}

/// Queue depth snapshot for the status endpoint
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueDepths {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub dead_letter: usize,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<JobRecord>,
    running: HashMap<RunId, RunningJob>,
    completed: VecDeque<CompletedJob>,
    dead_letter: Vec<DeadJob>,
}

/// The job queue
pub struct JobQueue {
    state: RwLock<QueueState>,
    completed_capacity: usize,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::with_completed_capacity(DEFAULT_COMPLETED_CAPACITY)
    }

    pub fn with_completed_capacity(completed_capacity: usize) -> Self {
        Self {
            state: RwLock::new(QueueState::default()),
            completed_capacity,
        }
    }

    /// Append a job to the pending FIFO
    pub async fn enqueue(&self, job: JobRecord) {
        debug!(job_id = %job.job_id, "enqueued");
        self.state.write().await.pending.push_back(job);
    }

    /// Remove and return the first pending job whose required capabilities
    /// are a subset of `capabilities`
    pub async fn dequeue(&self, capabilities: &HashSet<String>) -> Option<JobRecord> {
        let mut state = self.state.write().await;
        let position = state
            .pending
            .iter()
            .position(|job| job.required_capabilities.is_subset(capabilities))?;
        state.pending.remove(position)
    }

    /// Remove a specific job from pending by job id (used by the retry loop
    /// to reclaim the job it just requeued)
    pub async fn claim_pending(&self, job_id: &JobId) -> Option<JobRecord> {
        let mut state = self.state.write().await;
        let position = state.pending.iter().position(|job| &job.job_id == job_id)?;
        state.pending.remove(position)
    }

    /// Record that a job was assigned to a node
    pub async fn mark_running(&self, job: JobRecord, node_id: NodeId) {
        let mut state = self.state.write().await;
        state.running.insert(
            job.run_id,
            RunningJob {
                job,
                node_id,
                started_at: Instant::now(),
            },
        );
    }

    /// Move a running job to the completed ring. Returns `false` when the
    /// run id is not in the running map.
    pub async fn mark_complete(
        &self,
        run_id: &RunId,
        success: bool,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> bool {
        let mut state = self.state.write().await;
        let Some(running) = state.running.remove(run_id) else {
            return false;
        };
        if state.completed.len() >= self.completed_capacity {
            state.completed.pop_front();
        }
        state.completed.push_back(CompletedJob {
            job: running.job,
            status: if success {
                JobStatus::Success
            } else {
                JobStatus::Failed
            },
            result,
            error,
            finished_at: Utc::now(),
        });
        true
    }

    /// Handle a run deadline expiry: requeue with a fresh run id, or
    /// dead-letter once retries are exhausted.
    pub async fn mark_timeout(&self, run_id: &RunId) -> TimeoutDisposition {
        let mut state = self.state.write().await;
        let Some(running) = state.running.remove(run_id) else {
            return TimeoutDisposition::Unknown;
        };

        let mut job = running.job;
        job.retry_count += 1;

        if job.retries_exhausted() {
            let reason = format!("Exceeded max retries ({})", job.max_retries);
            warn!(job_id = %job.job_id, retries = job.retry_count, "dead-lettering job");
            state.dead_letter.push(DeadJob {
                job,
                error: reason.clone(),
                dead_lettered_at: Utc::now(),
            });
            TimeoutDisposition::DeadLettered { reason }
        } else {
            job.run_id = RunId::new();
            let new_run_id = job.run_id;
            debug!(job_id = %job.job_id, retry = job.retry_count, "requeueing timed-out job");
            state.pending.push_back(job);
            TimeoutDisposition::Requeued { new_run_id }
        }
    }

    /// One pass of the running-map deadline sweeper: times out every running
    /// job older than its own `timeout_ms`. Idempotent for already-resolved
    /// runs. Runs every 5s in production.
    pub async fn sweep_timeouts(&self) -> Vec<(RunId, TimeoutDisposition)> {
        let expired: Vec<RunId> = {
            let state = self.state.read().await;
            let now = Instant::now();
            state
                .running
                .iter()
                .filter(|(_, running)| {
                    now.duration_since(running.started_at).as_millis() as u64
                        > running.job.timeout_ms
                })
                .map(|(run_id, _)| *run_id)
                .collect()
        };

        let mut outcomes = Vec::with_capacity(expired.len());
        for run_id in expired {
            let disposition = self.mark_timeout(&run_id).await;
            if disposition != TimeoutDisposition::Unknown {
                outcomes.push((run_id, disposition));
            }
        }
        outcomes
    }

    /// Snapshot of the dead-letter list
    pub async fn dead_letter(&self) -> Vec<DeadJob> {
        self.state.read().await.dead_letter.clone()
    }

    /// Snapshot of the completed ring, oldest first
    pub async fn completed(&self) -> Vec<CompletedJob> {
        self.state.read().await.completed.iter().cloned().collect()
    }

    /// Current depth of each structure
    pub async fn depths(&self) -> QueueDepths {
        let state = self.state.read().await;
        QueueDepths {
            pending: state.pending.len(),
            running: state.running.len(),
            completed: state.completed.len(),
            dead_letter: state.dead_letter.len(),
        }
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn caps(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn job_with_caps(list: &[&str]) -> JobRecord {
        JobRecord::new(json!({"q": 1}), None)
            .with_capabilities(list.iter().map(|s| s.to_string()))
    }

    #[tokio::test]
    async fn dequeue_respects_capability_subset() {
        let queue = JobQueue::new();
        queue.enqueue(job_with_caps(&["docker"])).await;
        queue.enqueue(job_with_caps(&[])).await;

        // Node without docker skips the first job
        let job = queue.dequeue(&caps(&["python-3.11"])).await.unwrap();
        assert!(job.required_capabilities.is_empty());

        // Nothing else matches
        assert!(queue.dequeue(&caps(&["python-3.11"])).await.is_none());

        // Docker node gets the remaining job
        assert!(queue.dequeue(&caps(&["docker", "python-3.11"])).await.is_some());
    }

    #[tokio::test]
    async fn enqueue_dequeue_preserves_record() {
        let queue = JobQueue::new();
        let job = job_with_caps(&["docker"]);
        let job_id = job.job_id;
        let retry_count = job.retry_count;
        queue.enqueue(job).await;

        let dequeued = queue.dequeue(&caps(&["docker"])).await.unwrap();
        assert_eq!(dequeued.job_id, job_id);
        assert_eq!(dequeued.retry_count, retry_count);
    }

    #[tokio::test]
    async fn timeout_requeues_with_fresh_run_id_until_exhausted() {
        let queue = JobQueue::new();
        let job = job_with_caps(&[]);
        let job_id = job.job_id;
        let first_run = job.run_id;
        queue.mark_running(job, NodeId::new("n1")).await;

        // Attempt 1 times out: requeued
        let disposition = queue.mark_timeout(&first_run).await;
        let second_run = match disposition {
            TimeoutDisposition::Requeued { new_run_id } => new_run_id,
            other => panic!("expected requeue, got {other:?}"),
        };
        assert_ne!(first_run, second_run);

        // Attempt 2 times out: requeued again
        let job = queue.claim_pending(&job_id).await.unwrap();
        assert_eq!(job.retry_count, 1);
        queue.mark_running(job, NodeId::new("n1")).await;
        let third_run = match queue.mark_timeout(&second_run).await {
            TimeoutDisposition::Requeued { new_run_id } => new_run_id,
            other => panic!("expected requeue, got {other:?}"),
        };

        // Attempt 3 times out: dead-lettered
        let job = queue.claim_pending(&job_id).await.unwrap();
        assert_eq!(job.retry_count, 2);
        queue.mark_running(job, NodeId::new("n1")).await;
        match queue.mark_timeout(&third_run).await {
            TimeoutDisposition::DeadLettered { reason } => {
                assert_eq!(reason, "Exceeded max retries (3)");
            }
            other => panic!("expected dead-letter, got {other:?}"),
        }

        let dead = queue.dead_letter().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].job.job_id, job_id);
        assert_eq!(dead[0].job.retry_count, 3);
        assert!(queue.claim_pending(&job_id).await.is_none());
    }

    #[tokio::test]
    async fn mark_timeout_is_noop_for_resolved_runs() {
        let queue = JobQueue::new();
        let job = job_with_caps(&[]);
        let run_id = job.run_id;
        queue.mark_running(job, NodeId::new("n1")).await;

        assert!(queue.mark_complete(&run_id, true, Some(json!("ok")), None).await);
        assert_eq!(queue.mark_timeout(&run_id).await, TimeoutDisposition::Unknown);
        assert!(!queue.mark_complete(&run_id, true, None, None).await);
    }

    #[tokio::test]
    async fn sweeper_times_out_only_expired_jobs() {
        let queue = JobQueue::new();

        let fast = job_with_caps(&[]).with_timeout_ms(5);
        let slow = job_with_caps(&[]).with_timeout_ms(60_000);
        let fast_run = fast.run_id;
        queue.mark_running(fast, NodeId::new("n1")).await;
        queue.mark_running(slow, NodeId::new("n2")).await;

        tokio::time::sleep(std::time::Duration::from_millis(15)).await;
        let outcomes = queue.sweep_timeouts().await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].0, fast_run);

        let depths = queue.depths().await;
        assert_eq!(depths.running, 1);
        assert_eq!(depths.pending, 1);
    }

    #[tokio::test]
    async fn completed_ring_is_bounded() {
        let queue = JobQueue::with_completed_capacity(2);
        for _ in 0..3 {
            let job = job_with_caps(&[]);
            let run_id = job.run_id;
            queue.mark_running(job, NodeId::new("n1")).await;
            queue.mark_complete(&run_id, true, None, None).await;
        }
        assert_eq!(queue.completed().await.len(), 2);
    }
}
