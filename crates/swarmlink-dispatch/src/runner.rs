//! Retry loop tying the queue's accounting to the dispatcher's rendezvous
//!
//! The dispatcher never retries: it publishes one outcome per run. The
//! runner owns the retry policy: timeouts go back through the queue until
//! it dead-letters the job; worker errors surface immediately.

use std::sync::Arc;
use tracing::info;

use swarmlink_types::{JobRecord, Result, SwarmlinkError};

use crate::dispatcher::{DispatchResult, Dispatcher};
use crate::queue::{JobQueue, TimeoutDisposition};

pub struct JobRunner {
    dispatcher: Arc<Dispatcher>,
    queue: Arc<JobQueue>,
}

impl JobRunner {
    pub fn new(dispatcher: Arc<Dispatcher>, queue: Arc<JobQueue>) -> Self {
        Self { dispatcher, queue }
    }

    /// Run a job to a terminal outcome: success, worker error, or
    /// dead-letter after the queue's retry budget is spent.
    pub async fn run(
        &self,
        input: serde_json::Value,
        agent_id: Option<String>,
        timeout_ms: Option<u64>,
    ) -> Result<DispatchResult> {
        let mut job = JobRecord::new(input, agent_id);
        if let Some(timeout_ms) = timeout_ms {
            job.timeout_ms = timeout_ms;
        }

        loop {
            let node_id = self
                .dispatcher
                .pick_idle_node(job.agent_id.as_deref())
                .await
                .ok_or(SwarmlinkError::NoIdleNode)?;

            self.queue.mark_running(job.clone(), node_id.clone()).await;

            match self.dispatcher.dispatch_job(&job, &node_id).await {
                Ok(result) => {
                    self.queue
                        .mark_complete(
                            &job.run_id,
                            result.success,
                            result.output.clone(),
                            result.error.clone(),
                        )
                        .await;
                    return Ok(result);
                }
                Err(SwarmlinkError::JobTimeout { .. }) => {
                    match self.queue.mark_timeout(&job.run_id).await {
                        TimeoutDisposition::Requeued { .. } => {
                            info!(job_id = %job.job_id, retry = job.retry_count + 1, "retrying after timeout");
                            match self.queue.claim_pending(&job.job_id).await {
                                Some(requeued) => job = requeued,
                                // Another consumer drained it; nothing left to drive
                                None => {
                                    return Err(SwarmlinkError::JobTimeout {
                                        run_id: job.run_id.to_string(),
                                        timeout_ms: job.timeout_ms,
                                    });
                                }
                            }
                        }
                        TimeoutDisposition::DeadLettered { reason } => {
                            return Err(SwarmlinkError::DeadLetter {
                                job_id: job.job_id.to_string(),
                                reason,
                            });
                        }
                        // The periodic sweeper resolved this run first; pick
                        // up whatever disposition it chose
                        TimeoutDisposition::Unknown => {
                            match self.queue.claim_pending(&job.job_id).await {
                                Some(requeued) => job = requeued,
                                None => {
                                    return Err(SwarmlinkError::DeadLetter {
                                        job_id: job.job_id.to_string(),
                                        reason: format!(
                                            "Exceeded max retries ({})",
                                            job.max_retries
                                        ),
                                    });
                                }
                            }
                        }
                    }
                }
                Err(other) => {
                    self.queue
                        .mark_complete(&job.run_id, false, None, Some(other.to_string()))
                        .await;
                    return Err(other);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::JobOutcome;
    use serde_json::json;
    use swarmlink_agents::AgentStore;
    use swarmlink_protocol::{FramePayload, ResultStatus};
    use swarmlink_registry::{NodeRegistry, Outbound, Registration};
    use swarmlink_types::{JobRunMetrics, NodeId, RunId};
    use tokio::sync::mpsc;

    async fn setup() -> (
        Arc<Dispatcher>,
        Arc<JobQueue>,
        JobRunner,
        mpsc::UnboundedReceiver<Outbound>,
    ) {
        let registry = Arc::new(NodeRegistry::new());
        let (tx, rx) = mpsc::unbounded_channel();
        registry
            .register(
                NodeId::new("n1"),
                tx,
                Registration {
                    capabilities: vec![],
                    agent_types: vec![],
                    wallet: None,
                    version: "1.0".to_string(),
                },
            )
            .await;
        let dispatcher = Arc::new(Dispatcher::new(registry, Arc::new(AgentStore::new())));
        let queue = Arc::new(JobQueue::new());
        let runner = JobRunner::new(dispatcher.clone(), queue.clone());
        (dispatcher, queue, runner, rx)
    }

    fn run_id_of(outbound: &Outbound) -> RunId {
        match outbound {
            Outbound::Frame(frame) => match &frame.payload {
                FramePayload::JobAssign { run_id, .. } => *run_id,
                other => panic!("expected JOB_ASSIGN, got {other:?}"),
            },
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn success_completes_the_queue_record() {
        let (dispatcher, queue, runner, mut rx) = setup().await;

        let worker = tokio::spawn(async move {
            let assigned = rx.recv().await.unwrap();
            dispatcher.handle_job_result(
                run_id_of(&assigned),
                JobOutcome {
                    status: ResultStatus::Success,
                    output: Some(json!("done")),
                    logs: vec![],
                    error: None,
                    metrics: JobRunMetrics::default(),
                    memory: None,
                },
            );
        });

        let result = runner.run(json!({"x": 1}), None, Some(5_000)).await.unwrap();
        assert!(result.success);
        worker.await.unwrap();

        let depths = queue.depths().await;
        assert_eq!(depths.running, 0);
        assert_eq!(depths.completed, 1);
        assert_eq!(depths.dead_letter, 0);
    }

    #[tokio::test]
    async fn silent_worker_exhausts_retries_into_dead_letter() {
        let (_dispatcher, queue, runner, mut rx) = setup().await;

        // Worker receives every assignment and never replies
        let silent = tokio::spawn(async move { while rx.recv().await.is_some() {} });

        let err = runner.run(json!(null), None, Some(30)).await.unwrap_err();
        match &err {
            SwarmlinkError::DeadLetter { reason, .. } => {
                assert_eq!(reason, "Exceeded max retries (3)");
            }
            other => panic!("expected dead-letter, got {other:?}"),
        }

        let dead = queue.dead_letter().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].job.retry_count, 3);

        let depths = queue.depths().await;
        assert_eq!(depths.pending, 0);
        assert_eq!(depths.running, 0);
        silent.abort();
    }

    #[tokio::test]
    async fn no_nodes_is_reported_immediately() {
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(NodeRegistry::new()),
            Arc::new(AgentStore::new()),
        ));
        let queue = Arc::new(JobQueue::new());
        let runner = JobRunner::new(dispatcher, queue.clone());

        let err = runner.run(json!(null), None, None).await.unwrap_err();
        assert_eq!(err.error_code(), "NO_IDLE_NODE");
        assert_eq!(queue.depths().await.running, 0);
    }
}
