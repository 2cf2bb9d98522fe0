//! Job domain types
//!
//! A `JobRecord` identifies a logical work item; its `run_id` correlates the
//! current in-flight attempt. Retries keep the `job_id`; the queue
//! re-enqueues the same record with an incremented `retry_count`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::identity::{JobId, RunId};

/// Default number of attempts before a job is dead-lettered
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default per-dispatch deadline in milliseconds
pub const DEFAULT_JOB_TIMEOUT_MS: u64 = 30_000;

/// Lifecycle status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failed,
    Timeout,
    Dead,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Dead)
    }
}

/// A unit of dispatchable work
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub job_id: JobId,
    pub run_id: RunId,
    pub agent_id: Option<String>,
    pub input: serde_json::Value,
    pub required_capabilities: HashSet<String>,
    pub timeout_ms: u64,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(input: serde_json::Value, agent_id: Option<String>) -> Self {
        Self {
            job_id: JobId::new(),
            run_id: RunId::new(),
            agent_id,
            input,
            required_capabilities: HashSet::new(),
            timeout_ms: DEFAULT_JOB_TIMEOUT_MS,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            created_at: Utc::now(),
        }
    }

    pub fn with_capabilities(mut self, caps: impl IntoIterator<Item = String>) -> Self {
        self.required_capabilities = caps.into_iter().collect();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Whether another retry is allowed after the current attempt failed
    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

/// Execution metrics reported by a worker alongside a result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRunMetrics {
    pub start_time: i64,
    pub end_time: i64,
    pub duration_ms: u64,
}

/// Structured error detail inside a worker result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}
