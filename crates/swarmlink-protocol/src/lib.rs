//! Swarmlink Protocol - wire codec for control-plane/worker traffic
//!
//! Frames are self-delimited UTF-8 JSON text messages carried over a
//! WebSocket. Every frame has an envelope (`type`, `traceId`, `timestamp`)
//! and a type-specific payload. `traceId` is generated by the sender of a
//! request and echoed by the responder; `timestamp` is the sender clock in
//! milliseconds.
//!
//! # Example
//!
//! ```
//! use swarmlink_protocol::{decode, Frame, FramePayload};
//!
//! let frame = Frame::new(FramePayload::HeartbeatAck { received: true });
//! let text = frame.encode();
//! let parsed = decode(&text).unwrap();
//! assert_eq!(parsed, frame);
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use swarmlink_types::{
    JobErrorDetail, JobId, JobRunMetrics, NodeId, NodeSpecs, Result, RunId, SwarmlinkError,
    WorkerStatus,
};

/// Terminal status of one worker-side job execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultStatus {
    Success,
    Error,
    Timeout,
}

/// One wire frame: envelope plus tagged payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "traceId")]
    pub trace_id: Uuid,
    /// Sender clock, milliseconds since the Unix epoch
    pub timestamp: i64,
    #[serde(flatten)]
    pub payload: FramePayload,
}

/// Payloads, discriminated by the `type` field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FramePayload {
    /// Worker → control: authenticate and declare capabilities
    #[serde(rename = "AUTH", rename_all = "camelCase")]
    Auth {
        node_id: NodeId,
        capabilities: Vec<String>,
        #[serde(default)]
        agent_types: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        wallet: Option<String>,
        specs: NodeSpecs,
        secret: String,
        version: String,
    },

    /// Control → worker: authentication verdict
    #[serde(rename = "AUTH_ACK", rename_all = "camelCase")]
    AuthAck {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        heartbeat_interval_ms: Option<u64>,
    },

    /// Worker → control: liveness + load report
    #[serde(rename = "HEARTBEAT", rename_all = "camelCase")]
    Heartbeat {
        status: WorkerStatus,
        cpu_usage: f64,
        memory_usage: f64,
        active_jobs: u32,
    },

    /// Control → worker: heartbeat receipt
    #[serde(rename = "HEARTBEAT_ACK")]
    HeartbeatAck { received: bool },

    /// Control → worker: assign a sandbox job
    #[serde(rename = "JOB_ASSIGN", rename_all = "camelCase")]
    JobAssign {
        job_id: JobId,
        run_id: RunId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
        input: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        script: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_call: Option<serde_json::Value>,
    },

    /// Worker → control: sandbox job outcome
    #[serde(rename = "JOB_RESULT", rename_all = "camelCase")]
    JobResult {
        job_id: JobId,
        run_id: RunId,
        status: ResultStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<serde_json::Value>,
        #[serde(default)]
        logs: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<JobErrorDetail>,
        metrics: JobRunMetrics,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        memory: Option<serde_json::Value>,
    },

    /// Control → worker: run a full agent turn on the node
    #[serde(rename = "AGENT_JOB", rename_all = "camelCase")]
    AgentJob {
        job_id: JobId,
        agent_type: String,
        user_query: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<serde_json::Value>,
    },

    /// Worker → control: agent turn outcome
    #[serde(rename = "AGENT_JOB_RESULT", rename_all = "camelCase")]
    AgentJobResult {
        job_id: JobId,
        success: bool,
        response: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tools_used: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metrics: Option<JobRunMetrics>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Bidirectional: protocol-level error report
    #[serde(rename = "ERROR")]
    Error {
        code: String,
        message: String,
        fatal: bool,
    },
}

impl Frame {
    /// Build a frame with a fresh trace id and the current timestamp
    pub fn new(payload: FramePayload) -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            timestamp: Utc::now().timestamp_millis(),
            payload,
        }
    }

    /// Build a response frame echoing the request's trace id
    pub fn reply_to(request_trace: Uuid, payload: FramePayload) -> Self {
        Self {
            trace_id: request_trace,
            timestamp: Utc::now().timestamp_millis(),
            payload,
        }
    }

    /// Build an ERROR frame from a platform error
    pub fn error(err: &SwarmlinkError) -> Self {
        Self::new(FramePayload::Error {
            code: err.error_code().to_string(),
            message: err.to_string(),
            fatal: err.is_fatal_for_connection(),
        })
    }

    /// Serialize to the wire text representation.
    ///
    /// Frames are built from serializable parts only, so this cannot fail.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).expect("frame serialization is infallible")
    }

    /// Short name of the payload type, for logging
    pub fn kind(&self) -> &'static str {
        match self.payload {
            FramePayload::Auth { .. } => "AUTH",
            FramePayload::AuthAck { .. } => "AUTH_ACK",
            FramePayload::Heartbeat { .. } => "HEARTBEAT",
            FramePayload::HeartbeatAck { .. } => "HEARTBEAT_ACK",
            FramePayload::JobAssign { .. } => "JOB_ASSIGN",
            FramePayload::JobResult { .. } => "JOB_RESULT",
            FramePayload::AgentJob { .. } => "AGENT_JOB",
            FramePayload::AgentJobResult { .. } => "AGENT_JOB_RESULT",
            FramePayload::Error { .. } => "ERROR",
        }
    }
}

/// Decode a wire text message into a frame.
///
/// Fails with `MalformedFrame` when the input is not valid JSON, lacks the
/// envelope fields, or carries an unknown `type`.
pub fn decode(text: &str) -> Result<Frame> {
    serde_json::from_str(text).map_err(|e| SwarmlinkError::MalformedFrame {
        reason: e.to_string(),
    })
}
