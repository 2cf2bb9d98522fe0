//! Swarmlink Gateway - the worker connection supervisor
//!
//! Every accepted socket gets a session that starts in `AWAITING_AUTH` with
//! an armed deadline. A good AUTH registers the node and moves the session
//! to `READY`; from there heartbeats refresh the registry and results are
//! routed to the dispatcher. Outbound writes are serialized through one
//! writer task per socket; writes to a closed channel are dropped with a
//! logged warning.
//!
//! State machine:
//!
//! ```text
//! AWAITING_AUTH --AUTH ok--> READY
//! AWAITING_AUTH --AUTH bad / timeout / close--> CLOSED
//! READY --HEARTBEAT--> READY            (metrics updated, HEARTBEAT_ACK)
//! READY --JOB_RESULT / AGENT_JOB_RESULT--> READY   (routed to dispatcher)
//! READY --HEARTBEAT from unregistered--> CLOSED    (ERROR NOT_REGISTERED)
//! READY --parse fail--> READY           (ERROR INVALID_MESSAGE, non-fatal)
//! any   --channel close--> CLOSED       (unregistered, history recorded)
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use swarmlink_dispatch::{AgentJobOutcome, Dispatcher, JobOutcome};
use swarmlink_monitor::Monitor;
use swarmlink_protocol::{decode, Frame, FramePayload, ResultStatus};
use swarmlink_registry::{NodeRegistry, NodeSender, Outbound, Registration};
use swarmlink_types::{NodeId, NodeMetrics, SwarmlinkError};

/// Default window a peer has to present AUTH
pub const AUTH_DEADLINE: Duration = Duration::from_secs(10);

/// Heartbeat interval hint handed to workers in AUTH_ACK
pub const HEARTBEAT_INTERVAL_MS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub node_secret: String,
    pub auth_deadline: Duration,
    pub heartbeat_interval_ms: u64,
}

impl GatewayConfig {
    pub fn new(node_secret: impl Into<String>) -> Self {
        Self {
            node_secret: node_secret.into(),
            auth_deadline: AUTH_DEADLINE,
            heartbeat_interval_ms: HEARTBEAT_INTERVAL_MS,
        }
    }
}

/// Length-guarded constant-time string comparison
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Supervises all worker connections
pub struct ConnectionSupervisor {
    registry: Arc<NodeRegistry>,
    dispatcher: Arc<Dispatcher>,
    monitor: Arc<Monitor>,
    config: GatewayConfig,
}

#[derive(Debug, Clone, PartialEq)]
enum SessionState {
    AwaitingAuth,
    Ready(NodeId),
}

/// Whether the receive loop keeps the socket open after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    Continue,
    Close,
}

/// One worker connection's protocol state
pub struct Session {
    supervisor: Arc<ConnectionSupervisor>,
    outbound: NodeSender,
    state: SessionState,
}

impl ConnectionSupervisor {
    pub fn new(
        registry: Arc<NodeRegistry>,
        dispatcher: Arc<Dispatcher>,
        monitor: Arc<Monitor>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            monitor,
            config,
        }
    }

    /// Drive one accepted WebSocket to completion
    pub async fn handle_socket(self: Arc<Self>, socket: WebSocket) {
        let (mut ws_tx, mut ws_rx) = socket.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();

        // Writer task: the only place that touches the sink
        let writer = tokio::spawn(async move {
            while let Some(outbound) = out_rx.recv().await {
                match outbound {
                    Outbound::Frame(frame) => {
                        if ws_tx.send(Message::Text(frame.encode().into())).await.is_err() {
                            warn!("write to closed worker channel dropped");
                            break;
                        }
                    }
                    Outbound::Close { reason } => {
                        let frame = Frame::new(FramePayload::Error {
                            code: reason.clone(),
                            message: format!("connection closed: {reason}"),
                            fatal: true,
                        });
                        let _ = ws_tx.send(Message::Text(frame.encode().into())).await;
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        });

        let mut session = Session::new(self.clone(), out_tx);
        let auth_deadline = tokio::time::sleep(self.config.auth_deadline);
        tokio::pin!(auth_deadline);

        loop {
            tokio::select! {
                _ = &mut auth_deadline, if !session.is_authenticated() => {
                    session.on_auth_deadline();
                    break;
                }
                inbound = ws_rx.next() => match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if session.on_text(&text).await == SessionAction::Close {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // ping/pong/binary handled by the stack
                    Some(Err(e)) => {
                        debug!(error = %e, "worker socket error");
                        break;
                    }
                }
            }
        }

        session.on_close().await;
        // Dropping the session releases the last local sender; the writer
        // drains any final frames (auth rejections, fatal errors) and exits
        drop(session);
        let _ = tokio::time::timeout(Duration::from_secs(5), writer).await;
    }
}

impl Session {
    pub fn new(supervisor: Arc<ConnectionSupervisor>, outbound: NodeSender) -> Self {
        Self {
            supervisor,
            outbound,
            state: SessionState::AwaitingAuth,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, SessionState::Ready(_))
    }

    fn send(&self, frame: Frame) {
        if self.outbound.send(Outbound::Frame(frame)).is_err() {
            warn!("write to closed worker channel dropped");
        }
    }

    /// The auth deadline fired with no successful AUTH
    pub fn on_auth_deadline(&self) {
        info!("peer failed to authenticate in time");
        self.send(Frame::error(&SwarmlinkError::AuthTimeout));
    }

    /// Process one inbound text message
    pub async fn on_text(&mut self, text: &str) -> SessionAction {
        let frame = match decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                // Parse failures are local: report and keep the connection
                debug!(error = %e, "undecodable frame from worker");
                self.send(Frame::error(&e));
                return SessionAction::Continue;
            }
        };

        let trace_id = frame.trace_id;
        let state = self.state.clone();
        match (state, frame.payload) {
            (
                SessionState::AwaitingAuth,
                FramePayload::Auth {
                    node_id,
                    capabilities,
                    agent_types,
                    wallet,
                    secret,
                    version,
                    ..
                },
            ) => {
                if !constant_time_eq(&secret, &self.supervisor.config.node_secret) {
                    warn!(node_id = %node_id, "authentication rejected");
                    self.send(Frame::reply_to(
                        trace_id,
                        FramePayload::AuthAck {
                            success: false,
                            message: Some("Invalid credentials".to_string()),
                            heartbeat_interval_ms: None,
                        },
                    ));
                    return SessionAction::Close;
                }

                self.supervisor
                    .registry
                    .register(
                        node_id.clone(),
                        self.outbound.clone(),
                        Registration {
                            capabilities,
                            agent_types,
                            wallet,
                            version,
                        },
                    )
                    .await;
                self.supervisor.monitor.record_connected(node_id.clone());
                info!(node_id = %node_id, "worker authenticated");

                self.send(Frame::reply_to(
                    trace_id,
                    FramePayload::AuthAck {
                        success: true,
                        message: None,
                        heartbeat_interval_ms: Some(
                            self.supervisor.config.heartbeat_interval_ms,
                        ),
                    },
                ));
                self.state = SessionState::Ready(node_id);
                SessionAction::Continue
            }

            (SessionState::AwaitingAuth, _) => {
                // Only AUTH is valid before registration
                self.send(Frame::error(&SwarmlinkError::NotRegistered {
                    node_id: "unauthenticated".to_string(),
                }));
                SessionAction::Close
            }

            (
                SessionState::Ready(node_id),
                FramePayload::Heartbeat {
                    cpu_usage,
                    memory_usage,
                    active_jobs,
                    ..
                },
            ) => {
                let known = self
                    .supervisor
                    .registry
                    .update_heartbeat(
                        &node_id,
                        NodeMetrics {
                            cpu_percent: cpu_usage,
                            memory_percent: memory_usage,
                            active_jobs,
                        },
                    )
                    .await;

                if !known {
                    // Evicted between frames: the peer must reconnect
                    self.send(Frame::error(&SwarmlinkError::NotRegistered {
                        node_id: node_id.to_string(),
                    }));
                    return SessionAction::Close;
                }

                self.send(Frame::reply_to(
                    trace_id,
                    FramePayload::HeartbeatAck { received: true },
                ));
                SessionAction::Continue
            }

            (
                SessionState::Ready(node_id),
                FramePayload::JobResult {
                    run_id,
                    status,
                    output,
                    logs,
                    error,
                    metrics,
                    memory,
                    ..
                },
            ) => {
                self.supervisor
                    .monitor
                    .record_job_outcome(&node_id, status == ResultStatus::Success);
                self.supervisor.dispatcher.handle_job_result(
                    run_id,
                    JobOutcome {
                        status,
                        output,
                        logs,
                        error,
                        metrics,
                        memory,
                    },
                );
                SessionAction::Continue
            }

            (
                SessionState::Ready(node_id),
                FramePayload::AgentJobResult {
                    job_id,
                    success,
                    response,
                    tools_used,
                    error,
                    ..
                },
            ) => {
                self.supervisor.monitor.record_job_outcome(&node_id, success);
                self.supervisor.dispatcher.handle_agent_job_result(
                    job_id,
                    AgentJobOutcome {
                        success,
                        response,
                        tools_used,
                        error,
                    },
                );
                SessionAction::Continue
            }

            (SessionState::Ready(node_id), FramePayload::Error { code, message, fatal }) => {
                warn!(node_id = %node_id, %code, %message, fatal, "worker reported error");
                if fatal {
                    SessionAction::Close
                } else {
                    SessionAction::Continue
                }
            }

            (SessionState::Ready(_), other) => {
                // Control-plane-bound frames the worker should never send
                self.send(Frame::error(&SwarmlinkError::malformed(format!(
                    "unexpected frame from worker: {other:?}"
                ))));
                SessionAction::Continue
            }
        }
    }

    /// Tear down registry and history state when the socket closes.
    ///
    /// Channel-guarded: an evicted connection must not remove the entry its
    /// replacement now owns.
    pub async fn on_close(&mut self) {
        if let SessionState::Ready(node_id) = &self.state {
            self.supervisor
                .registry
                .unregister_channel(node_id, &self.outbound)
                .await;
            self.supervisor
                .monitor
                .record_disconnected(node_id.clone(), None);
            info!(node_id = %node_id, "worker disconnected");
        }
    }
}
