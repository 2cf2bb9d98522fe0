//! Swarmlink Worker Node
//!
//! Dials the control plane, authenticates, heartbeats, and executes
//! assigned jobs in the local sandbox. Reconnects with a fixed backoff
//! whenever the connection drops; exits cleanly on Ctrl+C.

mod sandbox;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use swarmlink_protocol::{decode, Frame, FramePayload, ResultStatus};
use swarmlink_types::{NodeId, NodeSpecs, WorkerStatus};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const AUTH_ACK_DEADLINE: Duration = Duration::from_secs(10);
const FALLBACK_HEARTBEAT_MS: u64 = 10_000;

/// Swarmlink worker node - executes jobs for the control plane
#[derive(Parser, Debug, Clone)]
#[command(name = "swarmlink-worker")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Control plane host
    #[arg(long, env = "CONTROL_PLANE_HOST", default_value = "127.0.0.1")]
    control_plane_host: String,

    /// Control plane worker port
    #[arg(long, env = "CONTROL_PLANE_PORT", default_value_t = 8787)]
    control_plane_port: u16,

    /// Node id presented at AUTH (defaults to a generated id)
    #[arg(long, env = "NODE_ID")]
    node_id: Option<String>,

    /// Shared secret
    #[arg(long, env = "NODE_SECRET", default_value = "dev-node-secret")]
    node_secret: String,

    /// Capabilities to advertise, comma-separated
    #[arg(long, env = "NODE_CAPABILITIES", value_delimiter = ',')]
    capabilities: Vec<String>,

    /// Agent types this node accepts, comma-separated (empty = any)
    #[arg(long, env = "NODE_AGENT_TYPES", value_delimiter = ',')]
    agent_types: Vec<String>,

    /// Payout wallet
    #[arg(long, env = "NODE_WALLET")]
    wallet: Option<String>,

    /// Log level
    #[arg(long, env = "SWARMLINK_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn ws_url(&self) -> String {
        format!(
            "ws://{}:{}/ws",
            self.control_plane_host, self.control_plane_port
        )
    }

    fn resolved_node_id(&self) -> NodeId {
        match &self.node_id {
            Some(id) => NodeId::new(id.clone()),
            None => NodeId::new(format!("worker-{}", uuid::Uuid::new_v4().simple())),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    let node_id = args.resolved_node_id();
    info!(node_id = %node_id, url = args.ws_url(), "starting worker");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C, exiting");
        }
        _ = connection_loop(args, node_id) => {}
    }
    Ok(())
}

async fn connection_loop(args: Args, node_id: NodeId) {
    loop {
        match run_session(&args, &node_id).await {
            Ok(()) => info!("session ended, reconnecting"),
            Err(e) => warn!(error = %e, "session failed, reconnecting"),
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

fn machine_specs() -> NodeSpecs {
    NodeSpecs {
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        cpu_cores: std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(1),
        total_memory_gb: 0.0,
        runtime_version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

/// One connection: auth, heartbeat, job loop. Returns when the socket drops.
async fn run_session(args: &Args, node_id: &NodeId) -> anyhow::Result<()> {
    let (stream, _) = connect_async(args.ws_url())
        .await
        .context("connecting to control plane")?;
    let (mut ws_tx, mut ws_rx) = stream.split();

    // Authenticate before anything else
    let auth = Frame::new(FramePayload::Auth {
        node_id: node_id.clone(),
        capabilities: args.capabilities.clone(),
        agent_types: args.agent_types.clone(),
        wallet: args.wallet.clone(),
        specs: machine_specs(),
        secret: args.node_secret.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    });
    ws_tx
        .send(Message::Text(auth.encode().into()))
        .await
        .context("sending AUTH")?;

    let heartbeat_interval_ms = tokio::time::timeout(AUTH_ACK_DEADLINE, async {
        while let Some(message) = ws_rx.next().await {
            let message = message.context("reading AUTH_ACK")?;
            if let Message::Text(text) = message {
                if let Ok(frame) = decode(&text) {
                    match frame.payload {
                        FramePayload::AuthAck {
                            success: true,
                            heartbeat_interval_ms,
                            ..
                        } => return Ok(heartbeat_interval_ms.unwrap_or(FALLBACK_HEARTBEAT_MS)),
                        FramePayload::AuthAck {
                            success: false,
                            message,
                            ..
                        } => anyhow::bail!(
                            "authentication rejected: {}",
                            message.unwrap_or_default()
                        ),
                        _ => continue,
                    }
                }
            }
        }
        anyhow::bail!("connection closed before AUTH_ACK")
    })
    .await
    .context("waiting for AUTH_ACK")??;

    info!(interval_ms = heartbeat_interval_ms, "authenticated");

    // One writer task serializes every outbound frame
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Frame>();
    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if ws_tx.send(Message::Text(frame.encode().into())).await.is_err() {
                break;
            }
        }
    });

    let active_jobs = Arc::new(AtomicU32::new(0));

    // Heartbeat loop on the acked interval
    let heartbeat = {
        let out_tx = out_tx.clone();
        let active_jobs = active_jobs.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_millis(heartbeat_interval_ms));
            loop {
                interval.tick().await;
                let jobs = active_jobs.load(Ordering::Relaxed);
                let status = if jobs == 0 {
                    WorkerStatus::Idle
                } else {
                    WorkerStatus::Busy
                };
                let frame = Frame::new(FramePayload::Heartbeat {
                    status,
                    cpu_usage: 0.0,
                    memory_usage: 0.0,
                    active_jobs: jobs,
                });
                if out_tx.send(frame).is_err() {
                    break;
                }
            }
        })
    };

    // Job loop
    let result = job_loop(&mut ws_rx, &out_tx, &active_jobs).await;

    heartbeat.abort();
    writer.abort();
    result
}

async fn job_loop(
    ws_rx: &mut (impl futures_util::Stream<
        Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>,
    > + Unpin),
    out_tx: &mpsc::UnboundedSender<Frame>,
    active_jobs: &Arc<AtomicU32>,
) -> anyhow::Result<()> {
    while let Some(message) = ws_rx.next().await {
        let message = message.context("reading frame")?;
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let frame = match decode(&text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "undecodable frame from control plane");
                continue;
            }
        };

        match frame.payload {
            FramePayload::JobAssign {
                job_id,
                run_id,
                input,
                timeout_ms,
                script,
                tool_call,
                ..
            } => {
                let out_tx = out_tx.clone();
                let active_jobs = active_jobs.clone();
                tokio::spawn(async move {
                    active_jobs.fetch_add(1, Ordering::Relaxed);
                    let outcome = sandbox::execute(
                        script.as_deref(),
                        tool_call.as_ref(),
                        &input,
                        timeout_ms.unwrap_or(30_000),
                    )
                    .await;
                    active_jobs.fetch_sub(1, Ordering::Relaxed);

                    let _ = out_tx.send(Frame::new(FramePayload::JobResult {
                        job_id,
                        run_id,
                        status: outcome.status,
                        output: outcome.output,
                        logs: outcome.logs,
                        error: outcome.error,
                        metrics: outcome.metrics,
                        memory: None,
                    }));
                });
            }

            FramePayload::AgentJob {
                job_id,
                agent_type,
                user_query,
                ..
            } => {
                // No local agent runtime: answer honestly rather than hang
                // the dispatcher
                let _ = out_tx.send(Frame::new(FramePayload::AgentJobResult {
                    job_id,
                    success: false,
                    response: String::new(),
                    tools_used: vec![],
                    metrics: None,
                    error: Some(format!(
                        "agent runtime for {agent_type} not installed (query: {user_query})"
                    )),
                }));
            }

            FramePayload::Error { code, message, fatal } => {
                if fatal {
                    error!(%code, %message, "fatal error from control plane");
                    anyhow::bail!("control plane closed the session: {code}");
                }
                warn!(%code, %message, "error from control plane");
            }

            FramePayload::HeartbeatAck { .. } | FramePayload::AuthAck { .. } => {}

            other => warn!(?other, "unexpected frame from control plane"),
        }
    }
    Ok(())
}
