//! Swarmlink Control Plane
//!
//! Hosts the HTTP API, the worker WebSocket listener, the dispatcher, the
//! orchestrator, and the prepaid ledger. Workers connect outbound to the
//! control-plane port; users talk to the HTTP port.
//!
//! ```bash
//! # defaults (payments off, deterministic planner)
//! swarmlink-control-plane
//!
//! # production-ish
//! NODE_SECRET=... X402_ENABLED=true PLATFORM_WALLET=0x... \
//!     swarmlink-control-plane --config config/production.toml
//! ```

mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{routing::get, Router};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use swarmlink_agents::AgentStore;
use swarmlink_api::{create_router, ws::worker_ws_handler, ApiConfig, AppState};
use swarmlink_dispatch::{Dispatcher, JobQueue, JobRunner};
use swarmlink_gateway::{ConnectionSupervisor, GatewayConfig};
use swarmlink_ledger::BalanceLedger;
use swarmlink_monitor::Monitor;
use swarmlink_orchestrator::{
    DeterministicPlanner, IntentPlanner, LlmPlanner, Orchestrator, ToolPlanner,
};
use swarmlink_registry::NodeRegistry;
use swarmlink_settlement::{
    DistributionMode, DistributorConfig, HttpSettlementBackend, PaymentDistributor,
    SettlementBackend,
};
use swarmlink_types::WalletAddress;

use crate::config::ServerConfig;

/// Period of the staleness and job-timeout sweepers
const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Swarmlink control plane - decentralized agent execution platform
#[derive(Parser, Debug)]
#[command(name = "swarmlink-control-plane")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "SWARMLINK_CONFIG")]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SWARMLINK_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long, env = "SWARMLINK_LOG_FORMAT")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut server_config = ServerConfig::load(args.config.as_deref())?;
    if let Some(level) = args.log_level {
        server_config.logging.level = level;
    }
    if let Some(format) = args.log_format {
        server_config.logging.format = format;
    }

    init_logging(&server_config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting swarmlink control plane"
    );

    if server_config.payments_enabled && server_config.platform_wallet.is_none() {
        anyhow::bail!("X402_ENABLED requires PLATFORM_WALLET to be set");
    }

    let state = build_state(&server_config)
        .await
        .context("building application state")?;

    spawn_sweepers(&state);

    // Two listeners, one state: users on the HTTP port, workers on the
    // control-plane port
    let api_router = create_router(state.clone());
    let ws_router = Router::new()
        .route("/ws", get(worker_ws_handler))
        .with_state(state);

    let http_listener = tokio::net::TcpListener::bind(server_config.http_addr())
        .await
        .with_context(|| format!("binding HTTP listener on {}", server_config.http_addr()))?;
    let ws_listener = tokio::net::TcpListener::bind(server_config.control_plane_addr())
        .await
        .with_context(|| {
            format!(
                "binding worker listener on {}",
                server_config.control_plane_addr()
            )
        })?;

    tracing::info!(
        http = %server_config.http_addr(),
        workers = %server_config.control_plane_addr(),
        payments = server_config.payments_enabled,
        "listening"
    );

    let http = axum::serve(http_listener, api_router).with_graceful_shutdown(shutdown_signal());
    let ws = axum::serve(ws_listener, ws_router).with_graceful_shutdown(shutdown_signal());

    tokio::try_join!(async { http.await }, async { ws.await })?;

    tracing::info!("shutdown complete");
    Ok(())
}

/// Wire every component; nothing here is a global
async fn build_state(config: &ServerConfig) -> anyhow::Result<AppState> {
    let registry = Arc::new(NodeRegistry::new());
    let queue = Arc::new(JobQueue::new());
    let agents = Arc::new(AgentStore::new());
    let monitor = Arc::new(Monitor::new());
    let dispatcher = Arc::new(Dispatcher::new(registry.clone(), agents.clone()));
    let runner = Arc::new(JobRunner::new(dispatcher.clone(), queue.clone()));

    let platform_wallet = config.platform_wallet.as_deref().map(WalletAddress::new);
    let ledger = Arc::new(BalanceLedger::open(&config.data_dir, platform_wallet).await?);

    let settlement: Arc<dyn SettlementBackend> = Arc::new(HttpSettlementBackend::new(
        config
            .settlement_backend_url
            .clone()
            .unwrap_or_else(|| "http://localhost:8402".to_string()),
        config.settlement_rpc_url.clone(),
    ));
    let distributor = Arc::new(PaymentDistributor::new(
        DistributorConfig {
            mode: if config.onchain_distribution {
                DistributionMode::OnChain
            } else {
                DistributionMode::Internal
            },
            ..Default::default()
        },
        settlement.clone(),
    ));

    let (intent, tools) = build_planners();
    let orchestrator = Arc::new(Orchestrator::new(
        agents.clone(),
        dispatcher.clone(),
        intent,
        tools,
    ));

    let supervisor = Arc::new(ConnectionSupervisor::new(
        registry.clone(),
        dispatcher.clone(),
        monitor.clone(),
        GatewayConfig::new(config.node_secret.clone()),
    ));

    Ok(AppState {
        registry,
        queue,
        dispatcher,
        runner,
        ledger,
        settlement,
        distributor,
        agents,
        orchestrator,
        monitor,
        supervisor,
        config: ApiConfig {
            payments_enabled: config.payments_enabled,
            query_price: config.query_price,
        },
    })
}

/// LLM planner when one is configured, deterministic otherwise
fn build_planners() -> (Arc<dyn IntentPlanner>, Arc<dyn ToolPlanner>) {
    if std::env::var("SWARMLINK_LLM_BASE_URL").is_ok() {
        tracing::info!("using LLM planner");
        let planner = Arc::new(LlmPlanner::from_env());
        (planner.clone() as Arc<dyn IntentPlanner>, planner as Arc<dyn ToolPlanner>)
    } else {
        tracing::warn!("no LLM configured, using deterministic planner");
        let planner = Arc::new(DeterministicPlanner::new());
        (planner.clone() as Arc<dyn IntentPlanner>, planner as Arc<dyn ToolPlanner>)
    }
}

/// Staleness sweeper and job-timeout sweeper, both every 5s
fn spawn_sweepers(state: &AppState) {
    let registry = state.registry.clone();
    let monitor = state.monitor.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let outcome = registry.sweep().await;
            for node_id in outcome.evicted {
                monitor.record_disconnected(node_id, Some("HEARTBEAT_TIMEOUT".to_string()));
            }
        }
    });

    let queue = state.queue.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            queue.sweep_timeouts().await;
        }
    });
}

fn init_logging(config: &config::LoggingConfig) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.format.as_str() {
        "json" => subscriber.with(fmt::layer().json().with_target(true)).init(),
        _ => subscriber.with(fmt::layer().with_target(true)).init(),
    }
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
