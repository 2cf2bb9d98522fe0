//! API integration tests
//!
//! Exercise the full request/response cycle against a router wired with
//! real components: a tempdir-backed ledger, the deterministic planner, and
//! a scripted settlement backend. No network, no workers.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::ServiceExt;

use swarmlink_agents::AgentStore;
use swarmlink_api::{create_router, ApiConfig, AppState};
use swarmlink_dispatch::{Dispatcher, JobQueue, JobRunner};
use swarmlink_gateway::{ConnectionSupervisor, GatewayConfig};
use swarmlink_ledger::BalanceLedger;
use swarmlink_monitor::Monitor;
use swarmlink_orchestrator::{DeterministicPlanner, Orchestrator};
use swarmlink_registry::NodeRegistry;
use swarmlink_settlement::{
    DepositCheck, DistributorConfig, PaymentDistributor, SettlementBackend,
};
use swarmlink_types::{Result as SwarmResult, SwarmlinkError, WalletAddress};

const PLATFORM_WALLET: &str = "0xplatform";

/// Settlement backend scripted for deposits from `0xalice`
struct StubBackend;

#[async_trait]
impl SettlementBackend for StubBackend {
    async fn verify_deposit(&self, tx_hash: &str) -> SwarmResult<DepositCheck> {
        if tx_hash.starts_with("0xdead") {
            return Err(SwarmlinkError::DepositInvalid {
                reason: "unknown transaction".to_string(),
            });
        }
        Ok(DepositCheck {
            confirmed: true,
            from: WalletAddress::new("0xalice"),
            to: WalletAddress::new(PLATFORM_WALLET),
            amount: dec!(1.00),
        })
    }

    async fn transfer(&self, _to: &str, _amount: Decimal) -> SwarmResult<String> {
        Ok("0xtransfer".to_string())
    }
}

async fn test_state(payments_enabled: bool, data_dir: &std::path::Path) -> AppState {
    let registry = Arc::new(NodeRegistry::new());
    let queue = Arc::new(JobQueue::new());
    let agents = Arc::new(AgentStore::new());
    let dispatcher = Arc::new(Dispatcher::new(registry.clone(), agents.clone()));
    let runner = Arc::new(JobRunner::new(dispatcher.clone(), queue.clone()));
    let monitor = Arc::new(Monitor::new());
    let ledger = Arc::new(
        BalanceLedger::open(data_dir, Some(WalletAddress::new(PLATFORM_WALLET)))
            .await
            .unwrap(),
    );
    let settlement: Arc<dyn SettlementBackend> = Arc::new(StubBackend);
    let distributor = Arc::new(PaymentDistributor::new(
        DistributorConfig::default(),
        settlement.clone(),
    ));
    let planner = Arc::new(DeterministicPlanner::new());
    let orchestrator = Arc::new(Orchestrator::new(
        agents.clone(),
        dispatcher.clone(),
        planner.clone(),
        planner,
    ));
    let supervisor = Arc::new(ConnectionSupervisor::new(
        registry.clone(),
        dispatcher.clone(),
        monitor.clone(),
        GatewayConfig::new("test-secret"),
    ));

    AppState {
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
            payments_enabled,
            query_price: dec!(0.10),
        },
    }
}

async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    wallet: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(wallet) = wallet {
        request = request.header("X-Wallet-Address", wallet);
    }
    let body = match body {
        Some(value) => Body::from(serde_json::to_vec(&value).unwrap()),
        None => Body::empty(),
    };

    let response = router.clone().oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn health_reports_ok() {
    let dir = tempfile::tempdir().unwrap();
    let router = create_router(test_state(true, dir.path()).await);

    let (status, body) = send(&router, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn balance_for_fresh_wallet_is_zeroed() {
    let dir = tempfile::tempdir().unwrap();
    let router = create_router(test_state(true, dir.path()).await);

    let (status, body) = send(&router, "GET", "/api/balance?wallet=0xBob", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["wallet"], "0xbob");
    assert_eq!(body["balance"], "0");
    assert_eq!(body["queryPrice"], "0.10");
    assert_eq!(body["queriesRemaining"], 0);
}

#[tokio::test]
async fn chat_with_insufficient_balance_is_402_and_uncharged() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(true, dir.path()).await;
    state
        .ledger
        .credit(&WalletAddress::new("0xalice"), dec!(0.05), None)
        .await
        .unwrap();
    let router = create_router(state.clone());

    let (status, body) = send(
        &router,
        "POST",
        "/api/chat",
        Some("0xalice"),
        Some(json!({"message": "Plan a cheap trip to Tokyo"})),
    )
    .await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["required"], "0.10");
    assert_eq!(body["currentBalance"], "0.05");

    // Balance untouched, nothing distributed
    let balance = state
        .ledger
        .get_balance(&WalletAddress::new("0xalice"))
        .await
        .unwrap();
    assert_eq!(balance.balance, dec!(0.05));
    assert!(state.distributor.distributions().await.is_empty());
}

#[tokio::test]
async fn happy_chat_charges_and_distributes() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(true, dir.path()).await;
    state
        .ledger
        .credit(&WalletAddress::new("0xalice"), dec!(1.00), None)
        .await
        .unwrap();
    let router = create_router(state.clone());

    let (status, body) = send(
        &router,
        "POST",
        "/api/chat",
        Some("0xAlice"),
        Some(json!({"message": "Plan a cheap trip to Tokyo"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["charged"], true);
    assert_eq!(body["newBalance"], "0.90");
    assert!(!body["queryHash"].as_str().unwrap().is_empty());

    let agents_used: Vec<&str> = body["agentsUsed"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert!(agents_used.contains(&"travel-planner"));
    assert!(agents_used.contains(&"budget-planner"));

    // Distribution: half to the platform, the rest split across both agents
    let distributions = state.distributor.distributions().await;
    assert_eq!(distributions.len(), 1);
    assert_eq!(distributions[0].orchestrator_amount, dec!(0.05));
    assert_eq!(distributions[0].agent_payments.len(), agents_used.len());
    assert_eq!(
        distributions[0].agent_payments[0].amount,
        dec!(0.05) / Decimal::from(agents_used.len())
    );

    let balance = state
        .ledger
        .get_balance(&WalletAddress::new("0xalice"))
        .await
        .unwrap();
    assert_eq!(balance.balance, dec!(0.90));
    assert_eq!(balance.total_spent, dec!(0.10));
}

#[tokio::test]
async fn chat_without_wallet_header_is_rejected_when_payments_on() {
    let dir = tempfile::tempdir().unwrap();
    let router = create_router(test_state(true, dir.path()).await);

    let (status, _body) = send(
        &router,
        "POST",
        "/api/chat",
        None,
        Some(json!({"message": "hello"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn chat_with_payments_disabled_never_charges() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(false, dir.path()).await;
    let router = create_router(state.clone());

    let (status, body) = send(
        &router,
        "POST",
        "/api/chat",
        None,
        Some(json!({"message": "what's the weather"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["charged"], false);
    assert!(state.distributor.distributions().await.is_empty());
}

#[tokio::test]
async fn run_without_nodes_is_503() {
    let dir = tempfile::tempdir().unwrap();
    let router = create_router(test_state(true, dir.path()).await);

    let (status, body) = send(
        &router,
        "POST",
        "/api/run",
        None,
        Some(json!({"input": {"task": "x"}})),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "NO_IDLE_NODE");
}

#[tokio::test]
async fn deposit_credits_once_and_rejects_replay() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(true, dir.path()).await;
    let router = create_router(state.clone());

    let (status, body) = send(
        &router,
        "POST",
        "/api/deposit",
        None,
        Some(json!({"txHash": "0xabc", "wallet": "0xalice"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["deposited"], "1.00");
    assert_eq!(body["newBalance"], "1.00");

    // Replay: rejected, balance unchanged
    let (status, body) = send(
        &router,
        "POST",
        "/api/deposit",
        None,
        Some(json!({"txHash": "0xabc", "wallet": "0xalice"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "DEPOSIT_ALREADY_PROCESSED");

    let balance = state
        .ledger
        .get_balance(&WalletAddress::new("0xalice"))
        .await
        .unwrap();
    assert_eq!(balance.balance, dec!(1.00));
}

#[tokio::test]
async fn deposit_with_bad_transaction_is_400() {
    let dir = tempfile::tempdir().unwrap();
    let router = create_router(test_state(true, dir.path()).await);

    let (status, body) = send(
        &router,
        "POST",
        "/api/deposit",
        None,
        Some(json!({"txHash": "0xdeadbeef", "wallet": "0xalice"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "DEPOSIT_INVALID");
}

#[tokio::test]
async fn agent_crud_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let router = create_router(test_state(true, dir.path()).await);

    let (status, body) = send(&router, "GET", "/api/agents", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 15);

    let agent = json!({
        "id": "my-agent",
        "name": "My Agent",
        "description": "custom",
        "systemPrompt": "You are custom.",
        "tools": [],
        "keywords": ["custom"],
    });
    let (status, _) = send(&router, "POST", "/api/agents", None, Some(agent.clone())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&router, "GET", "/api/agents/my-agent", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "My Agent");

    let (status, _) = send(&router, "DELETE", "/api/agents/my-agent", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&router, "GET", "/api/agents/my-agent", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn monitor_endpoints_return_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(true, dir.path()).await;
    state.monitor.info("test", "hello from tests");
    let router = create_router(state);

    let (status, body) = send(&router, "GET", "/api/monitor/logs", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = send(&router, "GET", "/api/status", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["nodes"]["total"], 0);
    assert_eq!(body["agentCount"], 15);

    let (status, body) = send(&router, "GET", "/api/payments", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());
}
