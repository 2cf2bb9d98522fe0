//! Orchestrated multi-agent chat
//!
//! The charge path is strict: the balance is checked before execution but
//! deducted only after the orchestrator produced at least one non-error
//! agent result, and distribution happens only after the deduction
//! returned true. Failed queries never charge.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{error, info};

use swarmlink_orchestrator::AgentResult;
use swarmlink_settlement::AgentPayee;
use swarmlink_types::{DistributionId, WalletAddress};

use crate::error::ApiError;
use crate::state::AppState;

pub const WALLET_HEADER: &str = "x-wallet-address";

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInfo {
    pub distribution_id: DistributionId,
    pub amount: Decimal,
    pub orchestrator_amount: Decimal,
    pub agents_paid: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub success: bool,
    pub message: String,
    pub agents_used: Vec<String>,
    pub query_hash: String,
    pub agent_results: Vec<AgentResult>,
    pub charged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_balance: Option<Decimal>,
}

fn wallet_from_headers(headers: &HeaderMap) -> Option<WalletAddress> {
    headers
        .get(WALLET_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.trim().is_empty())
        .map(WalletAddress::new)
}

fn query_hash(message: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(message.as_bytes());
    hasher.update(chrono::Utc::now().timestamp_millis().to_be_bytes());
    hex::encode(hasher.finalize())
}

pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ChatRequest>,
) -> Response {
    if body.message.trim().is_empty() {
        return ApiError::bad_request("message must not be empty").into_response();
    }

    let wallet = wallet_from_headers(&headers);
    let price = state.config.query_price;

    // Balance gate: checked up front, deducted only on success
    if state.config.payments_enabled {
        let Some(wallet) = &wallet else {
            return ApiError::bad_request(format!("{WALLET_HEADER} header required"))
                .into_response();
        };
        let balance = state.ledger.get_or_create(wallet).await;
        if balance.balance < price {
            return (
                StatusCode::PAYMENT_REQUIRED,
                Json(json!({
                    "error": "Insufficient balance",
                    "required": price,
                    "currentBalance": balance.balance,
                })),
            )
                .into_response();
        }
    }

    let response = match state.orchestrator.execute(&body.message).await {
        Ok(response) => response,
        Err(e) => {
            // Uncaught orchestrator failure: 500, ledger untouched
            error!(error = %e, "orchestrator failed");
            return ApiError::from(e).into_response();
        }
    };

    let mut charged = false;
    let mut payment = None;
    let mut new_balance = None;

    let should_charge = state.config.payments_enabled && response.is_chargeable();
    if let Some(wallet) = wallet.as_ref().filter(|_| should_charge) {
        match state.ledger.deduct(wallet, price).await {
            Ok(true) => {
                charged = true;
                new_balance = state.ledger.get_balance(wallet).await.map(|b| b.balance);

                let payees: Vec<AgentPayee> = response
                    .agents_used
                    .iter()
                    .map(|id| AgentPayee {
                        agent_id: id.clone(),
                        address: state.agents.get(id).and_then(|a| a.wallet),
                    })
                    .collect();
                let distribution = state
                    .distributor
                    .distribute(price, &payees, Some(wallet.as_str()), None)
                    .await;
                info!(
                    wallet = %wallet,
                    distribution = %distribution.id,
                    "query charged and distributed"
                );
                payment = Some(PaymentInfo {
                    distribution_id: distribution.id,
                    amount: price,
                    orchestrator_amount: distribution.orchestrator_amount,
                    agents_paid: distribution.agent_payments.len(),
                });
            }
            Ok(false) => {
                // Raced to zero between check and success; stay uncharged
                info!(wallet = %wallet, "balance raced below price, query not charged");
            }
            Err(e) => {
                error!(error = %e, "deduct persistence failed");
                return ApiError::from(e).into_response();
            }
        }
    }

    Json(ChatResponse {
        success: true,
        message: response.message,
        agents_used: response.agents_used,
        query_hash: query_hash(&body.message),
        agent_results: response.agent_results,
        charged,
        payment,
        new_balance,
    })
    .into_response()
}
