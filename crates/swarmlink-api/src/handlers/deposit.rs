//! Deposit verification and balance queries

use axum::{
    extract::{Query, State},
    Json,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use swarmlink_types::WalletAddress;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRequest {
    pub tx_hash: String,
    pub wallet: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositResponse {
    pub success: bool,
    pub deposited: Decimal,
    pub new_balance: Decimal,
}

pub async fn deposit(
    State(state): State<AppState>,
    Json(body): Json<DepositRequest>,
) -> Result<Json<DepositResponse>, ApiError> {
    if body.tx_hash.trim().is_empty() {
        return Err(ApiError::bad_request("txHash must not be empty"));
    }
    let wallet = WalletAddress::new(&body.wallet);
    let outcome = state
        .ledger
        .verify_and_credit(state.settlement.as_ref(), body.tx_hash.trim(), &wallet)
        .await?;

    Ok(Json(DepositResponse {
        success: true,
        deposited: outcome.deposited,
        new_balance: outcome.new_balance,
    }))
}

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    pub wallet: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub wallet: WalletAddress,
    pub balance: Decimal,
    pub total_deposited: Decimal,
    pub total_spent: Decimal,
    pub query_price: Decimal,
    pub queries_remaining: u64,
}

pub async fn balance(
    State(state): State<AppState>,
    Query(query): Query<BalanceQuery>,
) -> Json<BalanceResponse> {
    let wallet = WalletAddress::new(&query.wallet);
    let balance = state.ledger.get_or_create(&wallet).await;
    let price = state.config.query_price;

    let queries_remaining = if price > Decimal::ZERO {
        (balance.balance / price).trunc().to_u64().unwrap_or(0)
    } else {
        0
    };

    Json(BalanceResponse {
        wallet: balance.wallet,
        balance: balance.balance,
        total_deposited: balance.total_deposited,
        total_spent: balance.total_spent,
        query_price: price,
        queries_remaining,
    })
}
