//! Settlement backend - the platform's view of the chain

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use swarmlink_types::{Result, SwarmlinkError, WalletAddress};

/// Facts about a deposit transaction, as reported by the facilitator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositCheck {
    /// Whether the transaction is confirmed on chain
    pub confirmed: bool,
    /// Sender of the value transfer
    pub from: WalletAddress,
    /// Recipient of the value transfer
    pub to: WalletAddress,
    /// Transferred amount in USDC
    pub amount: Decimal,
}

/// External settlement capability: inspect deposits, move value out
#[async_trait]
pub trait SettlementBackend: Send + Sync {
    /// Inspect the transaction identified by `tx_hash`
    async fn verify_deposit(&self, tx_hash: &str) -> Result<DepositCheck>;

    /// Transfer `amount` USDC to `to`; returns the external transaction id
    async fn transfer(&self, to: &str, amount: Decimal) -> Result<String>;
}

/// HTTP facilitator-backed settlement
pub struct HttpSettlementBackend {
    facilitator_url: String,
    rpc_url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyRequest<'a> {
    tx_hash: &'a str,
    rpc_url: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TransferRequest<'a> {
    to: &'a str,
    amount: Decimal,
    rpc_url: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferResponse {
    tx_hash: String,
}

impl HttpSettlementBackend {
    pub fn new(facilitator_url: impl Into<String>, rpc_url: impl Into<String>) -> Self {
        Self {
            facilitator_url: facilitator_url.into(),
            rpc_url: rpc_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SettlementBackend for HttpSettlementBackend {
    async fn verify_deposit(&self, tx_hash: &str) -> Result<DepositCheck> {
        let url = format!("{}/verify", self.facilitator_url);
        let response = self
            .client
            .post(&url)
            .json(&VerifyRequest {
                tx_hash,
                rpc_url: &self.rpc_url,
            })
            .send()
            .await
            .map_err(|e| SwarmlinkError::DepositInvalid {
                reason: format!("facilitator unreachable: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(SwarmlinkError::DepositInvalid {
                reason: format!("facilitator returned HTTP {}", response.status()),
            });
        }

        response
            .json()
            .await
            .map_err(|e| SwarmlinkError::DepositInvalid {
                reason: format!("malformed facilitator response: {e}"),
            })
    }

    async fn transfer(&self, to: &str, amount: Decimal) -> Result<String> {
        let url = format!("{}/transfer", self.facilitator_url);
        let response = self
            .client
            .post(&url)
            .json(&TransferRequest {
                to,
                amount,
                rpc_url: &self.rpc_url,
            })
            .send()
            .await
            .map_err(|e| SwarmlinkError::OnChainFailure {
                reason: format!("facilitator unreachable: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(SwarmlinkError::OnChainFailure {
                reason: format!("transfer rejected with HTTP {}", response.status()),
            });
        }

        let body: TransferResponse =
            response
                .json()
                .await
                .map_err(|e| SwarmlinkError::OnChainFailure {
                    reason: format!("malformed transfer response: {e}"),
                })?;
        Ok(body.tx_hash)
    }
}
