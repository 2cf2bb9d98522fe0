//! Payment distributor - splits successful payments between platform and agents

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

use swarmlink_types::DistributionId;

use crate::backend::SettlementBackend;

/// How payouts leave the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistributionMode {
    /// Credit in-memory agent wallets
    Internal,
    /// Transfer on-chain through the settlement backend
    OnChain,
}

#[derive(Debug, Clone)]
pub struct DistributorConfig {
    pub mode: DistributionMode,
    /// Fraction of each payment kept by the platform (default 0.5)
    pub orchestrator_share: Decimal,
    /// Pause between consecutive on-chain transfers (nonce hygiene)
    pub inter_transfer_delay: Duration,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            mode: DistributionMode::Internal,
            orchestrator_share: Decimal::new(5, 1),
            inter_transfer_delay: Duration::from_millis(200),
        }
    }
}

/// Ledger entry kind for a component transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    UserPayment,
    OrchestratorShare,
    AgentPayout,
}

/// One component transaction of a distribution
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementTransaction {
    pub kind: TransactionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterparty: Option<String>,
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_tx_id: Option<String>,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

/// Payout target: an agent and its optional on-chain address
#[derive(Debug, Clone)]
pub struct AgentPayee {
    pub agent_id: String,
    pub address: Option<String>,
}

/// Outcome of one agent's payout
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPayment {
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_tx_id: Option<String>,
    pub success: bool,
}

/// Record of one completed distribution
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDistribution {
    pub id: DistributionId,
    pub total_amount: Decimal,
    pub orchestrator_amount: Decimal,
    pub agent_payments: Vec<AgentPayment>,
    pub on_chain: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Default)]
struct DistributorState {
    transactions: Vec<SettlementTransaction>,
    distributions: Vec<PaymentDistribution>,
    /// Internal-mode agent wallet balances, keyed by agent id
    agent_wallets: std::collections::HashMap<String, Decimal>,
}

/// Splits successful payments; records every outcome, rolls back nothing
pub struct PaymentDistributor {
    config: DistributorConfig,
    backend: Arc<dyn SettlementBackend>,
    state: RwLock<DistributorState>,
}

impl PaymentDistributor {
    pub fn new(config: DistributorConfig, backend: Arc<dyn SettlementBackend>) -> Self {
        Self {
            config,
            backend,
            state: RwLock::new(DistributorState::default()),
        }
    }

    /// Distribute `total` between the platform and `agents`.
    ///
    /// Called only after the corresponding query succeeded and its balance
    /// deduction returned true. Per-agent failures are captured in the
    /// returned record; earlier transfers stand and the user is not refunded.
    pub async fn distribute(
        &self,
        total: Decimal,
        agents: &[AgentPayee],
        user_wallet: Option<&str>,
        user_external_tx_id: Option<&str>,
    ) -> PaymentDistribution {
        let now = Utc::now();
        let orchestrator_amount = total * self.config.orchestrator_share;
        let agent_pool = total - orchestrator_amount;
        let per_agent = agent_pool / Decimal::from(agents.len().max(1));

        let mut transactions = vec![
            SettlementTransaction {
                kind: TransactionKind::UserPayment,
                counterparty: user_wallet.map(str::to_string),
                amount: total,
                external_tx_id: user_external_tx_id.map(str::to_string),
                success: true,
                timestamp: now,
            },
            SettlementTransaction {
                kind: TransactionKind::OrchestratorShare,
                counterparty: None,
                amount: orchestrator_amount,
                external_tx_id: None,
                success: true,
                timestamp: now,
            },
        ];

        let mut agent_payments = Vec::with_capacity(agents.len());
        let on_chain = self.config.mode == DistributionMode::OnChain;

        for (i, payee) in agents.iter().enumerate() {
            let payment = match (&self.config.mode, &payee.address) {
                (DistributionMode::OnChain, Some(address)) => {
                    if i > 0 {
                        tokio::time::sleep(self.config.inter_transfer_delay).await;
                    }
                    match self.backend.transfer(address, per_agent).await {
                        Ok(tx_id) => {
                            info!(agent = %payee.agent_id, %tx_id, "agent payout transferred");
                            AgentPayment {
                                agent_id: payee.agent_id.clone(),
                                address: payee.address.clone(),
                                amount: per_agent,
                                external_tx_id: Some(tx_id),
                                success: true,
                            }
                        }
                        Err(e) => {
                            warn!(agent = %payee.agent_id, error = %e, "agent payout failed");
                            AgentPayment {
                                agent_id: payee.agent_id.clone(),
                                address: payee.address.clone(),
                                amount: per_agent,
                                external_tx_id: None,
                                success: false,
                            }
                        }
                    }
                }
                // Internal mode, or on-chain with no payout address
                _ => {
                    let mut state = self.state.write().await;
                    *state
                        .agent_wallets
                        .entry(payee.agent_id.clone())
                        .or_insert(Decimal::ZERO) += per_agent;
                    AgentPayment {
                        agent_id: payee.agent_id.clone(),
                        address: payee.address.clone(),
                        amount: per_agent,
                        external_tx_id: None,
                        success: true,
                    }
                }
            };

            transactions.push(SettlementTransaction {
                kind: TransactionKind::AgentPayout,
                counterparty: Some(payee.agent_id.clone()),
                amount: per_agent,
                external_tx_id: payment.external_tx_id.clone(),
                success: payment.success,
                timestamp: Utc::now(),
            });
            agent_payments.push(payment);
        }

        let distribution = PaymentDistribution {
            id: DistributionId::new(),
            total_amount: total,
            orchestrator_amount,
            agent_payments,
            on_chain,
            timestamp: now,
        };

        let mut state = self.state.write().await;
        state.transactions.extend(transactions);
        state.distributions.push(distribution.clone());
        distribution
    }

    /// Snapshot of all component transactions
    pub async fn transactions(&self) -> Vec<SettlementTransaction> {
        self.state.read().await.transactions.clone()
    }

    /// Snapshot of all distribution records
    pub async fn distributions(&self) -> Vec<PaymentDistribution> {
        self.state.read().await.distributions.clone()
    }

    /// Internal wallet balance for an agent
    pub async fn agent_balance(&self, agent_id: &str) -> Decimal {
        self.state
            .read()
            .await
            .agent_wallets
            .get(agent_id)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }
}
