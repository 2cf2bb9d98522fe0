//! Swarmlink Ledger - prepaid user balances
//!
//! Invariants:
//!
//! 1. `balance == total_deposited - total_spent` and is never negative
//! 2. A deposit transaction id is credited at most once; membership in the
//!    processed set is the sole gate on crediting
//! 3. `deduct` is the atomic point: the balance check and mutation happen
//!    under one write lock
//!
//! Persistence is two JSON files in the data directory, `balances.json` and
//! `processed-deposits.json`, each written temp-then-rename after every
//! successful deduct/credit. In-memory state briefly leads disk; the rename
//! keeps every on-disk snapshot internally consistent.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

use swarmlink_settlement::SettlementBackend;
use swarmlink_types::{Result, SwarmlinkError, WalletAddress};

const BALANCES_FILE: &str = "balances.json";
const DEPOSITS_FILE: &str = "processed-deposits.json";

/// One credited deposit in a wallet's history
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRecord {
    pub tx_id: String,
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Per-wallet prepaid balance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBalance {
    pub wallet: WalletAddress,
    pub balance: Decimal,
    pub total_deposited: Decimal,
    pub total_spent: Decimal,
    pub deposit_history: Vec<DepositRecord>,
    pub last_activity: DateTime<Utc>,
}

impl UserBalance {
    fn new(wallet: WalletAddress) -> Self {
        Self {
            wallet,
            balance: Decimal::ZERO,
            total_deposited: Decimal::ZERO,
            total_spent: Decimal::ZERO,
            deposit_history: Vec::new(),
            last_activity: Utc::now(),
        }
    }
}

/// Outcome of a verified deposit
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditOutcome {
    pub deposited: Decimal,
    pub new_balance: Decimal,
}

#[derive(Default)]
struct LedgerState {
    balances: HashMap<WalletAddress, UserBalance>,
    processed_deposits: HashSet<String>,
}

/// The prepaid balance ledger
pub struct BalanceLedger {
    state: RwLock<LedgerState>,
    data_dir: PathBuf,
    /// Deposits must pay this wallet; unchecked when unset
    platform_wallet: Option<WalletAddress>,
}

impl BalanceLedger {
    /// Open the ledger, loading any persisted state from `data_dir`
    pub async fn open(
        data_dir: impl AsRef<Path>,
        platform_wallet: Option<WalletAddress>,
    ) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .map_err(|e| SwarmlinkError::storage(format!("create {data_dir:?}: {e}")))?;

        let mut state = LedgerState::default();

        let balances_path = data_dir.join(BALANCES_FILE);
        if let Ok(bytes) = tokio::fs::read(&balances_path).await {
            let balances: Vec<UserBalance> = serde_json::from_slice(&bytes)
                .map_err(|e| SwarmlinkError::storage(format!("parse {BALANCES_FILE}: {e}")))?;
            info!(count = balances.len(), "loaded persisted balances");
            state.balances = balances.into_iter().map(|b| (b.wallet.clone(), b)).collect();
        }

        let deposits_path = data_dir.join(DEPOSITS_FILE);
        if let Ok(bytes) = tokio::fs::read(&deposits_path).await {
            state.processed_deposits = serde_json::from_slice(&bytes)
                .map_err(|e| SwarmlinkError::storage(format!("parse {DEPOSITS_FILE}: {e}")))?;
        }

        Ok(Self {
            state: RwLock::new(state),
            data_dir,
            platform_wallet,
        })
    }

    /// Current balance record, if the wallet has one
    pub async fn get_balance(&self, wallet: &WalletAddress) -> Option<UserBalance> {
        self.state.read().await.balances.get(wallet).cloned()
    }

    /// Balance record, creating a zeroed one if absent
    pub async fn get_or_create(&self, wallet: &WalletAddress) -> UserBalance {
        let mut state = self.state.write().await;
        state
            .balances
            .entry(wallet.clone())
            .or_insert_with(|| UserBalance::new(wallet.clone()))
            .clone()
    }

    /// Whether the wallet can cover `amount`
    pub async fn has_enough(&self, wallet: &WalletAddress, amount: Decimal) -> bool {
        self.state
            .read()
            .await
            .balances
            .get(wallet)
            .map(|b| b.balance >= amount)
            .unwrap_or(false)
    }

    /// Atomically deduct `amount`. Returns `false` (without persisting) when
    /// the balance is insufficient.
    ///
    /// Callers charge only after a query produced at least one non-error
    /// agent result, so failed queries never reach this point.
    pub async fn deduct(&self, wallet: &WalletAddress, amount: Decimal) -> Result<bool> {
        {
            let mut state = self.state.write().await;
            let entry = match state.balances.get_mut(wallet) {
                Some(entry) if entry.balance >= amount => entry,
                _ => return Ok(false),
            };
            entry.balance -= amount;
            entry.total_spent += amount;
            entry.last_activity = Utc::now();
            debug!(wallet = %wallet, %amount, balance = %entry.balance, "deducted");
        }
        self.persist_balances().await?;
        Ok(true)
    }

    /// Credit `amount`, optionally recording the deposit transaction id
    pub async fn credit(
        &self,
        wallet: &WalletAddress,
        amount: Decimal,
        tx_id: Option<&str>,
    ) -> Result<CreditOutcome> {
        let outcome = {
            let mut state = self.state.write().await;
            let entry = state
                .balances
                .entry(wallet.clone())
                .or_insert_with(|| UserBalance::new(wallet.clone()));
            entry.balance += amount;
            entry.total_deposited += amount;
            entry.last_activity = Utc::now();
            if let Some(tx_id) = tx_id {
                entry.deposit_history.push(DepositRecord {
                    tx_id: tx_id.to_string(),
                    amount,
                    timestamp: Utc::now(),
                });
            }
            CreditOutcome {
                deposited: amount,
                new_balance: entry.balance,
            }
        };
        self.persist_balances().await?;
        Ok(outcome)
    }

    /// Verify an on-chain deposit and credit it exactly once.
    ///
    /// The transaction must be confirmed, pay the platform wallet, and
    /// originate from `expected_from`. Adding the tx id to the processed set
    /// is the sole gate on crediting.
    pub async fn verify_and_credit(
        &self,
        backend: &dyn SettlementBackend,
        tx_id: &str,
        expected_from: &WalletAddress,
    ) -> Result<CreditOutcome> {
        // Cheap rejection before the facilitator round-trip
        if self.state.read().await.processed_deposits.contains(tx_id) {
            return Err(SwarmlinkError::DepositAlreadyProcessed {
                tx_id: tx_id.to_string(),
            });
        }

        let check = backend.verify_deposit(tx_id).await?;

        if !check.confirmed {
            return Err(SwarmlinkError::DepositInvalid {
                reason: format!("transaction {tx_id} not confirmed"),
            });
        }
        if let Some(platform) = &self.platform_wallet {
            if &check.to != platform {
                return Err(SwarmlinkError::DepositInvalid {
                    reason: format!("transaction {tx_id} does not pay the platform wallet"),
                });
            }
        }
        if &check.from != expected_from {
            return Err(SwarmlinkError::DepositSenderMismatch {
                expected: expected_from.to_string(),
                actual: check.from.to_string(),
            });
        }

        let outcome = {
            let mut state = self.state.write().await;
            // Re-check under the write lock: two concurrent calls with the
            // same tx id must credit exactly once.
            if !state.processed_deposits.insert(tx_id.to_string()) {
                return Err(SwarmlinkError::DepositAlreadyProcessed {
                    tx_id: tx_id.to_string(),
                });
            }
            let entry = state
                .balances
                .entry(expected_from.clone())
                .or_insert_with(|| UserBalance::new(expected_from.clone()));
            entry.balance += check.amount;
            entry.total_deposited += check.amount;
            entry.last_activity = Utc::now();
            entry.deposit_history.push(DepositRecord {
                tx_id: tx_id.to_string(),
                amount: check.amount,
                timestamp: Utc::now(),
            });
            CreditOutcome {
                deposited: check.amount,
                new_balance: entry.balance,
            }
        };

        self.persist_balances().await?;
        self.persist_deposits().await?;
        info!(wallet = %expected_from, tx = tx_id, amount = %outcome.deposited, "deposit credited");
        Ok(outcome)
    }

    async fn persist_balances(&self) -> Result<()> {
        let snapshot: Vec<UserBalance> = {
            let state = self.state.read().await;
            state.balances.values().cloned().collect()
        };
        write_atomically(&self.data_dir.join(BALANCES_FILE), &snapshot).await
    }

    async fn persist_deposits(&self) -> Result<()> {
        let snapshot: Vec<String> = {
            let state = self.state.read().await;
            state.processed_deposits.iter().cloned().collect()
        };
        write_atomically(&self.data_dir.join(DEPOSITS_FILE), &snapshot).await
    }
}

/// Serialize to a sibling temp file, then rename into place
async fn write_atomically<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| SwarmlinkError::storage(format!("serialize {path:?}: {e}")))?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(|e| SwarmlinkError::storage(format!("write {tmp:?}: {e}")))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| SwarmlinkError::storage(format!("rename {tmp:?}: {e}")))?;
    Ok(())
}
