//! Swarmlink Settlement - deposit verification and payout distribution
//!
//! The [`SettlementBackend`] trait is the platform's only view of the chain:
//! deposit inspection and outbound transfers. [`PaymentDistributor`] splits a
//! successful query's price between the platform and the participating
//! agents, either crediting internal wallets or transferring on-chain.
//!
//! Distribution is a post-success best-effort side effect: a failed agent
//! transfer is recorded but never rolls back earlier transfers and never
//! refunds the user.

pub mod backend;
pub mod distributor;

pub use backend::{DepositCheck, HttpSettlementBackend, SettlementBackend};
pub use distributor::{
    AgentPayee, AgentPayment, DistributionMode, DistributorConfig, PaymentDistribution,
    PaymentDistributor, SettlementTransaction, TransactionKind,
};
