//! Swarmlink Types - Canonical domain types for the agent execution platform
//!
//! This crate contains the foundational types shared by every other
//! swarmlink crate, with no dependencies on the rest of the workspace:
//!
//! - Identity types (NodeId, WalletAddress, JobId, RunId, ...)
//! - Node records, capabilities, and live metrics
//! - Job records and lifecycle status
//! - The platform-wide error enum
//!
//! # Invariants carried by these types
//!
//! 1. Wallet addresses are normalized to lowercase at construction
//! 2. A `RunId` correlates exactly one in-flight dispatch attempt
//! 3. Balances never go negative (enforced by the ledger crate)

pub mod error;
pub mod identity;
pub mod job;
pub mod node;

pub use error::*;
pub use identity::*;
pub use job::*;
pub use node::*;

/// Version of the swarmlink wire/type schema
pub const SCHEMA_VERSION: &str = "1.0";
