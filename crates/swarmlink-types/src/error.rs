//! Error types for Swarmlink
//!
//! A single platform-wide enum; each variant maps to a stable error code
//! used in ERROR frames and HTTP responses.

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for swarmlink operations
pub type Result<T> = std::result::Result<T, SwarmlinkError>;

/// Swarmlink error types
#[derive(Debug, Clone, Error)]
pub enum SwarmlinkError {
    // ========================================================================
    // Protocol Errors
    // ========================================================================

    /// Inbound frame could not be decoded
    #[error("Malformed frame: {reason}")]
    MalformedFrame { reason: String },

    /// Peer failed to authenticate within the deadline
    #[error("Authentication deadline expired")]
    AuthTimeout,

    /// Peer presented invalid credentials
    #[error("Invalid credentials")]
    AuthDenied,

    /// Frame received from a node the registry does not know
    #[error("Node {node_id} is not registered")]
    NotRegistered { node_id: String },

    // ========================================================================
    // Dispatch Errors
    // ========================================================================

    /// No online node advertises the required capabilities
    #[error("No node satisfies required capabilities: {required}")]
    CapabilityMismatch { required: String },

    /// Every eligible node is busy or offline
    #[error("No idle nodes available")]
    NoIdleNode,

    /// The dispatch deadline fired before a result arrived
    #[error("Job {run_id} timed out after {timeout_ms}ms")]
    JobTimeout { run_id: String, timeout_ms: u64 },

    /// The worker reported a failure
    #[error("Job failed: {reason}")]
    JobFailed { reason: String },

    /// Retries exhausted; the job was dead-lettered
    #[error("Job {job_id} dead-lettered: {reason}")]
    DeadLetter { job_id: String, reason: String },

    // ========================================================================
    // Ledger Errors
    // ========================================================================

    /// Balance too low for the requested operation
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },

    /// Deposit transaction was already credited
    #[error("Deposit {tx_id} already processed")]
    DepositAlreadyProcessed { tx_id: String },

    /// Deposit sender does not match the claiming wallet
    #[error("Deposit sender mismatch: expected {expected}, got {actual}")]
    DepositSenderMismatch { expected: String, actual: String },

    /// Deposit transaction failed verification
    #[error("Deposit verification failed: {reason}")]
    DepositInvalid { reason: String },

    // ========================================================================
    // Settlement Errors
    // ========================================================================

    /// On-chain transfer failed
    #[error("On-chain settlement failure: {reason}")]
    OnChainFailure { reason: String },

    // ========================================================================
    // Orchestration Errors
    // ========================================================================

    /// The planner backend could not be reached or returned garbage
    #[error("Planner unavailable: {reason}")]
    PlannerUnavailable { reason: String },

    /// Requested agent does not exist in the catalogue or store
    #[error("Agent {agent_id} not found")]
    AgentNotFound { agent_id: String },

    // ========================================================================
    // General Errors
    // ========================================================================

    /// Persistence failure
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SwarmlinkError {
    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a malformed-frame error
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedFrame {
            reason: reason.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Whether the connection carrying this error must be closed
    pub fn is_fatal_for_connection(&self) -> bool {
        matches!(
            self,
            Self::AuthTimeout | Self::AuthDenied | Self::NotRegistered { .. }
        )
    }

    /// Stable error code for ERROR frames and HTTP bodies
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MalformedFrame { .. } => "INVALID_MESSAGE",
            Self::AuthTimeout => "AUTH_TIMEOUT",
            Self::AuthDenied => "AUTH_DENIED",
            Self::NotRegistered { .. } => "NOT_REGISTERED",
            Self::CapabilityMismatch { .. } => "CAPABILITY_MISMATCH",
            Self::NoIdleNode => "NO_IDLE_NODE",
            Self::JobTimeout { .. } => "JOB_TIMEOUT",
            Self::JobFailed { .. } => "JOB_FAILED",
            Self::DeadLetter { .. } => "DEAD_LETTER",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::DepositAlreadyProcessed { .. } => "DEPOSIT_ALREADY_PROCESSED",
            Self::DepositSenderMismatch { .. } => "DEPOSIT_SENDER_MISMATCH",
            Self::DepositInvalid { .. } => "DEPOSIT_INVALID",
            Self::OnChainFailure { .. } => "ONCHAIN_FAILURE",
            Self::PlannerUnavailable { .. } => "PLANNER_UNAVAILABLE",
            Self::AgentNotFound { .. } => "AGENT_NOT_FOUND",
            Self::Storage { .. } => "STORAGE_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn error_codes_are_stable() {
        let err = SwarmlinkError::InsufficientBalance {
            required: dec!(0.10),
            available: dec!(0.05),
        };
        assert_eq!(err.error_code(), "INSUFFICIENT_BALANCE");
        assert_eq!(SwarmlinkError::NoIdleNode.error_code(), "NO_IDLE_NODE");
    }

    #[test]
    fn fatal_classification() {
        assert!(SwarmlinkError::AuthDenied.is_fatal_for_connection());
        assert!(SwarmlinkError::AuthTimeout.is_fatal_for_connection());
        assert!(!SwarmlinkError::malformed("bad json").is_fatal_for_connection());
        assert!(!SwarmlinkError::NoIdleNode.is_fatal_for_connection());
    }
}
