//! Application state shared across handlers
//!
//! All components are constructed in the composition root and passed in by
//! capability; handlers never reach for globals.

use rust_decimal::Decimal;
use std::sync::Arc;

use swarmlink_agents::AgentStore;
use swarmlink_dispatch::{Dispatcher, JobQueue, JobRunner};
use swarmlink_gateway::ConnectionSupervisor;
use swarmlink_ledger::BalanceLedger;
use swarmlink_monitor::Monitor;
use swarmlink_orchestrator::Orchestrator;
use swarmlink_registry::NodeRegistry;
use swarmlink_settlement::{PaymentDistributor, SettlementBackend};

/// HTTP-facing configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Whether chat queries are charged
    pub payments_enabled: bool,
    /// Price of one chat query in USDC
    pub query_price: Decimal,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            payments_enabled: true,
            query_price: Decimal::new(10, 2),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<NodeRegistry>,
    pub queue: Arc<JobQueue>,
    pub dispatcher: Arc<Dispatcher>,
    pub runner: Arc<JobRunner>,
    pub ledger: Arc<BalanceLedger>,
    pub settlement: Arc<dyn SettlementBackend>,
    pub distributor: Arc<PaymentDistributor>,
    pub agents: Arc<AgentStore>,
    pub orchestrator: Arc<Orchestrator>,
    pub monitor: Arc<Monitor>,
    pub supervisor: Arc<ConnectionSupervisor>,
    pub config: ApiConfig,
}
