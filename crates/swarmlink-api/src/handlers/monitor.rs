//! Observability snapshots

use axum::{extract::State, Json};
use serde::Serialize;
use std::collections::HashMap;

use swarmlink_monitor::{ConnectionEvent, JobCounters, LogEntry};
use swarmlink_settlement::{PaymentDistribution, SettlementTransaction};
use swarmlink_types::{NodeId, NodeRecord};

use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorOverview {
    pub nodes: Vec<NodeRecord>,
    pub job_counters: HashMap<NodeId, JobCounters>,
    pub recent_logs: Vec<LogEntry>,
    pub history: Vec<ConnectionEvent>,
}

pub async fn overview(State(state): State<AppState>) -> Json<MonitorOverview> {
    Json(MonitorOverview {
        nodes: state.registry.all_nodes().await,
        job_counters: state.monitor.counters(),
        recent_logs: state.monitor.logs(),
        history: state.monitor.history(),
    })
}

pub async fn nodes(State(state): State<AppState>) -> Json<Vec<NodeRecord>> {
    Json(state.registry.all_nodes().await)
}

pub async fn logs(State(state): State<AppState>) -> Json<Vec<LogEntry>> {
    Json(state.monitor.logs())
}

pub async fn history(State(state): State<AppState>) -> Json<Vec<ConnectionEvent>> {
    Json(state.monitor.history())
}

pub async fn payments(State(state): State<AppState>) -> Json<Vec<PaymentDistribution>> {
    Json(state.distributor.distributions().await)
}

pub async fn transactions(State(state): State<AppState>) -> Json<Vec<SettlementTransaction>> {
    Json(state.distributor.transactions().await)
}
