//! Platform status summary

use axum::{extract::State, Json};
use serde::Serialize;

use swarmlink_dispatch::QueueDepths;
use swarmlink_registry::RegistrySummary;

use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub nodes: RegistrySummary,
    pub queue: QueueDepths,
    pub in_flight_dispatches: usize,
    pub agent_count: usize,
    pub payments_enabled: bool,
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        nodes: state.registry.summary().await,
        queue: state.queue.depths().await,
        in_flight_dispatches: state.dispatcher.in_flight(),
        agent_count: state.agents.list().len(),
        payments_enabled: state.config.payments_enabled,
    })
}
