//! Agent store CRUD

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use swarmlink_agents::AgentDefinition;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AgentListResponse {
    pub agents: Vec<AgentDefinition>,
    pub count: usize,
}

pub async fn list(State(state): State<AppState>) -> Json<AgentListResponse> {
    let agents = state.agents.list();
    let count = agents.len();
    Json(AgentListResponse { agents, count })
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AgentDefinition>, ApiError> {
    state
        .agents
        .get(&id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("agent {id} not found")))
}

pub async fn create(
    State(state): State<AppState>,
    Json(agent): Json<AgentDefinition>,
) -> Result<Json<AgentDefinition>, ApiError> {
    if agent.id.trim().is_empty() {
        return Err(ApiError::bad_request("agent id must not be empty"));
    }
    if state.agents.get(&agent.id).is_some() {
        return Err(ApiError::bad_request(format!(
            "agent {} already exists",
            agent.id
        )));
    }
    state.agents.create(agent.clone())?;
    Ok(Json(agent))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(agent): Json<AgentDefinition>,
) -> Result<Json<AgentDefinition>, ApiError> {
    if agent.id != id {
        return Err(ApiError::bad_request("agent id in body must match path"));
    }
    state.agents.update(&id, agent.clone())?;
    Ok(Json(agent))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.agents.delete(&id)?;
    Ok(Json(serde_json::json!({ "success": true, "deleted": id })))
}
