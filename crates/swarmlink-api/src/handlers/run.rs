//! Single-job dispatch

use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub input: serde_json::Value,
    #[serde(default)]
    pub agent_id: Option<String>,
    /// Per-dispatch deadline in milliseconds
    #[serde(default)]
    pub timeout: Option<u64>,
}

pub async fn run(
    State(state): State<AppState>,
    Json(body): Json<RunRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .runner
        .run(body.input, body.agent_id, body.timeout)
        .await?;
    Ok(Json(result))
}
