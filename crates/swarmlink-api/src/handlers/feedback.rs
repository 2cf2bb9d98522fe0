//! Query feedback intake

use axum::{extract::State, Json};
use serde::Deserialize;

use swarmlink_monitor::LogLevel;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub query_hash: String,
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
}

pub async fn feedback(
    State(state): State<AppState>,
    Json(body): Json<FeedbackRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !(1..=5).contains(&body.rating) {
        return Err(ApiError::bad_request("rating must be between 1 and 5"));
    }

    state.monitor.log(
        LogLevel::Info,
        "feedback",
        format!(
            "query {} rated {}{}",
            body.query_hash,
            body.rating,
            body.comment
                .as_deref()
                .map(|c| format!(": {c}"))
                .unwrap_or_default()
        ),
        None,
        None,
    );

    Ok(Json(serde_json::json!({ "success": true })))
}
