//! Worker WebSocket endpoint

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::IntoResponse,
};

use crate::state::AppState;

/// Upgrade handler for `/ws`: hands the socket to the supervisor
pub async fn worker_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let supervisor = state.supervisor.clone();
    ws.on_upgrade(move |socket| supervisor.handle_socket(socket))
}
