//! Route definitions

use axum::{
    http::{header, Method},
    routing::get,
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the full control-plane router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-wallet-address"),
            header::HeaderName::from_static("x-payment-tx"),
        ]);

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ws", get(ws::worker_ws_handler))
        .nest("/api", api_routes())
        .layer(cors)
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    use axum::routing::post;

    Router::new()
        .route("/status", get(handlers::status::status))
        .route("/chat", post(handlers::chat::chat))
        .route("/run", post(handlers::run::run))
        .route("/deposit", post(handlers::deposit::deposit))
        .route("/balance", get(handlers::deposit::balance))
        .route("/feedback", post(handlers::feedback::feedback))
        .route(
            "/agents",
            get(handlers::agents::list).post(handlers::agents::create),
        )
        .route(
            "/agents/{id}",
            get(handlers::agents::get_one)
                .put(handlers::agents::update)
                .delete(handlers::agents::delete),
        )
        .route("/payments", get(handlers::monitor::payments))
        .route("/transactions", get(handlers::monitor::transactions))
        .route("/monitor", get(handlers::monitor::overview))
        .route("/monitor/nodes", get(handlers::monitor::nodes))
        .route("/monitor/logs", get(handlers::monitor::logs))
        .route("/monitor/history", get(handlers::monitor::history))
}
