//! Swarmlink API - the control plane's HTTP surface
//!
//! Exposes query submission, single-job dispatch, deposits, balances, agent
//! CRUD, and observability snapshots, plus the `/ws` upgrade endpoint the
//! worker fleet connects to. CORS is wide open with the three headers the
//! web client sends.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod ws;

pub use error::ApiError;
pub use routes::create_router;
pub use state::{ApiConfig, AppState};
