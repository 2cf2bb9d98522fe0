//! Request handlers

pub mod agents;
pub mod chat;
pub mod deposit;
pub mod feedback;
pub mod health;
pub mod monitor;
pub mod run;
pub mod status;
