//! HTTP surface for the `itinerad` daemon.
//!
//! - Configuration types (`config`)
//! - axum routes and error-to-status mapping (`routes`)
//!
//! The daemon owns its counter store. Remote-store clients in other
//! processes read counters through `/usage` and write them back with a
//! revision check, so they share the daemon's budget.

pub mod config;
pub mod routes;

pub use routes::{AppState, build_router};
