//! # Web API
//!
//! Axum-based HTTP surface for health reporting. Two endpoints: a bare
//! liveness probe and a detailed report of circuit states and consumer lag.
//! Degraded is a reportable condition, not an error status.

pub mod handlers;
pub mod state;

use axum::routing::get;
use axum::Router;

pub use state::AppState;

/// Build the health router over the shared application state
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::basic_health))
        .route("/health/detailed", get(handlers::health::detailed_health))
        .with_state(state)
}
