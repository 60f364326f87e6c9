use axum::extract::State;
use axum::{routing::get, Json, Router};
use meritum_events::ConsumerState;
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok` while the completion consumer is reading, `degraded` otherwise.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Registered WebSocket connections.
    pub connections: usize,
    /// Users with an indexed connection.
    pub users: usize,
    pub consumer: ConsumerState,
}

/// GET /health -- returns service, registry and consumer health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.hub.stats().await;
    let consumer = *state.consumer_state.borrow();

    let status = if consumer == ConsumerState::Reading {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        connections: stats.connections,
        users: stats.users,
        consumer,
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
