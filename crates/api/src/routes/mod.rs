pub mod documents;
pub mod health;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /documents/queue    POST, bearer auth
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/documents", documents::router())
}

/// Real-time notification socket (root level, `GET /ws?token=...`).
pub fn ws_routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws::ws_handler))
}
