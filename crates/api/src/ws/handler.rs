use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use meritum_core::types::UserId;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::config::WsConfig;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::ws::connection::{read_pump, write_pump, Connection, MAX_MESSAGE_SIZE};
use crate::ws::hub::Hub;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// HTTP handler that authenticates the `token` query parameter and upgrades
/// the connection to WebSocket.
///
/// The token is checked before the upgrade, so a rejected client never gets
/// a socket.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> AppResult<Response> {
    let Some(token) = query.token.filter(|t| !t.is_empty()) else {
        tracing::warn!("WebSocket upgrade without token");
        return Err(AppError::unauthorized("No token provided"));
    };

    let user_id = state.verifier.verify(&token).await.map_err(|e| {
        tracing::warn!(error = %e, "WebSocket upgrade with invalid token");
        AppError::unauthorized("Invalid token")
    })?;

    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let hub = state.hub.clone();
    let ws_config = state.config.ws.clone();
    Ok(ws
        .max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, user_id, hub, ws_config))
        .into_response())
}

/// Manage a single WebSocket connection after upgrade.
///
///   1. Registers the connection with the [`Hub`].
///   2. Spawns the write pump, which drains the outbound channel.
///   3. Runs the read pump on the current task until the peer goes away,
///      then unregisters.
async fn handle_socket(socket: WebSocket, user_id: UserId, hub: Hub, config: WsConfig) {
    let (conn, outbound) = Connection::new(user_id, config.outbound_capacity);
    let key = conn.key().clone();
    tracing::info!(conn_id = %key.id, user_id = %key.user_id, "WebSocket connected");

    hub.register(conn).await;

    let (sink, stream) = socket.split();
    let pumps = config.pump_config();
    let writer_done = CancellationToken::new();

    tokio::spawn(write_pump(sink, outbound, key.id, pumps, writer_done.clone()));
    read_pump(stream, key, hub, pumps, writer_done).await;
}
