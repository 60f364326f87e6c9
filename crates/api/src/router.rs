//! Router assembly shared by `main.rs` and the integration tests.

use std::time::Duration;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, StatusCode};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::config::ServerConfig;
use crate::routes;
use crate::state::AppState;

const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Health, the `/api/v1` job routes and the `/ws` upgrade behind one set of
/// layers.
///
/// Only the HTTP routes get the request timeout. A socket lives for as long as
/// its pumps do, so `/ws` is merged in after the timeout is applied.
pub fn build_app_router(state: AppState, config: &ServerConfig) -> Router {
    let timeout = TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        Duration::from_secs(config.request_timeout_secs),
    );
    let http_routes = Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .layer(timeout);

    let trace = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    // Outermost last: CORS sees the request first, panics are caught closest
    // to the handlers.
    Router::new()
        .merge(http_routes)
        .merge(routes::ws_routes())
        .layer(CatchPanicLayer::new())
        .layer(PropagateRequestIdLayer::new(REQUEST_ID))
        .layer(trace)
        .layer(SetRequestIdLayer::new(REQUEST_ID, MakeRequestUuid))
        .layer(cors_layer(&config.cors_origins))
        .with_state(state)
}

/// Browser access for the configured origins. Origins are checked when the
/// config is loaded, so anything that fails to parse here is skipped.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
