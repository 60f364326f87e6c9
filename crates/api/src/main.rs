use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use meritum_api::auth::jwt::JwtVerifier;
use meritum_api::config::ServerConfig;
use meritum_api::router::build_app_router;
use meritum_api::state::AppState;
use meritum_api::{broker, ws};
use meritum_events::{CompletionConsumer, ConsumerConfig, JobProducer};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "meritum_api=debug,meritum_events=debug,tower_http=debug".into()
            }),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(|| tracing_subscriber::fmt::layer()))
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env().expect("Invalid server configuration");
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Broker ---
    let brokers = broker::connect(&config.broker).expect("Failed to connect to broker");
    let producer = JobProducer::new(Arc::clone(&brokers.publisher))
        .with_topic(config.broker.job_requests_topic.clone())
        .with_publish_timeout(config.broker.publish_timeout);

    // --- Connection registry ---
    let hub_cancel = CancellationToken::new();
    let (hub, hub_handle) = ws::Hub::start(config.ws.policy, hub_cancel.clone());
    tracing::info!(policy = ?config.ws.policy, "Connection registry started");

    // --- Completion consumer ---
    let consumer_config = ConsumerConfig {
        topic: config.broker.completion_topic.clone(),
        group_id: config.broker.completion_group_id.clone(),
        initial_backoff: config.broker.backoff_initial,
        max_backoff: config.broker.backoff_max,
    };
    let consumer = CompletionConsumer::start(
        brokers.subscriber.as_ref(),
        &consumer_config,
        Arc::new(hub.clone()),
    )
    .await
    .expect("Failed to subscribe to completion topic");
    let consumer_state = consumer.state();
    let consumer_cancel = CancellationToken::new();
    let consumer_handle = tokio::spawn(consumer.run(consumer_cancel.clone()));

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        hub,
        producer,
        verifier: Arc::new(JwtVerifier::new(config.jwt.clone())),
        consumer_state,
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    let grace = Duration::from_secs(config.shutdown_timeout_secs);

    // Stop reading completions first so nothing new is dispatched.
    consumer_cancel.cancel();
    match tokio::time::timeout(grace, consumer_handle).await {
        Ok(Ok(stats)) => tracing::info!(?stats, "Completion consumer stopped"),
        Ok(Err(e)) => tracing::error!(error = %e, "Completion consumer task failed"),
        Err(_) => tracing::warn!("Completion consumer did not stop in time"),
    }

    // Dropping every connection sends close frames to the clients.
    hub_cancel.cancel();
    if tokio::time::timeout(grace, hub_handle).await.is_err() {
        tracing::warn!("Connection registry did not stop in time");
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
