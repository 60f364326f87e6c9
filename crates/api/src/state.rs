use std::sync::Arc;

use meritum_events::{ConsumerState, JobProducer};
use tokio::sync::watch;

use crate::auth::TokenVerifier;
use crate::config::ServerConfig;
use crate::ws::Hub;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Handle to the connection registry.
    pub hub: Hub,
    /// Publishes document jobs for the workers.
    pub producer: JobProducer,
    /// Turns a bearer or query-string token into a user id.
    pub verifier: Arc<dyn TokenVerifier>,
    /// Last reported state of the completion consumer.
    pub consumer_state: watch::Receiver<ConsumerState>,
}
