#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use meritum_api::auth::jwt::{generate_access_token, JwtConfig, JwtVerifier};
use meritum_api::config::{BrokerBackend, BrokerConfig, ServerConfig, WsConfig};
use meritum_api::router::build_app_router;
use meritum_api::state::AppState;
use meritum_api::ws::{ConnectionPolicy, Hub};
use meritum_events::{
    CompletionConsumer, ConsumerConfig, ConsumerState, JobProducer, MemoryBroker,
    COMPLETION_GROUP_ID, COMPLETION_TOPIC, JOB_REQUESTS_TOPIC,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub const TEST_SECRET: &str = "test-secret-that-is-long-enough-for-hmac";

/// Build a test `ServerConfig` with safe defaults and fast timings.
pub fn test_config(policy: ConnectionPolicy) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        jwt: JwtConfig::new(TEST_SECRET),
        broker: BrokerConfig {
            backend: BrokerBackend::Memory,
            kafka_brokers: String::new(),
            job_requests_topic: JOB_REQUESTS_TOPIC.to_string(),
            completion_topic: COMPLETION_TOPIC.to_string(),
            completion_group_id: COMPLETION_GROUP_ID.to_string(),
            publish_timeout: Duration::from_secs(2),
            backoff_initial: Duration::from_millis(10),
            backoff_max: Duration::from_millis(50),
        },
        ws: WsConfig {
            policy,
            outbound_capacity: 16,
            pong_wait: Duration::from_secs(60),
            write_wait: Duration::from_secs(10),
        },
    }
}

/// A fully wired application over an in-memory broker.
pub struct TestApp {
    pub router: Router,
    pub broker: MemoryBroker,
    pub hub: Hub,
    pub consumer_state: watch::Receiver<ConsumerState>,
    /// Stops the registry and the consumer.
    pub cancel: CancellationToken,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_policy(ConnectionPolicy::Replace).await
    }

    /// Mirrors the wiring in `main.rs`: registry, consumer, producer, router.
    pub async fn with_policy(policy: ConnectionPolicy) -> Self {
        let config = test_config(policy);
        let broker = MemoryBroker::new();
        let cancel = CancellationToken::new();

        let (hub, _) = Hub::start(config.ws.policy, cancel.child_token());

        let consumer_config = ConsumerConfig {
            topic: config.broker.completion_topic.clone(),
            group_id: config.broker.completion_group_id.clone(),
            initial_backoff: config.broker.backoff_initial,
            max_backoff: config.broker.backoff_max,
        };
        let consumer = CompletionConsumer::start(&broker, &consumer_config, Arc::new(hub.clone()))
            .await
            .expect("subscribe should succeed");
        let mut consumer_state = consumer.state();
        tokio::spawn(consumer.run(cancel.child_token()));
        consumer_state
            .wait_for(|s| *s == ConsumerState::Reading)
            .await
            .expect("consumer should start");

        let producer = JobProducer::new(Arc::new(broker.clone()))
            .with_publish_timeout(config.broker.publish_timeout);

        let state = AppState {
            config: Arc::new(config.clone()),
            hub: hub.clone(),
            producer,
            verifier: Arc::new(JwtVerifier::new(config.jwt.clone())),
            consumer_state: consumer_state.clone(),
        };

        Self {
            router: build_app_router(state, &config),
            broker,
            hub,
            consumer_state,
            cancel,
        }
    }

    /// Serve the router on an ephemeral local port.
    pub async fn serve(&self) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind should succeed");
        let addr = listener.local_addr().unwrap();
        let router = self.router.clone();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    /// Wait until `user_id` has `count` indexed connections.
    pub async fn wait_for_connections(&self, user_id: &str, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.hub.connections_for(user_id).await.len() != count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("registry should reach the expected connection count");
    }
}

pub fn token_for(user_id: &str) -> String {
    generate_access_token(user_id, &JwtConfig::new(TEST_SECRET)).expect("token should sign")
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

/// A completion payload as a worker would publish it.
pub fn completion_payload(user_id: &str, job_id: i64) -> String {
    format!(
        r#"{{"user_id":"{user_id}","job_id":{job_id},"success":true,"document_type":"resume","download_url":"https://cdn.example/{job_id}.pdf"}}"#
    )
}

/// `POST /api/v1/documents/queue` with an optional bearer token.
pub fn queue_request(token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder =
        Request::post("/api/v1/documents/queue").header(CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}
