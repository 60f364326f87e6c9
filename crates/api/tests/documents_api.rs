//! Integration tests for `POST /api/v1/documents/queue`.

mod common;

use axum::http::StatusCode;
use meritum_api::ws::{Connection, HubStats};
use meritum_core::JobRequest;
use meritum_events::{BrokerSubscriber, JOB_REQUESTS_TOPIC};
use serde_json::json;
use tower::ServiceExt;

use common::{body_json, queue_request, token_for, TestApp};

fn resume_job(job_id: i64) -> serde_json::Value {
    json!({
        "jobId": job_id,
        "docType": "resume",
        "companyName": "Acme",
        "userInfo": {"name": "Ada"},
        "educationInfo": {"school": "Analytical"},
        "resume": {"experiences": []}
    })
}

// ---------------------------------------------------------------------------
// Test: an authenticated request is published keyed by job id
// ---------------------------------------------------------------------------

#[tokio::test]
async fn queue_publishes_job_for_token_subject() {
    let app = TestApp::new().await;
    let mut worker = app.broker.subscribe(JOB_REQUESTS_TOPIC, "workers").await.unwrap();

    let response = app
        .router
        .clone()
        .oneshot(queue_request(Some(&token_for("u1")), resume_job(7)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["job_id"], 7);
    assert_eq!(json["data"]["doc_type"], "resume");

    let message = worker.read().await.unwrap();
    assert_eq!(message.key.as_deref(), Some(b"7".as_slice()));
    let job: JobRequest = serde_json::from_slice(&message.payload).unwrap();
    assert_eq!(job.job_id, 7);
    assert_eq!(job.user_id, "u1");
    assert_eq!(job.company_name, "Acme");
    assert_eq!(job.user_info["name"], "Ada");
    assert!(job.resume.is_some());
}

// ---------------------------------------------------------------------------
// Test: missing or malformed credentials are rejected
// ---------------------------------------------------------------------------

#[tokio::test]
async fn queue_without_token_returns_401() {
    let app = TestApp::new().await;

    let response = app
        .router
        .clone()
        .oneshot(queue_request(None, resume_job(7)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn queue_with_invalid_token_returns_401() {
    let app = TestApp::new().await;

    let response = app
        .router
        .clone()
        .oneshot(queue_request(Some("forged.token.value"), resume_job(7)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// Test: a non-positive job id fails validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn queue_rejects_non_positive_job_id() {
    let app = TestApp::new().await;

    let response = app
        .router
        .clone()
        .oneshot(queue_request(Some(&token_for("u1")), resume_job(0)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

// ---------------------------------------------------------------------------
// Test: an unreachable broker yields 503 and leaves the registry untouched
// ---------------------------------------------------------------------------

#[tokio::test]
async fn broker_outage_returns_503_without_touching_registry() {
    let app = TestApp::new().await;
    let (conn, _outbound) = Connection::new("u1", 4);
    let conn_id = conn.id();
    app.hub.register(conn).await;
    let before = app.hub.stats().await;

    app.broker.set_online(false);
    let response = app
        .router
        .clone()
        .oneshot(queue_request(Some(&token_for("u1")), resume_job(7)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(response).await;
    assert_eq!(json["code"], "BROKER_UNAVAILABLE");

    assert_eq!(app.hub.stats().await, before);
    assert_eq!(before, HubStats { connections: 1, users: 1 });
    assert_eq!(app.hub.connections_for("u1").await, vec![conn_id]);
}
