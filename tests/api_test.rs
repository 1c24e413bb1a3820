//! HTTP API Integration Tests

mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use calltrack::domain::call::TelephonyState;
use calltrack::interface::api::{build_router, ApiState, LiveConsumerHub};
use common::{start, TestEnv};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt; // For `oneshot`

fn setup() -> (TestEnv, Arc<LiveConsumerHub>, Router) {
    let env = start();
    let hub = Arc::new(LiveConsumerHub::new(env.tracker.clone(), 16));
    let prometheus_handle = PrometheusBuilder::new().build_recorder().handle();
    let app = build_router(
        ApiState {
            tracker: env.tracker.clone(),
        },
        prometheus_handle,
        hub.clone(),
    );
    (env, hub, app)
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

#[tokio::test(start_paused = true)]
async fn test_api_post_signal_accepted() {
    let (env, _hub, app) = setup();

    let (status, json) = post_json(
        &app,
        "/signals",
        json!({"type": "outgoing_intercepted", "number": "415-555-0199"}),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["kind"], "outgoing_intercepted");

    let (status, _) = post_json(
        &app,
        "/signals",
        json!({"type": "state_changed", "state": "offhook"}),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(env.tracker.state().await, TelephonyState::Offhook);
}

#[tokio::test(start_paused = true)]
async fn test_api_rejects_unknown_signal_type() {
    let (_env, _hub, app) = setup();

    let (status, _) = post_json(&app, "/signals", json!({"type": "teleport"})).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test(start_paused = true)]
async fn test_api_rejects_undialable_outgoing_number() {
    let (env, _hub, app) = setup();

    let (status, json) = post_json(
        &app,
        "/signals",
        json!({"type": "outgoing_intercepted", "number": "private"}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert!(json["error"].is_string());
    assert_eq!(env.tracker.state().await, TelephonyState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_api_queue_empties_after_delivery() {
    let (env, _hub, app) = setup();

    post_json(
        &app,
        "/signals",
        json!({"type": "outgoing_intercepted", "number": "4155550199"}),
    )
    .await;
    env.tracker.wait_idle().await;
    assert_eq!(env.remote.entries().await.len(), 1);

    let (status, body) = get(&app, "/queue").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["data"]["size"], 0);
    assert_eq!(json["data"]["cap"], 1000);
    assert!(json["data"]["entries"].as_array().unwrap().is_empty());

    let (status, body) = get(&app, "/queue/raw").await;
    assert_eq!(status, StatusCode::OK);
    let raw: Value = serde_json::from_slice(&body).unwrap();
    assert!(raw.as_array().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_api_queue_holds_events_while_remote_is_down() {
    let (env, _hub, app) = setup();
    env.remote.set_unavailable(true);

    post_json(
        &app,
        "/signals",
        json!({"type": "outgoing_intercepted", "number": "4155550199"}),
    )
    .await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let (_, body) = get(&app, "/queue").await;
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["data"]["size"], 1);
    let entry = &json["data"]["entries"][0];
    assert_eq!(entry["phoneNumber"], "4155550199");
    assert_eq!(entry["outcome"], "outgoing_start");
    assert!(entry["receivedAt"].is_number());

    env.remote.set_unavailable(false);
    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    env.tracker.wait_idle().await;
    assert_eq!(env.remote.entries().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_api_flush_reports_buffer_state() {
    let (_env, _hub, app) = setup();

    post_json(
        &app,
        "/signals",
        json!({"type": "outgoing_intercepted", "number": "4155550199"}),
    )
    .await;

    let (status, json) = post_json(&app, "/flush", Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["drained"], 0);
    assert_eq!(json["data"]["pending"], 1);
    assert_eq!(json["data"]["consumer_attached"], false);
}

#[tokio::test(start_paused = true)]
async fn test_api_health_check() {
    let (_env, _hub, app) = setup();

    let (status, body) = get(&app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["status"], "ok");
    assert_eq!(json["data"]["call_state"], "idle");
    assert_eq!(json["data"]["network_available"], true);
}

#[tokio::test(start_paused = true)]
async fn test_api_metrics_endpoint() {
    let (_env, _hub, app) = setup();

    let (status, _) = get(&app, "/metrics").await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test(start_paused = true)]
async fn test_live_hub_attaches_first_client_and_detaches_last() {
    let (env, hub, app) = setup();

    post_json(
        &app,
        "/signals",
        json!({"type": "outgoing_intercepted", "number": "4155550199"}),
    )
    .await;
    assert_eq!(env.tracker.delivery_status().pending, 1);

    let mut first = hub.connect();
    let mut second = hub.connect();
    assert_eq!(hub.client_count(), 2);
    assert!(env.tracker.delivery_status().consumer_attached);
    assert_eq!(env.tracker.delivery_status().pending, 0);
    // only the first subscriber existed when the backlog drained
    assert_eq!(first.try_recv().unwrap().phone_key().as_str(), "4155550199");
    assert!(second.try_recv().is_err());

    post_json(
        &app,
        "/signals",
        json!({"type": "state_changed", "state": "offhook"}),
    )
    .await;
    assert!(first.try_recv().is_ok());
    assert!(second.try_recv().is_ok());

    hub.disconnect();
    assert!(env.tracker.delivery_status().consumer_attached);
    hub.disconnect();
    assert_eq!(hub.client_count(), 0);
    assert!(!env.tracker.delivery_status().consumer_attached);
}
