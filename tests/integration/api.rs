//! API integration tests.
//!
//! These tests verify the HTTP surface responds correctly.

use crate::common;

use crontab::GlobalState;
use crontab::api::{ApiState, WEBSERVER_EVENTS_COUNTER, WEBSERVER_LISTENERS_COUNTER, build_router};

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

async fn body_string(response: axum::response::Response) -> String {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(body.to_vec()).unwrap()
}

/// Test: Health endpoint responds with status ok.
#[tokio::test]
async fn test_health_endpoint() {
    let router = build_router(ApiState::new(Arc::new(GlobalState::new())));

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

/// Test: Emitting an unknown event returns 404.
#[tokio::test]
async fn test_emit_unknown_event_returns_404() {
    let state = Arc::new(GlobalState::new());
    let router = build_router(ApiState::new(Arc::clone(&state)));

    let request = Request::builder()
        .uri("/events/nothing/emit")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_string(response).await.contains("event: 'nothing' not found"));
    assert_eq!(
        state
            .counters()
            .get(WEBSERVER_EVENTS_COUNTER, [("event_name", "nothing")]),
        0
    );
}

/// Test: Emit accepts any method and counts the invoked listeners.
#[tokio::test]
async fn test_emit_any_method_counts_listeners() {
    let state = Arc::new(GlobalState::new());
    for _ in 0..3 {
        state.add_event_listener("backup", Arc::new(|| {}));
    }
    let router = build_router(ApiState::new(Arc::clone(&state)));

    for method in ["GET", "PUT"] {
        let request = Request::builder()
            .method(method)
            .uri("/events/backup/emit")
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_string(response).await,
            "event: 'backup' emitted, 3 listeners where found"
        );
    }

    let labels = [("event_name", "backup")];
    assert_eq!(state.counters().get(WEBSERVER_EVENTS_COUNTER, labels), 2);
    assert_eq!(state.counters().get(WEBSERVER_LISTENERS_COUNTER, labels), 6);
}

/// Test: Registered event names are listed.
#[tokio::test]
async fn test_list_events_endpoint() {
    let config = common::config(
        r#"
jobs:
  - name: listener
    events:
      - web-event: rotate
    tasks:
      - get: http://127.0.0.1:9/never
"#,
    );
    let state = Arc::new(GlobalState::new());
    let handle = common::start(&config, &state);
    let router = build_router(ApiState::new(Arc::clone(&state)));

    let response = router
        .oneshot(Request::get("/events").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["total"], 1);
    assert_eq!(json["events"][0], "rotate");

    handle.shutdown();
    handle.join().await;
}

/// Test: Metrics are rendered when a handle is configured.
#[tokio::test]
async fn test_metrics_endpoint() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    let state = ApiState::new(Arc::new(GlobalState::new())).with_metrics(handle);
    let router = build_router(state);

    let response = router
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

/// Test: Metrics return 404 with a hint when disabled.
#[tokio::test]
async fn test_metrics_disabled_hint() {
    let router = build_router(ApiState::new(Arc::new(GlobalState::new())));

    let response = router
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_string(response).await.contains("Metrics are disabled"));
}

/// Test: Basic auth protects every route, emit included.
#[tokio::test]
async fn test_basic_auth_guards_emit() {
    let state = Arc::new(GlobalState::new());
    state.add_event_listener("deploy", Arc::new(|| {}));
    let router = build_router(ApiState::new(Arc::clone(&state)).with_credentials("ops", "pw"));

    let denied = router
        .clone()
        .oneshot(
            Request::post("/events/deploy/emit")
                .header(header::AUTHORIZATION, "Basic b3BzOndyb25n")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    // "ops:pw"
    let allowed = router
        .oneshot(
            Request::post("/events/deploy/emit")
                .header(header::AUTHORIZATION, "Basic b3BzOnB3")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);
}

/// Test: Counters are exposed as JSON.
#[tokio::test]
async fn test_counters_endpoint() {
    let state = Arc::new(GlobalState::new());
    state.counters().increment("events", [("job", "a")], 4);
    let router = build_router(ApiState::new(Arc::clone(&state)));

    let response = router
        .oneshot(Request::get("/counters").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let json: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json[0]["name"], "events");
    assert_eq!(json[0]["labels"]["job"], "a");
    assert_eq!(json[0]["value"], 4);
}
