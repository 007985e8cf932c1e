//! End-to-end scenarios: configuration in, counters and side effects out.

use crate::common;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use crontab::GlobalState;
use crontab::api::{ApiState, build_router};
use crontab::core::hooked::{DONE_HOOKS_COUNTER, FAIL_HOOKS_COUNTER};
use crontab::execution::TASK_ATTEMPTS_COUNTER;
use crontab::scheduler::EVENTS_COUNTER;
use http_body_util::BodyExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tower::ServiceExt;

/// Router counting hits on `/ping`.
fn ping_router(hits: Arc<AtomicUsize>) -> Router {
    Router::new().route(
        "/ping",
        get(move || {
            let hits = Arc::clone(&hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                "pong"
            }
        }),
    )
}

/// Test: a failing command is attempted retries + 1 times, then fail hooks run once.
#[cfg(unix)]
#[tokio::test]
async fn test_failing_command_exhausts_retries() {
    let dir = tempfile::tempdir().unwrap();
    let hook_log = dir.path().join("hook");
    let config = common::config(&format!(
        r#"
jobs:
  - name: scenario-a
    events:
      - on-init: true
    tasks:
      - command: exit 1
        retries: 2
        retry-delay: 0
        on-fail:
          - command: echo failed >> {}
"#,
        hook_log.display()
    ));
    let state = Arc::new(GlobalState::new());

    common::start(&config, &state).join().await;

    let labels = [("task", "exit 1"), ("job", "scenario-a")];
    common::wait_for_counter(&state, FAIL_HOOKS_COUNTER, &labels, 1, Duration::from_secs(5)).await;
    assert_eq!(state.counters().get(TASK_ATTEMPTS_COUNTER, labels), 3);
    assert_eq!(state.counters().get(FAIL_HOOKS_COUNTER, labels), 1);
    assert_eq!(state.counters().get(DONE_HOOKS_COUNTER, labels), 0);

    // The hook runs after the counter is bumped.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let runs = std::fs::read_to_string(hook_log).unwrap();
    assert_eq!(runs.lines().count(), 1);
}

/// Test: an interval trigger runs an HTTP GET once per tick.
#[tokio::test]
async fn test_interval_get_runs_done_hooks_per_tick() {
    let hits = Arc::new(AtomicUsize::new(0));
    let base = common::serve(ping_router(Arc::clone(&hits))).await;
    let url = format!("{}/ping", base);
    let config = common::config(&format!(
        r#"
jobs:
  - name: scenario-b
    events:
      - interval: 100ms
    tasks:
      - get: {}
"#,
        url
    ));
    let state = Arc::new(GlobalState::new());

    let handle = common::start(&config, &state);
    let labels = [("task", url.as_str()), ("job", "scenario-b")];
    common::wait_for_counter(&state, DONE_HOOKS_COUNTER, &labels, 3, Duration::from_secs(5)).await;
    assert_eq!(state.counters().get(FAIL_HOOKS_COUNTER, labels), 0);
    assert!(state.counters().get(EVENTS_COUNTER, [("job", "scenario-b")]) >= 3);
    handle.shutdown();
    handle.join().await;

    assert!(hits.load(Ordering::SeqCst) >= 3);
}

/// Test: one web event dispatch triggers every job listening for it.
#[tokio::test]
async fn test_web_event_triggers_every_listening_job() {
    let hits = Arc::new(AtomicUsize::new(0));
    let base = common::serve(ping_router(Arc::clone(&hits))).await;
    let config = common::config(&format!(
        r#"
jobs:
  - name: first
    events:
      - web-event: deploy
    tasks:
      - get: {0}/ping
  - name: second
    events:
      - web-event: deploy
    tasks:
      - get: {0}/ping
"#,
        base
    ));
    let state = Arc::new(GlobalState::new());
    let handle = common::start(&config, &state);
    let router = build_router(ApiState::new(Arc::clone(&state)));

    let response = router
        .oneshot(
            Request::post("/events/deploy/emit")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(
        String::from_utf8(body.to_vec()).unwrap(),
        "event: 'deploy' emitted, 2 listeners where found"
    );

    for job in ["first", "second"] {
        common::wait_for_counter(&state, EVENTS_COUNTER, &[("job", job)], 1, Duration::from_secs(5))
            .await;
    }
    let url = format!("{}/ping", base);
    for job in ["first", "second"] {
        let labels = [("task", url.as_str()), ("job", job)];
        common::wait_for_counter(&state, DONE_HOOKS_COUNTER, &labels, 1, Duration::from_secs(5))
            .await;
    }
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    handle.shutdown();
    handle.join().await;
}

/// Test: job level hooks follow each task's result.
#[cfg(unix)]
#[tokio::test]
async fn test_job_hooks_follow_task_results() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("log");
    let config = common::config(&format!(
        r#"
jobs:
  - name: hooks
    events:
      - on-init: true
    tasks:
      - command: "true"
      - command: "false"
    hooks:
      done:
        - command: echo done >> {0}
      failed:
        - command: echo failed >> {0}
"#,
        log.display()
    ));
    let state = Arc::new(GlobalState::new());

    common::start(&config, &state).join().await;
    common::wait_for_counter(
        &state,
        FAIL_HOOKS_COUNTER,
        &[("task", "false"), ("job", "hooks")],
        1,
        Duration::from_secs(5),
    )
    .await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let lines: Vec<String> = std::fs::read_to_string(log)
        .unwrap()
        .lines()
        .map(String::from)
        .collect();
    assert_eq!(lines, vec!["done", "failed"]);
}
