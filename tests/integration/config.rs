//! Configuration loading from disk through job compilation.

use crontab::config::{ConfigError, LogFormat, LogLevel, YamlLoader};
use crontab::{GlobalState, Job, JobError};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

const FULL: &str = r#"
log-level: debug
log-format: json
shell: /bin/bash
shell-args: -c
webserver:
  address: 0.0.0.0
  port: 8080
  username: admin
  password: secret
  metrics: true
jobs:
  - name: backup
    description: nightly dump
    concurrency: 2
    events:
      - cron: "0 3 * * *"
      - web-event: backup-now
    tasks:
      - command: pg_dump app > /backup/app.sql
        timeout: 5m
        retries: 3
        retry-delay: 10s
        env:
          pgpassword: "{{ env('PGPASSWORD') }}"
        on-fail:
          - post: https://alerts.example.com/hook
            headers:
              Content-Type: application/json
            data:
              text: backup failed
    hooks:
      done:
        - get: https://status.example.com/ok
  - name: cleanup
    disabled: true
    events:
      - {}
    tasks:
      - {}
"#;

/// Test: A full document loads from disk and every enabled job compiles.
#[test]
fn test_load_full_document() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(FULL.as_bytes()).unwrap();

    let config = YamlLoader::load_config(file.path()).unwrap();

    assert_eq!(config.log_level, LogLevel::Debug);
    assert_eq!(config.log_format, LogFormat::Json);
    assert_eq!(config.shell.as_deref(), Some("/bin/bash"));
    let web = config.webserver.as_ref().unwrap();
    assert_eq!(web.credentials(), Some(("admin", "secret")));
    assert!(web.metrics);

    let backup = &config.jobs[0];
    assert_eq!(backup.concurrency(), 2);
    assert_eq!(backup.events.len(), 2);
    assert_eq!(backup.tasks[0].timeout, Some(Duration::from_secs(300)));
    assert_eq!(backup.tasks[0].retry_delay, Some(Duration::from_secs(10)));
    assert_eq!(backup.tasks[0].on_fail.len(), 1);

    let state = Arc::new(GlobalState::new());
    let job = Job::compile(backup, &state).unwrap();
    assert_eq!(job.task_count(), 1);
    assert_eq!(job.pool().capacity(), 2);

    // Disabled jobs are neither validated nor compiled.
    assert!(matches!(
        Job::compile(&config.jobs[1], &state),
        Err(JobError::Disabled(_))
    ));
}

/// Test: A missing file reports its path.
#[test]
fn test_missing_file() {
    let err = YamlLoader::load_config("/definitely/not/here.yaml").unwrap_err();
    assert!(matches!(err, ConfigError::FileReadError { .. }));
    assert!(err.to_string().contains("/definitely/not/here.yaml"));
}

/// Test: Validation errors name the job they come from.
#[test]
fn test_errors_name_the_job() {
    let err = YamlLoader::parse_config(
        r#"
jobs:
  - name: broken
    events:
      - on-init: true
        interval: 1s
    tasks:
      - command: "true"
"#,
    )
    .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("broken"), "{}", message);
    assert!(message.contains("on-init"), "{}", message);
    assert!(message.contains("interval"), "{}", message);
}

/// Test: Duplicate job names are rejected.
#[test]
fn test_duplicate_job_names() {
    let err = YamlLoader::parse_config(
        r#"
jobs:
  - name: same
    events: [{on-init: true}]
    tasks: [{command: "true"}]
  - name: same
    events: [{on-init: true}]
    tasks: [{command: "true"}]
"#,
    )
    .unwrap_err();

    assert!(err.to_string().contains("duplicate job name"));
}
