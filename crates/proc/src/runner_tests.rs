// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

fn sh(script: &str) -> CommandSpec {
    CommandSpec::new("/bin/sh").arg("-c").arg(script)
}

#[tokio::test]
async fn captures_stdout_stderr_and_exit_code() {
    let result = CommandRunner::run(sh("echo out; echo err >&2; exit 3"))
        .await
        .unwrap();
    assert_eq!(result.exit_code, 3);
    assert!(!result.ok());
    assert_eq!(result.stdout.trim(), "out");
    assert_eq!(result.stderr.trim(), "err");
    assert!(result.finished_at >= result.started_at);
}

#[tokio::test]
async fn capture_is_capped_without_blocking_the_child() {
    let spec = sh("i=0; while [ $i -lt 2000 ]; do echo 0123456789012345678901234567890123456789; i=$((i+1)); done").capture_limit(512);
    let result = CommandRunner::run(spec).await.unwrap();
    assert_eq!(result.exit_code, 0);
    assert!(result.stdout.len() <= 512);
}

#[tokio::test]
async fn timeout_kills_the_child() {
    let start = std::time::Instant::now();
    let err = CommandRunner::run(sh("sleep 30").timeout(Duration::from_millis(200)))
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::TimedOut { .. }));
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn spawn_failure_names_the_program() {
    let err = CommandRunner::run(CommandSpec::new("/nonexistent/definitely-missing"))
        .await
        .unwrap_err();
    let RunnerError::Spawn { program, .. } = err else {
        panic!("expected spawn error");
    };
    assert!(program.contains("definitely-missing"));
}

#[tokio::test]
async fn heartbeat_fires_during_long_runs() {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    let hb = Heartbeat::new(Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }))
    .every(Duration::from_millis(50));
    let result = CommandRunner::run(sh("sleep 0.4").heartbeat(hb)).await.unwrap();
    assert_eq!(result.exit_code, 0);
    assert!(count.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn parses_single_json_document() {
    let result = CommandRunner::run(sh(r#"echo '{"total_size": 42}'"#).expect_json())
        .await
        .unwrap();
    let json = result.json.unwrap();
    assert_eq!(json["total_size"], 42);
}

#[tokio::test]
async fn parses_newline_delimited_json_into_array() {
    let result = CommandRunner::run(
        sh(r#"echo '{"n": 1}'; echo '{"n": 2}'"#).expect_json(),
    )
    .await
    .unwrap();
    let json = result.json.unwrap();
    assert_eq!(json.as_array().map(Vec::len), Some(2));
    assert_eq!(json[1]["n"], 2);
}

#[tokio::test]
async fn malformed_json_yields_none_not_an_error() {
    let result = CommandRunner::run(sh("echo 'not json at all'").expect_json())
        .await
        .unwrap();
    assert_eq!(result.exit_code, 0);
    assert!(result.json.is_none());
}

#[tokio::test]
async fn env_vars_reach_the_child_without_appearing_in_argv() {
    let result = CommandRunner::run(sh("printf %s \"$SECRET_VALUE\"").env("SECRET_VALUE", "boo"))
        .await
        .unwrap();
    assert_eq!(result.stdout, "boo");
    assert!(!result.display_command().contains("boo"));
}
