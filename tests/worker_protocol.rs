// tests/worker_protocol.rs
//
// Job runner behaviour against scripted workers: the script stands in for
// `cosi worker <service>` and talks the same stdin/stdout/stderr protocol.

mod common;
use crate::common::{JOB_LIMIT, init_tracing, with_timeout};

use std::error::Error;

use serde_json::json;

use cosi::config::JobsSection;
use cosi::jobs::{JobManager, WorkerLauncher};
use cosi::types::JobOutcome;
use cosi_test_utils::builders::{RequestBuilder, fast_jobs};
use cosi_test_utils::fake_worker::script_launcher;

type TestResult = Result<(), Box<dyn Error>>;

fn scripted(script: &str) -> JobManager {
    JobManager::new(&fast_jobs(), script_launcher(script))
}

#[tokio::test]
async fn test_non_object_result_is_wrapped() -> TestResult {
    init_tracing();
    let manager = scripted("cat >/dev/null; echo '[1, 2, 3]'");

    let result = with_timeout(JOB_LIMIT, manager.run(RequestBuilder::new("echo").build())).await?;

    assert_eq!(result, json!({ "data": [1, 2, 3] }));
    Ok(())
}

#[tokio::test]
async fn test_error_result_keeps_worker_keys_and_gains_log() -> TestResult {
    init_tracing();
    let manager = scripted(
        "cat >/dev/null; echo 'checking input' >&2; echo '{\"error\": \"bad input\", \"field\": \"x\"}'",
    );

    let result = with_timeout(JOB_LIMIT, manager.run(RequestBuilder::new("echo").build())).await?;

    assert_eq!(result["error"], json!("bad input"));
    assert_eq!(result["field"], json!("x"));
    let log = result["log"].as_str().ok_or("log should be a string")?;
    assert!(log.contains("echo: checking input"), "log was: {log}");
    assert_eq!(manager.list().recent[0].outcome, JobOutcome::Failed);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_large_result_written_just_before_exit_is_kept() -> TestResult {
    init_tracing();
    // The worker is gone well before a line this size is read and parsed, and
    // liveness is checked every 20ms.
    let jobs = JobsSection {
        poll_interval_ms: 20,
        ..fast_jobs()
    };
    let manager = JobManager::new(
        &jobs,
        script_launcher(
            "cat >/dev/null; printf '{\"blob\": \"'; head -c 20000000 /dev/zero | tr '\\0' a; printf '\"}\\n'; exit 0",
        ),
    );

    for _ in 0..3 {
        let result = with_timeout(JOB_LIMIT, manager.run(RequestBuilder::new("echo").build())).await?;
        assert!(result.get("error").is_none(), "job failed: {:?}", result.get("error"));
        let blob = result["data"]["blob"].as_str().ok_or("blob should be a string")?;
        assert_eq!(blob.len(), 20_000_000);
    }
    assert!(
        manager
            .list()
            .recent
            .iter()
            .all(|job| job.outcome == JobOutcome::Completed)
    );
    Ok(())
}

#[tokio::test]
async fn test_slow_live_worker_is_waited_for() -> TestResult {
    init_tracing();
    // Answers after several poll intervals.
    let manager = scripted("cat >/dev/null; sleep 1; echo '{\"late\": true}'");

    let result = with_timeout(JOB_LIMIT, manager.run(RequestBuilder::new("echo").build())).await?;

    assert_eq!(result, json!({ "data": { "late": true } }));
    Ok(())
}

#[tokio::test]
async fn test_only_the_first_result_counts() -> TestResult {
    init_tracing();
    let manager = scripted("cat >/dev/null; echo '{\"n\": 1}'; echo '{\"n\": 2}'");

    let result = with_timeout(JOB_LIMIT, manager.run(RequestBuilder::new("echo").build())).await?;

    assert_eq!(result, json!({ "data": { "n": 1 } }));
    Ok(())
}

#[tokio::test]
async fn test_worker_receives_request_on_stdin() -> TestResult {
    init_tracing();
    // Echo the request back as the result.
    let manager = scripted("head -n 1; echo");

    let request = RequestBuilder::new("echo").param("k", "v").build();
    let result = with_timeout(JOB_LIMIT, manager.run(request)).await?;

    assert_eq!(result, json!({ "data": { "service": "echo", "k": "v" } }));
    Ok(())
}

#[tokio::test]
async fn test_worker_exit_without_result_is_terminated() -> TestResult {
    init_tracing();
    let manager = scripted("cat >/dev/null; echo 'giving up' >&2; exit 1");

    let result = with_timeout(JOB_LIMIT, manager.run(RequestBuilder::new("echo").build())).await?;

    assert_eq!(result["error"], json!("job terminated"));
    assert!(result["log"].as_str().is_some_and(|log| log.contains("echo: giving up")));
    assert_eq!(manager.list().recent[0].outcome, JobOutcome::Terminated);
    Ok(())
}

#[tokio::test]
async fn test_spawn_failure_is_recorded_as_failed() -> TestResult {
    init_tracing();
    let manager = JobManager::new(
        &fast_jobs(),
        WorkerLauncher::new("/nonexistent/cosi-worker-binary"),
    );

    let result = with_timeout(JOB_LIMIT, manager.run(RequestBuilder::new("echo").build())).await?;

    let error = result["error"].as_str().ok_or("error should be a string")?;
    assert!(error.starts_with("failed to start worker"), "error was: {error}");
    let listing = manager.list();
    assert!(listing.running.is_empty());
    assert_eq!(listing.recent[0].outcome, JobOutcome::Failed);
    Ok(())
}
