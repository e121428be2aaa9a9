//! Transport-level tests against a real local HTTP server.

mod common;

use std::sync::Arc;

use common::no_evidence;
use mockito::Matcher;
use serde_json::json;

use verifier_bench::domain::models::attempt::{AttemptContext, Phase, RequestAttempt};
use verifier_bench::domain::models::config::ExecutionConfig;
use verifier_bench::domain::ports::{VerifierTransport, WireRequest};
use verifier_bench::infrastructure::HttpTransport;
use verifier_bench::services::serializer::ResultSerializer;
use verifier_bench::services::task_manager::TaskManager;
use verifier_bench::services::worker::WorkerPool;

fn context() -> AttemptContext {
    AttemptContext {
        agent_index: 0,
        agent_id: "perf-test-agent-0".to_string(),
        task_index: 0,
        worker_index: 0,
        phase: Phase::Create,
        attempt_index: 0,
    }
}

#[tokio::test]
async fn ok_response_classifies_as_success() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v3.0/agents/perf-test-agent-0/attestations")
        .match_header("content-type", "application/json")
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"agent_id":"perf-test-agent-0"}"#)
        .create_async()
        .await;

    let transport = HttpTransport::new().unwrap();
    let url = format!("{}/v3.0/agents/perf-test-agent-0/attestations", server.url());
    let mut attempt = RequestAttempt::new(context(), "POST", url);
    attempt.set_json_body(&json!({"evidence_supported": []}));
    attempt.perform(&transport).await;

    mock.assert_async().await;
    assert!(attempt.ok());
    assert!(!attempt.conflicts());
    assert_eq!(attempt.retry_after(), 0);
    assert_eq!(attempt.response_status(), Some(201));
    assert!(attempt.duration().unwrap() > 0.0);
}

#[tokio::test]
async fn conflict_and_retry_after_survive_the_wire() {
    let mut server = mockito::Server::new_async().await;
    let _conflict = server
        .mock("POST", Matcher::Any)
        .with_status(409)
        .with_body(r#"{"error":"attestation already in progress"}"#)
        .create_async()
        .await;

    let transport = HttpTransport::new().unwrap();
    let mut attempt = RequestAttempt::new(context(), "POST", format!("{}/x", server.url()));
    attempt.perform(&transport).await;

    assert!(!attempt.ok());
    assert!(attempt.conflicts());
    assert_eq!(attempt.retry_after(), 1);

    let mut server = mockito::Server::new_async().await;
    let _backoff = server
        .mock("POST", Matcher::Any)
        .with_status(503)
        .with_header("Retry-After", "4")
        .with_body(r#"{"error":"not yet"}"#)
        .create_async()
        .await;

    let mut attempt = RequestAttempt::new(context(), "POST", format!("{}/x", server.url()));
    attempt.perform(&transport).await;
    assert_eq!(attempt.retry_after(), 4);
}

#[tokio::test]
async fn connection_refusal_is_a_captured_fault() {
    let transport = HttpTransport::new().unwrap();
    // Nothing listens on the discard port.
    let request = WireRequest::new("POST", "http://127.0.0.1:9/v3.0/agents/x/attestations");
    let outcome = transport.execute(&request).await;
    assert!(outcome.is_err());

    // Through an attempt the same fault is captured, not raised.
    let mut attempt =
        RequestAttempt::new(context(), "POST", "http://127.0.0.1:9/v3.0/agents/x/attestations");
    attempt.perform(&transport).await;
    assert!(!attempt.ok());
    assert!(attempt.fault().is_some());
    assert_eq!(attempt.retry_after(), 0);
}

#[test]
fn full_protocol_run_over_real_http() {
    let mut server = mockito::Server::new();
    let create = server
        .mock("POST", "/v3.0/agents/perf-test-agent-0/attestations")
        .match_body(Matcher::PartialJson(json!({
            "evidence_supported": [],
            "system_info": {"boot_time": "1970-01-01T00:00:01+00:00"},
        })))
        .with_status(200)
        .with_body(r#"{"attestation":0}"#)
        .create();
    let update = server
        .mock("PATCH", "/v3.0/agents/perf-test-agent-0/attestations/0")
        .match_body(Matcher::PartialJson(json!({"evidence_collected": []})))
        .with_status(200)
        .with_body(r#"{"attestation":0}"#)
        .create();

    let dir = tempfile::tempdir().unwrap();
    let config = ExecutionConfig {
        verifier_url: server.url(),
        db_url: "postgresql://verifier.test:5432".to_string(),
        worker_count: 1,
        agent_count: 1,
        tasks_per_agent: 1,
        verbose: false,
    };
    let serializer = ResultSerializer::with_file(dir.path().join("run.jsonl"));
    let manager = Arc::new(TaskManager::with_serializer(config, serializer));
    let transport: Arc<dyn VerifierTransport> = Arc::new(HttpTransport::new().unwrap());

    let pool = WorkerPool::spawn(&manager, &transport, &no_evidence()).unwrap();
    pool.join().unwrap();

    create.assert();
    update.assert();

    let records = manager.serializer().read_tasks().unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].create_successful);
    assert!(records[0].update_successful);
}
