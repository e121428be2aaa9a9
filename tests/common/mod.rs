//! Shared helpers for the integration test suites: a scriptable in-process
//! verifier and builders for manager/worker fixtures.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use verifier_bench::domain::models::config::ExecutionConfig;
use verifier_bench::domain::ports::{
    TransportFault, VerifierTransport, WireRequest, WireResponse,
};
use verifier_bench::services::serializer::ResultSerializer;
use verifier_bench::services::task_manager::TaskManager;
use verifier_bench::services::worker::EvidenceFactory;

/// One canned verifier response.
#[derive(Clone)]
pub struct Scripted {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

pub fn ok() -> Scripted {
    Scripted {
        status: 200,
        headers: vec![],
        body: r#"{"status":"ok"}"#.to_string(),
    }
}

pub fn status(code: u16) -> Scripted {
    Scripted {
        status: code,
        headers: vec![],
        body: r#"{"status":"error"}"#.to_string(),
    }
}

pub fn retry_after(code: u16, seconds: u64) -> Scripted {
    Scripted {
        status: code,
        headers: vec![("Retry-After".to_string(), seconds.to_string())],
        body: r#"{"status":"busy"}"#.to_string(),
    }
}

/// Scriptable verifier: consumes per-phase response scripts in order, then
/// falls back to 200-ok. An optional latency simulates verifier work so that
/// timing-based assertions (overlap, durations) are meaningful.
pub struct MockVerifier {
    create_script: Mutex<VecDeque<Scripted>>,
    update_script: Mutex<VecDeque<Scripted>>,
    latency: Option<Duration>,
}

impl MockVerifier {
    pub fn always_ok() -> Self {
        Self::scripted(vec![], vec![])
    }

    pub fn scripted(create: Vec<Scripted>, update: Vec<Scripted>) -> Self {
        Self {
            create_script: Mutex::new(create.into()),
            update_script: Mutex::new(update.into()),
            latency: None,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }
}

#[async_trait]
impl VerifierTransport for MockVerifier {
    async fn execute(&self, request: &WireRequest) -> Result<WireResponse, TransportFault> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let script = match request.method.as_str() {
            "POST" => &self.create_script,
            "PATCH" => &self.update_script,
            other => {
                return Err(TransportFault::Other(format!(
                    "unexpected method {other}"
                )))
            }
        };
        let scripted = script.lock().unwrap().pop_front().unwrap_or_else(ok);

        Ok(WireResponse {
            status: scripted.status,
            headers: scripted.headers,
            body: scripted.body.into_bytes(),
            request_time: None,
        })
    }
}

pub fn config(worker_count: usize, agent_count: usize, tasks_per_agent: u64) -> ExecutionConfig {
    ExecutionConfig {
        verifier_url: "https://verifier.test:8881".to_string(),
        db_url: "postgresql://verifier.test:5432".to_string(),
        worker_count,
        agent_count,
        tasks_per_agent,
        verbose: false,
    }
}

/// A manager writing its results into the given temp directory.
pub fn manager_in(
    dir: &tempfile::TempDir,
    worker_count: usize,
    agent_count: usize,
    tasks_per_agent: u64,
) -> Arc<TaskManager> {
    let serializer = ResultSerializer::with_file(dir.path().join("run.jsonl"));
    Arc::new(TaskManager::with_serializer(
        config(worker_count, agent_count, tasks_per_agent),
        serializer,
    ))
}

/// Evidence factory producing an empty snapshot; protocol tests that care
/// about payload contents build their own evidence instead.
pub fn no_evidence() -> EvidenceFactory {
    Arc::new(|| Ok(vec![]))
}
