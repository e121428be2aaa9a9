//! The two-phase attestation protocol state machine.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::sleep;

use crate::domain::models::agent::AgentSlot;
use crate::domain::models::attempt::{AttemptContext, AttemptRecord, Phase, RequestAttempt};
use crate::domain::models::evidence::EvidenceBundle;
use crate::domain::ports::VerifierTransport;

/// One end-to-end execution of the push-attestation protocol for a given
/// (agent, task index) pair.
///
/// The create phase negotiates capabilities (`POST .../attestations`), the
/// update phase submits collected evidence (`PATCH .../attestations/{n}`).
/// Each phase is a retry loop over request attempts: server-directed backoff
/// (`Retry-After`, or an implicit second on 409) sleeps and re-issues; any
/// other non-ok outcome aborts the task. There is no client-side attempt
/// cap.
pub struct AttestationTask {
    worker_index: usize,
    agent: Arc<AgentSlot>,
    task_index: u64,
    verifier_url: String,
    evidence: EvidenceBundle,
    create_attempts: Vec<RequestAttempt>,
    update_attempts: Vec<RequestAttempt>,
}

impl AttestationTask {
    pub(crate) fn new(
        worker_index: usize,
        agent: Arc<AgentSlot>,
        evidence: EvidenceBundle,
        verifier_url: &str,
    ) -> Self {
        let task_index = agent.task_count();
        Self {
            worker_index,
            agent,
            task_index,
            verifier_url: verifier_url.to_string(),
            evidence,
            create_attempts: Vec::new(),
            update_attempts: Vec::new(),
        }
    }

    pub fn worker_index(&self) -> usize {
        self.worker_index
    }

    pub fn agent(&self) -> &Arc<AgentSlot> {
        &self.agent
    }

    pub fn agent_index(&self) -> usize {
        self.agent.index()
    }

    pub fn task_index(&self) -> u64 {
        self.task_index
    }

    /// Unique identity within a run: agent index plus per-agent task index.
    pub fn key(&self) -> (usize, u64) {
        (self.agent.index(), self.task_index)
    }

    /// Run the two-phase protocol to completion. Returns true iff both
    /// phases ended with an ok attempt.
    pub async fn execute(&mut self, transport: &dyn VerifierTransport) -> bool {
        loop {
            let (retry_after, ok) = self.run_attempt(Phase::Create, transport).await;
            if retry_after > 0 {
                sleep(Duration::from_secs(retry_after)).await;
                continue;
            }
            if !ok {
                return false;
            }
            break;
        }

        loop {
            let (retry_after, ok) = self.run_attempt(Phase::Update, transport).await;
            if retry_after > 0 {
                sleep(Duration::from_secs(retry_after)).await;
                continue;
            }
            if !ok {
                return false;
            }
            break;
        }

        true
    }

    async fn run_attempt(
        &mut self,
        phase: Phase,
        transport: &dyn VerifierTransport,
    ) -> (u64, bool) {
        let mut attempt = match phase {
            Phase::Create => self.build_create_attempt(),
            Phase::Update => self.build_update_attempt(),
        };
        attempt.perform(transport).await;
        let verdict = (attempt.retry_after(), attempt.ok());

        match phase {
            Phase::Create => self.create_attempts.push(attempt),
            Phase::Update => self.update_attempts.push(attempt),
        }
        verdict
    }

    fn build_create_attempt(&self) -> RequestAttempt {
        let url = format!(
            "{}/v3.0/agents/{}/attestations",
            self.verifier_url,
            self.agent.id()
        );
        let mut attempt = RequestAttempt::new(
            self.attempt_context(Phase::Create, self.create_attempts.len()),
            "POST",
            url,
        );
        attempt.set_json_body(&json!({
            "evidence_supported": self.render_evidence(Phase::Create),
            "system_info": {
                "boot_time": self.agent.boot_time(),
            },
        }));
        attempt
    }

    fn build_update_attempt(&self) -> RequestAttempt {
        let url = format!(
            "{}/v3.0/agents/{}/attestations/{}",
            self.verifier_url,
            self.agent.id(),
            self.task_index
        );
        let mut attempt = RequestAttempt::new(
            self.attempt_context(Phase::Update, self.update_attempts.len()),
            "PATCH",
            url,
        );
        attempt.set_json_body(&json!({
            "evidence_collected": self.render_evidence(Phase::Update),
        }));
        attempt
    }

    /// Null renderings are filtered out of the emitted array.
    fn render_evidence(&self, phase: Phase) -> Vec<Value> {
        self.evidence
            .iter()
            .filter_map(|item| match phase {
                Phase::Create => item.render_supported(),
                Phase::Update => item.render_collected(),
            })
            .collect()
    }

    fn attempt_context(&self, phase: Phase, attempt_index: usize) -> AttemptContext {
        AttemptContext {
            agent_index: self.agent.index(),
            agent_id: self.agent.id(),
            task_index: self.task_index,
            worker_index: self.worker_index,
            phase,
            attempt_index,
        }
    }

    pub fn create_successful(&self) -> bool {
        self.create_attempts.last().is_some_and(RequestAttempt::ok)
    }

    pub fn update_successful(&self) -> bool {
        self.update_attempts.last().is_some_and(RequestAttempt::ok)
    }

    pub fn create_duration(&self) -> f64 {
        phase_duration(&self.create_attempts)
    }

    pub fn update_duration(&self) -> f64 {
        phase_duration(&self.update_attempts)
    }

    /// The serialized form of the whole task.
    pub fn record(&self) -> TaskRecord {
        TaskRecord {
            agent_index: self.agent.index(),
            task_index: self.task_index,
            worker_index: self.worker_index,
            create_successful: self.create_successful(),
            update_successful: self.update_successful(),
            create_duration: self.create_duration(),
            update_duration: self.update_duration(),
            create_attempts: self.create_attempts.iter().map(RequestAttempt::record).collect(),
            update_attempts: self.update_attempts.iter().map(RequestAttempt::record).collect(),
        }
    }
}

fn phase_duration(attempts: &[RequestAttempt]) -> f64 {
    attempts.iter().filter_map(RequestAttempt::duration).sum()
}

/// The persisted, agent-unbound shape of a concluded task. Deserialized
/// records feed reporting only; they cannot be re-executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub agent_index: usize,
    pub task_index: u64,
    pub worker_index: usize,
    pub create_successful: bool,
    pub update_successful: bool,
    pub create_duration: f64,
    pub update_duration: f64,
    pub create_attempts: Vec<AttemptRecord>,
    pub update_attempts: Vec<AttemptRecord>,
}

impl TaskRecord {
    pub fn total_duration(&self) -> f64 {
        self.create_duration + self.update_duration
    }

    /// When the protocol run entered the wire: the first create attempt.
    pub fn start_time(&self) -> Option<f64> {
        self.create_attempts.first().and_then(|a| a.start_time)
    }

    /// When the protocol run left the wire: the last update attempt, or the
    /// last create attempt when the update phase was never entered.
    pub fn end_time(&self) -> Option<f64> {
        self.create_attempts.first()?;
        match self.update_attempts.last() {
            Some(last) => last.end_time,
            None => self.create_attempts.last().and_then(|a| a.end_time),
        }
    }
}
