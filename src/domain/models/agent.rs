//! Mock agent slots.
//!
//! An agent slot is the unit of single-flight admission: while `busy` is
//! set, exactly one live attestation task references the slot. Slots are
//! created once at startup and never destroyed; their shared state is only
//! mutated through the task manager's admission path and the conclusion
//! path.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::models::evidence::EvidenceBundle;
use crate::domain::models::task::AttestationTask;

pub struct AgentSlot {
    index: usize,
    /// Per-agent task quota; 0 means unlimited
    tasks_per_agent: u64,
    /// Single-flight flag
    busy: AtomicBool,
    /// Monotonically non-decreasing count of admitted tasks
    task_count: AtomicU64,
}

impl AgentSlot {
    pub fn new(index: usize, tasks_per_agent: u64) -> Self {
        Self {
            index,
            tasks_per_agent,
            busy: AtomicBool::new(false),
            task_count: AtomicU64::new(0),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Stable identity; the database fixtures pre-create rows matching it.
    pub fn id(&self) -> String {
        format!("perf-test-agent-{}", self.index)
    }

    pub fn busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn task_count(&self) -> u64 {
        self.task_count.load(Ordering::SeqCst)
    }

    /// Whether the slot has exhausted its quota. Never true when unlimited.
    pub fn finished(&self) -> bool {
        self.tasks_per_agent > 0 && self.task_count() >= self.tasks_per_agent
    }

    /// Deterministic mock boot time: the current task count interpreted as
    /// seconds since the Unix epoch, rendered as ISO-8601 UTC.
    pub fn boot_time(&self) -> String {
        let timestamp = DateTime::<Utc>::from_timestamp(self.task_count() as i64, 0)
            .unwrap_or_default();
        timestamp.to_rfc3339()
    }

    /// Admit a new task on this slot, or `None` while busy or finished.
    ///
    /// Must only be called under the task manager's dispatch lock: the busy
    /// flag and task count are both updated before the task becomes
    /// observable to any other worker.
    pub(crate) fn new_task(
        self: &Arc<Self>,
        worker_index: usize,
        evidence: EvidenceBundle,
        verifier_url: &str,
    ) -> Option<AttestationTask> {
        if self.busy() || self.finished() {
            return None;
        }

        let task = AttestationTask::new(worker_index, Arc::clone(self), evidence, verifier_url);
        self.busy.store(true, Ordering::SeqCst);
        self.task_count.fetch_add(1, Ordering::SeqCst);
        Some(task)
    }

    /// Release the single-flight flag once the slot's task has concluded.
    pub(crate) fn conclude_task(&self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}
