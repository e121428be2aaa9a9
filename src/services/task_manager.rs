//! Round-robin task dispatch, admission gating, and task accounting.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};

use crate::domain::errors::HarnessResult;
use crate::domain::models::agent::AgentSlot;
use crate::domain::models::config::ExecutionConfig;
use crate::domain::models::evidence::EvidenceBundle;
use crate::domain::models::task::AttestationTask;
use crate::services::serializer::ResultSerializer;
use crate::services::stats::GlobalStats;

/// Outcome of an admission request.
pub enum Admission {
    /// A task was admitted and is now the caller's to execute.
    Task(AttestationTask),
    /// Every agent is momentarily occupied (busy or already finished while
    /// others drain); yield and ask again.
    AllBusy,
    /// Terminal end-of-stream: admissions are closed or every agent has
    /// reached its quota.
    Closed,
}

/// Shared dispatcher: owns the agent fleet, the admission gate, the
/// round-robin cursor, the serializer, and the stat counters.
///
/// The whole admission sequence (gate check, cursor scan, slot reservation)
/// runs under one dispatch mutex, serializing admission across workers; no
/// operation here suspends or performs I/O under that lock.
pub struct TaskManager {
    config: ExecutionConfig,
    agents: Vec<Arc<AgentSlot>>,
    admissions_open: AtomicBool,
    next_agent_index: Mutex<usize>,
    in_flight: Mutex<HashSet<(usize, u64)>>,
    stats: GlobalStats,
    serializer: ResultSerializer,
}

impl TaskManager {
    pub fn new(config: ExecutionConfig) -> HarnessResult<Self> {
        let serializer = ResultSerializer::new()?;
        Ok(Self::with_serializer(config, serializer))
    }

    /// Build with an explicit serializer (tests point this at a temp file).
    pub fn with_serializer(config: ExecutionConfig, serializer: ResultSerializer) -> Self {
        let agents = (0..config.agent_count)
            .map(|index| Arc::new(AgentSlot::new(index, config.tasks_per_agent)))
            .collect();

        Self {
            config,
            agents,
            admissions_open: AtomicBool::new(true),
            next_agent_index: Mutex::new(0),
            in_flight: Mutex::new(HashSet::new()),
            stats: GlobalStats::new(),
            serializer,
        }
    }

    /// Admit a new task for `worker_index`, consuming the evidence snapshot
    /// on success.
    pub fn new_task(&self, worker_index: usize, evidence: EvidenceBundle) -> Admission {
        let mut cursor = self
            .next_agent_index
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if !self.admissions_open() || self.all_finished() {
            return Admission::Closed;
        }

        // Finished-but-idle agents also stall admission while the remaining
        // busy agents drain towards their quota; without this the cursor
        // scan below could never terminate.
        if self
            .agents
            .iter()
            .all(|agent| agent.busy() || agent.finished())
        {
            return Admission::AllBusy;
        }

        loop {
            let candidate = &self.agents[*cursor];
            if !candidate.busy() && !candidate.finished() {
                break;
            }
            *cursor = (*cursor + 1) % self.agents.len();
        }

        let agent = Arc::clone(&self.agents[*cursor]);
        *cursor = (*cursor + 1) % self.agents.len();

        match agent.new_task(worker_index, evidence, &self.config.verifier_url) {
            Some(task) => {
                self.in_flight
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(task.key());
                Admission::Task(task)
            }
            // The scan above found the slot idle under the dispatch lock,
            // so this arm is never taken; degrade to a transient refusal.
            None => Admission::AllBusy,
        }
    }

    /// Conclude a finished task: drop it from the in-flight set, enqueue it
    /// on the serializer, fold it into the stats, and release the owning
    /// agent's single-flight flag, in that order. Consuming the task makes
    /// a second conclusion unrepresentable.
    pub fn conclude_task(&self, task: AttestationTask) {
        let removed = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&task.key());

        if !removed {
            warn!(
                agent = task.agent_index(),
                task = task.task_index(),
                "ignoring conclusion of a task that was never admitted"
            );
            return;
        }

        let record = task.record();
        self.serializer.queue_task(record.clone());
        self.stats.record_task(&record);
        task.agent().conclude_task();
    }

    /// Close the admission gate; workers drain in-flight tasks and then
    /// observe the terminal signal.
    pub fn disallow_new_tasks(&self) {
        self.admissions_open.store(false, Ordering::SeqCst);
        info!("admissions closed, draining in-flight tasks");
    }

    pub fn admissions_open(&self) -> bool {
        self.admissions_open.load(Ordering::SeqCst)
    }

    pub fn all_busy(&self) -> bool {
        self.agents.iter().all(|agent| agent.busy())
    }

    /// True only under a quota: unbounded runs never finish on their own.
    pub fn all_finished(&self) -> bool {
        self.config.bounded() && self.agents.iter().all(|agent| agent.finished())
    }

    pub fn agents(&self) -> &[Arc<AgentSlot>] {
        &self.agents
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn stats(&self) -> &GlobalStats {
        &self.stats
    }

    pub fn serializer(&self) -> &ResultSerializer {
        &self.serializer
    }
}
