//! Worker event-loop hosts.
//!
//! Each worker is one OS thread running a current-thread tokio runtime and a
//! `LocalSet`: a single-threaded cooperative scheduler multiplexing many
//! attestation tasks. The only suspension points inside a task are the HTTP
//! fetch and the retry-after sleep; the worker loop itself yields explicitly
//! between admissions so spawned tasks get driven.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::task::LocalSet;
use tokio::time::sleep;
use tracing::{debug, error};

use crate::domain::errors::{HarnessError, HarnessResult};
use crate::domain::models::evidence::EvidenceBundle;
use crate::domain::ports::VerifierTransport;
use crate::services::task_manager::{Admission, TaskManager};

/// Builds the per-task evidence snapshot. Called once per admission attempt
/// so no two tasks ever share evidence state.
pub type EvidenceFactory = Arc<dyn Fn() -> HarnessResult<EvidenceBundle> + Send + Sync>;

/// Pause between admission attempts while every agent slot is occupied.
const IDLE_BACKOFF: Duration = Duration::from_millis(25);

/// A fleet of worker threads driving the shared task manager.
pub struct WorkerPool {
    handles: Vec<thread::JoinHandle<HarnessResult<()>>>,
}

impl WorkerPool {
    /// Launch `manager.config().worker_count` workers.
    pub fn spawn(
        manager: &Arc<TaskManager>,
        transport: &Arc<dyn VerifierTransport>,
        evidence_factory: &EvidenceFactory,
    ) -> HarnessResult<Self> {
        let worker_count = manager.config().worker_count;
        let mut handles = Vec::with_capacity(worker_count);

        for worker_index in 0..worker_count {
            let manager = Arc::clone(manager);
            let transport = Arc::clone(transport);
            let evidence_factory = Arc::clone(evidence_factory);

            let handle = thread::Builder::new()
                .name(format!("worker-{worker_index}"))
                .spawn(move || worker_main(worker_index, &manager, &transport, &evidence_factory))
                .map_err(HarnessError::Runtime)?;
            handles.push(handle);
        }

        Ok(Self { handles })
    }

    /// Wait for every worker to drain and stop. The first worker failure is
    /// returned after all threads have been joined.
    pub fn join(self) -> HarnessResult<()> {
        let mut first_error = None;
        for (index, handle) in self.handles.into_iter().enumerate() {
            let outcome = handle.join().unwrap_or_else(|panic| {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(ToString::to_string)
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic with non-string payload".to_string());
                Err(HarnessError::WorkerPanicked { index, reason })
            });
            if let Err(err) = outcome {
                error!(worker = index, error = %err, "worker failed");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn worker_main(
    worker_index: usize,
    manager: &Arc<TaskManager>,
    transport: &Arc<dyn VerifierTransport>,
    evidence_factory: &EvidenceFactory,
) -> HarnessResult<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(HarnessError::Runtime)?;

    let local = LocalSet::new();
    runtime.block_on(local.run_until(worker_loop(
        worker_index,
        manager,
        transport,
        evidence_factory,
    )))
}

/// The worker main loop: snapshot evidence, ask for a task, schedule it
/// fire-and-forget, flush the serializer, yield.
async fn worker_loop(
    worker_index: usize,
    manager: &Arc<TaskManager>,
    transport: &Arc<dyn VerifierTransport>,
    evidence_factory: &EvidenceFactory,
) -> HarnessResult<()> {
    debug!(worker = worker_index, "worker started");
    let mut in_flight = Vec::new();

    loop {
        let evidence = evidence_factory()?;

        match manager.new_task(worker_index, evidence) {
            Admission::Closed => break,
            Admission::AllBusy => sleep(IDLE_BACKOFF).await,
            Admission::Task(task) => {
                let manager = Arc::clone(manager);
                let transport = Arc::clone(transport);
                in_flight.push(tokio::task::spawn_local(async move {
                    let mut task = task;
                    // The task's own outcome (success or failure) is
                    // irrelevant here: conclusion always runs.
                    task.execute(transport.as_ref()).await;
                    manager.conclude_task(task);
                }));
            }
        }

        in_flight.retain(|handle| !handle.is_finished());
        manager.serializer().write_tasks()?;
        tokio::task::yield_now().await;
    }

    // Terminal signal observed: drain this worker's in-flight tasks, then
    // flush whatever they concluded with.
    for handle in in_flight {
        let _ = handle.await;
    }
    manager.serializer().write_tasks()?;

    debug!(worker = worker_index, "worker stopped");
    Ok(())
}
