//! Immutable, process-wide execution configuration.

/// Execution configuration resolved from the command line.
///
/// `worker_count` and `agent_count` are always ≥ 1 here; the `0 ⇒ derived`
/// defaults of the CLI are applied before construction. `tasks_per_agent`
/// keeps the raw value: 0 means unlimited.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Verifier base URL, normalized, without a trailing slash
    pub verifier_url: String,
    /// Database engine URL used by the fixture collaborator
    pub db_url: String,
    /// Number of worker event loops
    pub worker_count: usize,
    /// Number of mock agent slots
    pub agent_count: usize,
    /// Per-agent task quota; 0 means unlimited
    pub tasks_per_agent: u64,
    /// Per-request info logging
    pub verbose: bool,
}

impl ExecutionConfig {
    /// True when a per-agent quota is in force.
    pub fn bounded(&self) -> bool {
        self.tasks_per_agent > 0
    }
}
