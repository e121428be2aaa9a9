//! Shared statistics counters.
//!
//! Counters are shared across all worker threads. Each counter guards its
//! four-field tuple with one mutex, so a single `record` observation updates
//! count, total, shortest and longest atomically with respect to concurrent
//! observers. Leaf bins propagate into their linked `all` bin by recording
//! into it sequentially after their own update; the two locks are never held
//! at the same time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::domain::models::task::TaskRecord;

/// Initial shortest-duration sentinel; any real observation undercuts it.
const SHORTEST_SENTINEL: f64 = 9999.0;

struct Cells {
    count: u64,
    total_duration: f64,
    shortest_duration: f64,
    longest_duration: f64,
}

/// One statistics bin: an observation count plus duration aggregates.
pub struct StatCounter {
    cells: Mutex<Cells>,
    total: Option<Arc<StatCounter>>,
}

impl StatCounter {
    fn new(total: Option<Arc<StatCounter>>) -> Self {
        Self {
            cells: Mutex::new(Cells {
                count: 0,
                total_duration: 0.0,
                shortest_duration: SHORTEST_SENTINEL,
                longest_duration: 0.0,
            }),
            total,
        }
    }

    /// A free-standing bin.
    pub fn standalone() -> Arc<Self> {
        Arc::new(Self::new(None))
    }

    /// A bin whose every observation also feeds `total`.
    pub fn linked(total: &Arc<StatCounter>) -> Arc<Self> {
        Arc::new(Self::new(Some(Arc::clone(total))))
    }

    /// Fold one duration observation in. `None` durations (attempts that
    /// never got timing, e.g. re-read from disk with nulls) are skipped.
    pub fn record(&self, duration: Option<f64>) {
        let Some(duration) = duration else {
            return;
        };

        {
            let mut cells = self.lock();
            cells.count += 1;
            cells.total_duration += duration;
            if duration < cells.shortest_duration {
                cells.shortest_duration = duration;
            }
            if duration > cells.longest_duration {
                cells.longest_duration = duration;
            }
        }

        if let Some(total) = &self.total {
            total.record(Some(duration));
        }
    }

    pub fn count(&self) -> u64 {
        self.lock().count
    }

    pub fn total_duration(&self) -> Option<f64> {
        let cells = self.lock();
        (cells.count > 0).then_some(cells.total_duration)
    }

    pub fn shortest_duration(&self) -> Option<f64> {
        let cells = self.lock();
        (cells.count > 0).then_some(cells.shortest_duration)
    }

    pub fn longest_duration(&self) -> Option<f64> {
        let cells = self.lock();
        (cells.count > 0).then_some(cells.longest_duration)
    }

    pub fn average_duration(&self) -> Option<f64> {
        let cells = self.lock();
        (cells.count > 0).then(|| cells.total_duration / cells.count as f64)
    }

    /// Share of the linked total this bin accounts for.
    pub fn percentage(&self) -> Option<f64> {
        let total = self.total.as_ref()?;
        let total_count = total.count();
        (total_count > 0).then(|| self.count() as f64 / total_count as f64)
    }

    /// Observations per `denominator` time units.
    pub fn rate(&self, denominator: f64) -> Option<f64> {
        (denominator != 0.0).then(|| self.count() as f64 / denominator)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Cells> {
        self.cells.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Per-phase request outcome bins: every attempt lands in exactly one of
/// ok/retry/fail, and transitively in `all`.
pub struct RequestStats {
    pub all: Arc<StatCounter>,
    pub ok: Arc<StatCounter>,
    pub retry: Arc<StatCounter>,
    pub fail: Arc<StatCounter>,
}

impl RequestStats {
    pub fn new() -> Self {
        let all = StatCounter::standalone();
        Self {
            ok: StatCounter::linked(&all),
            retry: StatCounter::linked(&all),
            fail: StatCounter::linked(&all),
            all,
        }
    }
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-phase (or full-protocol) execution bins: success/fail plus `all`.
pub struct ProtocolStats {
    pub all: Arc<StatCounter>,
    pub success: Arc<StatCounter>,
    pub fail: Arc<StatCounter>,
}

impl ProtocolStats {
    pub fn new() -> Self {
        let all = StatCounter::standalone();
        Self {
            success: StatCounter::linked(&all),
            fail: StatCounter::linked(&all),
            all,
        }
    }
}

impl Default for ProtocolStats {
    fn default() -> Self {
        Self::new()
    }
}

/// The run-wide statistics aggregate: request and protocol bins per phase,
/// the overall time window, and the observed worker/agent counts.
pub struct GlobalStats {
    pub create_requests: RequestStats,
    pub update_requests: RequestStats,
    pub create_phases: ProtocolStats,
    pub update_phases: ProtocolStats,
    pub full_protocol_runs: ProtocolStats,
    start_time: Mutex<f64>,
    end_time: Mutex<f64>,
    worker_count: AtomicUsize,
    agent_count: AtomicUsize,
}

impl GlobalStats {
    pub fn new() -> Self {
        Self {
            create_requests: RequestStats::new(),
            update_requests: RequestStats::new(),
            create_phases: ProtocolStats::new(),
            update_phases: ProtocolStats::new(),
            full_protocol_runs: ProtocolStats::new(),
            start_time: Mutex::new(0.0),
            end_time: Mutex::new(0.0),
            worker_count: AtomicUsize::new(0),
            agent_count: AtomicUsize::new(0),
        }
    }

    /// Fold one concluded task into every applicable bin.
    pub fn record_task(&self, task: &TaskRecord) {
        self.update_start_time(task.start_time());
        self.update_end_time(task.end_time());
        self.update_worker_count(task.worker_index + 1);
        self.update_agent_count(task.agent_index + 1);

        if task.create_successful {
            self.create_phases.success.record(Some(task.create_duration));
        } else {
            self.create_phases.fail.record(Some(task.create_duration));
        }

        if task.update_successful {
            self.update_phases.success.record(Some(task.update_duration));
            self.full_protocol_runs
                .success
                .record(Some(task.total_duration()));
        } else {
            self.update_phases.fail.record(Some(task.update_duration));
            self.full_protocol_runs
                .fail
                .record(Some(task.total_duration()));
        }

        for attempt in &task.create_attempts {
            if attempt.ok {
                self.create_requests.ok.record(attempt.duration);
            } else if attempt.retried() {
                self.create_requests.retry.record(attempt.duration);
            } else {
                self.create_requests.fail.record(attempt.duration);
            }
        }

        for attempt in &task.update_attempts {
            if attempt.ok {
                self.update_requests.ok.record(attempt.duration);
            } else if attempt.retried() {
                self.update_requests.retry.record(attempt.duration);
            } else {
                self.update_requests.fail.record(attempt.duration);
            }
        }
    }

    fn update_start_time(&self, start_time: Option<f64>) {
        let Some(start_time) = start_time else { return };
        let mut earliest = self
            .start_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *earliest == 0.0 || start_time < *earliest {
            *earliest = start_time;
        }
    }

    fn update_end_time(&self, end_time: Option<f64>) {
        let Some(end_time) = end_time else { return };
        let mut latest = self.end_time.lock().unwrap_or_else(PoisonError::into_inner);
        if *latest == 0.0 || end_time > *latest {
            *latest = end_time;
        }
    }

    fn update_worker_count(&self, worker_count: usize) {
        self.worker_count.fetch_max(worker_count, Ordering::SeqCst);
    }

    fn update_agent_count(&self, agent_count: usize) {
        self.agent_count.fetch_max(agent_count, Ordering::SeqCst);
    }

    pub fn start_time(&self) -> f64 {
        *self
            .start_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn end_time(&self) -> f64 {
        *self.end_time.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Width of the observed wall-clock window across all tasks.
    pub fn track_duration(&self) -> f64 {
        self.end_time() - self.start_time()
    }

    /// Highest observed worker index + 1.
    pub fn worker_count(&self) -> usize {
        self.worker_count.load(Ordering::SeqCst)
    }

    /// Highest observed agent index + 1.
    pub fn agent_count(&self) -> usize {
        self.agent_count.load(Ordering::SeqCst)
    }
}

impl Default for GlobalStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::attempt::AttemptRecord;

    fn attempt(ok: bool, retry_after: u64, duration: f64) -> AttemptRecord {
        AttemptRecord {
            action: Some("create".to_string()),
            method: "POST".to_string(),
            url: "https://verifier/x".to_string(),
            start_time: Some(1.0),
            end_time: Some(1.0 + duration),
            duration: Some(duration),
            ok,
            conflicts: retry_after == 1,
            retry_after,
        }
    }

    fn successful_task() -> TaskRecord {
        TaskRecord {
            agent_index: 2,
            task_index: 0,
            worker_index: 1,
            create_successful: true,
            update_successful: true,
            create_duration: 0.3,
            update_duration: 0.2,
            create_attempts: vec![attempt(false, 1, 0.1), attempt(true, 0, 0.2)],
            update_attempts: vec![attempt(true, 0, 0.2)],
        }
    }

    #[test]
    fn test_record_updates_all_four_fields() {
        let counter = StatCounter::standalone();
        counter.record(Some(2.0));
        counter.record(Some(4.0));
        counter.record(None);

        assert_eq!(counter.count(), 2);
        assert_eq!(counter.total_duration(), Some(6.0));
        assert_eq!(counter.shortest_duration(), Some(2.0));
        assert_eq!(counter.longest_duration(), Some(4.0));
        assert_eq!(counter.average_duration(), Some(3.0));
    }

    #[test]
    fn test_empty_counter_reports_blank_aggregates() {
        let counter = StatCounter::standalone();
        assert_eq!(counter.count(), 0);
        assert!(counter.total_duration().is_none());
        assert!(counter.shortest_duration().is_none());
        assert!(counter.longest_duration().is_none());
        assert!(counter.average_duration().is_none());
        assert!(counter.percentage().is_none());
    }

    #[test]
    fn test_linked_records_propagate_to_total() {
        let stats = RequestStats::new();
        stats.ok.record(Some(1.0));
        stats.retry.record(Some(3.0));
        stats.fail.record(Some(2.0));

        assert_eq!(stats.all.count(), 3);
        assert_eq!(stats.all.total_duration(), Some(6.0));
        assert_eq!(stats.all.shortest_duration(), Some(1.0));
        assert_eq!(stats.all.longest_duration(), Some(3.0));
        assert_eq!(stats.ok.percentage(), Some(1.0 / 3.0));
    }

    #[test]
    fn test_rate() {
        let counter = StatCounter::standalone();
        counter.record(Some(0.1));
        counter.record(Some(0.1));
        assert_eq!(counter.rate(4.0), Some(0.5));
        assert!(counter.rate(0.0).is_none());
    }

    #[test]
    fn test_record_task_bins_by_outcome() {
        let stats = GlobalStats::new();
        stats.record_task(&successful_task());

        assert_eq!(stats.create_requests.ok.count(), 1);
        assert_eq!(stats.create_requests.retry.count(), 1);
        assert_eq!(stats.create_requests.fail.count(), 0);
        assert_eq!(stats.create_requests.all.count(), 2);
        assert_eq!(stats.update_requests.ok.count(), 1);

        assert_eq!(stats.create_phases.success.count(), 1);
        assert_eq!(stats.update_phases.success.count(), 1);
        assert_eq!(stats.full_protocol_runs.success.count(), 1);
        assert_eq!(stats.full_protocol_runs.all.count(), 1);

        assert_eq!(stats.worker_count(), 2);
        assert_eq!(stats.agent_count(), 3);
    }

    #[test]
    fn test_failed_create_still_records_both_phase_bins() {
        let task = TaskRecord {
            agent_index: 0,
            task_index: 0,
            worker_index: 0,
            create_successful: false,
            update_successful: false,
            create_duration: 0.4,
            update_duration: 0.0,
            create_attempts: vec![attempt(false, 0, 0.4)],
            update_attempts: vec![],
        };
        let stats = GlobalStats::new();
        stats.record_task(&task);

        assert_eq!(stats.create_phases.fail.count(), 1);
        assert_eq!(stats.update_phases.fail.count(), 1);
        assert_eq!(stats.full_protocol_runs.fail.count(), 1);
        assert_eq!(stats.create_requests.fail.count(), 1);
        assert_eq!(stats.update_requests.all.count(), 0);
    }

    #[test]
    fn test_time_window_tracks_min_start_max_end() {
        let stats = GlobalStats::new();
        let mut early = successful_task();
        early.create_attempts = vec![attempt(true, 0, 1.0)];
        early.create_attempts[0].start_time = Some(5.0);
        early.update_attempts[0].end_time = Some(9.0);
        stats.record_task(&early);

        let mut late = successful_task();
        late.create_attempts = vec![attempt(true, 0, 1.0)];
        late.create_attempts[0].start_time = Some(2.0);
        late.update_attempts[0].end_time = Some(7.0);
        stats.record_task(&late);

        assert_eq!(stats.start_time(), 2.0);
        assert_eq!(stats.end_time(), 9.0);
        assert_eq!(stats.track_duration(), 7.0);
    }
}
