//! Append-only line-delimited record sink for completed tasks.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::Local;
use tracing::debug;

use crate::domain::errors::{HarnessError, HarnessResult};
use crate::domain::models::task::TaskRecord;

const RESULTS_DIR: &str = "results";

/// Stages concluded task records and appends them to a `.jsonl` file, one
/// JSON object per line. Writes are append-mode, so parallel runs can share
/// a directory by writing distinct files; within one process the queue and
/// the file are guarded by a single lock.
pub struct ResultSerializer {
    file_path: PathBuf,
    queued_tasks: Mutex<Vec<TaskRecord>>,
}

impl ResultSerializer {
    /// Create a serializer writing to `results/{YYYYMMDDHHMMSS}.jsonl`,
    /// creating the directory if needed.
    pub fn new() -> HarnessResult<Self> {
        let directory = PathBuf::from(RESULTS_DIR);
        fs::create_dir_all(&directory).map_err(|source| HarnessError::ResultsFile {
            path: directory.clone(),
            source,
        })?;

        let timestamp = Local::now().format("%Y%m%d%H%M%S");
        let file_path = directory.join(format!("{timestamp}.jsonl"));
        Ok(Self::at_path(file_path))
    }

    /// Use an explicit path, resolving the way operators expect: as given,
    /// else under `results/`, else the `results/` candidate with a `.jsonl`
    /// extension.
    pub fn with_file(file_path: impl Into<PathBuf>) -> Self {
        let mut file_path: PathBuf = file_path.into();

        if !file_path.is_file() {
            file_path = Path::new(RESULTS_DIR).join(&file_path);
        }
        if !file_path.is_file() {
            file_path.set_extension("jsonl");
        }

        Self::at_path(file_path)
    }

    fn at_path(file_path: PathBuf) -> Self {
        Self {
            file_path,
            queued_tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Stage one record for the next flush.
    pub fn queue_task(&self, task: TaskRecord) {
        self.queued_tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task);
    }

    pub fn queued_count(&self) -> usize {
        self.queued_tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Append every queued record to the output file and clear the queue.
    /// Records stay queued if the file cannot be opened.
    pub fn write_tasks(&self) -> HarnessResult<()> {
        let mut queued = self
            .queued_tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if queued.is_empty() {
            return Ok(());
        }

        let io_err = |source| HarnessError::ResultsFile {
            path: self.file_path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .map_err(io_err)?;

        for task in queued.iter() {
            let line = serde_json::to_string(task).map_err(|source| {
                HarnessError::MalformedRecord {
                    path: self.file_path.clone(),
                    source,
                }
            })?;
            writeln!(file, "{line}").map_err(io_err)?;
        }

        debug!(
            records = queued.len(),
            path = %self.file_path.display(),
            "flushed task records"
        );
        queued.clear();
        Ok(())
    }

    /// Re-parse a results file. The returned records carry no agent binding
    /// and exist only to feed reporting.
    pub fn read_tasks(&self) -> HarnessResult<Vec<TaskRecord>> {
        if !self.file_path.is_file() {
            return Err(HarnessError::ResultsFileMissing(self.file_path.clone()));
        }

        let file = OpenOptions::new()
            .read(true)
            .open(&self.file_path)
            .map_err(|source| HarnessError::ResultsFile {
                path: self.file_path.clone(),
                source,
            })?;

        let mut tasks = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|source| HarnessError::ResultsFile {
                path: self.file_path.clone(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let task = serde_json::from_str(&line).map_err(|source| {
                HarnessError::MalformedRecord {
                    path: self.file_path.clone(),
                    source,
                }
            })?;
            tasks.push(task);
        }
        Ok(tasks)
    }
}
