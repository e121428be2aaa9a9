//! Domain errors for the load-generation harness.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the harness core. All of these are infrastructure
/// faults in the harness itself: fatal to the owning worker, surfaced as a
/// non-zero process exit. Verifier-side failures are never errors; they are
/// classified outcomes on the request attempts that observed them.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("invalid {kind} URL '{input}': {reason}")]
    InvalidUrl {
        kind: &'static str,
        input: String,
        reason: String,
    },

    #[error("results file {path}: {source}")]
    ResultsFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no results file exists at {0}")]
    ResultsFileMissing(PathBuf),

    #[error("malformed task record in {path}: {source}")]
    MalformedRecord {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("evidence fixture {path}: {source}")]
    EvidenceFixture {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("worker runtime could not be built: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("worker {index} terminated abnormally: {reason}")]
    WorkerPanicked { index: usize, reason: String },
}

pub type HarnessResult<T> = Result<T, HarnessError>;
