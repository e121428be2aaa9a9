//! Verifier Bench - attestation verifier load-generation harness
//!
//! Drives a remote attestation verifier's push-attestation endpoints with:
//! - A pool of worker threads each hosting a cooperative event loop
//! - A shared fleet of mock agents acting as single-flight slots
//! - A round-robin task dispatcher with server-directed backoff handling
//! - Shared stat counters reduced into a terminal report
//! - A line-delimited JSON log of every attestation task

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export key types for convenience
pub use domain::models::config::ExecutionConfig;
pub use services::task_manager::TaskManager;
