//! Service layer: dispatch, statistics, serialization, and worker hosting.

pub mod serializer;
pub mod stats;
pub mod task_manager;
pub mod worker;

pub use serializer::ResultSerializer;
pub use stats::{GlobalStats, ProtocolStats, RequestStats, StatCounter};
pub use task_manager::{Admission, TaskManager};
pub use worker::WorkerPool;
