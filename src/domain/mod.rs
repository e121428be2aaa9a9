//! Domain layer: core models, errors, and the transport port.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{HarnessError, HarnessResult};
