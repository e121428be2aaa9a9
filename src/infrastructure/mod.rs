//! Infrastructure: HTTP transport, logging setup, database fixtures.

pub mod database;
pub mod http;
pub mod logging;

pub use http::HttpTransport;
