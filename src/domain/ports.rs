//! Transport port for talking to the verifier.
//!
//! Request attempts are written against this seam rather than a concrete
//! HTTP client, so scenario tests can script verifier behavior in-process.
//! The production implementation lives in `infrastructure::http`.

use async_trait::async_trait;
use thiserror::Error;

/// One outbound request, fully assembled by the attempt that owns it.
#[derive(Debug, Clone)]
pub struct WireRequest {
    /// HTTP method, upper-case ("POST", "PATCH", ...)
    pub method: String,
    /// Absolute request URL
    pub url: String,
    /// Request headers in insertion order
    pub headers: Vec<(String, String)>,
    /// Request body, if any
    pub body: Option<String>,
}

impl WireRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }
}

/// A response as observed on the wire. Any status code is a valid response;
/// classification happens on the request attempt, not here.
#[derive(Debug, Clone)]
pub struct WireResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: Vec<(String, String)>,
    /// Raw response body bytes
    pub body: Vec<u8>,
    /// Transport-measured request time in seconds, when available
    pub request_time: Option<f64>,
}

impl WireResponse {
    /// Case-insensitive header lookup, first match wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Transport-level faults: the request never produced an HTTP response.
/// These are captured on the attempt and classify it as failed; they never
/// abort the harness.
#[derive(Debug, Clone, Error)]
pub enum TransportFault {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("transport error: {0}")]
    Other(String),
}

/// The verifier transport seam.
///
/// Implementations enforce the per-request timeouts (20 s connect, 45 s
/// total) and surface breaches as [`TransportFault`]s.
#[async_trait]
pub trait VerifierTransport: Send + Sync {
    async fn execute(&self, request: &WireRequest) -> Result<WireResponse, TransportFault>;
}
