//! One HTTP round trip with timing and outcome classification.

use std::fmt;
use std::sync::LazyLock;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::domain::ports::{TransportFault, VerifierTransport, WireRequest, WireResponse};

/// Process-wide monotonic epoch. All attempt timestamps are seconds since
/// this instant, comparable across worker threads.
static MONOTONIC_EPOCH: LazyLock<Instant> = LazyLock::new(Instant::now);

/// Seconds elapsed since the process-wide monotonic epoch.
pub fn monotonic_seconds() -> f64 {
    MONOTONIC_EPOCH.elapsed().as_secs_f64()
}

/// Which protocol phase an attempt belongs to. Only used for the attempt's
/// log identity; classification is method-derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Create,
    Update,
}

impl Phase {
    fn short(self) -> char {
        match self {
            Self::Create => 'c',
            Self::Update => 'u',
        }
    }
}

/// Identifying context for log lines: which agent, task, worker, and
/// position in the phase's attempt sequence this request belongs to.
#[derive(Debug, Clone)]
pub struct AttemptContext {
    pub agent_index: usize,
    pub agent_id: String,
    pub task_index: u64,
    pub worker_index: usize,
    pub phase: Phase,
    pub attempt_index: usize,
}

impl AttemptContext {
    /// Compact attempt id, e.g. `a0|t3|c1` for the second create attempt of
    /// agent 0's task 3.
    pub fn id(&self) -> String {
        format!(
            "a{}|t{}|{}{}",
            self.agent_index,
            self.task_index,
            self.phase.short(),
            self.attempt_index
        )
    }
}

/// One request/response exchange with the verifier.
///
/// Construction fixes the method and URL; `set_json_body` / `set_text_body`
/// fill in the payload and pick the Content-Type. `perform` captures
/// monotonic start/end timestamps around the fetch, stores the response or
/// the transport fault, parses the body as JSON exactly once, and logs a
/// single outcome line.
pub struct RequestAttempt {
    context: AttemptContext,
    request: WireRequest,
    start_time: Option<f64>,
    end_time: Option<f64>,
    response: Option<WireResponse>,
    response_json: Option<Value>,
    fault: Option<TransportFault>,
}

impl RequestAttempt {
    pub fn new(context: AttemptContext, method: &str, url: impl Into<String>) -> Self {
        Self {
            context,
            request: WireRequest::new(method, url),
            start_time: None,
            end_time: None,
            response: None,
            response_json: None,
            fault: None,
        }
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.request.headers.push((name.into(), value.into()));
    }

    /// JSON payloads get `Content-Type: application/json`.
    pub fn set_json_body(&mut self, body: &Value) {
        self.set_header("Content-Type", "application/json");
        self.request.body = Some(body.to_string());
    }

    /// Anything else is sent as plain text.
    pub fn set_text_body(&mut self, body: impl Into<String>) {
        self.set_header("Content-Type", "text/plain");
        self.request.body = Some(body.into());
    }

    /// Issue the request. Transport faults are captured, not propagated: a
    /// faulted attempt is simply classified as failed.
    pub async fn perform(&mut self, transport: &dyn VerifierTransport) {
        debug!(
            attempt = %self.context.id(),
            worker = self.context.worker_index,
            "{} {}",
            self.request.method,
            self.request.url
        );

        self.start_time = Some(monotonic_seconds());
        match transport.execute(&self.request).await {
            Ok(response) => self.response = Some(response),
            Err(fault) => self.fault = Some(fault),
        }
        self.end_time = Some(monotonic_seconds());

        self.response_json = self.parse_response_json();
        self.log_outcome();
    }

    /// CRUD action implied by the method.
    pub fn action(&self) -> Option<&'static str> {
        match self.request.method.to_uppercase().as_str() {
            "POST" => Some("create"),
            "GET" => Some("read"),
            "PUT" | "PATCH" => Some("update"),
            "DELETE" => Some("delete"),
            _ => None,
        }
    }

    pub fn start_time(&self) -> Option<f64> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<f64> {
        self.end_time
    }

    /// Server-reported request time when the transport measured one, else
    /// the interval between the captured timestamps.
    pub fn duration(&self) -> Option<f64> {
        if let Some(request_time) = self.response.as_ref().and_then(|r| r.request_time) {
            return Some(request_time);
        }
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// The single success predicate: no fault, a JSON object body, 2xx.
    pub fn ok(&self) -> bool {
        let Some(response) = &self.response else {
            return false;
        };
        self.fault.is_none()
            && matches!(self.response_json, Some(Value::Object(_)))
            && (200..=299).contains(&response.status)
    }

    /// Strictly status 409.
    pub fn conflicts(&self) -> bool {
        self.response.as_ref().is_some_and(|r| r.status == 409)
    }

    /// Server-directed backoff in seconds. A 409 implicitly requests one
    /// second even without a `Retry-After` header.
    pub fn retry_after(&self) -> u64 {
        let Some(response) = &self.response else {
            return 0;
        };
        let retry_after = response
            .header("Retry-After")
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(0)
            .max(0) as u64;

        if retry_after == 0 && self.conflicts() {
            return 1;
        }
        retry_after
    }

    pub fn response_status(&self) -> Option<u16> {
        self.response.as_ref().map(|r| r.status)
    }

    pub fn fault(&self) -> Option<&TransportFault> {
        self.fault.as_ref()
    }

    /// The serialized form: only the design-relevant fields survive.
    pub fn record(&self) -> AttemptRecord {
        AttemptRecord {
            action: self.action().map(str::to_string),
            method: self.request.method.clone(),
            url: self.request.url.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            duration: self.duration(),
            ok: self.ok(),
            conflicts: self.conflicts(),
            retry_after: self.retry_after(),
        }
    }

    fn parse_response_json(&self) -> Option<Value> {
        let response = self.response.as_ref()?;
        let text = String::from_utf8_lossy(&response.body);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        // A body that does not parse is not itself a fault; it just keeps
        // the attempt from being ok.
        serde_json::from_str(trimmed).ok()
    }

    fn log_outcome(&self) {
        let operation = format!(
            "{} attestation {} for {}",
            self.action().unwrap_or("perform"),
            self.context.task_index,
            self.context.agent_id
        );
        let id = self.context.id();
        let worker = self.context.worker_index;

        if self.ok() {
            let duration = HumanDuration(self.duration().unwrap_or(0.0));
            info!(attempt = %id, worker, "{operation} in {duration}");
            return;
        }

        let retry_after = self.retry_after();
        if retry_after > 0 {
            let issue = if self.conflicts() {
                "already in progress"
            } else {
                "performed too early"
            };
            let unit = if retry_after == 1 { "second" } else { "seconds" };
            warn!(
                attempt = %id,
                worker,
                "{operation} {issue}, retrying in {retry_after} {unit}"
            );
            return;
        }

        let duration = HumanDuration(self.duration().unwrap_or(0.0));
        let details = self.failure_details();
        error!(attempt = %id, worker, "{operation} failed after {duration}: {details}");
    }

    fn failure_details(&self) -> String {
        if let Some(fault) = &self.fault {
            return format!("transport fault during request/response: {fault}");
        }
        let Some(response) = &self.response else {
            return "no response received".to_string();
        };
        let text = String::from_utf8_lossy(&response.body);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return format!("received empty response body (status={})", response.status);
        }
        if self.response_json.is_none() {
            return format!(
                "response body could not be parsed as JSON (status={}): {trimmed}",
                response.status
            );
        }
        if !(200..=299).contains(&response.status) {
            return format!(
                "received unexpected status code {} and JSON response body: {trimmed}",
                response.status
            );
        }
        "an unknown error occurred".to_string()
    }
}

/// The persisted shape of one attempt: exactly the design-relevant fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub action: Option<String>,
    pub method: String,
    pub url: String,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    pub duration: Option<f64>,
    pub ok: bool,
    pub conflicts: bool,
    pub retry_after: u64,
}

impl AttemptRecord {
    /// Whether this attempt counts into the retry bin: not ok, but the
    /// server asked for another try.
    pub fn retried(&self) -> bool {
        !self.ok && self.retry_after > 0
    }
}

/// Human-friendly duration rendering, scaled to the dominant unit.
pub struct HumanDuration(pub f64);

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let seconds = self.0;
        if seconds < 0.000_001 {
            write!(f, "{}ns", (seconds * 1e9).round())
        } else if seconds < 0.001 {
            write!(f, "{}\u{3bc}s", (seconds * 1e6).round())
        } else if seconds < 1.0 {
            write!(f, "{}ms", (seconds * 1e3).round())
        } else if seconds < 60.0 {
            write!(f, "{:.1}s", seconds)
        } else if seconds < 3600.0 {
            write!(f, "{:.1}m", seconds / 60.0)
        } else {
            write!(f, "{:.1}h", seconds / 3600.0)
        }
    }
}
