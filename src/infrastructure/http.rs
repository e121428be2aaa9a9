//! reqwest-backed verifier transport.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;

use crate::domain::ports::{TransportFault, VerifierTransport, WireRequest, WireResponse};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(45);

/// HTTP client for the verifier under test.
///
/// TLS peer and host verification are disabled: this is a load generator
/// talking to a test deployment with throwaway certificates. The client is
/// shared across all workers; reqwest pools connections per host.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .tcp_nodelay(true)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl VerifierTransport for HttpTransport {
    async fn execute(&self, request: &WireRequest) -> Result<WireResponse, TransportFault> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|err| TransportFault::Other(err.to_string()))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let started = Instant::now();
        let response = builder.send().await.map_err(classify)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().await.map_err(classify)?.to_vec();

        Ok(WireResponse {
            status,
            headers,
            body,
            request_time: Some(started.elapsed().as_secs_f64()),
        })
    }
}

fn classify(err: reqwest::Error) -> TransportFault {
    if err.is_timeout() {
        TransportFault::Timeout(err.to_string())
    } else if err.is_connect() {
        TransportFault::Connect(err.to_string())
    } else {
        TransportFault::Other(err.to_string())
    }
}
