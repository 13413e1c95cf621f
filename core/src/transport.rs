//! Executes `HttpRequest`s against the network.
//!
//! `Transport` is the seam between the deterministic `ApiClient` and real
//! I/O. `UreqTransport` is the production implementation: blocking, pooled,
//! bounded by the configured timeout, and it returns 4xx/5xx responses as
//! data so status interpretation stays in `ApiClient`.

use std::io;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Runs one HTTP round-trip.
pub trait Transport: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// Blocking transport backed by a pooled `ureq::Agent`.
pub struct UreqTransport {
    agent: ureq::Agent,
    timeout: Duration,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .new_agent();
        Self { agent, timeout }
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        tracing::debug!(method = %request.method, url = %request.url, "sending request");
        let started = Instant::now();

        let result = match request.method {
            HttpMethod::Get => {
                let mut builder = self.agent.get(&request.url);
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder.call()
            }
            HttpMethod::Post => {
                let mut builder = self.agent.post(&request.url);
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                match request.body.as_deref() {
                    Some(body) => builder.send(body.as_bytes()),
                    None => builder.send_empty(),
                }
            }
        };

        let mut response = result.map_err(|e| self.map_error(e))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        // A status without a readable body is still a failure.
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| self.map_error(e))?;

        tracing::debug!(
            status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "received response"
        );
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

impl UreqTransport {
    fn map_error(&self, err: ureq::Error) -> Error {
        let timed_out = match &err {
            ureq::Error::Timeout(_) => true,
            ureq::Error::Io(e) => e.kind() == io::ErrorKind::TimedOut,
            _ => false,
        };
        if timed_out {
            tracing::warn!(timeout = ?self.timeout, "request timed out");
            Error::Timeout(format!("no response within {:?}", self.timeout))
        } else {
            tracing::warn!(error = %err, "transport failure");
            Error::Transport(err.to_string())
        }
    }
}
