//! The I/O half of the host-does-IO split.
//!
//! `Transport` turns an `HttpRequest` into an `HttpResponse`. It reports
//! every response it receives, whatever the status; interpreting the status
//! is the executor's job. Only failures to obtain a response at all become
//! `TransportError`.

use async_trait::async_trait;

use crate::config::Credentials;
use crate::error::TransportError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Blocking ureq agent driven from tokio's blocking pool.
///
/// Requests with `Credentials::Include` share one agent, so cookies the
/// server sets are sent back on later calls. `Credentials::Omit` requests
/// each get a fresh agent with an empty cookie jar.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        Self { agent: new_agent() }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for UreqTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let agent = match request.credentials {
            Credentials::Include => self.agent.clone(),
            Credentials::Omit => new_agent(),
        };
        tokio::task::spawn_blocking(move || execute_blocking(&agent, request))
            .await
            .map_err(|e| TransportError::new(format!("transport task failed: {e}")))?
    }
}

/// Disables ureq's status-code-as-error behavior so 4xx/5xx responses come
/// back as data rather than `Err`.
fn new_agent() -> ureq::Agent {
    ureq::Agent::config_builder()
        .http_status_as_error(false)
        .build()
        .new_agent()
}

fn with_headers<B>(mut builder: ureq::RequestBuilder<B>, headers: &[(String, String)]) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

fn execute_blocking(agent: &ureq::Agent, req: HttpRequest) -> Result<HttpResponse, TransportError> {
    let headers = &req.headers;
    let mut response = match (req.method, req.body) {
        (HttpMethod::Get, _) => with_headers(agent.get(&req.url), headers).call(),
        (HttpMethod::Delete, _) => with_headers(agent.delete(&req.url), headers).call(),
        (HttpMethod::Post, Some(body)) => with_headers(agent.post(&req.url), headers).send(body.as_bytes()),
        (HttpMethod::Post, None) => with_headers(agent.post(&req.url), headers).send_empty(),
        (HttpMethod::Put, Some(body)) => with_headers(agent.put(&req.url), headers).send(body.as_bytes()),
        (HttpMethod::Put, None) => with_headers(agent.put(&req.url), headers).send_empty(),
    }
    .map_err(|e| TransportError::new(e.to_string()))?;

    let status = response.status();
    let response_headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();
    let body = response
        .body_mut()
        .read_to_string()
        .map_err(|e| TransportError::new(format!("failed to read response body: {e}")))?;

    Ok(HttpResponse {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or_default().to_string(),
        headers: response_headers,
        body,
    })
}
