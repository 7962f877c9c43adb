//! Request executor: builds requests, hands them to a transport, and turns
//! responses into typed results.
//!
//! # Design
//! `RequestExecutor` carries no mutable state between calls: a resolved base
//! URL, the credentials policy and a shared transport. Each call is split into
//! `build_request` (options to `HttpRequest`) and `parse_response`
//! (`HttpResponse` to `T`), both free of I/O, with the transport round-trip in
//! between. Cloning is cheap and clones share the transport.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::config::{ClientConfig, ConfigError, Credentials};
use crate::error::{ApiError, RequestError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::transport::Transport;

/// One call: method, endpoint, optional headers and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOptions {
    pub method: HttpMethod,
    /// Absolute URL, or a path joined against the configured base URL.
    pub endpoint: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl RequestOptions {
    pub fn new(method: HttpMethod, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, endpoint)
    }

    pub fn put(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, endpoint)
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, endpoint)
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `body` as the JSON payload and sets the content type.
    pub fn with_json<B: Serialize>(self, body: &B) -> Result<Self, RequestError> {
        let body = serde_json::to_string(body).map_err(|e| RequestError::Serialization(e.to_string()))?;
        Ok(self
            .with_header("content-type", "application/json")
            .with_body(body))
    }
}

#[derive(Clone)]
pub struct RequestExecutor {
    base_url: Option<Url>,
    credentials: Credentials,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl RequestExecutor {
    pub fn new(transport: Arc<dyn Transport>, config: &ClientConfig) -> Result<Self, ConfigError> {
        let base_url = config
            .base_url
            .as_deref()
            .map(|url| {
                Url::parse(url).map_err(|e| ConfigError::InvalidBaseUrl {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;
        Ok(Self {
            base_url,
            credentials: config.credentials,
            transport,
        })
    }

    pub fn credentials(&self) -> Credentials {
        self.credentials
    }

    /// Resolves `endpoint` the way a browser resolves a link: absolute URLs
    /// are kept, anything else is joined against the base URL when one is
    /// configured and passed through otherwise.
    pub fn resolve(&self, endpoint: &str) -> Result<String, RequestError> {
        if Url::parse(endpoint).is_ok() {
            return Ok(endpoint.to_string());
        }
        match &self.base_url {
            Some(base) => base
                .join(endpoint)
                .map(String::from)
                .map_err(|e| RequestError::InvalidEndpoint {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                }),
            None => Ok(endpoint.to_string()),
        }
    }

    pub fn build_request(&self, options: RequestOptions) -> Result<HttpRequest, RequestError> {
        Ok(HttpRequest {
            method: options.method,
            url: self.resolve(&options.endpoint)?,
            headers: options.headers,
            body: options.body,
            credentials: self.credentials,
        })
    }

    /// Performs the call and decodes a 2xx body as `T`.
    pub async fn execute<T: DeserializeOwned>(&self, options: RequestOptions) -> Result<T, RequestError> {
        let response = self.send(options).await?;
        parse_response(response)
    }

    /// Performs the call and ignores the body of a 2xx response.
    pub async fn execute_unit(&self, options: RequestOptions) -> Result<(), RequestError> {
        self.send(options).await.map(drop)
    }

    async fn send(&self, options: RequestOptions) -> Result<HttpResponse, RequestError> {
        let request = self.build_request(options)?;
        let method = request.method;
        let url = request.url.clone();
        debug!(%method, %url, "sending request");

        let response = self.transport.send(request).await.map_err(|e| {
            debug!(%method, %url, error = %e, "transport failed");
            RequestError::Transport(e)
        })?;
        debug!(%method, %url, status = response.status, "received response");

        check_status(&response)?;
        Ok(response)
    }
}

/// Decodes the body of a response whose status was already accepted.
pub fn parse_response<T: DeserializeOwned>(response: HttpResponse) -> Result<T, RequestError> {
    check_status(&response)?;
    serde_json::from_str(&response.body).map_err(|e| RequestError::Deserialization(e.to_string()))
}

/// Map non-2xx responses to `ApiError`, keeping the body when it is JSON.
pub fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    Err(ApiError {
        message: response.status_text.clone(),
        status: response.status,
        body: serde_json::from_str(&response.body).ok(),
    })
}
