//! Error types for the user API client.
//!
//! # Design
//! Two kinds of failure reach callers and they must stay distinguishable:
//! `ApiError` means a server answered with a non-2xx status, everything else
//! (connection failures, malformed success bodies, bad endpoints) means no
//! usable answer arrived. `RequestError` is `Clone` because the query cache
//! keeps the last error per key and hands copies to every event subscriber.

use serde_json::Value;
use thiserror::Error;

/// A non-2xx response from the server.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("HTTP {status}: {message}")]
pub struct ApiError {
    /// The response's status text.
    pub message: String,
    pub status: u16,
    /// The response body when it parsed as JSON, `None` otherwise.
    pub body: Option<Value>,
}

/// How an [`ApiError`] is treated by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 404: the requested resource does not exist.
    NotFound,
    /// 401: the session is gone; also triggers the session-expiry observer.
    Unauthorized,
    /// Any other non-2xx status.
    Application,
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self.status {
            401 => ErrorKind::Unauthorized,
            404 => ErrorKind::NotFound,
            _ => ErrorKind::Application,
        }
    }
}

/// The call never produced a response (DNS, refused connection, reset,
/// timeout, unreadable body).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors returned by the request executor and by cached queries.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The endpoint could not be resolved against the base URL.
    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A 2xx response body did not match the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),
}

impl RequestError {
    pub fn api(&self) -> Option<&ApiError> {
        match self {
            RequestError::Api(api) => Some(api),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        self.api().map(|api| api.status)
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        self.api().map(ApiError::kind)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == Some(ErrorKind::NotFound)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind() == Some(ErrorKind::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16) -> ApiError {
        ApiError {
            message: "status".to_string(),
            status,
            body: None,
        }
    }

    #[test]
    fn kinds_by_status() {
        assert_eq!(api(401).kind(), ErrorKind::Unauthorized);
        assert_eq!(api(404).kind(), ErrorKind::NotFound);
        assert_eq!(api(500).kind(), ErrorKind::Application);
        assert_eq!(api(403).kind(), ErrorKind::Application);
    }

    #[test]
    fn transport_errors_have_no_status() {
        let err = RequestError::from(TransportError::new("connection refused"));
        assert_eq!(err.status(), None);
        assert_eq!(err.kind(), None);
        assert!(!err.is_unauthorized());
        assert!(!err.is_not_found());
    }

    #[test]
    fn display() {
        let err = RequestError::from(ApiError {
            message: "Not Found".to_string(),
            status: 404,
            body: None,
        });
        assert_eq!(err.to_string(), "HTTP 404: Not Found");
        assert!(err.is_not_found());

        let err = RequestError::from(TransportError::new("connection reset"));
        assert_eq!(err.to_string(), "transport error: connection reset");

        let err = RequestError::Deserialization("expected value".to_string());
        assert_eq!(err.to_string(), "deserialization failed: expected value");
    }
}
