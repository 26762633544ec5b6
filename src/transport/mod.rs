//! # Outbound Transport Abstraction
//!
//! Pluggable transport consumed by the policy engine. The engine assumes no
//! particular wire protocol, only that failures can be classified from the
//! status code or error kind. The in-crate [`MockTransport`] scripts outcomes
//! for tests and local development.

pub mod mock;
pub mod resilient_client;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classification::ClassifiedError;

/// Outbound request handed to a transport implementation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Option<serde_json::Value>,
}

impl TransportRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: HashMap::new(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Response returned by a transport implementation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Option<serde_json::Value>,
}

impl TransportResponse {
    pub fn ok(body: serde_json::Value) -> Self {
        Self {
            status: 200,
            headers: HashMap::new(),
            body: Some(body),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport-level failures observed before any response arrives
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Connection failure: {0}")]
    Connection(String),

    #[error("Transport timeout: {0}")]
    Timeout(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Pluggable outbound call interface
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// Classify a completed transport exchange at the boundary
///
/// Non-2xx statuses classify by status code; transport errors classify by
/// error kind.
pub fn classify_outcome(
    outcome: Result<TransportResponse, TransportError>,
) -> Result<TransportResponse, ClassifiedError> {
    match outcome {
        Ok(response) if response.is_success() => Ok(response),
        Ok(response) => {
            let excerpt = response
                .body
                .as_ref()
                .map(|b| b.to_string())
                .unwrap_or_default();
            Err(ClassifiedError::from_status(response.status, Some(&excerpt)))
        }
        Err(TransportError::Timeout(message)) => Err(ClassifiedError::new(
            crate::classification::ErrorKind::Timeout,
            message,
        )),
        Err(TransportError::Connection(message)) => Err(ClassifiedError::transient(message)),
        Err(TransportError::Protocol(message)) => Err(ClassifiedError::permanent(message)),
    }
}

pub use mock::MockTransport;
pub use resilient_client::ResilientClient;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::ErrorKind;

    #[test]
    fn test_classify_success_passthrough() {
        let response = TransportResponse::ok(serde_json::json!({"ok": true}));
        assert!(classify_outcome(Ok(response)).is_ok());
    }

    #[test]
    fn test_classify_statuses() {
        let mk = |status| TransportResponse {
            status,
            headers: HashMap::new(),
            body: None,
        };
        assert_eq!(
            classify_outcome(Ok(mk(503))).unwrap_err().kind,
            ErrorKind::Transient
        );
        assert_eq!(
            classify_outcome(Ok(mk(400))).unwrap_err().kind,
            ErrorKind::Permanent
        );
    }

    #[test]
    fn test_classify_transport_errors() {
        assert_eq!(
            classify_outcome(Err(TransportError::Connection("refused".into())))
                .unwrap_err()
                .kind,
            ErrorKind::Transient
        );
        assert_eq!(
            classify_outcome(Err(TransportError::Timeout("deadline".into())))
                .unwrap_err()
                .kind,
            ErrorKind::Timeout
        );
        assert_eq!(
            classify_outcome(Err(TransportError::Protocol("bad frame".into())))
                .unwrap_err()
                .kind,
            ErrorKind::Permanent
        );
    }
}
