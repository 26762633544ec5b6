//! # Correlation Context
//!
//! Request-scoped correlation identifier propagation. A context is opened at
//! ingress (reusing the inbound `X-Correlation-ID` header when it is present
//! and well-formed, generating a UUID v4 otherwise), travels by value into
//! every outbound call and published envelope, and is never mutated after
//! creation. Pure propagation - no network behavior lives here.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::correlation::{CORRELATION_ID_HEADER, MAX_CORRELATION_ID_LENGTH};

tokio::task_local! {
    static CURRENT_CONTEXT: CorrelationContext;
}

/// Opaque correlation identifier carried across a causal chain
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a fresh collision-resistant identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Accept an inbound header value when well-formed, else generate
    ///
    /// A value is well-formed when it is non-empty, within the length limit,
    /// and printable ASCII (header-safe). Precedence is fixed: the inbound
    /// value wins whenever it is valid.
    pub fn from_inbound(header_value: Option<&str>) -> Self {
        match header_value {
            Some(value) if Self::is_well_formed(value) => Self(value.to_string()),
            _ => Self::new(),
        }
    }

    fn is_well_formed(value: &str) -> bool {
        !value.is_empty()
            && value.len() <= MAX_CORRELATION_ID_LENGTH
            && value.chars().all(|c| c.is_ascii_graphic())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self::from_inbound(Some(value))
    }
}

/// Request-scoped context carrying the correlation id through a call chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationContext {
    pub correlation_id: CorrelationId,
    pub started_at: DateTime<Utc>,
}

impl CorrelationContext {
    /// Open a context with a freshly generated id
    pub fn new() -> Self {
        Self {
            correlation_id: CorrelationId::new(),
            started_at: Utc::now(),
        }
    }

    /// Open a context from an inbound header value (generated when absent
    /// or malformed)
    pub fn from_header(header_value: Option<&str>) -> Self {
        Self {
            correlation_id: CorrelationId::from_inbound(header_value),
            started_at: Utc::now(),
        }
    }

    /// Read the active context for the current task scope, if one is installed
    pub fn current() -> Option<CorrelationContext> {
        CURRENT_CONTEXT.try_with(|ctx| ctx.clone()).ok()
    }

    /// Read the active correlation id, generating one when no scope is active
    ///
    /// Operations that publish or call out always carry *some* id; outside an
    /// installed scope a fresh id is minted per call.
    pub fn current_or_new() -> CorrelationId {
        CURRENT_CONTEXT
            .try_with(|ctx| ctx.correlation_id.clone())
            .unwrap_or_default()
    }

    /// Run a future with this context installed as the task-local scope
    pub async fn scope<F>(self, fut: F) -> F::Output
    where
        F: std::future::Future,
    {
        CURRENT_CONTEXT.scope(self, fut).await
    }

    /// Write the correlation id into an outbound header map
    pub fn attach_header(&self, headers: &mut std::collections::HashMap<String, String>) {
        headers.insert(
            CORRELATION_ID_HEADER.to_string(),
            self.correlation_id.to_string(),
        );
    }
}

impl Default for CorrelationContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_inbound_value_preferred_when_well_formed() {
        let id = CorrelationId::from_inbound(Some("req-abc-123"));
        assert_eq!(id.as_str(), "req-abc-123");
    }

    #[test]
    fn test_malformed_inbound_values_regenerated() {
        let empty = CorrelationId::from_inbound(Some(""));
        assert!(!empty.as_str().is_empty());

        let whitespace = CorrelationId::from_inbound(Some("has spaces"));
        assert_ne!(whitespace.as_str(), "has spaces");

        let oversized = "x".repeat(MAX_CORRELATION_ID_LENGTH + 1);
        let too_long = CorrelationId::from_inbound(Some(&oversized));
        assert_ne!(too_long.as_str(), oversized);

        let absent = CorrelationId::from_inbound(None);
        assert!(Uuid::parse_str(absent.as_str()).is_ok());
    }

    #[tokio::test]
    async fn test_scope_installs_current_context() {
        assert!(CorrelationContext::current().is_none());

        let ctx = CorrelationContext::from_header(Some("scoped-id"));
        let seen = ctx
            .clone()
            .scope(async { CorrelationContext::current_or_new() })
            .await;

        assert_eq!(seen.as_str(), "scoped-id");
        assert!(CorrelationContext::current().is_none());
    }

    #[tokio::test]
    async fn test_nested_scopes_are_isolated() {
        let outer = CorrelationContext::from_header(Some("outer"));
        let inner = CorrelationContext::from_header(Some("inner"));

        outer
            .scope(async {
                assert_eq!(CorrelationContext::current_or_new().as_str(), "outer");
                inner
                    .scope(async {
                        assert_eq!(CorrelationContext::current_or_new().as_str(), "inner");
                    })
                    .await;
                assert_eq!(CorrelationContext::current_or_new().as_str(), "outer");
            })
            .await;
    }

    #[test]
    fn test_attach_header() {
        let ctx = CorrelationContext::from_header(Some("attach-me"));
        let mut headers = HashMap::new();
        ctx.attach_header(&mut headers);
        assert_eq!(
            headers.get(CORRELATION_ID_HEADER).map(String::as_str),
            Some("attach-me")
        );
    }
}
