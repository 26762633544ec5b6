//! # Resilient Outbound Client
//!
//! Glues the transport abstraction to the policy engine: every send is gated
//! by the target's circuit breaker, bounded by the policy timeout, retried on
//! retryable classifications, and carries the active correlation id in its
//! headers.

use std::sync::Arc;

use tracing::debug;

use crate::correlation::CorrelationContext;
use crate::resilience::{PolicyEngine, PolicyError};
use crate::transport::{classify_outcome, Transport, TransportRequest, TransportResponse};

/// Policy-wrapped outbound caller for one transport
#[derive(Clone)]
pub struct ResilientClient {
    transport: Arc<dyn Transport>,
    engine: PolicyEngine,
}

impl ResilientClient {
    pub fn new(transport: Arc<dyn Transport>, engine: PolicyEngine) -> Self {
        Self { transport, engine }
    }

    /// Send a request to a logical target under its resilience policy
    ///
    /// The active correlation id is attached to the outbound headers before
    /// every attempt; callers never see intermediate retries.
    pub async fn send(
        &self,
        target_id: &str,
        request: TransportRequest,
    ) -> Result<TransportResponse, PolicyError> {
        let context = CorrelationContext::current().unwrap_or_default();

        let mut request = request;
        context.attach_header(&mut request.headers);

        debug!(
            target_id = %target_id,
            correlation_id = %context.correlation_id,
            method = %request.method,
            path = %request.path,
            "📡 Sending outbound request"
        );

        let transport = Arc::clone(&self.transport);
        self.engine
            .execute(target_id, move || {
                let transport = Arc::clone(&transport);
                let request = request.clone();
                async move { classify_outcome(transport.send(request).await) }
            })
            .await
    }

    /// Send with a substitute response produced when the target is
    /// unavailable
    pub async fn send_with_fallback<FB>(
        &self,
        target_id: &str,
        request: TransportRequest,
        fallback: FB,
    ) -> Result<TransportResponse, PolicyError>
    where
        FB: FnOnce() -> TransportResponse,
    {
        match self.send(target_id, request).await {
            Ok(response) => Ok(response),
            Err(_) => Ok(fallback()),
        }
    }

    pub fn engine(&self) -> &PolicyEngine {
        &self.engine
    }
}
