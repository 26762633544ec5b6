//! # Health Signal Aggregation
//!
//! Read-only roll-up of circuit breaker states and consumer lag into a
//! single health report. Purely observational: the aggregator never opens,
//! closes, or resets a breaker and never touches queue contents. A degraded
//! report is a signal for operators and load balancers, not a trigger for
//! recovery behavior.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::messaging::MessageDispatcher;
use crate::resilience::{CircuitBreakerRegistry, CircuitState};

/// Binary health verdict for the communication layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// Point-in-time snapshot of the layer's health signals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    /// Circuit state per known target
    pub targets: HashMap<String, CircuitState>,
    /// Age of the oldest unconsumed message on the watched queue, when one
    /// is configured and the broker is reachable
    pub consumer_lag_seconds: Option<i64>,
    pub generated_at: DateTime<Utc>,
}

impl HealthReport {
    /// Targets currently refusing calls
    pub fn open_targets(&self) -> Vec<&str> {
        self.targets
            .iter()
            .filter(|(_, state)| **state == CircuitState::Open)
            .map(|(target, _)| target.as_str())
            .collect()
    }
}

/// Aggregates breaker states and consumer lag into [`HealthReport`]s
pub struct HealthSignalAggregator {
    registry: Arc<CircuitBreakerRegistry>,
    dispatcher: Option<MessageDispatcher>,
    watched_queue: Option<String>,
}

impl HealthSignalAggregator {
    pub fn new(registry: Arc<CircuitBreakerRegistry>) -> Self {
        Self {
            registry,
            dispatcher: None,
            watched_queue: None,
        }
    }

    /// Include consumer lag for one queue in generated reports
    pub fn with_watched_queue(
        mut self,
        dispatcher: MessageDispatcher,
        queue_name: impl Into<String>,
    ) -> Self {
        self.dispatcher = Some(dispatcher);
        self.watched_queue = Some(queue_name.into());
        self
    }

    /// Build a report from the current breaker states and queue lag
    ///
    /// The layer is degraded when any circuit is open. Lag is informational
    /// and never flips the verdict on its own; an unreachable broker during
    /// metrics collection reports lag as unknown rather than failing the
    /// report.
    pub async fn report(&self) -> HealthReport {
        let targets = self.registry.state_summary().await;
        let any_open = targets
            .values()
            .any(|state| *state == CircuitState::Open);

        let consumer_lag_seconds = match (&self.dispatcher, &self.watched_queue) {
            (Some(dispatcher), Some(queue)) => match dispatcher.queue_lag_seconds(queue).await {
                Ok(lag) => lag,
                Err(err) => {
                    debug!(queue_name = %queue, error = %err, "Queue lag unavailable");
                    None
                }
            },
            _ => None,
        };

        let status = if any_open {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthReport {
            status,
            targets,
            consumer_lag_seconds,
            generated_at: Utc::now(),
        }
    }
}
