//! # Circuit Breaker Metrics
//!
//! Per-breaker call accounting and system-wide aggregation consumed by the
//! health signal aggregator.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::CircuitState;

/// Metrics tracked per circuit breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    pub total_calls: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub consecutive_failures: u64,
    pub rejected_calls: u64,
    pub probe_attempts: u64,
    pub total_duration: Duration,

    /// Derived on snapshot
    pub current_state: CircuitState,
    pub failure_rate: f64,
    pub success_rate: f64,
    pub average_duration: Duration,
}

impl CircuitBreakerMetrics {
    pub fn new() -> Self {
        Self {
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            consecutive_failures: 0,
            rejected_calls: 0,
            probe_attempts: 0,
            total_duration: Duration::ZERO,
            current_state: CircuitState::Closed,
            failure_rate: 0.0,
            success_rate: 0.0,
            average_duration: Duration::ZERO,
        }
    }
}

impl Default for CircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// System-wide aggregation across every registered breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemResilienceMetrics {
    pub total_breakers: usize,
    pub count_by_state: HashMap<String, usize>,
    pub total_calls: u64,
    pub total_failures: u64,
    pub total_rejected: u64,

    /// Fraction of breakers currently closed, in [0.0, 1.0]
    pub health_score: f64,
}

impl SystemResilienceMetrics {
    /// Aggregate per-breaker snapshots into the system view
    pub fn aggregate(snapshots: &[CircuitBreakerMetrics]) -> Self {
        let mut count_by_state: HashMap<String, usize> = HashMap::new();
        let mut total_calls = 0u64;
        let mut total_failures = 0u64;
        let mut total_rejected = 0u64;
        let mut closed = 0usize;

        for snapshot in snapshots {
            *count_by_state
                .entry(format!("{:?}", snapshot.current_state).to_lowercase())
                .or_insert(0) += 1;
            total_calls += snapshot.total_calls;
            total_failures += snapshot.failure_count;
            total_rejected += snapshot.rejected_calls;
            if snapshot.current_state == CircuitState::Closed {
                closed += 1;
            }
        }

        let health_score = if snapshots.is_empty() {
            1.0
        } else {
            closed as f64 / snapshots.len() as f64
        };

        Self {
            total_breakers: snapshots.len(),
            count_by_state,
            total_calls,
            total_failures,
            total_rejected,
            health_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregation_over_mixed_states() {
        let mut open = CircuitBreakerMetrics::new();
        open.current_state = CircuitState::Open;
        open.total_calls = 10;
        open.failure_count = 10;

        let mut closed = CircuitBreakerMetrics::new();
        closed.total_calls = 5;
        closed.success_count = 5;

        let system = SystemResilienceMetrics::aggregate(&[open, closed]);
        assert_eq!(system.total_breakers, 2);
        assert_eq!(system.total_calls, 15);
        assert_eq!(system.total_failures, 10);
        assert_eq!(system.count_by_state.get("open"), Some(&1));
        assert_eq!(system.count_by_state.get("closed"), Some(&1));
        assert!((system.health_score - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_aggregation_is_healthy() {
        let system = SystemResilienceMetrics::aggregate(&[]);
        assert_eq!(system.total_breakers, 0);
        assert!((system.health_score - 1.0).abs() < f64::EPSILON);
    }
}
