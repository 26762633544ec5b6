//! # Circuit Breaker Registry
//!
//! Holds one breaker per logical downstream target, created lazily on first
//! call and never deleted while the process runs (an entry is reset, not
//! removed). The registry is an explicit injected object so tests construct
//! isolated registries per case.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::resilience::{
    CircuitBreaker, CircuitBreakerMetrics, CircuitState, ResilienceConfig,
    SystemResilienceMetrics,
};

/// Registry of circuit breakers keyed by target id
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    config: ResilienceConfig,
}

impl CircuitBreakerRegistry {
    pub fn new(config: ResilienceConfig) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// The resilience configuration this registry resolves policies from
    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    /// Get or lazily create the breaker for a target
    pub async fn for_target(&self, target_id: &str) -> Arc<CircuitBreaker> {
        // Fast path under the read lock
        {
            let breakers = self.breakers.read().await;
            if let Some(breaker) = breakers.get(target_id) {
                return Arc::clone(breaker);
            }
        }

        // Double-checked creation under the write lock
        let mut breakers = self.breakers.write().await;
        if let Some(breaker) = breakers.get(target_id) {
            return Arc::clone(breaker);
        }

        debug!(target_id = %target_id, "Creating circuit breaker for new target");
        let policy = self.config.policy_for(target_id).clone();
        let breaker = Arc::new(CircuitBreaker::new(target_id.to_string(), policy));
        breakers.insert(target_id.to_string(), Arc::clone(&breaker));
        breaker
    }

    /// Read-only state snapshot across every registered target
    pub async fn state_summary(&self) -> HashMap<String, CircuitState> {
        let breakers = self.breakers.read().await;
        breakers
            .iter()
            .map(|(target, breaker)| (target.clone(), breaker.state()))
            .collect()
    }

    /// Metrics snapshot for one target, if registered
    pub async fn target_metrics(&self, target_id: &str) -> Option<CircuitBreakerMetrics> {
        let breaker = {
            let breakers = self.breakers.read().await;
            breakers.get(target_id).cloned()
        };
        match breaker {
            Some(breaker) => Some(breaker.metrics().await),
            None => None,
        }
    }

    /// System-wide aggregated metrics
    pub async fn system_metrics(&self) -> SystemResilienceMetrics {
        let breakers: Vec<Arc<CircuitBreaker>> = {
            let guard = self.breakers.read().await;
            guard.values().cloned().collect()
        };

        let mut snapshots = Vec::with_capacity(breakers.len());
        for breaker in breakers {
            snapshots.push(breaker.metrics().await);
        }
        SystemResilienceMetrics::aggregate(&snapshots)
    }

    /// Reset one target's breaker to closed with cleared counters
    pub async fn reset(&self, target_id: &str) {
        let breaker = {
            let breakers = self.breakers.read().await;
            breakers.get(target_id).cloned()
        };
        if let Some(breaker) = breaker {
            breaker.reset().await;
        }
    }

    /// Force every registered breaker open (emergency stop)
    pub async fn force_all_open(&self) {
        warn!("🚨 Forcing all circuit breakers open");
        let breakers: Vec<Arc<CircuitBreaker>> = {
            let guard = self.breakers.read().await;
            guard.values().cloned().collect()
        };
        for breaker in breakers {
            breaker.force_open().await;
        }
    }

    /// Force every registered breaker closed (emergency recovery)
    pub async fn force_all_closed(&self) {
        warn!("🚨 Forcing all circuit breakers closed");
        let breakers: Vec<Arc<CircuitBreaker>> = {
            let guard = self.breakers.read().await;
            guard.values().cloned().collect()
        };
        for breaker in breakers {
            breaker.force_closed().await;
        }
    }

    /// Number of registered targets
    pub async fn len(&self) -> usize {
        self.breakers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.breakers.read().await.is_empty()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(ResilienceConfig::default())
    }
}
