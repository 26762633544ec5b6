//! # Resilience Policy Engine
//!
//! Composes timeout, circuit-breaker gating, retry with exponential backoff,
//! and optional fallback into one executable pipeline around an operation.
//! Intermediate attempts are fully absorbed; the caller only ever sees the
//! final value, the fallback value, or a single classified policy error.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use crate::classification::{ClassifiedError, ErrorKind};
use crate::correlation::CorrelationContext;
use crate::resilience::{CircuitBreakerRegistry, PolicyConfig};

/// Final error surfaced by the policy engine
#[derive(Debug, Clone, Error)]
pub enum PolicyError {
    /// The target's circuit is open: the dependency is unavailable and no
    /// transport call was made
    #[error("Dependency unavailable: circuit open for target '{target}'")]
    CircuitOpen { target: String },

    /// Every permitted attempt failed with a retryable classification
    #[error("Retries exhausted for target '{target}' after {attempts} attempts: {source}")]
    RetriesExhausted {
        target: String,
        attempts: u32,
        source: ClassifiedError,
    },

    /// A permanent classification short-circuited the retry loop
    #[error("Permanent failure for target '{target}': {source}")]
    Permanent {
        target: String,
        source: ClassifiedError,
    },
}

impl PolicyError {
    /// The classified failure behind this error, when one was observed
    pub fn classification(&self) -> Option<&ClassifiedError> {
        match self {
            PolicyError::CircuitOpen { .. } => None,
            PolicyError::RetriesExhausted { source, .. } => Some(source),
            PolicyError::Permanent { source, .. } => Some(source),
        }
    }

    /// Whether the failure was a fail-fast circuit rejection
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, PolicyError::CircuitOpen { .. })
    }
}

/// Synchronous execution summary returned by `execute_with_report`
#[derive(Debug)]
pub struct ExecutionReport<T> {
    pub outcome: Result<T, PolicyError>,
    pub attempt_count: u32,
}

/// Observer hook for retry and circuit notifications
///
/// All methods default to no-ops; implementors override what they observe.
pub trait PolicyObserver: Send + Sync {
    fn on_retry(&self, _target: &str, _attempt: u32, _error: &ClassifiedError, _delay: Duration) {}
    fn on_circuit_rejection(&self, _target: &str) {}
    fn on_success(&self, _target: &str, _attempts: u32) {}
}

/// Deterministic exponential backoff: `min(base * 2^attempt, cap)`
pub fn exponential_backoff(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let base_ms = base.as_millis() as u64;
    let delay_ms = 2u64
        .checked_pow(attempt)
        .and_then(|multiplier| base_ms.checked_mul(multiplier))
        .unwrap_or(u64::MAX);
    Duration::from_millis(delay_ms).min(cap)
}

/// Backoff with optional jitter applied on top, still clamped to the cap
fn backoff_delay(policy: &PolicyConfig, attempt: u32) -> Duration {
    let delay = exponential_backoff(policy.backoff_base(), policy.backoff_cap(), attempt);
    if policy.jitter_enabled && policy.jitter_max_percentage > 0.0 {
        let jitter = fastrand::f64() * policy.jitter_max_percentage;
        delay.mul_f64(1.0 + jitter).min(policy.backoff_cap())
    } else {
        delay
    }
}

/// Composable fault-handling pipeline around outbound operations
#[derive(Clone)]
pub struct PolicyEngine {
    registry: Arc<CircuitBreakerRegistry>,
    observer: Option<Arc<dyn PolicyObserver>>,
}

impl std::fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEngine")
            .field("registry", &self.registry)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl PolicyEngine {
    pub fn new(registry: Arc<CircuitBreakerRegistry>) -> Self {
        Self {
            registry,
            observer: None,
        }
    }

    /// Attach an observer notified on retries and circuit rejections
    pub fn with_observer(mut self, observer: Arc<dyn PolicyObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// The registry this engine gates through (read-only access for health)
    pub fn registry(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.registry
    }

    /// Execute an operation under the target's policy
    ///
    /// `operation` is re-invoked per attempt; each attempt is bounded by the
    /// policy timeout and re-enters the circuit gate. Dropping the returned
    /// future cancels the in-flight attempt without a half-applied breaker
    /// update: outcomes are only recorded after an attempt completes, and a
    /// cancelled half-open probe releases its slot by reopening the circuit.
    pub async fn execute<T, F, Fut>(
        &self,
        target_id: &str,
        operation: F,
    ) -> Result<T, PolicyError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ClassifiedError>>,
    {
        self.execute_with_report(target_id, operation).await.outcome
    }

    /// Execute, falling back to a substitute value on any final failure
    pub async fn execute_with_fallback<T, F, Fut, FB>(
        &self,
        target_id: &str,
        operation: F,
        fallback: FB,
    ) -> Result<T, PolicyError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ClassifiedError>>,
        FB: FnOnce() -> T,
    {
        match self.execute(target_id, operation).await {
            Ok(value) => Ok(value),
            Err(error) => {
                warn!(
                    target_id = %target_id,
                    error = %error,
                    "🪂 Returning fallback value after policy failure"
                );
                Ok(fallback())
            }
        }
    }

    /// Execute and report the outcome together with the attempt count
    pub async fn execute_with_report<T, F, Fut>(
        &self,
        target_id: &str,
        operation: F,
    ) -> ExecutionReport<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ClassifiedError>>,
    {
        let policy = self.registry.config().policy_for(target_id).clone();
        let breaker = self.registry.for_target(target_id).await;
        let correlation_id = CorrelationContext::current_or_new();

        let mut attempt: u32 = 0;
        loop {
            // Gate before every attempt; circuit state may have changed
            // between retries. A probe admission carries a guard that stays
            // alive until the attempt's outcome is recorded; if this future
            // is dropped mid-attempt the guard reopens the circuit instead
            // of leaving it half-open with no probe in flight.
            let admission = breaker.try_acquire().await;
            if admission.is_rejected() {
                if let Some(observer) = &self.observer {
                    observer.on_circuit_rejection(target_id);
                }
                warn!(
                    target_id = %target_id,
                    correlation_id = %correlation_id,
                    "⛔ Circuit open, failing fast without transport call"
                );
                return ExecutionReport {
                    outcome: Err(PolicyError::CircuitOpen {
                        target: target_id.to_string(),
                    }),
                    attempt_count: attempt,
                };
            }

            let started = Instant::now();
            let outcome = tokio::time::timeout(policy.timeout(), operation()).await;
            let elapsed = started.elapsed();
            attempt += 1;

            let classified = match outcome {
                Ok(Ok(value)) => {
                    breaker.record_success(elapsed).await;
                    if let Some(observer) = &self.observer {
                        observer.on_success(target_id, attempt);
                    }
                    debug!(
                        target_id = %target_id,
                        correlation_id = %correlation_id,
                        attempts = attempt,
                        "Call completed"
                    );
                    return ExecutionReport {
                        outcome: Ok(value),
                        attempt_count: attempt,
                    };
                }
                Ok(Err(error)) => error,
                // Elapsing the deadline drops (cancels) the in-flight future
                Err(_) => ClassifiedError::timeout(target_id, elapsed),
            };

            // Every completed attempt updates the breaker, probe timeouts
            // included.
            breaker.record_failure(elapsed).await;

            if classified.kind == ErrorKind::Permanent {
                return ExecutionReport {
                    outcome: Err(PolicyError::Permanent {
                        target: target_id.to_string(),
                        source: classified,
                    }),
                    attempt_count: attempt,
                };
            }

            // attempt counts completed tries; retries allowed beyond the
            // first attempt up to max_retries.
            if attempt > policy.max_retries {
                return ExecutionReport {
                    outcome: Err(PolicyError::RetriesExhausted {
                        target: target_id.to_string(),
                        attempts: attempt,
                        source: classified,
                    }),
                    attempt_count: attempt,
                };
            }

            let delay = backoff_delay(&policy, attempt - 1);
            if let Some(observer) = &self.observer {
                observer.on_retry(target_id, attempt, &classified, delay);
            }
            debug!(
                target_id = %target_id,
                correlation_id = %correlation_id,
                attempt = attempt,
                delay_ms = delay.as_millis(),
                error = %classified,
                "🔁 Retrying after backoff"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::ResilienceConfig;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn engine_with(policy: PolicyConfig) -> PolicyEngine {
        let config = ResilienceConfig {
            default_policy: policy,
            targets: HashMap::new(),
        };
        PolicyEngine::new(Arc::new(CircuitBreakerRegistry::new(config)))
    }

    fn fast_policy(max_retries: u32) -> PolicyConfig {
        PolicyConfig {
            max_retries,
            backoff_base_ms: 1,
            backoff_cap_ms: 5,
            timeout_ms: 100,
            failure_threshold: 10,
            break_duration_ms: 50,
            jitter_enabled: false,
            jitter_max_percentage: 0.0,
        }
    }

    #[test]
    fn test_exponential_backoff_shape() {
        let base = Duration::from_millis(100);
        let cap = Duration::from_millis(1000);
        assert_eq!(exponential_backoff(base, cap, 0), Duration::from_millis(100));
        assert_eq!(exponential_backoff(base, cap, 1), Duration::from_millis(200));
        assert_eq!(exponential_backoff(base, cap, 2), Duration::from_millis(400));
        assert_eq!(exponential_backoff(base, cap, 3), Duration::from_millis(800));
        assert_eq!(exponential_backoff(base, cap, 4), cap);
        assert_eq!(exponential_backoff(base, cap, 30), cap);
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let engine = engine_with(fast_policy(3));
        let result: Result<&str, _> = engine.execute("api", || async { Ok("ok") }).await;
        assert_eq!(result.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_transient_failures_retried_to_success() {
        let engine = engine_with(fast_policy(3));
        let calls = AtomicU32::new(0);

        let report = engine
            .execute_with_report("api", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ClassifiedError::transient("connection reset"))
                    } else {
                        Ok("recovered")
                    }
                }
            })
            .await;

        assert_eq!(report.outcome.unwrap(), "recovered");
        assert_eq!(report.attempt_count, 3);
    }

    #[tokio::test]
    async fn test_permanent_short_circuits_retries() {
        let engine = engine_with(fast_policy(5));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = engine
            .execute("api", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ClassifiedError::permanent("HTTP 422")) }
            })
            .await;

        assert!(matches!(result, Err(PolicyError::Permanent { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted_reports_attempts() {
        let engine = engine_with(fast_policy(2));
        let calls = AtomicU32::new(0);

        let report: ExecutionReport<()> = engine
            .execute_with_report("api", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ClassifiedError::transient("nack")) }
            })
            .await;

        // Initial attempt plus two retries
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.attempt_count, 3);
        assert!(matches!(
            report.outcome,
            Err(PolicyError::RetriesExhausted { attempts: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_attempt_timeout_classified_and_retried() {
        let mut policy = fast_policy(1);
        policy.timeout_ms = 20;
        let engine = engine_with(policy);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = engine
            .execute("slow", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok(())
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        match result {
            Err(PolicyError::RetriesExhausted { source, .. }) => {
                assert_eq!(source.kind, ErrorKind::Timeout);
            }
            other => panic!("Expected retries exhausted with timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_open_circuit_fails_fast_without_invoking_operation() {
        let mut policy = fast_policy(0);
        policy.failure_threshold = 1;
        policy.break_duration_ms = 10_000;
        let engine = engine_with(policy);

        let _: Result<(), _> = engine
            .execute("broken", || async { Err(ClassifiedError::transient("boom")) })
            .await;

        let calls = AtomicU32::new(0);
        let result: Result<(), _> = engine
            .execute("broken", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert!(matches!(result, Err(PolicyError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fallback_on_final_failure() {
        let mut policy = fast_policy(0);
        policy.failure_threshold = 1;
        let engine = engine_with(policy);

        let value = engine
            .execute_with_fallback(
                "api",
                || async { Err(ClassifiedError::transient("down")) },
                || "cached",
            )
            .await
            .unwrap();
        assert_eq!(value, "cached");
    }

    #[tokio::test]
    async fn test_observer_sees_retries() {
        #[derive(Default)]
        struct CountingObserver {
            retries: AtomicU32,
        }
        impl PolicyObserver for CountingObserver {
            fn on_retry(&self, _t: &str, _a: u32, _e: &ClassifiedError, _d: Duration) {
                self.retries.fetch_add(1, Ordering::SeqCst);
            }
        }

        let observer = Arc::new(CountingObserver::default());
        let engine = engine_with(fast_policy(2)).with_observer(observer.clone());

        let _: Result<(), _> = engine
            .execute("api", || async { Err(ClassifiedError::transient("blip")) })
            .await;

        assert_eq!(observer.retries.load(Ordering::SeqCst), 2);
    }
}
