//! # Circuit Breaker State Machine
//!
//! One breaker per logical downstream target, with three states: Closed
//! (normal operation), Open (failing fast while a cooldown elapses), and
//! HalfOpen (exactly one probe in flight testing recovery). Transitions are
//! serialized per target; concurrent failures cannot double-transition the
//! state.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex as SyncMutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::resilience::{CircuitBreakerMetrics, PolicyConfig};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - calls are allowed through
    Closed = 0,
    /// Failure mode - calls fail fast without executing
    Open = 1,
    /// Testing recovery - a single probe call is in flight
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Open, // Default to safest state
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Gate decision for one prospective call
#[derive(Debug)]
pub enum CallAdmission {
    /// Circuit is closed; proceed normally
    Allowed,
    /// Circuit was open and the cooldown elapsed; this caller holds the
    /// single half-open probe slot until the guard settles or drops
    Probe(ProbeGuard),
    /// Circuit is open (or a probe is already in flight); fail fast
    Rejected,
}

impl CallAdmission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, CallAdmission::Allowed)
    }

    pub fn is_probe(&self) -> bool {
        matches!(self, CallAdmission::Probe(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, CallAdmission::Rejected)
    }
}

/// Releases the half-open probe slot if its holder vanishes
///
/// Recording the probe's outcome disarms the guard. If the admitted future
/// is instead dropped before an outcome lands (caller cancelled, client
/// disconnected), the drop reverts HalfOpen back to Open and restarts the
/// cooldown, so the target is never stranded half-open with no probe in
/// flight.
#[derive(Debug)]
pub struct ProbeGuard {
    target: String,
    state: Arc<AtomicU8>,
    opened_at: Arc<SyncMutex<Option<Instant>>>,
    armed: Arc<AtomicBool>,
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        if self.armed.swap(false, Ordering::AcqRel) {
            // Restart the cooldown before flipping the state so a racing
            // gate check cannot pair Open with a stale timestamp.
            *self.opened_at.lock() = Some(Instant::now());
            let reverted = self
                .state
                .compare_exchange(
                    CircuitState::HalfOpen as u8,
                    CircuitState::Open as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok();
            if reverted {
                warn!(
                    target_id = %self.target,
                    "🟡 Probe abandoned before settling; circuit reopened"
                );
            }
        }
    }
}

/// Core circuit breaker with atomic state management
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Target name for logging and metrics
    target: String,

    /// Current circuit state (atomic for thread safety)
    state: Arc<AtomicU8>,

    /// Policy parameters governing thresholds and cooldown
    config: PolicyConfig,

    /// Call accounting protected by mutex
    metrics: Arc<Mutex<CircuitBreakerMetrics>>,

    /// Time when circuit was opened (for cooldown calculations)
    opened_at: Arc<SyncMutex<Option<Instant>>>,

    /// Whether the outstanding probe guard is still live
    probe_armed: Arc<AtomicBool>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker for the given target
    pub fn new(target: String, config: PolicyConfig) -> Self {
        info!(
            target_id = %target,
            failure_threshold = config.failure_threshold,
            break_duration_ms = config.break_duration_ms,
            "🛡️ Circuit breaker initialized"
        );

        Self {
            target,
            state: Arc::new(AtomicU8::new(CircuitState::Closed as u8)),
            config,
            metrics: Arc::new(Mutex::new(CircuitBreakerMetrics::new())),
            opened_at: Arc::new(SyncMutex::new(None)),
            probe_armed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Get target name
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Consult the gate before attempting a call
    ///
    /// While HalfOpen, every caller other than the probe holder is rejected
    /// as if the circuit were still Open. The Open->HalfOpen transition goes
    /// through a compare-exchange so two concurrent callers cannot both win
    /// the probe slot; the winner receives a [`ProbeGuard`] that must be
    /// held until the probe settles.
    pub async fn try_acquire(&self) -> CallAdmission {
        match self.state() {
            CircuitState::Closed => CallAdmission::Allowed,
            CircuitState::HalfOpen => {
                self.record_rejection().await;
                CallAdmission::Rejected
            }
            CircuitState::Open => {
                let cooldown_elapsed = match *self.opened_at.lock() {
                    Some(opened_time) => opened_time.elapsed() >= self.config.break_duration(),
                    None => {
                        // Open without a timestamp should not happen; treat
                        // the cooldown as elapsed so the target can recover.
                        warn!(target_id = %self.target, "Circuit open but no timestamp recorded");
                        true
                    }
                };

                if !cooldown_elapsed {
                    self.record_rejection().await;
                    return CallAdmission::Rejected;
                }

                // Single-probe admission: only the caller that wins the
                // Open->HalfOpen exchange proceeds.
                let won_probe = self
                    .state
                    .compare_exchange(
                        CircuitState::Open as u8,
                        CircuitState::HalfOpen as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok();

                if won_probe {
                    self.probe_armed.store(true, Ordering::Release);
                    let mut metrics = self.metrics.lock().await;
                    metrics.probe_attempts += 1;
                    drop(metrics);
                    info!(target_id = %self.target, "🟡 Circuit breaker half-open (probe admitted)");
                    CallAdmission::Probe(ProbeGuard {
                        target: self.target.clone(),
                        state: Arc::clone(&self.state),
                        opened_at: Arc::clone(&self.opened_at),
                        armed: Arc::clone(&self.probe_armed),
                    })
                } else {
                    self.record_rejection().await;
                    CallAdmission::Rejected
                }
            }
        }
    }

    /// Record a successful completed attempt
    pub async fn record_success(&self, duration: Duration) {
        let mut metrics = self.metrics.lock().await;
        metrics.total_calls += 1;
        metrics.success_count += 1;
        metrics.total_duration += duration;

        debug!(
            target_id = %self.target,
            duration_ms = duration.as_millis(),
            "🟢 Call succeeded"
        );

        match self.state() {
            CircuitState::HalfOpen => {
                // Probe succeeded: target recovered
                drop(metrics);
                self.transition_to_closed().await;
            }
            CircuitState::Closed => {
                metrics.consecutive_failures = 0;
            }
            CircuitState::Open => {
                warn!(target_id = %self.target, "Success recorded while circuit is open");
            }
        }
    }

    /// Record a failed completed attempt
    ///
    /// A half-open probe failure reopens the circuit and restarts the
    /// cooldown timer; a timed-out probe lands here too.
    pub async fn record_failure(&self, duration: Duration) {
        let mut metrics = self.metrics.lock().await;
        metrics.total_calls += 1;
        metrics.failure_count += 1;
        metrics.consecutive_failures += 1;
        metrics.total_duration += duration;

        error!(
            target_id = %self.target,
            consecutive_failures = metrics.consecutive_failures,
            duration_ms = duration.as_millis(),
            "🔴 Call failed"
        );

        match self.state() {
            CircuitState::Closed => {
                if metrics.consecutive_failures >= self.config.failure_threshold as u64 {
                    drop(metrics);
                    self.transition_to_open().await;
                }
            }
            CircuitState::HalfOpen => {
                drop(metrics);
                self.transition_to_open().await;
            }
            CircuitState::Open => {
                // Already open; nothing further to transition
            }
        }
    }

    async fn record_rejection(&self) {
        let mut metrics = self.metrics.lock().await;
        metrics.rejected_calls += 1;
    }

    /// Transition to closed state (normal operation)
    async fn transition_to_closed(&self) {
        self.probe_armed.store(false, Ordering::Release);
        self.state
            .store(CircuitState::Closed as u8, Ordering::Release);
        *self.opened_at.lock() = None;

        let mut metrics = self.metrics.lock().await;
        metrics.consecutive_failures = 0;

        info!(
            target_id = %self.target,
            total_calls = metrics.total_calls,
            "🟢 Circuit breaker closed (recovered)"
        );
    }

    /// Transition to open state (failing fast)
    async fn transition_to_open(&self) {
        self.probe_armed.store(false, Ordering::Release);
        // Timestamp first: a gate check that observes Open must also observe
        // a cooldown that has just restarted, never a stale opening.
        *self.opened_at.lock() = Some(Instant::now());
        self.state.store(CircuitState::Open as u8, Ordering::Release);

        let metrics = self.metrics.lock().await;
        error!(
            target_id = %self.target,
            consecutive_failures = metrics.consecutive_failures,
            failure_threshold = self.config.failure_threshold,
            break_duration_ms = self.config.break_duration_ms,
            "🔴 Circuit breaker opened (failing fast)"
        );
    }

    /// Force circuit to open state (emergency stop)
    pub async fn force_open(&self) {
        warn!(target_id = %self.target, "🚨 Circuit breaker forced open");
        self.transition_to_open().await;
    }

    /// Force circuit to closed state (emergency recovery)
    pub async fn force_closed(&self) {
        warn!(target_id = %self.target, "🚨 Circuit breaker forced closed");
        self.transition_to_closed().await;
    }

    /// Reset counters and return to closed; the entry itself is never deleted
    pub async fn reset(&self) {
        let mut metrics = self.metrics.lock().await;
        *metrics = CircuitBreakerMetrics::new();
        drop(metrics);
        self.transition_to_closed().await;
    }

    /// Get current metrics snapshot
    pub async fn metrics(&self) -> CircuitBreakerMetrics {
        let metrics = self.metrics.lock().await;
        let mut snapshot = metrics.clone();

        snapshot.current_state = self.state();

        if metrics.total_calls > 0 {
            snapshot.failure_rate = metrics.failure_count as f64 / metrics.total_calls as f64;
            snapshot.success_rate = metrics.success_count as f64 / metrics.total_calls as f64;

            if metrics.success_count > 0 {
                snapshot.average_duration = metrics.total_duration / metrics.success_count as u32;
            }
        }

        snapshot
    }

    /// Check if circuit is healthy (closed state with low failure rate)
    pub async fn is_healthy(&self) -> bool {
        if self.state() != CircuitState::Closed {
            return false;
        }

        let metrics = self.metrics.lock().await;
        if metrics.total_calls < 10 {
            // Too few calls to determine health
            return true;
        }

        let failure_rate = metrics.failure_count as f64 / metrics.total_calls as f64;
        failure_rate < 0.1
    }
}
