//! # Resilience Module
//!
//! Composable fault-handling around outbound calls: per-target circuit
//! breakers, retry with exponential backoff, per-attempt timeouts, and
//! optional fallback values.
//!
//! ## Architecture
//!
//! - **Circuit Breakers**: one state machine per downstream target, created
//!   lazily by the [`CircuitBreakerRegistry`]
//! - **Policy Engine**: composes timeout, gate, retry, and fallback into a
//!   single `execute()` pipeline
//! - **Metrics Collection**: per-breaker accounting aggregated into a
//!   system-wide health score
//! - **Configuration**: per-target policy overrides with crate defaults
//!
//! ## Usage
//!
//! ```rust,no_run
//! use switchboard_core::resilience::{CircuitBreakerRegistry, PolicyEngine, ResilienceConfig};
//! use switchboard_core::classification::ClassifiedError;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(CircuitBreakerRegistry::new(ResilienceConfig::default()));
//! let engine = PolicyEngine::new(registry);
//!
//! let result = engine
//!     .execute("payment_gateway", || async {
//!         // Outbound call here
//!         Ok::<_, ClassifiedError>("accepted")
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod metrics;
pub mod policy;
pub mod registry;

pub use circuit_breaker::{CallAdmission, CircuitBreaker, CircuitState, ProbeGuard};
pub use config::{PolicyConfig, ResilienceConfig};
pub use metrics::{CircuitBreakerMetrics, SystemResilienceMetrics};
pub use policy::{
    exponential_backoff, ExecutionReport, PolicyEngine, PolicyError, PolicyObserver,
};
pub use registry::CircuitBreakerRegistry;
