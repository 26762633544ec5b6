#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Switchboard Core
//!
//! Resilient inter-service communication layer: one crate that owns the
//! failure-handling policy for every call and message a service sends.
//!
//! ## Overview
//!
//! Services call each other over HTTP and exchange messages over durable
//! queues; both paths fail in the same ways (slow dependencies, flapping
//! dependencies, poison messages) and both deserve the same treatment. This
//! crate centralizes that treatment so individual call sites stay free of
//! ad-hoc retry loops and sleep calls.
//!
//! ## Module Organization
//!
//! - [`resilience`] - Policy engine, per-target circuit breakers, backoff
//! - [`classification`] - Transient / permanent / timeout failure taxonomy
//! - [`correlation`] - Correlation-id propagation across calls and messages
//! - [`transport`] - HTTP-shaped transport seam and the resilient client
//! - [`messaging`] - Broker abstraction, dispatcher, idempotency, dead letters
//! - [`health`] - Read-only aggregation of circuit states and consumer lag
//! - [`web`] - Axum health endpoints
//! - [`config`] - YAML configuration with environment overrides
//! - [`error`] - Crate-level error types
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use switchboard_core::resilience::{CircuitBreakerRegistry, PolicyEngine, ResilienceConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(CircuitBreakerRegistry::new(ResilienceConfig::default()));
//! let engine = PolicyEngine::new(registry);
//!
//! let value = engine
//!     .execute("inventory_service", || async {
//!         // any fallible call, classified as transient/permanent/timeout
//!         Ok::<_, switchboard_core::classification::ClassifiedError>(42)
//!     })
//!     .await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

pub mod classification;
pub mod config;
pub mod constants;
pub mod correlation;
pub mod error;
pub mod health;
pub mod logging;
pub mod messaging;
pub mod resilience;
pub mod transport;
pub mod web;

pub use classification::{ClassifiedError, ErrorKind};
pub use correlation::{CorrelationContext, CorrelationId};
pub use error::{Result, SwitchboardError};
pub use health::{HealthReport, HealthSignalAggregator, HealthStatus};
pub use messaging::{
    Broker, DispatcherConfig, IdempotencyStore, InMemoryBroker, MessageDispatcher, MessageEnvelope,
    MessageHandler, MessagingError, PgmqBroker,
};
pub use resilience::{
    CircuitBreaker, CircuitBreakerRegistry, CircuitState, PolicyConfig, PolicyEngine, PolicyError,
    ResilienceConfig,
};
pub use transport::{ResilientClient, Transport, TransportError, TransportRequest, TransportResponse};
