//! # System Constants
//!
//! Well-known keys, suffixes, and default operational values shared across
//! the resilience, correlation, and messaging subsystems.

/// Correlation propagation constants
pub mod correlation {
    /// Header carried on every outbound HTTP request and response
    pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

    /// Top-level envelope field name for the correlation id
    pub const CORRELATION_ID_FIELD: &str = "correlation_id";

    /// Maximum accepted length for an inbound correlation id value
    pub const MAX_CORRELATION_ID_LENGTH: usize = 128;
}

/// Messaging constants
pub mod messaging {
    /// Suffix appended to a queue name to form its dead-letter destination
    pub const DEAD_LETTER_SUFFIX: &str = "_dlq";

    /// Logical circuit-breaker target for broker operations (publish/receive)
    pub const BROKER_TARGET: &str = "broker";

    /// Default ceiling on delivery attempts before dead-lettering
    pub const DEFAULT_MAX_DELIVERY_COUNT: u32 = 5;

    /// Default visibility timeout handed to the broker on receive
    pub const DEFAULT_VISIBILITY_TIMEOUT_SECONDS: u64 = 30;

    /// Default number of envelopes requested per receive call
    pub const DEFAULT_BATCH_SIZE: i32 = 10;

    /// Default parallelism cap for consumer handler invocations
    pub const DEFAULT_MAX_CONCURRENT_MESSAGES: usize = 10;
}

/// Resilience policy defaults
pub mod resilience {
    /// Default retry ceiling per call
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    /// Default exponential backoff base in milliseconds
    pub const DEFAULT_BACKOFF_BASE_MS: u64 = 100;

    /// Default exponential backoff cap in milliseconds
    pub const DEFAULT_BACKOFF_CAP_MS: u64 = 10_000;

    /// Default per-attempt timeout in milliseconds
    pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

    /// Default consecutive-failure threshold before the circuit opens
    pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

    /// Default cooldown before a probe is admitted, in milliseconds
    pub const DEFAULT_BREAK_DURATION_MS: u64 = 30_000;
}

/// Environment variable consulted for environment detection
pub const ENV_VAR: &str = "SWITCHBOARD_ENV";

/// Crate version string surfaced by the health endpoint
pub const SWITCHBOARD_VERSION: &str = env!("CARGO_PKG_VERSION");
