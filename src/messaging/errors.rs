//! # Messaging Error Types
//!
//! Structured error handling for the messaging system using thiserror, with
//! a boundary conversion into the retry taxonomy consumed by the policy
//! engine and the dispatcher's dead-letter decisions.

use thiserror::Error;

use crate::classification::ClassifiedError;
use crate::resilience::PolicyError;

/// Messaging error types
#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("Broker connection error: {message}")]
    BrokerConnection { message: String },

    #[error("Queue operation failed: {queue_name}: {operation}: {message}")]
    QueueOperation {
        queue_name: String,
        operation: String,
        message: String,
    },

    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Message serialization error: {message}")]
    MessageSerialization { message: String },

    #[error("Message deserialization error: {message}")]
    MessageDeserialization { message: String },

    #[error("Circuit breaker is open for target: {target}")]
    CircuitBreakerOpen { target: String },

    #[error("Configuration error: {component}: {message}")]
    Configuration { component: String, message: String },

    #[error("Broker timeout: operation {operation} timed out after {timeout_seconds}s")]
    Timeout {
        operation: String,
        timeout_seconds: u64,
    },

    #[error("Connection pool exhausted: {message}")]
    PoolExhausted { message: String },

    #[error("Internal messaging error: {message}")]
    Internal { message: String },
}

impl MessagingError {
    /// Create a broker connection error
    pub fn broker_connection(message: impl Into<String>) -> Self {
        Self::BrokerConnection {
            message: message.into(),
        }
    }

    /// Create a queue operation error
    pub fn queue_operation(
        queue_name: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::QueueOperation {
            queue_name: queue_name.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a queue not found error
    pub fn queue_not_found(queue_name: impl Into<String>) -> Self {
        Self::QueueNotFound {
            queue_name: queue_name.into(),
        }
    }

    /// Create a message serialization error
    pub fn message_serialization(message: impl Into<String>) -> Self {
        Self::MessageSerialization {
            message: message.into(),
        }
    }

    /// Create a message deserialization error
    pub fn message_deserialization(message: impl Into<String>) -> Self {
        Self::MessageDeserialization {
            message: message.into(),
        }
    }

    /// Create a circuit breaker open error
    pub fn circuit_breaker_open(target: impl Into<String>) -> Self {
        Self::CircuitBreakerOpen {
            target: target.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_seconds: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_seconds,
        }
    }

    /// Create a pool exhausted error
    pub fn pool_exhausted(message: impl Into<String>) -> Self {
        Self::PoolExhausted {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Label this failure for retry/dead-letter decisions
    ///
    /// Serialization, deserialization, and missing-queue failures will never
    /// succeed on redelivery; everything else observed at the broker boundary
    /// is retry-eligible.
    pub fn classify(&self) -> ClassifiedError {
        match self {
            MessagingError::Timeout {
                operation,
                timeout_seconds,
            } => ClassifiedError::timeout(
                operation.clone(),
                std::time::Duration::from_secs(*timeout_seconds),
            ),
            MessagingError::MessageSerialization { .. }
            | MessagingError::MessageDeserialization { .. }
            | MessagingError::QueueNotFound { .. }
            | MessagingError::Configuration { .. } => {
                ClassifiedError::permanent(self.to_string())
            }
            _ => ClassifiedError::transient(self.to_string()),
        }
    }
}

/// Conversion from sqlx::Error to MessagingError
impl From<sqlx::Error> for MessagingError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => {
                MessagingError::queue_operation("unknown", "query", "No rows found")
            }
            sqlx::Error::Database(db_err) => {
                MessagingError::queue_operation("unknown", "database", db_err.to_string())
            }
            sqlx::Error::PoolTimedOut => MessagingError::timeout("broker_pool", 30),
            sqlx::Error::PoolClosed => MessagingError::pool_exhausted("Broker pool is closed"),
            sqlx::Error::Configuration(config_err) => {
                MessagingError::configuration("broker", config_err.to_string())
            }
            _ => MessagingError::broker_connection(err.to_string()),
        }
    }
}

/// Conversion from serde_json::Error to MessagingError
impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() || err.is_data() {
            MessagingError::message_deserialization(err.to_string())
        } else {
            MessagingError::message_serialization(err.to_string())
        }
    }
}

/// Conversion from pgmq::errors::PgmqError to MessagingError
impl From<pgmq::errors::PgmqError> for MessagingError {
    fn from(err: pgmq::errors::PgmqError) -> Self {
        MessagingError::queue_operation("unknown", "pgmq", err.to_string())
    }
}

/// Conversion from policy engine errors (publish goes through the engine)
impl From<PolicyError> for MessagingError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::CircuitOpen { target } => MessagingError::circuit_breaker_open(target),
            other => MessagingError::internal(other.to_string()),
        }
    }
}

/// Result type alias for messaging operations
pub type MessagingResult<T> = Result<T, MessagingError>;
