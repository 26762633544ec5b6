//! # Failure Classification
//!
//! Labels raw failures observed at a boundary (HTTP status, transport error,
//! broker nack, deserialization failure) as transient, permanent, or timeout.
//! The classification is consumed immediately by the policy engine or the
//! message dispatcher to decide retry and dead-letter eligibility; it is
//! never persisted.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Primary failure categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// May succeed on retry: network blips, 5xx responses, broker nacks
    Transient,

    /// Will never succeed if retried: 4xx validation, deserialization failure
    Permanent,

    /// Deadline exceeded; retry-eligible up to policy limits and counts
    /// toward circuit failures
    Timeout,
}

impl ErrorKind {
    /// Whether the policy engine may schedule another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::Timeout)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::Permanent => write!(f, "permanent"),
            ErrorKind::Timeout => write!(f, "timeout"),
        }
    }
}

/// A failure labeled with its retry class and the observed cause
#[derive(Debug, Clone, Error)]
#[error("{kind} failure: {message}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a transient (retry-eligible) failure
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    /// Create a permanent (non-retryable) failure
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permanent, message)
    }

    /// Create a timeout failure
    pub fn timeout(operation: impl Into<String>, elapsed: Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!(
                "operation '{}' timed out after {}ms",
                operation.into(),
                elapsed.as_millis()
            ),
        )
    }

    /// Classify a non-2xx HTTP status code
    ///
    /// 408 and 429 are treated as retry-eligible even though they sit in the
    /// 4xx range; every other 4xx is a caller error and permanent.
    pub fn from_status(status: u16, body_excerpt: Option<&str>) -> Self {
        let detail = body_excerpt.unwrap_or("");
        match status {
            408 => Self::new(ErrorKind::Timeout, format!("HTTP 408 request timeout {detail}")),
            429 => Self::transient(format!("HTTP 429 rate limited {detail}")),
            s if (400..500).contains(&s) => Self::permanent(format!("HTTP {s} {detail}")),
            s if (500..600).contains(&s) => Self::transient(format!("HTTP {s} {detail}")),
            s => Self::transient(format!("unexpected HTTP status {s} {detail}")),
        }
    }

    /// Classify an opaque failure reason by inspecting its text
    ///
    /// Used where only a stringly-typed cause is available (broker drivers,
    /// boxed errors from handler code).
    pub fn from_reason(reason: &str) -> Self {
        let lowered = reason.to_lowercase();
        if lowered.contains("timeout") || lowered.contains("timed out") {
            Self::new(ErrorKind::Timeout, reason.to_string())
        } else if lowered.contains("deserial")
            || lowered.contains("malformed")
            || lowered.contains("validation")
            || lowered.contains("unauthorized")
            || lowered.contains("forbidden")
        {
            Self::permanent(reason.to_string())
        } else {
            // Connection resets, nacks, pool exhaustion: retry-eligible
            Self::transient(reason.to_string())
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<serde_json::Error> for ClassifiedError {
    fn from(err: serde_json::Error) -> Self {
        Self::permanent(format!("serialization failure: {err}"))
    }
}
