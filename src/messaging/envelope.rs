//! # Message Envelope
//!
//! The wire envelope carried through the broker. An envelope is never mutated
//! in place; redelivery re-presents it with an incremented `delivery_count`.
//! Terminal outcomes are acknowledgment (removed) or dead-lettering (moved
//! with the failure reason attached) - never both.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::correlation::{CorrelationContext, CorrelationId};

/// Envelope published to and delivered from the broker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Unique id used for idempotent consumption
    pub message_id: Uuid,

    /// Correlation id carried from the publishing request scope
    pub correlation_id: CorrelationId,

    /// Opaque business payload
    pub payload: serde_json::Value,

    /// Number of delivery attempts observed so far
    pub delivery_count: u32,

    /// When the publisher created the envelope
    pub enqueued_at: DateTime<Utc>,
}

impl MessageEnvelope {
    /// Build an envelope carrying the active correlation scope's id
    pub fn new(payload: serde_json::Value) -> Self {
        Self::with_correlation(payload, CorrelationContext::current_or_new())
    }

    /// Build an envelope with an explicit correlation id
    pub fn with_correlation(payload: serde_json::Value, correlation_id: CorrelationId) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            correlation_id,
            payload,
            delivery_count: 0,
            enqueued_at: Utc::now(),
        }
    }
}

/// Terminal record written to the dead-letter destination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetteredEnvelope {
    pub envelope: MessageEnvelope,
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}

impl DeadLetteredEnvelope {
    pub fn new(envelope: MessageEnvelope, reason: impl Into<String>) -> Self {
        Self {
            envelope,
            reason: reason.into(),
            dead_lettered_at: Utc::now(),
        }
    }
}
