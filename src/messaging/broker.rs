//! # Broker Interface
//!
//! Narrow durable-queue abstraction the dispatcher runs against. Any backend
//! providing send, visibility-timeout receive, ack, and dead-letter semantics
//! can implement it; the crate ships an in-memory backend for tests/dev and a
//! pgmq-backed one for production.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::messaging::{MessageEnvelope, MessagingResult};

/// Broker-assigned handle for one delivery attempt
///
/// The handle identifies the broker's copy of the message (not the logical
/// `message_id`), so ack and dead-letter address exactly the attempt that was
/// received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub queue_name: String,
    pub broker_message_id: i64,
}

/// One delivered envelope plus the handle needed to settle it
#[derive(Debug, Clone)]
pub struct Delivery {
    pub envelope: MessageEnvelope,
    pub receipt: DeliveryReceipt,
}

/// Queue depth and age statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMetrics {
    pub queue_name: String,
    pub message_count: i64,
    pub oldest_message_age_seconds: Option<i64>,
}

/// Durable queue operations consumed by the dispatcher
///
/// Contract: `dead_letter` moves the broker's copy to the queue's dead-letter
/// destination with the reason attached and removes the original, so a
/// dead-lettered message is never redelivered. While a delivery's visibility
/// timeout holds, no other consumer receives the same envelope.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Create the queue and its dead-letter destination if absent
    async fn create_queue(&self, queue_name: &str) -> MessagingResult<()>;

    /// Send an envelope; returns the broker-assigned message id
    async fn send(&self, queue_name: &str, envelope: &MessageEnvelope) -> MessagingResult<i64>;

    /// Receive up to `max_count` envelopes, invisible to other consumers for
    /// `visibility_timeout`
    async fn receive(
        &self,
        queue_name: &str,
        max_count: i32,
        visibility_timeout: Duration,
    ) -> MessagingResult<Vec<Delivery>>;

    /// Acknowledge (remove) a delivered envelope
    async fn ack(&self, receipt: &DeliveryReceipt) -> MessagingResult<()>;

    /// Move a delivered envelope to the dead-letter destination with the
    /// failure reason, removing the original
    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> MessagingResult<()>;

    /// Depth and oldest-message age for consumer-lag measurement
    async fn queue_metrics(&self, queue_name: &str) -> MessagingResult<QueueMetrics>;
}

/// Dead-letter destination for a queue
pub fn dead_letter_queue_name(queue_name: &str) -> String {
    format!("{queue_name}{}", crate::constants::messaging::DEAD_LETTER_SUFFIX)
}
