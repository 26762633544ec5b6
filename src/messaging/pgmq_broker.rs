//! # PostgreSQL Message Queue Broker (pgmq-rs)
//!
//! Durable [`Broker`] backend over the pgmq extension. The visibility-timeout
//! and per-message lock semantics come from pgmq itself; this layer maps
//! envelopes onto pgmq messages and implements dead-lettering as a move into
//! the `<queue>_dlq` companion queue.

use std::time::Duration;

use async_trait::async_trait;
use pgmq::PGMQueue;
use tracing::{debug, info, warn};

use crate::messaging::broker::{
    dead_letter_queue_name, Broker, Delivery, DeliveryReceipt, QueueMetrics,
};
use crate::messaging::{DeadLetteredEnvelope, MessageEnvelope, MessagingError, MessagingResult};

/// pgmq-backed broker
#[derive(Debug, Clone)]
pub struct PgmqBroker {
    pgmq: PGMQueue,
}

impl PgmqBroker {
    /// Connect using a database URL
    pub async fn new(database_url: &str) -> MessagingResult<Self> {
        info!("🚀 Connecting to pgmq broker");
        let pgmq = PGMQueue::new(database_url.to_string()).await?;
        info!("✅ Connected to pgmq broker");
        Ok(Self { pgmq })
    }

    /// Reuse an existing connection pool (BYOP - Bring Your Own Pool)
    pub async fn new_with_pool(pool: sqlx::PgPool) -> Self {
        info!("🚀 Creating pgmq broker with shared connection pool");
        let pgmq = PGMQueue::new_with_pool(pool).await;
        Self { pgmq }
    }

    /// Get reference to the underlying connection pool
    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pgmq.connection
    }

    fn validate_queue_name(queue_name: &str) -> MessagingResult<()> {
        let valid = !queue_name.is_empty()
            && queue_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if valid {
            Ok(())
        } else {
            Err(MessagingError::queue_operation(
                queue_name,
                "validate",
                "queue names must be non-empty and [a-zA-Z0-9_]",
            ))
        }
    }
}

#[async_trait]
impl Broker for PgmqBroker {
    async fn create_queue(&self, queue_name: &str) -> MessagingResult<()> {
        Self::validate_queue_name(queue_name)?;
        debug!("📋 Creating queue: {}", queue_name);

        self.pgmq.create(queue_name).await.map_err(|e| {
            MessagingError::queue_operation(queue_name, "create", e.to_string())
        })?;
        let dlq = dead_letter_queue_name(queue_name);
        self.pgmq
            .create(&dlq)
            .await
            .map_err(|e| MessagingError::queue_operation(&dlq, "create", e.to_string()))?;

        info!("✅ Queue created: {} (+ {})", queue_name, dlq);
        Ok(())
    }

    async fn send(&self, queue_name: &str, envelope: &MessageEnvelope) -> MessagingResult<i64> {
        debug!(
            queue_name = %queue_name,
            message_id = %envelope.message_id,
            correlation_id = %envelope.correlation_id,
            "📤 Sending envelope"
        );

        let broker_message_id = self
            .pgmq
            .send(queue_name, envelope)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "send", e.to_string()))?;

        debug!("✅ Envelope sent with broker id: {}", broker_message_id);
        Ok(broker_message_id)
    }

    async fn receive(
        &self,
        queue_name: &str,
        max_count: i32,
        visibility_timeout: Duration,
    ) -> MessagingResult<Vec<Delivery>> {
        let vt = visibility_timeout.as_secs().max(1) as i32;
        let raw = self
            .pgmq
            .read_batch::<serde_json::Value>(queue_name, Some(vt), max_count)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "receive", e.to_string()))?
            .unwrap_or_default();

        let mut deliveries = Vec::with_capacity(raw.len());
        for message in raw {
            let receipt = DeliveryReceipt {
                queue_name: queue_name.to_string(),
                broker_message_id: message.msg_id,
            };
            match serde_json::from_value::<MessageEnvelope>(message.message.clone()) {
                Ok(mut envelope) => {
                    // read_ct counts delivery attempts including this one
                    envelope.delivery_count = message.read_ct.max(0) as u32;
                    deliveries.push(Delivery { envelope, receipt });
                }
                Err(err) => {
                    // A payload that does not parse as an envelope will never
                    // succeed; move it aside instead of poisoning the loop.
                    warn!(
                        queue_name = %queue_name,
                        broker_message_id = message.msg_id,
                        error = %err,
                        "💀 Malformed envelope moved to dead-letter queue"
                    );
                    // Wrap the raw payload so the DLQ carries one shape:
                    // every record decodes as a DeadLetteredEnvelope with a
                    // reason, this path included.
                    let mut wrapped = MessageEnvelope::new(message.message.clone());
                    wrapped.delivery_count = message.read_ct.max(0) as u32;
                    let record = DeadLetteredEnvelope::new(
                        wrapped,
                        format!("malformed envelope: {err}"),
                    );
                    let dlq = dead_letter_queue_name(queue_name);
                    self.pgmq
                        .send(&dlq, &record)
                        .await
                        .map_err(|e| {
                            MessagingError::queue_operation(&dlq, "send", e.to_string())
                        })?;
                    self.pgmq
                        .delete(queue_name, message.msg_id)
                        .await
                        .map_err(|e| {
                            MessagingError::queue_operation(queue_name, "delete", e.to_string())
                        })?;
                }
            }
        }

        debug!(
            queue_name = %queue_name,
            count = deliveries.len(),
            "📨 Received envelopes"
        );
        Ok(deliveries)
    }

    async fn ack(&self, receipt: &DeliveryReceipt) -> MessagingResult<()> {
        debug!(
            queue_name = %receipt.queue_name,
            broker_message_id = receipt.broker_message_id,
            "🗑️ Acknowledging message"
        );

        self.pgmq
            .delete(&receipt.queue_name, receipt.broker_message_id)
            .await
            .map_err(|e| {
                MessagingError::queue_operation(&receipt.queue_name, "ack", e.to_string())
            })?;
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> MessagingResult<()> {
        let dlq = dead_letter_queue_name(&delivery.receipt.queue_name);
        let record = DeadLetteredEnvelope::new(delivery.envelope.clone(), reason);

        // Send to the DLQ first so a crash between the two steps redelivers
        // the original rather than losing it.
        self.pgmq
            .send(&dlq, &record)
            .await
            .map_err(|e| MessagingError::queue_operation(&dlq, "send", e.to_string()))?;
        self.pgmq
            .delete(&delivery.receipt.queue_name, delivery.receipt.broker_message_id)
            .await
            .map_err(|e| {
                MessagingError::queue_operation(
                    &delivery.receipt.queue_name,
                    "delete",
                    e.to_string(),
                )
            })?;

        warn!(
            queue_name = %delivery.receipt.queue_name,
            message_id = %delivery.envelope.message_id,
            reason = %reason,
            "💀 Envelope dead-lettered"
        );
        Ok(())
    }

    async fn queue_metrics(&self, queue_name: &str) -> MessagingResult<QueueMetrics> {
        Self::validate_queue_name(queue_name)?;

        let query = format!(
            "SELECT count(*), EXTRACT(EPOCH FROM (now() - min(enqueued_at)))::bigint \
             FROM pgmq.q_{queue_name}"
        );
        let row: (i64, Option<i64>) = sqlx::query_as(&query).fetch_one(self.pool()).await?;

        Ok(QueueMetrics {
            queue_name: queue_name.to_string(),
            message_count: row.0,
            oldest_message_age_seconds: row.1,
        })
    }
}
