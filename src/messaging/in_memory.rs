//! # In-Memory Broker
//!
//! Full-fidelity in-process broker with visibility-timeout redelivery and
//! dead-letter destinations. Backs tests and local development; the
//! visibility mechanics mirror the durable backend so consumer logic can be
//! exercised without a database.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::messaging::broker::{
    dead_letter_queue_name, Broker, Delivery, DeliveryReceipt, QueueMetrics,
};
use crate::messaging::{DeadLetteredEnvelope, MessageEnvelope, MessagingError, MessagingResult};

#[derive(Debug, Clone)]
struct StoredMessage {
    broker_message_id: i64,
    envelope: MessageEnvelope,
    /// Before this instant the message is held by a consumer
    visible_at: Instant,
    delivery_count: u32,
}

#[derive(Debug, Default)]
struct QueueState {
    next_id: i64,
    messages: Vec<StoredMessage>,
    dead_letters: Vec<DeadLetteredEnvelope>,
}

/// In-process broker with visibility-timeout semantics
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    queues: Arc<Mutex<HashMap<String, QueueState>>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dead-letter records for a queue (test observation)
    pub fn dead_letters(&self, queue_name: &str) -> Vec<DeadLetteredEnvelope> {
        let queues = self.queues.lock();
        queues
            .get(queue_name)
            .map(|q| q.dead_letters.clone())
            .unwrap_or_default()
    }

    /// Number of messages currently stored (visible or held) in a queue
    pub fn depth(&self, queue_name: &str) -> usize {
        let queues = self.queues.lock();
        queues.get(queue_name).map(|q| q.messages.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn create_queue(&self, queue_name: &str) -> MessagingResult<()> {
        let mut queues = self.queues.lock();
        queues.entry(queue_name.to_string()).or_default();
        queues
            .entry(dead_letter_queue_name(queue_name))
            .or_default();
        Ok(())
    }

    async fn send(&self, queue_name: &str, envelope: &MessageEnvelope) -> MessagingResult<i64> {
        let mut queues = self.queues.lock();
        let queue = queues.entry(queue_name.to_string()).or_default();
        queue.next_id += 1;
        let broker_message_id = queue.next_id;
        queue.messages.push(StoredMessage {
            broker_message_id,
            envelope: envelope.clone(),
            visible_at: Instant::now(),
            delivery_count: envelope.delivery_count,
        });
        debug!(
            queue_name = %queue_name,
            broker_message_id = broker_message_id,
            message_id = %envelope.message_id,
            "📤 Message stored"
        );
        Ok(broker_message_id)
    }

    async fn receive(
        &self,
        queue_name: &str,
        max_count: i32,
        visibility_timeout: Duration,
    ) -> MessagingResult<Vec<Delivery>> {
        let now = Instant::now();
        let mut queues = self.queues.lock();
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        let mut deliveries = Vec::new();
        for stored in queue.messages.iter_mut() {
            if deliveries.len() >= max_count as usize {
                break;
            }
            if stored.visible_at > now {
                continue;
            }
            // While the visibility timeout holds, no other consumer sees
            // this message.
            stored.visible_at = now + visibility_timeout;
            stored.delivery_count += 1;

            let mut envelope = stored.envelope.clone();
            envelope.delivery_count = stored.delivery_count;
            deliveries.push(Delivery {
                envelope,
                receipt: DeliveryReceipt {
                    queue_name: queue_name.to_string(),
                    broker_message_id: stored.broker_message_id,
                },
            });
        }

        Ok(deliveries)
    }

    async fn ack(&self, receipt: &DeliveryReceipt) -> MessagingResult<()> {
        let mut queues = self.queues.lock();
        let queue = queues
            .get_mut(&receipt.queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(&receipt.queue_name))?;
        queue
            .messages
            .retain(|m| m.broker_message_id != receipt.broker_message_id);
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> MessagingResult<()> {
        let mut queues = self.queues.lock();
        let queue = queues
            .get_mut(&delivery.receipt.queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(&delivery.receipt.queue_name))?;

        queue
            .messages
            .retain(|m| m.broker_message_id != delivery.receipt.broker_message_id);
        queue
            .dead_letters
            .push(DeadLetteredEnvelope::new(delivery.envelope.clone(), reason));

        debug!(
            queue_name = %delivery.receipt.queue_name,
            message_id = %delivery.envelope.message_id,
            reason = %reason,
            "💀 Message dead-lettered"
        );
        Ok(())
    }

    async fn queue_metrics(&self, queue_name: &str) -> MessagingResult<QueueMetrics> {
        let queues = self.queues.lock();
        let queue = queues
            .get(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        let oldest_message_age_seconds = queue
            .messages
            .iter()
            .map(|m| (chrono::Utc::now() - m.envelope.enqueued_at).num_seconds())
            .max();

        Ok(QueueMetrics {
            queue_name: queue_name.to_string(),
            message_count: queue.messages.len() as i64,
            oldest_message_age_seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_receive_ack_cycle() {
        let broker = InMemoryBroker::new();
        broker.create_queue("orders").await.unwrap();

        let envelope = MessageEnvelope::new(serde_json::json!({"n": 1}));
        broker.send("orders", &envelope).await.unwrap();

        let deliveries = broker
            .receive("orders", 10, Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].envelope.delivery_count, 1);

        broker.ack(&deliveries[0].receipt).await.unwrap();
        assert_eq!(broker.depth("orders"), 0);
    }

    #[tokio::test]
    async fn test_visibility_timeout_hides_held_messages() {
        let broker = InMemoryBroker::new();
        broker.create_queue("orders").await.unwrap();
        broker
            .send("orders", &MessageEnvelope::new(serde_json::json!({})))
            .await
            .unwrap();

        let first = broker
            .receive("orders", 10, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(first.len(), 1);

        // Held by the first consumer
        let second = broker
            .receive("orders", 10, Duration::from_millis(50))
            .await
            .unwrap();
        assert!(second.is_empty());

        // Redelivered after the timeout lapses, with delivery_count bumped
        tokio::time::sleep(Duration::from_millis(60)).await;
        let third = broker
            .receive("orders", 10, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(third.len(), 1);
        assert_eq!(third[0].envelope.delivery_count, 2);
    }

    #[tokio::test]
    async fn test_dead_letter_moves_and_removes() {
        let broker = InMemoryBroker::new();
        broker.create_queue("orders").await.unwrap();
        broker
            .send("orders", &MessageEnvelope::new(serde_json::json!({})))
            .await
            .unwrap();

        let deliveries = broker
            .receive("orders", 1, Duration::from_secs(30))
            .await
            .unwrap();
        broker
            .dead_letter(&deliveries[0], "permanent validation failure")
            .await
            .unwrap();

        assert_eq!(broker.depth("orders"), 0);
        let dead = broker.dead_letters("orders");
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].reason, "permanent validation failure");
    }

    #[tokio::test]
    async fn test_queue_metrics_reports_depth() {
        let broker = InMemoryBroker::new();
        broker.create_queue("orders").await.unwrap();
        for _ in 0..3 {
            broker
                .send("orders", &MessageEnvelope::new(serde_json::json!({})))
                .await
                .unwrap();
        }

        let metrics = broker.queue_metrics("orders").await.unwrap();
        assert_eq!(metrics.message_count, 3);
        assert!(metrics.oldest_message_age_seconds.is_some());
    }
}
