//! # Async Message Dispatcher
//!
//! Publishes and consumes envelopes against a durable broker with
//! at-least-once delivery. Publishing is itself a call to the broker target
//! and runs through the resilience policy engine; the consume loop applies
//! idempotency checks and routes permanently failing envelopes to the
//! dead-letter destination with the failure reason attached. Every terminal
//! outcome is an ack after successful processing or a dead-letter with a
//! recorded reason - a message is never silently dropped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::classification::{ClassifiedError, ErrorKind};
use crate::constants::messaging::{
    BROKER_TARGET, DEFAULT_BATCH_SIZE, DEFAULT_MAX_CONCURRENT_MESSAGES,
    DEFAULT_MAX_DELIVERY_COUNT, DEFAULT_VISIBILITY_TIMEOUT_SECONDS,
};
use crate::correlation::CorrelationContext;
use crate::messaging::broker::{Broker, Delivery};
use crate::messaging::{IdempotencyStore, MessageEnvelope, MessagingResult};
use crate::resilience::PolicyEngine;

/// Dispatcher operational parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Delivery attempts after which an envelope is dead-lettered
    pub max_delivery_count: u32,

    /// Visibility timeout handed to the broker on receive, in milliseconds
    pub visibility_timeout_ms: u64,

    /// Envelopes requested per receive call
    pub batch_size: i32,

    /// Parallelism cap for handler invocations
    pub max_concurrent_messages: usize,

    /// Idle sleep between empty receives, in milliseconds
    pub poll_interval_ms: u64,

    /// Circuit-breaker target id for broker operations
    pub broker_target: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_delivery_count: DEFAULT_MAX_DELIVERY_COUNT,
            visibility_timeout_ms: DEFAULT_VISIBILITY_TIMEOUT_SECONDS * 1000,
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrent_messages: DEFAULT_MAX_CONCURRENT_MESSAGES,
            poll_interval_ms: 100,
            broker_target: BROKER_TARGET.to_string(),
        }
    }
}

impl DispatcherConfig {
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_millis(self.visibility_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Consumer-side handler invoked once per non-duplicate delivery
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, envelope: &MessageEnvelope) -> Result<(), ClassifiedError>;
}

/// Broker-agnostic publish/consume front end
#[derive(Clone)]
pub struct MessageDispatcher {
    broker: Arc<dyn Broker>,
    engine: PolicyEngine,
    idempotency: Arc<IdempotencyStore>,
    config: DispatcherConfig,
}

impl MessageDispatcher {
    pub fn new(broker: Arc<dyn Broker>, engine: PolicyEngine, config: DispatcherConfig) -> Self {
        Self {
            broker,
            engine,
            idempotency: Arc::new(IdempotencyStore::default()),
            config,
        }
    }

    /// Replace the idempotency store (shared stores, custom retention)
    pub fn with_idempotency_store(mut self, store: Arc<IdempotencyStore>) -> Self {
        self.idempotency = store;
        self
    }

    pub fn idempotency_store(&self) -> &Arc<IdempotencyStore> {
        &self.idempotency
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Publish a payload, building the envelope from the active correlation
    /// scope
    pub async fn publish(
        &self,
        queue_name: &str,
        payload: serde_json::Value,
    ) -> MessagingResult<i64> {
        self.publish_envelope(queue_name, MessageEnvelope::new(payload))
            .await
    }

    /// Publish a prepared envelope through the resilience policy engine
    ///
    /// Publish is a call to the broker target: it is gated by the broker
    /// circuit breaker and retried on transient failure like any outbound
    /// call.
    pub async fn publish_envelope(
        &self,
        queue_name: &str,
        envelope: MessageEnvelope,
    ) -> MessagingResult<i64> {
        let broker = Arc::clone(&self.broker);
        let queue = queue_name.to_string();

        let broker_message_id = self
            .engine
            .execute(&self.config.broker_target, move || {
                let broker = Arc::clone(&broker);
                let queue = queue.clone();
                let envelope = envelope.clone();
                async move {
                    broker
                        .send(&queue, &envelope)
                        .await
                        .map_err(|e| e.classify())
                }
            })
            .await?;

        Ok(broker_message_id)
    }

    /// Publish without awaiting completion on the caller's path
    ///
    /// The spawned task is never awaited by the original request; its failure
    /// is logged with the originating correlation id, never silently
    /// swallowed.
    pub fn publish_fire_and_forget(&self, queue_name: &str, payload: serde_json::Value) {
        let dispatcher = self.clone();
        let queue = queue_name.to_string();
        let context = CorrelationContext::current().unwrap_or_default();

        tokio::spawn(async move {
            let correlation_id = context.correlation_id.clone();
            let result = context
                .scope(dispatcher.publish(&queue, payload))
                .await;
            if let Err(err) = result {
                error!(
                    queue_name = %queue,
                    correlation_id = %correlation_id,
                    error = %err,
                    "❌ Fire-and-forget publish failed"
                );
            }
        });
    }

    /// Oldest-message age for the queue, for consumer-lag health reporting
    pub async fn queue_lag_seconds(&self, queue_name: &str) -> MessagingResult<Option<i64>> {
        let metrics = self.broker.queue_metrics(queue_name).await?;
        Ok(metrics.oldest_message_age_seconds)
    }

    /// Run the receive loop until the shutdown signal flips to `true`
    ///
    /// Up to `max_concurrent_messages` envelopes are processed in parallel;
    /// each envelope's settlement (ack or dead-letter) is independent and
    /// does not block the others. In-flight handlers are drained before the
    /// loop returns.
    pub async fn run_consumer(
        &self,
        queue_name: &str,
        handler: Arc<dyn MessageHandler>,
        mut shutdown: watch::Receiver<bool>,
    ) -> MessagingResult<()> {
        info!(
            queue_name = %queue_name,
            max_concurrent = self.config.max_concurrent_messages,
            "📡 Consumer loop starting"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_messages));
        let mut in_flight: JoinSet<()> = JoinSet::new();

        loop {
            if *shutdown.borrow() {
                break;
            }

            // Reap finished handler tasks without blocking
            while in_flight.try_join_next().is_some() {}

            let deliveries = match self
                .broker
                .receive(
                    queue_name,
                    self.config.batch_size,
                    self.config.visibility_timeout(),
                )
                .await
            {
                Ok(deliveries) => deliveries,
                Err(err) => {
                    warn!(
                        queue_name = %queue_name,
                        error = %err,
                        "Broker receive failed; backing off"
                    );
                    if Self::sleep_or_shutdown(self.config.poll_interval(), &mut shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            if deliveries.is_empty() {
                if Self::sleep_or_shutdown(self.config.poll_interval(), &mut shutdown).await {
                    break;
                }
                continue;
            }

            for delivery in deliveries {
                let permit = match Arc::clone(&semaphore).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break, // semaphore closed: shutting down
                };
                let dispatcher = self.clone();
                let handler = Arc::clone(&handler);
                in_flight.spawn(async move {
                    dispatcher.process_delivery(delivery, handler).await;
                    drop(permit);
                });
            }
        }

        // Drain in-flight handlers so their settlements complete
        while in_flight.join_next().await.is_some() {}
        info!(queue_name = %queue_name, "📴 Consumer loop stopped");
        Ok(())
    }

    /// Consume whatever is currently visible, once (test/drain helper)
    pub async fn consume_available(
        &self,
        queue_name: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> MessagingResult<usize> {
        let deliveries = self
            .broker
            .receive(
                queue_name,
                self.config.batch_size,
                self.config.visibility_timeout(),
            )
            .await?;
        let count = deliveries.len();
        for delivery in deliveries {
            self.process_delivery(delivery, Arc::clone(&handler)).await;
        }
        Ok(count)
    }

    async fn process_delivery(&self, delivery: Delivery, handler: Arc<dyn MessageHandler>) {
        let envelope = delivery.envelope.clone();
        let context = CorrelationContext {
            correlation_id: envelope.correlation_id.clone(),
            started_at: chrono::Utc::now(),
        };

        // The handler runs inside the envelope's correlation scope so its
        // own outbound calls and publishes carry the same id.
        context
            .scope(async {
                self.settle_delivery(delivery, handler).await;
            })
            .await;
    }

    async fn settle_delivery(&self, delivery: Delivery, handler: Arc<dyn MessageHandler>) {
        let envelope = &delivery.envelope;

        // Idempotency gate: a redelivered envelope whose side effect already
        // happened is acknowledged without re-invoking the handler.
        if self.idempotency.is_processed(&envelope.message_id) {
            debug!(
                message_id = %envelope.message_id,
                correlation_id = %envelope.correlation_id,
                "♻️ Duplicate delivery acknowledged without reprocessing"
            );
            self.ack_or_log(&delivery).await;
            return;
        }

        match handler.handle(envelope).await {
            Ok(()) => {
                // Mark before ack: a crash between the two redelivers, and
                // the idempotency gate absorbs the duplicate.
                self.idempotency.mark_processed(envelope.message_id);
                debug!(
                    message_id = %envelope.message_id,
                    correlation_id = %envelope.correlation_id,
                    delivery_count = envelope.delivery_count,
                    "✅ Envelope processed"
                );
                self.ack_or_log(&delivery).await;
            }
            Err(err) if err.kind == ErrorKind::Permanent => {
                self.dead_letter_or_log(&delivery, &format!("permanent failure: {err}"))
                    .await;
            }
            Err(err) => {
                if envelope.delivery_count >= self.config.max_delivery_count {
                    self.dead_letter_or_log(
                        &delivery,
                        &format!(
                            "delivery count {} reached limit {}: {err}",
                            envelope.delivery_count, self.config.max_delivery_count
                        ),
                    )
                    .await;
                } else {
                    // No ack: the broker's visibility timeout re-presents the
                    // envelope with delivery_count + 1.
                    warn!(
                        message_id = %envelope.message_id,
                        correlation_id = %envelope.correlation_id,
                        delivery_count = envelope.delivery_count,
                        error = %err,
                        "🔁 Retryable failure; leaving envelope for redelivery"
                    );
                }
            }
        }
    }

    async fn ack_or_log(&self, delivery: &Delivery) {
        if let Err(err) = self.broker.ack(&delivery.receipt).await {
            // The envelope stays visible after the timeout and is deduped by
            // the idempotency gate on redelivery.
            error!(
                message_id = %delivery.envelope.message_id,
                error = %err,
                "❌ Acknowledgment failed"
            );
        }
    }

    async fn dead_letter_or_log(&self, delivery: &Delivery, reason: &str) {
        if let Err(err) = self.broker.dead_letter(delivery, reason).await {
            error!(
                message_id = %delivery.envelope.message_id,
                reason = %reason,
                error = %err,
                "❌ Dead-letter routing failed; envelope will be redelivered"
            );
        }
    }

    /// Sleep for `duration`, returning `true` when shutdown fired first
    async fn sleep_or_shutdown(
        duration: Duration,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            changed = shutdown.changed() => changed.is_ok() && *shutdown.borrow(),
        }
    }
}

impl std::fmt::Debug for MessageDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageDispatcher")
            .field("config", &self.config)
            .finish()
    }
}
