//! # Messaging
//!
//! Durable queue-backed messaging with at-least-once delivery semantics.
//!
//! The [`Broker`] trait abstracts the queue backend behind create / send /
//! receive / ack / dead-letter operations. [`PgmqBroker`] is the
//! PostgreSQL-backed production implementation (pgmq extension);
//! [`InMemoryBroker`] gives tests real visibility-timeout and redelivery
//! semantics without a database. [`MessageDispatcher`] layers publishing
//! through the resilience policy engine, idempotent consumption, and
//! dead-letter routing on top of whichever broker is wired in.

pub mod broker;
pub mod dispatcher;
pub mod envelope;
pub mod errors;
pub mod idempotency;
pub mod in_memory;
pub mod pgmq_broker;

pub use broker::{dead_letter_queue_name, Broker, Delivery, DeliveryReceipt, QueueMetrics};
pub use dispatcher::{DispatcherConfig, MessageDispatcher, MessageHandler};
pub use envelope::{DeadLetteredEnvelope, MessageEnvelope};
pub use errors::{MessagingError, MessagingResult};
pub use idempotency::{IdempotencyStore, ProcessedMessageRecord};
pub use in_memory::InMemoryBroker;
pub use pgmq_broker::PgmqBroker;
