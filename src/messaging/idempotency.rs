//! # Idempotency Store
//!
//! Tracks which `message_id`s have already produced their side effect so a
//! redelivered envelope (crash after processing, before ack) is acknowledged
//! without re-invoking the handler. Check-and-set goes through the map's
//! atomic entry API; there is no window between test and insert.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Record of one successfully processed message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedMessageRecord {
    pub message_id: Uuid,
    pub processed_at: DateTime<Utc>,
}

/// Concurrent idempotency store keyed by message id
#[derive(Debug)]
pub struct IdempotencyStore {
    records: DashMap<Uuid, ProcessedMessageRecord>,
    retention: ChronoDuration,
}

impl IdempotencyStore {
    /// Create a store with the given retention window for pruning
    pub fn new(retention: std::time::Duration) -> Self {
        Self {
            records: DashMap::new(),
            retention: ChronoDuration::from_std(retention)
                .unwrap_or_else(|_| ChronoDuration::hours(24)),
        }
    }

    /// Atomically record a message as processed
    ///
    /// Returns `true` when this call inserted the record, `false` when the
    /// message was already marked (a concurrent or earlier consumer won).
    pub fn mark_processed(&self, message_id: Uuid) -> bool {
        let mut inserted = false;
        self.records.entry(message_id).or_insert_with(|| {
            inserted = true;
            ProcessedMessageRecord {
                message_id,
                processed_at: Utc::now(),
            }
        });
        inserted
    }

    /// Whether a message has already been processed
    pub fn is_processed(&self, message_id: &Uuid) -> bool {
        self.records.contains_key(message_id)
    }

    /// Fetch the record for a message, if present
    pub fn record(&self, message_id: &Uuid) -> Option<ProcessedMessageRecord> {
        self.records.get(message_id).map(|r| r.clone())
    }

    /// Drop records older than the retention window; returns how many
    pub fn prune_expired(&self) -> usize {
        let cutoff = Utc::now() - self.retention;
        let before = self.records.len();
        self.records.retain(|_, record| record.processed_at >= cutoff);
        let pruned = before - self.records.len();
        if pruned > 0 {
            debug!(pruned = pruned, "🧹 Pruned expired idempotency records");
        }
        pruned
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Spawn a background task that prunes expired records on an interval
    ///
    /// The task runs until aborted; drop the handle holder's reference or
    /// call `abort()` on shutdown.
    pub fn spawn_pruner(
        self: &std::sync::Arc<Self>,
        interval: std::time::Duration,
    ) -> tokio::task::JoinHandle<()> {
        let store = std::sync::Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                store.prune_expired();
            }
        })
    }
}

impl Default for IdempotencyStore {
    fn default() -> Self {
        Self::new(std::time::Duration::from_secs(24 * 60 * 60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_mark_wins() {
        let store = IdempotencyStore::default();
        let id = Uuid::new_v4();

        assert!(store.mark_processed(id));
        assert!(!store.mark_processed(id));
        assert!(store.is_processed(&id));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_prune_respects_retention() {
        let store = IdempotencyStore::new(std::time::Duration::from_secs(3600));
        let fresh = Uuid::new_v4();
        let stale = Uuid::new_v4();

        store.mark_processed(fresh);
        store.records.insert(
            stale,
            ProcessedMessageRecord {
                message_id: stale,
                processed_at: Utc::now() - ChronoDuration::hours(2),
            },
        );

        assert_eq!(store.prune_expired(), 1);
        assert!(store.is_processed(&fresh));
        assert!(!store.is_processed(&stale));
    }

    #[tokio::test]
    async fn test_background_pruner_removes_stale_records() {
        let store = std::sync::Arc::new(IdempotencyStore::new(
            std::time::Duration::from_secs(3600),
        ));
        let stale = Uuid::new_v4();
        store.records.insert(
            stale,
            ProcessedMessageRecord {
                message_id: stale,
                processed_at: Utc::now() - ChronoDuration::hours(2),
            },
        );

        let pruner = store.spawn_pruner(std::time::Duration::from_millis(10));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        pruner.abort();

        assert!(!store.is_processed(&stale));
    }

    #[test]
    fn test_concurrent_marks_insert_once() {
        let store = std::sync::Arc::new(IdempotencyStore::default());
        let id = Uuid::new_v4();

        let winners: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let store = std::sync::Arc::clone(&store);
                    scope.spawn(move || usize::from(store.mark_processed(id)))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(winners, 1);
        assert_eq!(store.len(), 1);
    }
}
