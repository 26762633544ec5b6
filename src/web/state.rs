//! Shared state for the web API

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::health::HealthSignalAggregator;

/// State handed to every handler via axum's `State` extractor
#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<HealthSignalAggregator>,
    pub environment: String,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(aggregator: Arc<HealthSignalAggregator>, environment: impl Into<String>) -> Self {
        Self {
            aggregator,
            environment: environment.into(),
            started_at: Utc::now(),
        }
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
