//! # Configuration
//!
//! YAML-based configuration with environment-specific overrides. A single
//! `switchboard-config.yaml` holds the base settings plus optional
//! `development` / `test` / `production` sections that are deep-merged over
//! the base for the detected environment. Loaded configuration is validated
//! before use so bad policy parameters fail at startup, not mid-call.

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::messaging::DispatcherConfig;
use crate::resilience::ResilienceConfig;

/// Top-level configuration for the communication layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwitchboardConfig {
    #[serde(default)]
    pub resilience: ResilienceConfig,

    #[serde(default)]
    pub messaging: MessagingConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub web: WebConfig,
}

impl SwitchboardConfig {
    /// Validate every section; called by the loader before the config is
    /// handed out
    pub fn validate(&self) -> ConfigResult<()> {
        self.resilience.validate().map_err(|reason| {
            ConfigurationError::invalid_value("resilience", "policy", reason)
        })?;
        self.messaging.validate()?;
        Ok(())
    }
}

/// Messaging section: broker connection and dispatcher tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// PostgreSQL connection string for the pgmq-backed broker; tests and
    /// broker-less deployments leave it unset and wire an in-memory broker
    pub broker_url: Option<String>,

    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Queues created at startup
    #[serde(default)]
    pub queues: Vec<String>,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            broker_url: None,
            dispatcher: DispatcherConfig::default(),
            queues: Vec::new(),
        }
    }
}

impl MessagingConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.dispatcher.max_delivery_count == 0 {
            return Err(ConfigurationError::invalid_value(
                "messaging.dispatcher.max_delivery_count",
                "0",
                "must be at least 1",
            ));
        }
        if self.dispatcher.batch_size <= 0 {
            return Err(ConfigurationError::invalid_value(
                "messaging.dispatcher.batch_size",
                self.dispatcher.batch_size.to_string(),
                "must be positive",
            ));
        }
        if self.dispatcher.max_concurrent_messages == 0 {
            return Err(ConfigurationError::invalid_value(
                "messaging.dispatcher.max_concurrent_messages",
                "0",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Health section: what the aggregator watches
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Queue whose consumer lag appears in health reports
    pub watched_queue: Option<String>,
}

/// Web section: health endpoint exposure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "WebConfig::default_enabled")]
    pub enabled: bool,

    #[serde(default = "WebConfig::default_bind_address")]
    pub bind_address: String,
}

impl WebConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_bind_address() -> String {
        "0.0.0.0:8080".to_string()
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            bind_address: Self::default_bind_address(),
        }
    }
}
