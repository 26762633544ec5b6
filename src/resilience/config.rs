//! # Resilience Configuration
//!
//! Per-target policy parameters with crate-wide defaults. A `PolicyConfig` is
//! immutable once built at startup and shared read-only across every call to
//! its target.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::resilience::{
    DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_CAP_MS, DEFAULT_BREAK_DURATION_MS,
    DEFAULT_FAILURE_THRESHOLD, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_MS,
};

/// Policy parameters for one downstream target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Retry ceiling on transient/timeout failures (0 disables retries)
    pub max_retries: u32,

    /// Exponential backoff base delay in milliseconds
    pub backoff_base_ms: u64,

    /// Exponential backoff ceiling in milliseconds
    pub backoff_cap_ms: u64,

    /// Per-attempt timeout in milliseconds
    pub timeout_ms: u64,

    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,

    /// Cooldown before a half-open probe is admitted, in milliseconds
    pub break_duration_ms: u64,

    /// Whether backoff delays carry random jitter
    pub jitter_enabled: bool,

    /// Upper bound on jitter as a fraction of the computed delay
    pub jitter_max_percentage: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_cap_ms: DEFAULT_BACKOFF_CAP_MS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            break_duration_ms: DEFAULT_BREAK_DURATION_MS,
            jitter_enabled: true,
            jitter_max_percentage: 0.1,
        }
    }
}

impl PolicyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_cap(&self) -> Duration {
        Duration::from_millis(self.backoff_cap_ms)
    }

    pub fn break_duration(&self) -> Duration {
        Duration::from_millis(self.break_duration_ms)
    }

    /// Validate policy parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be at least 1".to_string());
        }
        if self.timeout_ms == 0 {
            return Err("timeout_ms must be greater than zero".to_string());
        }
        if self.backoff_cap_ms < self.backoff_base_ms {
            return Err(format!(
                "backoff_cap_ms ({}) must be >= backoff_base_ms ({})",
                self.backoff_cap_ms, self.backoff_base_ms
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_max_percentage) {
            return Err(format!(
                "jitter_max_percentage must be within [0.0, 1.0], got {}",
                self.jitter_max_percentage
            ));
        }
        Ok(())
    }
}

/// Resilience configuration: defaults plus per-target overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Default policy applied to targets without an explicit entry
    #[serde(default)]
    pub default_policy: PolicyConfig,

    /// Per-target policy overrides keyed by logical target id
    #[serde(default)]
    pub targets: HashMap<String, PolicyConfig>,
}

impl ResilienceConfig {
    /// Resolve the policy for a target, falling back to the default
    pub fn policy_for(&self, target_id: &str) -> &PolicyConfig {
        self.targets.get(target_id).unwrap_or(&self.default_policy)
    }

    /// Validate the default policy and every override
    pub fn validate(&self) -> Result<(), String> {
        self.default_policy
            .validate()
            .map_err(|e| format!("default policy: {e}"))?;
        for (target, policy) in &self.targets {
            policy
                .validate()
                .map_err(|e| format!("target '{target}': {e}"))?;
        }
        Ok(())
    }
}
