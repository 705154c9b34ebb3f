//! # Runtime Configuration
//!
//! Orchestrator-wide tunables, loaded the way the teacher's
//! `tasker_shared::config::ConfigManager` layers defaults under
//! environment overrides: a `RuntimeConfig::default()` baseline, with
//! `RuntimeConfig::load()` layering `STEPFORGE_`-prefixed environment
//! variables on top via the `config` crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ProcessError, ProcessResult};

/// Backoff policy for the empty-superstep idle wait (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackoffConfig {
    /// Base delay between empty-superstep retries, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound on the delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 10,
            max_delay_ms: 250,
        }
    }
}

/// Orchestrator execution limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionConfig {
    /// Hard cap on supersteps for `executeOnce` (§4.5); continuous mode
    /// ignores this.
    pub max_supersteps: u32,
    /// Consecutive empty drains before a one-shot run gives up (§4.5).
    pub empty_superstep_threshold: u32,
    pub backoff: BackoffConfig,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_supersteps: 10_000,
            empty_superstep_threshold: 5,
            backoff: BackoffConfig::default(),
        }
    }
}

impl ExecutionConfig {
    pub fn empty_superstep_delay(&self) -> Duration {
        Duration::from_millis(self.backoff.base_delay_ms)
    }
}

/// Circuit breaker tunables for the storage manager (§4.6, §7 storage
/// errors).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageResilienceConfig {
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
    pub success_threshold: u32,
}

impl Default for StorageResilienceConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 30,
            success_threshold: 2,
        }
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RuntimeConfig {
    pub execution: ExecutionConfig,
    pub storage_resilience: StorageResilienceConfig,
}

impl RuntimeConfig {
    /// Layer `STEPFORGE_`-prefixed environment variables (double
    /// underscore as the nesting separator, e.g.
    /// `STEPFORGE_EXECUTION__MAX_SUPERSTEPS`) over the compiled-in
    /// defaults.
    pub fn load() -> ProcessResult<Self> {
        let defaults = config::Config::try_from(&RuntimeConfig::default())
            .map_err(|e| ProcessError::configuration(format!("default config rejected: {e}")))?;

        let built = config::Config::builder()
            .add_source(defaults)
            .add_source(
                config::Environment::with_prefix("STEPFORGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ProcessError::configuration(format!("failed to build config: {e}")))?;

        built
            .try_deserialize()
            .map_err(|e| ProcessError::configuration(format!("failed to deserialize config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_self_consistent() {
        let cfg = RuntimeConfig::default();
        assert!(cfg.execution.max_supersteps > 0);
        assert!(cfg.execution.empty_superstep_threshold > 0);
        assert!(cfg.storage_resilience.failure_threshold > 0);
    }

    #[test]
    fn test_load_without_env_overrides_returns_defaults() {
        let cfg = RuntimeConfig::load().expect("defaults alone must load");
        assert_eq!(cfg, RuntimeConfig::default());
    }

    #[test]
    fn test_empty_superstep_delay() {
        let cfg = ExecutionConfig::default();
        assert_eq!(cfg.empty_superstep_delay(), Duration::from_millis(10));
    }
}
