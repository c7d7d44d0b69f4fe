//! Reload tuning

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for hot-reload
///
/// Durations are stored in milliseconds so the struct reads naturally from
/// a `[reload]` TOML table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReloadConfig {
    /// Carry instance state across reloads when the module supports it
    pub preserve_state: bool,
    /// Pause after unloading before the next copy is made
    pub settle_delay_ms: u64,
    /// Pause before retrying a failed temp-file delete
    pub delete_grace_ms: u64,
    /// Load attempts per reload (at least one is always made)
    pub max_load_attempts: u32,
    /// Growth of the pause between load attempts
    pub backoff_factor: u32,
    /// Reload automatically when the module file changes
    pub watch: bool,
    /// Quiet period after the last file change before reloading
    pub debounce_ms: u64,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            preserve_state: true,
            settle_delay_ms: 100,
            delete_grace_ms: 50,
            max_load_attempts: 3,
            backoff_factor: 2,
            watch: true,
            debounce_ms: 300,
        }
    }
}

impl ReloadConfig {
    /// No pauses and a single load attempt
    pub fn immediate() -> Self {
        Self {
            settle_delay_ms: 0,
            delete_grace_ms: 0,
            max_load_attempts: 1,
            ..Self::default()
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn delete_grace(&self) -> Duration {
        Duration::from_millis(self.delete_grace_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Pause before load attempt `attempt` (0-based) of a reload
    ///
    /// The first attempt waits `settle_delay`; each retry multiplies the
    /// previous pause by `backoff_factor`.
    pub fn attempt_delay(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.backoff_factor.max(1)).saturating_pow(attempt);
        Duration::from_millis(self.settle_delay_ms.saturating_mul(factor))
    }

    /// Number of load attempts actually made per reload
    pub fn load_attempts(&self) -> u32 {
        self.max_load_attempts.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ReloadConfig::default();
        assert!(config.preserve_state);
        assert_eq!(config.settle_delay(), Duration::from_millis(100));
        assert_eq!(config.debounce(), Duration::from_millis(300));
    }

    #[test]
    fn test_attempt_delay_backoff() {
        let config = ReloadConfig::default();
        assert_eq!(config.attempt_delay(0), Duration::from_millis(100));
        assert_eq!(config.attempt_delay(1), Duration::from_millis(200));
        assert_eq!(config.attempt_delay(2), Duration::from_millis(400));
    }

    #[test]
    fn test_at_least_one_attempt() {
        let config = ReloadConfig {
            max_load_attempts: 0,
            ..ReloadConfig::default()
        };
        assert_eq!(config.load_attempts(), 1);
    }

    #[test]
    fn test_partial_toml() {
        let config: ReloadConfig = toml::from_str("settle_delay_ms = 250\nwatch = false").unwrap();
        assert_eq!(config.settle_delay_ms, 250);
        assert!(!config.watch);
        assert_eq!(config.max_load_attempts, 3);
    }
}
