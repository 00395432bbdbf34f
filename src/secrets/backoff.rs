//! Capped exponential backoff for watch resubscription.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff policy gating resubscription attempts.
///
/// Delays grow from `initial_backoff` by `multiplier` per consecutive failed
/// attempt and never exceed `max_backoff`. Every attempt waits at least
/// `initial_backoff`, so a stream that keeps closing cannot drive a tight
/// reconnect loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the first resubscription attempt
    pub initial_backoff: Duration,
    /// Cap for exponential growth
    pub max_backoff: Duration,
    /// Growth factor per consecutive attempt (e.g. 2.0 for doubling)
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl BackoffConfig {
    /// Delay before resubscription attempt `attempt` (0-indexed).
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let scaled_ms = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped_ms = scaled_ms.min(self.max_backoff.as_millis() as f64);

        Duration::from_millis(capped_ms as u64).max(self.initial_backoff.min(self.max_backoff))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = BackoffConfig {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
            multiplier: 2.0,
        };

        assert_eq!(config.backoff_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.backoff_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.backoff_for_attempt(3), Duration::from_millis(800));
        assert_eq!(config.backoff_for_attempt(4), Duration::from_secs(1));
        assert_eq!(config.backoff_for_attempt(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_never_below_initial() {
        let config = BackoffConfig {
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
            multiplier: 1.0,
        };

        for attempt in 0..10 {
            assert_eq!(config.backoff_for_attempt(attempt), Duration::from_millis(50));
        }
    }

    #[test]
    fn test_default_policy() {
        let config = BackoffConfig::default();
        assert_eq!(config.backoff_for_attempt(0), Duration::from_millis(500));
        assert_eq!(config.backoff_for_attempt(20), Duration::from_secs(30));
    }
}
