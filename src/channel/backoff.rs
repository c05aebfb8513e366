//! Reconnect schedule with exponential backoff
//!
//! Unlike a bounded retry policy this never gives up: the channel keeps
//! trying until it is torn down.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Configuration for reconnect delays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Delay before the first retry (ms)
    pub initial_delay_ms: u64,
    /// Cap on any single delay (ms)
    pub max_delay_ms: u64,
    /// Growth factor per consecutive failure
    pub multiplier: f64,
    /// Jitter factor (0.0 to 1.0), applied symmetrically
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            max_delay_ms: 10_000,
            multiplier: 1.3,
            jitter: 0.2,
        }
    }
}

impl ReconnectConfig {
    /// Set initial delay
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set max delay cap
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set backoff multiplier
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    /// Set jitter factor (0.0 to 1.0)
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Reject schedules that would retry a dead server in a tight loop.
    ///
    /// The builders clamp their inputs; values read from a config file go
    /// through here instead.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(SyncError::Config { reason });

        if self.initial_delay_ms == 0 {
            return invalid("reconnect.initial_delay_ms must be at least 1".into());
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return invalid(format!(
                "reconnect.max_delay_ms ({}) is below initial_delay_ms ({})",
                self.max_delay_ms, self.initial_delay_ms
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return invalid(format!(
                "reconnect.multiplier must be >= 1.0, got {}",
                self.multiplier
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return invalid(format!(
                "reconnect.jitter must be between 0.0 and 1.0, got {}",
                self.jitter
            ));
        }
        Ok(())
    }
}

/// Tracks consecutive failures and hands out the next delay
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt: u32,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Consecutive failures since the last successful connect
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay for a given attempt (0-indexed)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay = self.config.initial_delay_ms as f64
            * self.config.multiplier.powi(attempt.min(64) as i32);

        let capped_delay = base_delay.min(self.config.max_delay_ms as f64);

        let jittered_delay = if self.config.jitter > 0.0 {
            let jitter_range = capped_delay * self.config.jitter;
            let jitter_offset = rand::random::<f64>() * jitter_range * 2.0 - jitter_range;
            (capped_delay + jitter_offset).max(0.0)
        } else {
            capped_delay
        };

        Duration::from_millis(jittered_delay as u64)
    }

    /// Delay before the next attempt; advances the failure counter
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.calculate_delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Forget failures after a successful connect
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(ReconnectConfig::default())
    }
}
