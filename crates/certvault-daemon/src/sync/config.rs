//! Sync orchestrator configuration.

use std::time::Duration;

use rand::Rng;

use certvault_core::config::SyncSettings;
use certvault_core::model::DEFAULT_NOTICE_DAYS;

/// Configuration for the sync orchestrator.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Delay between periodic sync passes.
    pub interval: Duration,

    /// Backoff applied after failed passes.
    pub retry: RetryPolicy,

    /// Days before expiry at which downloaded certificates are `upcoming`.
    pub notice_days: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            notice_days: DEFAULT_NOTICE_DAYS,
        }
    }
}

impl SyncConfig {
    pub fn from_settings(settings: &SyncSettings, notice_days: i64) -> Self {
        Self {
            interval: Duration::from_secs(settings.interval_secs.max(1)),
            retry: RetryPolicy {
                initial_delay: Duration::from_secs(settings.backoff_initial_secs),
                max_delay: Duration::from_secs(settings.backoff_max_secs),
                multiplier: settings.backoff_multiplier.max(1.0),
                jitter_ratio: settings.jitter_ratio.clamp(0.0, 1.0),
            },
            notice_days,
        }
    }
}

/// Exponential backoff with jitter for failed sync passes.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Upper bound before jitter.
    pub max_delay: Duration,
    /// Multiplier applied after each further failure.
    pub multiplier: f64,
    /// Fraction of the delay randomised in either direction.
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            multiplier: 2.0,
            jitter_ratio: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Un-jittered delay for a given attempt number (0-indexed).
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_ms = base_ms * self.multiplier.powi(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    /// Delay for a given attempt with `±jitter_ratio` applied.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.jittered(attempt, &mut rand::thread_rng())
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub(crate) fn jittered(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter_ratio <= 0.0 {
            return base;
        }
        let base_ms = base.as_millis() as f64;
        let spread = base_ms * self.jitter_ratio;
        let jittered = rng.gen_range(-spread..=spread) + base_ms;
        Duration::from_millis(jittered.max(0.0) as u64)
    }
}
