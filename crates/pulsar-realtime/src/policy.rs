//! Reconnection backoff policy.
//!
//! Delay before retry `n` (1-based) is `base_delay * multiplier^(n - 1)`:
//! with the defaults the retries wait 1s, 2s, 4s, 8s, 16s and then stop.
//! There is no ceiling other than the attempt limit itself.

use std::time::Duration;

use pulsar_settings::ReconnectSettings;

/// Default delay before the first retry in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default number of retries before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default growth factor per retry.
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Exponential backoff parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Retries allowed before the client gives up and goes idle.
    pub max_attempts: u32,
    /// Growth factor applied per retry (>= 1.0).
    pub multiplier: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            multiplier: DEFAULT_MULTIPLIER,
        }
    }
}

impl From<&ReconnectSettings> for ReconnectPolicy {
    fn from(s: &ReconnectSettings) -> Self {
        Self {
            base_delay: Duration::from_millis(s.base_delay_ms),
            max_attempts: s.max_attempts,
            multiplier: s.multiplier,
        }
    }
}

impl ReconnectPolicy {
    /// Policy that never retries.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Whether another retry is allowed after `attempts` retries so far.
    pub fn allows(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay before retry number `attempt` (1-based; 0 is treated as 1).
    ///
    /// Saturates at `u64::MAX` milliseconds instead of overflowing.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let base_ms = self.base_delay.as_millis() as f64;
        let factor = self.multiplier.powi(i32::try_from(exponent).unwrap_or(i32::MAX));
        let ms = (base_ms * factor).round();
        if ms.is_finite() && ms < u64::MAX as f64 {
            Duration::from_millis(ms as u64)
        } else {
            Duration::from_millis(u64::MAX)
        }
    }
}
