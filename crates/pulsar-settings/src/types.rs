//! Settings types and their compiled defaults.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings document (`~/.pulsar/settings.json`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PulsarSettings {
    /// Realtime event client settings.
    pub realtime: RealtimeSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

impl PulsarSettings {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        self.realtime.validate()
    }
}

/// Realtime connection settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RealtimeSettings {
    /// Base WebSocket address, e.g. `ws://localhost:8080`.
    pub url: String,
    /// Path appended to the base address.
    pub path: String,
    /// Reconnection policy.
    pub reconnect: ReconnectSettings,
    /// Interval between liveness probes in milliseconds.
    pub heartbeat_interval_ms: u64,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8080".to_string(),
            path: "/ws".to_string(),
            reconnect: ReconnectSettings::default(),
            heartbeat_interval_ms: 30_000,
        }
    }
}

impl RealtimeSettings {
    /// Reject values the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(SettingsError::InvalidValue {
                key: "realtime.url",
                reason: format!("must use ws:// or wss://, got {}", self.url),
            });
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(SettingsError::InvalidValue {
                key: "realtime.heartbeatIntervalMs",
                reason: "must be positive".into(),
            });
        }
        self.reconnect.validate()
    }
}

/// Exponential backoff parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectSettings {
    /// Delay before the first retry in milliseconds.
    pub base_delay_ms: u64,
    /// Retries allowed before giving up.
    pub max_attempts: u32,
    /// Growth factor applied per retry.
    pub multiplier: f64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_attempts: 5,
            multiplier: 2.0,
        }
    }
}

impl ReconnectSettings {
    fn validate(&self) -> Result<()> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(SettingsError::InvalidValue {
                key: "realtime.reconnect.multiplier",
                reason: format!("must be >= 1.0, got {}", self.multiplier),
            });
        }
        Ok(())
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter level when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
