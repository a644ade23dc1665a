//! # pulsar-settings
//!
//! Layered configuration for Pulsar.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`PulsarSettings::default()`]
//! 2. **User file**: `~/.pulsar/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `PULSAR_*` overrides (highest priority)
//!
//! There is no process-wide instance: the loaded value is passed to whoever
//! constructs a client.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings, load_settings_from_path,
    load_settings_with_env, settings_path,
};
pub use types::{LoggingSettings, PulsarSettings, RealtimeSettings, ReconnectSettings};
