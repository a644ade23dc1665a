//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`PulsarSettings::default()`]
//! 2. If `~/.pulsar/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate the result

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::PulsarSettings;

/// Resolve the path to the settings file (`~/.pulsar/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".pulsar").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<PulsarSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or a document that fails
/// validation is an error.
pub fn load_settings_from_path(path: &Path) -> Result<PulsarSettings> {
    load_settings_with_env(path, |name| std::env::var(name).ok())
}

/// Load settings from `path`, reading overrides through `env`.
pub fn load_settings_with_env(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<PulsarSettings> {
    let defaults = serde_json::to_value(PulsarSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: PulsarSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, env);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment overrides to loaded settings.
///
/// Numbers must parse and fall inside the listed range; anything else is
/// ignored with a warning and the file/default value stays.
pub fn apply_env_overrides(settings: &mut PulsarSettings, env: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup: env };
    let realtime = &mut settings.realtime;

    // PULSAR_WS_URL wins over the dashboard's public variable
    if let Some(v) = env
        .string("PULSAR_WS_URL")
        .or_else(|| env.string("NEXT_PUBLIC_WS_URL"))
    {
        realtime.url = v;
    }
    if let Some(v) = env.string("PULSAR_WS_PATH") {
        realtime.path = v;
    }
    if let Some(v) = env.u64("PULSAR_RECONNECT_DELAY_MS", 1, 600_000) {
        realtime.reconnect.base_delay_ms = v;
    }
    if let Some(v) = env.u64("PULSAR_MAX_RECONNECT_ATTEMPTS", 0, 1000) {
        realtime.reconnect.max_attempts = v as u32;
    }
    if let Some(v) = env.f64("PULSAR_BACKOFF_MULTIPLIER", 1.0, 10.0) {
        realtime.reconnect.multiplier = v;
    }
    if let Some(v) = env.u64("PULSAR_HEARTBEAT_INTERVAL_MS", 1000, 600_000) {
        realtime.heartbeat_interval_ms = v;
    }
    if let Some(v) = env.string("PULSAR_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a finite `f64` within an inclusive range.
pub fn parse_f64_range(val: &str, min: f64, max: f64) -> Option<f64> {
    let n: f64 = val.trim().parse().ok()?;
    (n.is_finite() && n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid integer env var, ignoring");
        }
        result
    }

    fn f64(&self, name: &str, min: f64, max: f64) -> Option<f64> {
        let val = (self.lookup)(name)?;
        let result = parse_f64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid number env var, ignoring");
        }
        result
    }
}
