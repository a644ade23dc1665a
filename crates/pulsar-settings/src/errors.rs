//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Why a settings document could not be loaded.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// Settings file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not JSON.
    #[error("{} is not valid JSON: {source}", path.display())]
    Parse {
        /// Settings file.
        path: PathBuf,
        /// Parser error.
        source: serde_json::Error,
    },

    /// The merged document does not fit the settings types.
    #[error("settings do not match the expected shape: {0}")]
    Shape(#[from] serde_json::Error),

    /// A value is outside what the client can run with.
    #[error("invalid {key}: {reason}")]
    InvalidValue {
        /// Dotted camelCase key, e.g. `realtime.url`.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Result alias for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_error_names_the_file() {
        let err = SettingsError::Read {
            path: PathBuf::from("/etc/pulsar.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "cannot read /etc/pulsar.json: denied");
    }

    #[test]
    fn shape_error_from_serde() {
        let json_err = serde_json::from_str::<u32>("\"x\"").unwrap_err();
        let err: SettingsError = json_err.into();
        assert!(err.to_string().starts_with("settings do not match the expected shape"));
    }

    #[test]
    fn invalid_value_display() {
        let err = SettingsError::InvalidValue {
            key: "realtime.reconnect.multiplier",
            reason: "must be >= 1.0, got 0.5".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid realtime.reconnect.multiplier: must be >= 1.0, got 0.5"
        );
    }
}
