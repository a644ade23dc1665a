//! Error types for the realtime client.
//!
//! None of these escape `connect()`/`disconnect()`/`subscribe()`: asynchronous
//! failures become state transitions and [`ClientEvent`](crate::ClientEvent)s.
//! They surface only from synchronous, fallible calls (building a client,
//! decoding a frame or a typed payload).

use thiserror::Error;

use crate::envelope::EventCategory;

/// Failures reported by a [`Transport`](crate::Transport) or [`Link`](crate::Link).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The handshake could not be completed.
    #[error("failed to open connection to {url}: {reason}")]
    Connect {
        /// Target address with any credential redacted.
        url: String,
        /// Why it failed.
        reason: String,
    },

    /// A frame could not be written.
    #[error("send failed: {0}")]
    Send(String),

    /// The peer or the network dropped the connection.
    #[error("connection closed: {0}")]
    Closed(String),
}

/// Errors from the realtime client's fallible surfaces.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// The configured base address is not a valid WebSocket URL.
    #[error("invalid connection url {url}: {reason}")]
    InvalidUrl {
        /// The rejected value.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Settings failed validation.
    #[error(transparent)]
    Settings(#[from] pulsar_settings::SettingsError),

    /// An inbound frame is not a valid envelope.
    #[error("malformed frame: {0}")]
    Decode(#[from] serde_json::Error),

    /// A typed payload was requested for an envelope of another category.
    #[error("payload {payload} does not accept category {actual}")]
    CategoryMismatch {
        /// Payload type name.
        payload: &'static str,
        /// Category carried by the envelope.
        actual: EventCategory,
    },

    /// Transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// `build()` was called outside a tokio runtime.
    #[error("no tokio runtime available to run the connection driver")]
    NoRuntime,

    /// A credential store could not be read or written.
    #[error("credential store: {0}")]
    Credential(#[from] std::io::Error),
}

/// Result alias for realtime operations.
pub type Result<T> = std::result::Result<T, RealtimeError>;
