//! Lifecycle signals published by the client.

use std::fmt;
use std::time::Duration;

/// Connection lifecycle state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not connected and not trying to.
    #[default]
    Idle,
    /// A transport open is in flight.
    Connecting,
    /// The transport is open.
    Open,
    /// Tearing down after a failure; transient.
    Closing,
    /// Waiting for the backoff timer before the next attempt.
    ReconnectScheduled,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::ReconnectScheduled => "reconnect_scheduled",
        })
    }
}

/// Observable lifecycle event, delivered through
/// [`RealtimeClient::events`](crate::RealtimeClient::events).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientEvent {
    /// The transport opened.
    Connected {
        /// Attempt generation that succeeded.
        generation: u64,
    },
    /// The caller disconnected.
    Disconnected,
    /// An open failed or an open connection dropped.
    ConnectionLost {
        /// Transport-reported cause.
        reason: String,
    },
    /// A retry was scheduled.
    ReconnectScheduled {
        /// 1-based retry number.
        attempt: u32,
        /// Wait before the retry.
        delay: Duration,
    },
    /// The retry budget is spent; the client is idle until `connect()`.
    RetriesExhausted {
        /// Retries made.
        attempts: u32,
    },
    /// An inbound frame could not be decoded and was dropped.
    MalformedFrame {
        /// Decoder error.
        error: String,
    },
}
