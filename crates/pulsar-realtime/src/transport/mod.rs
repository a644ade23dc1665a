//! Transport abstraction.
//!
//! A [`Transport`] opens [`Link`]s; a link carries text frames in both
//! directions until it closes. The driver owns at most one link at a time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use url::Url;

use crate::errors::TransportError;

mod ws;

pub use ws::WsTransport;

/// Live open/closed flag of a link.
///
/// Shared between the link, its I/O tasks and the client handle, so
/// [`RealtimeClient::is_connected`](crate::RealtimeClient::is_connected)
/// turns false as soon as the socket goes away.
#[derive(Clone, Debug)]
pub struct ReadyState(Arc<AtomicBool>);

impl ReadyState {
    /// A flag that starts open.
    pub fn open() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    /// Whether the link can carry frames.
    pub fn is_open(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Mark the link closed. Irreversible for this link.
    pub fn mark_closed(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Opens links to a URL.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Perform the handshake. The URL may carry a credential; implementations
    /// must not log it unredacted.
    async fn open(&self, url: &Url) -> Result<Box<dyn Link>, TransportError>;
}

/// One open connection.
#[async_trait]
pub trait Link: Send {
    /// Send a text frame.
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Next inbound text frame. `None` once the peer closed cleanly,
    /// `Some(Err(_))` when the connection dropped.
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;

    /// Close the link. Idempotent.
    async fn close(&mut self);

    /// Shared ready flag.
    fn ready_state(&self) -> ReadyState;
}

/// `url` with any `token` query value masked, for logs and errors.
pub fn redact(url: &Url) -> String {
    if !url.query_pairs().any(|(k, _)| k == "token") {
        return url.to_string();
    }
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "token" {
                "REDACTED".to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), v)
        })
        .collect();
    let mut masked = url.clone();
    let _ = masked.query_pairs_mut().clear().extend_pairs(pairs);
    masked.to_string()
}
