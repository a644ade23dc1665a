//! # pulsar-realtime
//!
//! Resilient client for the Pulsar dashboard event stream.
//!
//! A [`RealtimeClient`] keeps one WebSocket open to the backend, decodes every
//! pushed frame into an [`Envelope`] and hands it to the handlers subscribed to
//! its [`EventCategory`]. Dropped connections are retried with exponential
//! backoff ([`ReconnectPolicy`]) until the attempt limit is reached, and a
//! ping is sent periodically while the link is open.
//!
//! - **Lifecycle**: [`ConnectionMachine`] is a pure state machine; a driver task
//!   applies the [`Effect`]s it returns
//! - **Dispatch**: [`Registry`] with panic-isolated handlers and [`EventStream`]s
//! - **Transport**: [`Transport`]/[`Link`] traits, [`WsTransport`] over
//!   `tokio-tungstenite`
//! - **Credentials**: [`CredentialSource`] consulted on every open attempt
//!
//! ```no_run
//! # async fn demo() -> pulsar_realtime::Result<()> {
//! use pulsar_realtime::{EventCategory, PullRequest, RealtimeClient, TokenStore};
//!
//! let tokens = TokenStore::new();
//! tokens.set("session-token");
//! let client = RealtimeClient::builder(Default::default())
//!     .credentials(tokens)
//!     .build()?;
//! let _sub = client.on(EventCategory::PrOpened, |env| {
//!     if let Ok(pr) = env.payload::<PullRequest>() {
//!         println!("#{} {}", pr.pr_number, pr.title);
//!     }
//! });
//! client.connect();
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

mod client;
pub mod config;
pub mod credentials;
mod driver;
pub mod envelope;
pub mod errors;
pub mod events;
pub mod heartbeat;
pub mod machine;
pub mod payload;
pub mod policy;
pub mod registry;
pub mod transport;

pub use client::{RealtimeClient, RealtimeClientBuilder};
pub use config::ClientConfig;
pub use credentials::{CredentialSource, NoCredentials, StaticToken, TokenFile, TokenStore};
pub use envelope::{Envelope, EventCategory, PING_FRAME};
pub use errors::{RealtimeError, Result, TransportError};
pub use events::{ClientEvent, ConnectionState};
pub use machine::{ConnectionMachine, Effect};
pub use payload::{
    Integration, IntegrationKind, MetricUpdate, Payload, PullRequest, PullRequestState,
    WorkflowConclusion, WorkflowRun, WorkflowStatus,
};
pub use policy::ReconnectPolicy;
pub use registry::{DispatchReport, EventStream, Handler, Registry, Subscription};
pub use transport::{Link, ReadyState, Transport, WsTransport};
