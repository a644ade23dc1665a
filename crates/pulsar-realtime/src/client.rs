//! Public client handle.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;
use pulsar_settings::RealtimeSettings;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::credentials::{CredentialSource, NoCredentials};
use crate::driver::{Command, Driver, Shared};
use crate::envelope::{Envelope, EventCategory};
use crate::errors::{RealtimeError, Result};
use crate::events::{ClientEvent, ConnectionState};
use crate::heartbeat::Heartbeat;
use crate::machine::ConnectionMachine;
use crate::registry::{EventStream, Handler, Registry, Subscription};
use crate::transport::{ReadyState, Transport, WsTransport};

/// Lifecycle events buffered per receiver before it starts lagging.
const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Builder for [`RealtimeClient`].
pub struct RealtimeClientBuilder {
    settings: RealtimeSettings,
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialSource>,
    event_capacity: usize,
}

impl RealtimeClientBuilder {
    /// Use `transport` instead of [`WsTransport`].
    #[must_use]
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    /// Token supplier consulted on every open attempt. Defaults to none.
    #[must_use]
    pub fn credentials(mut self, credentials: impl CredentialSource) -> Self {
        self.credentials = Arc::new(credentials);
        self
    }

    /// Capacity of the lifecycle event channel (minimum 1).
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Validate the settings and spawn the driver on the current runtime.
    ///
    /// The client starts idle; call [`RealtimeClient::connect`].
    pub fn build(self) -> Result<RealtimeClient> {
        let config = ClientConfig::from_settings(&self.settings)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| RealtimeError::NoRuntime)?;

        let registry = Registry::new();
        let shared = Arc::new(Shared::default());
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let (events, _) = broadcast::channel(self.event_capacity);
        let (commands, command_rx) = mpsc::unbounded_channel();

        debug!(endpoint = %config.endpoint(), "realtime client built");
        let driver = Driver {
            machine: ConnectionMachine::new(config.policy),
            config,
            transport: self.transport,
            credentials: self.credentials,
            registry: registry.clone(),
            shared: Arc::clone(&shared),
            state_tx,
            events: events.clone(),
            link: None,
            link_generation: 0,
            pending_open: None,
            reconnect: None,
            heartbeat: Heartbeat::new(),
        };
        let task = runtime.spawn(driver.run(command_rx));

        Ok(RealtimeClient {
            commands,
            registry,
            shared,
            state: state_rx,
            events,
            driver: Mutex::new(Some(task)),
        })
    }
}

/// Handle to a resilient event-stream connection.
///
/// All methods return immediately; connection work happens on a background
/// driver task. Dropping the handle stops the driver and closes the link.
pub struct RealtimeClient {
    commands: mpsc::UnboundedSender<Command>,
    registry: Registry,
    shared: Arc<Shared>,
    state: watch::Receiver<ConnectionState>,
    events: broadcast::Sender<ClientEvent>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("shared", &self.shared)
            .finish_non_exhaustive()
    }
}

impl RealtimeClient {
    /// Start building a client from `settings`.
    pub fn builder(settings: RealtimeSettings) -> RealtimeClientBuilder {
        RealtimeClientBuilder {
            settings,
            transport: Arc::new(WsTransport::default()),
            credentials: Arc::new(NoCredentials),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    fn command(&self, command: Command) {
        if let Err(e) = self.commands.send(command) {
            warn!(command = ?e.0, "driver is gone, command dropped");
        }
    }

    /// Open the connection. A no-op while already open or connecting.
    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    /// Close the connection and cancel any pending retry.
    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    /// Register `handler` for `category`.
    pub fn subscribe(&self, category: impl Into<EventCategory>, handler: Handler) -> Subscription {
        self.registry.subscribe(category.into(), handler)
    }

    /// Register a closure for `category`.
    pub fn on<F>(&self, category: impl Into<EventCategory>, handler: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.subscribe(category, Arc::new(handler))
    }

    /// Remove `handler` from `category`. Returns whether it was registered.
    pub fn unsubscribe(&self, category: &EventCategory, handler: &Handler) -> bool {
        self.registry.unsubscribe(category, handler)
    }

    /// Envelopes of `category` as a stream.
    pub fn stream(&self, category: impl Into<EventCategory>) -> EventStream {
        self.registry.stream(category.into())
    }

    /// Whether the current link is open right now.
    pub fn is_connected(&self) -> bool {
        self.shared
            .ready
            .lock()
            .as_ref()
            .is_some_and(ReadyState::is_open)
    }

    /// Last state published by the driver.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch state changes.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Retries made since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::Acquire)
    }

    /// Subscribe to lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Disconnect and wait for the driver to stop.
    ///
    /// Later calls return immediately.
    pub async fn shutdown(&self) {
        let Some(task) = self.driver.lock().take() else {
            return;
        };
        self.command(Command::Shutdown);
        if let Err(e) = task.await {
            warn!(error = %e, "driver task ended abnormally");
        }
    }
}
