//! The connection driver task.
//!
//! One task owns the state machine, the link, the heartbeat and the reconnect
//! timer. Commands from the handle, open completions, inbound frames and timer
//! fires are all handled here one at a time.

use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Sleep, sleep};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::credentials::CredentialSource;
use crate::envelope::Envelope;
use crate::errors::TransportError;
use crate::events::{ClientEvent, ConnectionState};
use crate::heartbeat::{Heartbeat, ProbeOutcome, probe};
use crate::machine::{ConnectionMachine, Effect};
use crate::registry::Registry;
use crate::transport::{Link, ReadyState, Transport, redact};

/// Requests from the client handle.
#[derive(Debug)]
pub(crate) enum Command {
    Connect,
    Disconnect,
    Shutdown,
}

/// State read by the handle without a round trip to the driver.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub(crate) ready: Mutex<Option<ReadyState>>,
    pub(crate) attempts: AtomicU32,
}

type OpenResult = Result<Box<dyn Link>, TransportError>;
type OpenFuture = Pin<Box<dyn Future<Output = (u64, OpenResult)> + Send>>;

pub(crate) struct Driver {
    pub(crate) config: ClientConfig,
    pub(crate) machine: ConnectionMachine,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) credentials: Arc<dyn CredentialSource>,
    pub(crate) registry: Registry,
    pub(crate) shared: Arc<Shared>,
    pub(crate) state_tx: watch::Sender<ConnectionState>,
    pub(crate) events: broadcast::Sender<ClientEvent>,
    pub(crate) link: Option<Box<dyn Link>>,
    pub(crate) link_generation: u64,
    pub(crate) pending_open: Option<OpenFuture>,
    pub(crate) reconnect: Option<Pin<Box<Sleep>>>,
    pub(crate) heartbeat: Heartbeat,
}

impl Driver {
    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(Command::Connect) => {
                        let effects = self.machine.connect();
                        self.apply(effects).await;
                    }
                    Some(Command::Disconnect) => {
                        let effects = self.machine.disconnect();
                        self.apply(effects).await;
                    }
                    Some(Command::Shutdown) | None => break,
                },
                (generation, result) = next_open(&mut self.pending_open) => {
                    self.pending_open = None;
                    self.on_open(generation, result).await;
                }
                frame = next_frame(&mut self.link) => self.on_frame(frame).await,
                () = self.heartbeat.tick() => self.on_heartbeat().await,
                () = reconnect_due(&mut self.reconnect) => {
                    self.reconnect = None;
                    let effects = self.machine.reconnect_due();
                    self.apply(effects).await;
                }
            }
        }

        let effects = self.machine.disconnect();
        self.apply(effects).await;
        debug!("driver stopped");
    }

    async fn on_open(&mut self, generation: u64, result: OpenResult) {
        match result {
            Ok(mut link) => {
                let effects = self.machine.opened(generation);
                if effects.contains(&Effect::CloseStale) {
                    link.close().await;
                    return;
                }
                *self.shared.ready.lock() = Some(link.ready_state());
                self.link = Some(link);
                self.link_generation = generation;
                self.apply(effects).await;
            }
            Err(e) => {
                let effects = self.machine.failed(generation, &e.to_string());
                self.apply(effects).await;
            }
        }
    }

    async fn on_frame(&mut self, frame: Option<Result<String, TransportError>>) {
        let reason = match frame {
            Some(Ok(text)) => {
                self.deliver(&text);
                return;
            }
            Some(Err(e)) => e.to_string(),
            None => "connection closed by peer".to_string(),
        };

        // the link is finished either way; drop it so recv is not polled again
        self.close_link().await;
        let effects = self.machine.failed(self.link_generation, &reason);
        self.apply(effects).await;
    }

    fn deliver(&self, text: &str) {
        match Envelope::decode(text) {
            Ok(envelope) => {
                let report = self.registry.dispatch(&envelope);
                debug!(
                    category = %envelope.category(),
                    delivered = report.delivered,
                    failed = report.failed,
                    "envelope dispatched"
                );
            }
            Err(e) => {
                warn!(error = %e, len = text.len(), "dropping malformed frame");
                let _ = self.events.send(ClientEvent::MalformedFrame {
                    error: e.to_string(),
                });
            }
        }
    }

    async fn on_heartbeat(&mut self) {
        let Some(link) = self.link.as_mut() else {
            return;
        };
        if let ProbeOutcome::Failed(reason) = probe(link.as_mut()).await {
            debug!(reason, "probe failed, waiting for close");
        }
    }

    async fn close_link(&mut self) {
        *self.shared.ready.lock() = None;
        if let Some(mut link) = self.link.take() {
            link.close().await;
        }
    }

    async fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::CancelReconnect => self.reconnect = None,
                Effect::Open { generation } => self.start_open(generation),
                Effect::AbortOpen => self.pending_open = None,
                Effect::StartHeartbeat => self.heartbeat.start(self.config.heartbeat_interval),
                Effect::StopHeartbeat => self.heartbeat.stop(),
                Effect::CloseTransport => self.close_link().await,
                // handled where the stale link is in hand
                Effect::CloseStale => {}
                Effect::ScheduleReconnect { delay } => {
                    self.reconnect = Some(Box::pin(sleep(delay)));
                }
                Effect::Emit(event) => {
                    // no receivers is fine
                    let _ = self.events.send(event);
                }
            }
        }
        self.shared
            .attempts
            .store(self.machine.attempts(), Ordering::Release);
        let _ = self.state_tx.send_replace(self.machine.state());
    }

    fn start_open(&mut self, generation: u64) {
        let token = self.credentials.token();
        let url = self.config.connect_url(token.as_deref());
        info!(url = %redact(&url), generation, "opening connection");

        let transport = Arc::clone(&self.transport);
        self.pending_open = Some(Box::pin(async move {
            let result = transport.open(&url).await;
            (generation, result)
        }));
    }
}

async fn next_open(pending_open: &mut Option<OpenFuture>) -> (u64, OpenResult) {
    match pending_open {
        Some(fut) => fut.as_mut().await,
        None => pending().await,
    }
}

async fn next_frame(link: &mut Option<Box<dyn Link>>) -> Option<Result<String, TransportError>> {
    match link {
        Some(link) => link.recv().await,
        None => pending().await,
    }
}

async fn reconnect_due(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(delay) => delay.as_mut().await,
        None => pending().await,
    }
}
