//! Scripted in-memory transport shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pulsar_realtime::{ClientEvent, Envelope, Link, ReadyState, Transport, TransportError};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use url::Url;

/// Outcome of one scripted open.
#[derive(Clone, Debug)]
pub enum OpenScript {
    Succeed,
    Fail(String),
    /// Never completes.
    Hang,
}

#[derive(Default)]
struct MockState {
    script: VecDeque<OpenScript>,
    fallback: Option<OpenScript>,
    opens: Vec<(Url, Instant)>,
    links: Vec<LinkHandle>,
}

/// Transport whose opens follow a script. Unscripted opens succeed unless a
/// fallback is set.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(&self, outcome: OpenScript) -> &Self {
        self.state.lock().script.push_back(outcome);
        self
    }

    pub fn fail_next(&self, times: usize, reason: &str) -> &Self {
        for _ in 0..times {
            let _ = self.then(OpenScript::Fail(reason.to_string()));
        }
        self
    }

    pub fn always(&self, outcome: OpenScript) {
        self.state.lock().fallback = Some(outcome);
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().opens.len()
    }

    pub fn open_urls(&self) -> Vec<Url> {
        self.state.lock().opens.iter().map(|(u, _)| u.clone()).collect()
    }

    /// Gaps between consecutive open attempts.
    pub fn open_gaps(&self) -> Vec<Duration> {
        let state = self.state.lock();
        state
            .opens
            .windows(2)
            .map(|w| w[1].1.duration_since(w[0].1))
            .collect()
    }

    pub fn link(&self, index: usize) -> LinkHandle {
        self.state.lock().links[index].clone()
    }

    pub fn last_link(&self) -> LinkHandle {
        self.state
            .lock()
            .links
            .last()
            .cloned()
            .expect("no link opened yet")
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, url: &Url) -> Result<Box<dyn Link>, TransportError> {
        let outcome = {
            let mut state = self.state.lock();
            state.opens.push((url.clone(), Instant::now()));
            let scripted = state.script.pop_front();
            scripted
                .or_else(|| state.fallback.clone())
                .unwrap_or(OpenScript::Succeed)
        };

        match outcome {
            OpenScript::Succeed => {
                let (tx, rx) = mpsc::unbounded_channel();
                let handle = LinkHandle {
                    tx,
                    sent: Arc::default(),
                    ready: ReadyState::open(),
                    closed_by_client: Arc::default(),
                };
                let link = MockLink {
                    inbound: rx,
                    handle: handle.clone(),
                };
                self.state.lock().links.push(handle);
                Ok(Box::new(link))
            }
            OpenScript::Fail(reason) => Err(TransportError::Connect {
                url: pulsar_realtime::transport::redact(url),
                reason,
            }),
            OpenScript::Hang => futures::future::pending().await,
        }
    }
}

enum Inbound {
    Text(String),
    Drop(String),
    Close,
}

/// Test-side view of an opened link.
#[derive(Clone)]
pub struct LinkHandle {
    tx: mpsc::UnboundedSender<Inbound>,
    sent: Arc<Mutex<Vec<String>>>,
    ready: ReadyState,
    closed_by_client: Arc<AtomicBool>,
}

impl LinkHandle {
    pub fn push(&self, frame: &str) {
        let _ = self.tx.send(Inbound::Text(frame.to_string()));
    }

    pub fn push_envelope(&self, envelope: &Envelope) {
        self.push(&envelope.encode().unwrap());
    }

    /// Drop the connection abnormally. The ready flag flips immediately.
    pub fn fail(&self, reason: &str) {
        self.ready.mark_closed();
        let _ = self.tx.send(Inbound::Drop(reason.to_string()));
    }

    /// Close cleanly from the server side.
    pub fn close(&self) {
        self.ready.mark_closed();
        let _ = self.tx.send(Inbound::Close);
    }

    /// Flip the ready flag without telling the driver.
    pub fn mark_not_ready(&self) {
        self.ready.mark_closed();
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn closed_by_client(&self) -> bool {
        self.closed_by_client.load(Ordering::SeqCst)
    }
}

struct MockLink {
    inbound: mpsc::UnboundedReceiver<Inbound>,
    handle: LinkHandle,
}

#[async_trait]
impl Link for MockLink {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        if !self.handle.ready.is_open() {
            return Err(TransportError::Send("link is closed".into()));
        }
        self.handle.sent.lock().push(text);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        match self.inbound.recv().await {
            Some(Inbound::Text(text)) => Some(Ok(text)),
            Some(Inbound::Drop(reason)) => Some(Err(TransportError::Closed(reason))),
            Some(Inbound::Close) | None => None,
        }
    }

    async fn close(&mut self) {
        self.handle.ready.mark_closed();
        self.handle.closed_by_client.store(true, Ordering::SeqCst);
    }

    fn ready_state(&self) -> ReadyState {
        self.handle.ready.clone()
    }
}

/// Next lifecycle event, failing the test if none arrives within 10 minutes
/// of (usually paused) time.
pub async fn next_event(events: &mut broadcast::Receiver<ClientEvent>) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(600), events.recv())
        .await
        .expect("timed out waiting for client event")
        .expect("event channel closed")
}

/// Skip events until `pred` matches and return the match.
pub async fn wait_for(
    events: &mut broadcast::Receiver<ClientEvent>,
    pred: impl Fn(&ClientEvent) -> bool,
) -> ClientEvent {
    loop {
        let event = next_event(events).await;
        if pred(&event) {
            return event;
        }
    }
}
