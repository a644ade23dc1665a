//! WebSocket transport over `tokio-tungstenite`.

use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};
use url::Url;

use super::{Link, ReadyState, Transport, redact};
use crate::errors::TransportError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Inbound frames buffered between the reader task and the driver.
const DEFAULT_FRAME_BUFFER: usize = 256;

/// [`Transport`] that opens WebSocket connections.
#[derive(Clone, Debug)]
pub struct WsTransport {
    frame_buffer: usize,
}

impl Default for WsTransport {
    fn default() -> Self {
        Self {
            frame_buffer: DEFAULT_FRAME_BUFFER,
        }
    }
}

impl WsTransport {
    /// Transport with the default inbound buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the inbound frame buffer (minimum 1).
    #[must_use]
    pub fn with_frame_buffer(mut self, frames: usize) -> Self {
        self.frame_buffer = frames.max(1);
        self
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, url: &Url) -> Result<Box<dyn Link>, TransportError> {
        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Connect {
                url: redact(url),
                reason: e.to_string(),
            })?;
        debug!(url = %redact(url), "websocket handshake complete");

        let (sink, stream) = ws.split();
        let ready = ReadyState::open();
        let (tx, rx) = mpsc::channel(self.frame_buffer);
        let reader = tokio::spawn(read_loop(stream, tx, ready.clone()));

        Ok(Box::new(WsLink {
            sink,
            frames: rx,
            ready,
            reader,
        }))
    }
}

/// Pumps inbound frames into the link's channel and flips the ready flag the
/// moment the socket ends.
async fn read_loop(
    mut stream: futures::stream::SplitStream<WsStream>,
    tx: mpsc::Sender<Result<String, TransportError>>,
    ready: ReadyState,
) {
    while let Some(msg) = stream.next().await {
        let frame = match msg {
            Ok(Message::Text(text)) => text.as_str().to_owned(),
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => text,
                Err(_) => {
                    warn!(len = bytes.len(), "dropping non-utf8 binary frame");
                    continue;
                }
            },
            Ok(Message::Close(frame)) => {
                debug!(?frame, "peer closed websocket");
                break;
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
            Err(e) => {
                ready.mark_closed();
                let _ = tx.send(Err(TransportError::Closed(e.to_string()))).await;
                return;
            }
        };
        trace!(len = frame.len(), "frame received");
        if tx.send(Ok(frame)).await.is_err() {
            break;
        }
    }
    ready.mark_closed();
}

struct WsLink {
    sink: SplitSink<WsStream, Message>,
    frames: mpsc::Receiver<Result<String, TransportError>>,
    ready: ReadyState,
    reader: JoinHandle<()>,
}

#[async_trait]
impl Link for WsLink {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        if !self.ready.is_open() {
            return Err(TransportError::Send("link is closed".into()));
        }
        self.sink
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        self.frames.recv().await
    }

    async fn close(&mut self) {
        if self.ready.is_open() {
            self.ready.mark_closed();
            let _ = self.sink.send(Message::Close(None)).await;
        }
        let _ = self.sink.close().await;
        self.reader.abort();
    }

    fn ready_state(&self) -> ReadyState {
        self.ready.clone()
    }
}

impl Drop for WsLink {
    fn drop(&mut self) {
        self.ready.mark_closed();
        self.reader.abort();
    }
}
