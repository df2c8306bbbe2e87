//! WebSocket transport backed by `tokio-tungstenite`
//!
//! # Architecture
//!
//! ```text
//! WebSocketTransport (owned by the connection driver)
//!   │  send() ──> unbounded channel ──┐
//!   │  close() ─────────────────────> │
//!   │                                 v
//!   │                       socket task (tokio spawn)
//!   │                         ├─ connect_async(url)
//!   │                         ├─ write half: frames, decrements buffered amount once written
//!   │                         └─ read half: text/binary ──> EventSink::message
//!   └─ ready_state / buffered_amount: atomics shared with the socket task
//! ```

use crate::traits::*;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Commands from the transport handle to its socket task
#[derive(Debug)]
enum SocketCommand {
    Frame { message: Message, len: usize },
    Close,
}

/// State shared between the handle and the socket task
#[derive(Debug)]
struct Shared {
    ready: AtomicU8,
    buffered: AtomicUsize,
}

impl Shared {
    fn ready(&self) -> ReadyState {
        ReadyState::from_u8(self.ready.load(Ordering::Acquire))
    }

    fn set_ready(&self, state: ReadyState) {
        self.ready.store(state as u8, Ordering::Release);
    }
}

/// Creates [`WebSocketTransport`]s for `ws://` and `wss://` addresses
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn connect(&self, url: &str) -> Result<Box<dyn Transport>> {
        url.into_client_request()
            .map_err(|e| UpsocketError::Configuration(format!("Invalid WebSocket URL '{}': {}", url, e)))?;
        Ok(Box::new(WebSocketTransport::new(url)))
    }
}

/// A single WebSocket connection attempt and its lifetime
///
/// Nothing happens until [`Transport::attach`] is called; the socket task is
/// spawned then, so attach must run inside a Tokio runtime.
pub struct WebSocketTransport {
    url: String,
    shared: Arc<Shared>,
    commands: Option<UnboundedSender<SocketCommand>>,
    close_requested: bool,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            shared: Arc::new(Shared {
                ready: AtomicU8::new(ReadyState::Connecting as u8),
                buffered: AtomicUsize::new(0),
            }),
            commands: None,
            close_requested: false,
        }
    }
}

impl Transport for WebSocketTransport {
    fn url(&self) -> &str {
        &self.url
    }

    fn attach(&mut self, sink: EventSink) {
        if self.commands.is_some() {
            warn!("WebSocket transport for {} attached twice, ignoring", self.url);
            return;
        }

        let (tx, rx) = unbounded_channel();
        if self.close_requested {
            let _ = tx.send(SocketCommand::Close);
        }
        self.commands = Some(tx);

        let url = self.url.clone();
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            run_socket(url, shared, rx, sink).await;
        });
    }

    fn ready_state(&self) -> ReadyState {
        self.shared.ready()
    }

    fn buffered_amount(&self) -> usize {
        self.shared.buffered.load(Ordering::Acquire)
    }

    fn send(&mut self, message: WsMessage) -> Result<()> {
        if self.shared.ready() != ReadyState::Open {
            return Err(UpsocketError::NotOpen);
        }

        let commands = self.commands.as_ref().ok_or(UpsocketError::NotOpen)?;
        let len = message.len();

        self.shared.buffered.fetch_add(len, Ordering::AcqRel);
        commands
            .send(SocketCommand::Frame {
                message: ws_message_to_tungstenite(message),
                len,
            })
            .map_err(|e| {
                self.shared.buffered.fetch_sub(len, Ordering::AcqRel);
                UpsocketError::ChannelSend(e.to_string())
            })
    }

    fn close(&mut self) {
        match self.shared.ready() {
            ReadyState::Closing | ReadyState::Closed => return,
            _ => self.shared.set_ready(ReadyState::Closing),
        }

        self.close_requested = true;
        if let Some(commands) = &self.commands {
            let _ = commands.send(SocketCommand::Close);
        }
    }
}

/// Socket task: connect, then pump frames both ways until either side stops
async fn run_socket(
    url: String,
    shared: Arc<Shared>,
    mut commands: UnboundedReceiver<SocketCommand>,
    sink: EventSink,
) {
    let ws_stream = match connect_async(url.as_str()).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            let err = UpsocketError::from(e);
            if err.is_connection_refused() {
                debug!("Connection to {} refused", url);
            } else {
                warn!("Failed to connect to {}: {}", url, err);
            }
            finish(&shared, &sink);
            sink.error(err);
            sink.close();
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();

    if shared.ready() == ReadyState::Closing {
        debug!("Transport for {} closed before it opened", url);
        let _ = write.close().await;
        finish(&shared, &sink);
        sink.close();
        return;
    }

    info!("Connected to {}", url);
    shared.set_ready(ReadyState::Open);
    sink.open();

    loop {
        tokio::select! {
            command = commands.recv() => {
                match command {
                    Some(SocketCommand::Frame { message, len }) => {
                        let result = write.send(message).await;
                        shared.buffered.fetch_sub(len, Ordering::AcqRel);
                        if let Err(e) = result {
                            sink.error(e.into());
                            break;
                        }
                    }
                    Some(SocketCommand::Close) | None => {
                        debug!("Closing WebSocket to {}", url);
                        shared.set_ready(ReadyState::Closing);
                        let _ = write.close().await;
                        break;
                    }
                }
            }

            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("WebSocket to {} closed by peer", url);
                        break;
                    }
                    Some(Ok(frame)) => {
                        if let Some(message) = tungstenite_to_ws_message(frame) {
                            sink.message(message);
                        }
                    }
                    Some(Err(e)) => {
                        sink.error(e.into());
                        break;
                    }
                }
            }
        }
    }

    finish(&shared, &sink);
    sink.close();
}

fn finish(shared: &Shared, sink: &EventSink) {
    shared.set_ready(ReadyState::Closed);
    shared.buffered.store(0, Ordering::Release);
    debug!("Transport epoch {} finished", sink.epoch());
}

/// Convert WsMessage to tungstenite Message
fn ws_message_to_tungstenite(msg: WsMessage) -> Message {
    match msg {
        WsMessage::Text(text) => Message::Text(text),
        WsMessage::Binary(data) => Message::Binary(data),
    }
}

/// Convert tungstenite Message to WsMessage
fn tungstenite_to_ws_message(msg: Message) -> Option<WsMessage> {
    match msg {
        Message::Text(text) => Some(WsMessage::Text(text)),
        Message::Binary(data) => Some(WsMessage::Binary(data)),
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) | Message::Frame(_) => None,
    }
}
