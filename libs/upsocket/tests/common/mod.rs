//! Common test utilities for upsocket integration tests
//!
//! Provides a scripted in-memory transport for driving the connection state
//! machine deterministically, and a real WebSocket echo server.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{watch, Notify};
use upsocket::{Connector, EventSink, ReadyState, Result, Transport, UpsocketError, WsMessage};

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// Poll `condition` every millisecond for up to five seconds
///
/// Under a paused clock the sleeps auto-advance, so this also walks through
/// reconnect delays.
pub async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..5000 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    condition()
}

pub fn text(s: &str) -> WsMessage {
    WsMessage::from(s)
}

#[derive(Debug)]
struct SocketState {
    url: String,
    sink: Option<EventSink>,
    ready: ReadyState,
    buffered: usize,
    hold: bool,
    sent: Vec<WsMessage>,
    close_calls: usize,
}

/// Test-side handle on one mock transport
///
/// The connection owns the [`MockTransport`]; the test scripts its lifecycle
/// through this handle.
#[derive(Debug, Clone)]
pub struct MockSocket {
    state: Arc<Mutex<SocketState>>,
}

impl MockSocket {
    fn new(url: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(SocketState {
                url: url.to_string(),
                sink: None,
                ready: ReadyState::Connecting,
                buffered: 0,
                hold: false,
                sent: Vec::new(),
                close_calls: 0,
            })),
        }
    }

    fn with_sink(&self, f: impl FnOnce(&EventSink)) {
        let sink = self.state.lock().sink.clone();
        if let Some(sink) = sink {
            f(&sink);
        }
    }

    pub fn url(&self) -> String {
        self.state.lock().url.clone()
    }

    pub fn is_attached(&self) -> bool {
        self.state.lock().sink.is_some()
    }

    pub fn ready_state(&self) -> ReadyState {
        self.state.lock().ready
    }

    /// Complete the handshake
    pub fn open(&self) {
        self.state.lock().ready = ReadyState::Open;
        self.with_sink(|sink| sink.open());
    }

    /// Simulate the peer going away
    pub fn drop_connection(&self) {
        {
            let mut state = self.state.lock();
            state.ready = ReadyState::Closed;
            state.buffered = 0;
        }
        self.with_sink(|sink| sink.close());
    }

    /// Fail the handshake the way an unreachable server does
    pub fn refuse(&self) {
        self.state.lock().ready = ReadyState::Closed;
        self.with_sink(|sink| {
            sink.error(UpsocketError::ConnectionRefused("connection refused".to_string()));
            sink.close();
        });
    }

    pub fn error(&self, error: UpsocketError) {
        self.with_sink(|sink| sink.error(error));
    }

    /// Deliver an inbound payload
    pub fn message(&self, message: impl Into<WsMessage>) {
        let message = message.into();
        self.with_sink(|sink| sink.message(message));
    }

    /// Keep sent payloads counted in `buffered_amount` until released
    pub fn hold(&self, hold: bool) {
        self.state.lock().hold = hold;
    }

    /// Finish flushing whatever is outstanding
    pub fn release(&self) {
        self.state.lock().buffered = 0;
    }

    pub fn sent(&self) -> Vec<WsMessage> {
        self.state.lock().sent.clone()
    }

    pub fn close_calls(&self) -> usize {
        self.state.lock().close_calls
    }
}

/// Connection-side half of a [`MockSocket`]
pub struct MockTransport {
    url: String,
    socket: MockSocket,
}

impl Transport for MockTransport {
    fn url(&self) -> &str {
        &self.url
    }

    fn attach(&mut self, sink: EventSink) {
        let already_open = {
            let mut state = self.socket.state.lock();
            state.sink = Some(sink);
            state.ready == ReadyState::Open
        };
        if already_open {
            self.socket.with_sink(|sink| sink.open());
        }
    }

    fn ready_state(&self) -> ReadyState {
        self.socket.state.lock().ready
    }

    fn buffered_amount(&self) -> usize {
        self.socket.state.lock().buffered
    }

    fn send(&mut self, message: WsMessage) -> Result<()> {
        let mut state = self.socket.state.lock();
        if state.ready != ReadyState::Open {
            return Err(UpsocketError::NotOpen);
        }
        if state.hold {
            state.buffered += message.len().max(1);
        }
        state.sent.push(message);
        Ok(())
    }

    fn close(&mut self) {
        {
            let mut state = self.socket.state.lock();
            state.close_calls += 1;
            if matches!(state.ready, ReadyState::Closing | ReadyState::Closed) {
                return;
            }
            state.ready = ReadyState::Closed;
            state.buffered = 0;
        }
        self.socket.with_sink(|sink| sink.close());
    }
}

/// Connector handing out [`MockTransport`]s and recording their handles
///
/// Addresses starting with `bad://` are rejected.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    sockets: Arc<Mutex<Vec<MockSocket>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transports created so far
    pub fn count(&self) -> usize {
        self.sockets.lock().len()
    }

    pub fn socket(&self, index: usize) -> MockSocket {
        self.sockets.lock()[index].clone()
    }

    pub fn last(&self) -> MockSocket {
        let sockets = self.sockets.lock();
        sockets[sockets.len() - 1].clone()
    }
}

impl Connector for MockConnector {
    fn connect(&self, url: &str) -> Result<Box<dyn Transport>> {
        if url.starts_with("bad://") {
            return Err(UpsocketError::Configuration(format!("unsupported address {}", url)));
        }

        let socket = MockSocket::new(url);
        self.sockets.lock().push(socket.clone());
        Ok(Box::new(MockTransport {
            url: url.to_string(),
            socket,
        }))
    }
}

/// A simple WebSocket echo server for testing
pub struct MockWsServer {
    pub addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    shutdown: Arc<Notify>,
    /// Bumped to make every open client connection close
    drop_generation: Arc<watch::Sender<u64>>,
}

impl MockWsServer {
    /// Create and start a new echo server
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let shutdown = Arc::new(Notify::new());
        let drop_generation = Arc::new(watch::channel(0u64).0);

        let accepted_clone = accepted.clone();
        let shutdown_clone = shutdown.clone();
        let drop_clone = drop_generation.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                accepted_clone.fetch_add(1, Ordering::SeqCst);
                                let shutdown = shutdown_clone.clone();
                                let drop_clients = drop_clone.subscribe();
                                tokio::spawn(async move {
                                    Self::handle_connection(stream, shutdown, drop_clients).await;
                                });
                            }
                            Err(e) => {
                                eprintln!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_clone.notified() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            accepted,
            shutdown,
            drop_generation,
        }
    }

    async fn handle_connection(
        stream: tokio::net::TcpStream,
        shutdown: Arc<Notify>,
        mut drop_clients: watch::Receiver<u64>,
    ) {
        use futures::{SinkExt, StreamExt};
        use tokio_tungstenite::accept_async;

        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(msg)) => {
                            if msg.is_text() || msg.is_binary() {
                                if write.send(msg).await.is_err() {
                                    break;
                                }
                            } else if msg.is_close() {
                                break;
                            }
                        }
                        Some(Err(_)) | None => break,
                    }
                }
                _ = drop_clients.changed() => {
                    let _ = write.close().await;
                    break;
                }
                _ = shutdown.notified() => {
                    break;
                }
            }
        }
    }

    /// Get the WebSocket URL for this server
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Connections accepted so far
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Close every open client connection; the server keeps listening
    pub fn drop_clients(&self) {
        self.drop_generation.send_modify(|generation| *generation += 1);
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockWsServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// An address nothing listens on
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}
