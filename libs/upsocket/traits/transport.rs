//! Transport abstraction
//!
//! A [`Transport`] is one socket's lifetime: it is created (or handed over by
//! the application), attached to a connection through an [`EventSink`], and
//! thrown away once it reports closed. The connection never reuses a
//! transport; every reconnect asks the [`Connector`] for a fresh one.
//!
//! ```text
//! Connector::connect(url) ──> Transport ──attach(sink)──> socket I/O
//!                                              │
//!              open / close / error / message  │
//!                                              v
//!                                    EventSink ──> connection driver
//! ```

use crate::error::{Result, UpsocketError};
use crate::message::WsMessage;
use tokio::sync::mpsc::UnboundedSender;

/// Readiness of a transport, mirroring the WebSocket `readyState` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }
}

/// Lifecycle notification emitted by a transport
#[derive(Debug)]
pub enum TransportEvent {
    Open,
    Close,
    Error(UpsocketError),
    Message(WsMessage),
}

/// Handle through which a transport reports its lifecycle
///
/// Each sink is stamped with the epoch of the attach call that created it,
/// so the connection can tell a live transport from a superseded one.
#[derive(Debug, Clone)]
pub struct EventSink {
    epoch: u64,
    tx: UnboundedSender<(u64, TransportEvent)>,
}

impl EventSink {
    pub(crate) fn new(epoch: u64, tx: UnboundedSender<(u64, TransportEvent)>) -> Self {
        Self { epoch, tx }
    }

    /// Epoch this sink reports under
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Push a notification; silently dropped once the connection is gone
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.tx.send((self.epoch, event));
    }

    pub fn open(&self) {
        self.emit(TransportEvent::Open);
    }

    pub fn close(&self) {
        self.emit(TransportEvent::Close);
    }

    pub fn error(&self, error: UpsocketError) {
        self.emit(TransportEvent::Error(error));
    }

    pub fn message(&self, message: WsMessage) {
        self.emit(TransportEvent::Message(message));
    }

    /// Whether the receiving connection has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A bidirectional message socket
///
/// Implementations must be non-blocking: `send` queues the payload and
/// accounts for it in [`Transport::buffered_amount`] until it has been fully
/// written out.
pub trait Transport: Send + 'static {
    /// Address this transport was created for; reconnects reuse it
    fn url(&self) -> &str;

    /// Install the lifecycle notifications
    ///
    /// Called exactly once, right after the connection takes ownership.
    /// A transport that is already open when attached must report
    /// [`TransportEvent::Open`] through the sink.
    fn attach(&mut self, sink: EventSink);

    /// Current readiness
    fn ready_state(&self) -> ReadyState;

    /// Bytes handed to `send` that have not been flushed yet
    fn buffered_amount(&self) -> usize;

    /// Queue a payload for sending
    fn send(&mut self, message: WsMessage) -> Result<()>;

    /// Begin closing; the transport reports [`TransportEvent::Close`] when done
    fn close(&mut self);

    fn is_open(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }
}

/// Creates transports from an address
pub trait Connector: Send + Sync + 'static {
    /// Create a transport for `url`
    ///
    /// The transport must not start any I/O before it is attached.
    fn connect(&self, url: &str) -> Result<Box<dyn Transport>>;
}

/// What [`crate::Connection::connect`] should connect to
pub enum ConnectTarget {
    /// Create a transport for this address through the connector
    Url(String),
    /// Adopt an already constructed transport
    Transport(Box<dyn Transport>),
}

impl std::fmt::Debug for ConnectTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectTarget::Url(url) => f.debug_tuple("Url").field(url).finish(),
            ConnectTarget::Transport(t) => f.debug_tuple("Transport").field(&t.url()).finish(),
        }
    }
}

impl From<String> for ConnectTarget {
    fn from(url: String) -> Self {
        ConnectTarget::Url(url)
    }
}

impl From<&str> for ConnectTarget {
    fn from(url: &str) -> Self {
        ConnectTarget::Url(url.to_string())
    }
}

impl From<Box<dyn Transport>> for ConnectTarget {
    fn from(transport: Box<dyn Transport>) -> Self {
        ConnectTarget::Transport(transport)
    }
}
