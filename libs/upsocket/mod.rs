//! # Upsocket
//!
//! A resilient client-side message socket. Application code sends and
//! subscribes as if the connection never dropped:
//!
//! - **Reconnection**: closed transports are replaced after a capped Fibonacci backoff
//! - **Buffering**: outbound messages wait in memory and drain in order, one in flight at a time
//! - **Preamble**: an optional handshake payload goes out first on every open
//! - **Event bus**: `open`, `close`, `error` and `message` topics with synchronous handlers
//! - **Pluggable transport**: anything implementing [`Transport`]; WebSocket by default

pub mod traits;
pub mod core;

// Re-export all traits
pub use traits::*;

// Re-export core functionality
pub use self::core::{
    builder, bus, config, connection, connection_state, drain, events, websocket,
    builder::ConnectionBuilder,
    bus::{handler, EventBus, Handler},
    config::{BackoffConfig, ConnectionConfig},
    connection::Connection,
    connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState, Metrics},
    drain::{DrainOutcome, OutboundQueue},
    events::{ConnectionEvent, Topic},
    websocket::{WebSocketConnector, WebSocketTransport},
};
