//! # Upsocket core
//!
//! The reconnecting [`Connection`] and the pieces it is assembled from:
//!
//! - **bus**: topic-keyed publish/subscribe registry
//! - **drain**: outbound FIFO with at-most-one-in-flight flushing
//! - **websocket**: default transport on `tokio-tungstenite`
//! - **connection**: the driver task tying transport, backoff, buffer and bus together
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use upsocket::{Topic, WsMessage};
//!
//! #[tokio::main]
//! async fn main() -> upsocket::Result<()> {
//!     let connection = upsocket::builder()
//!         .preamble(WsMessage::from(r#"{"op":"auth","key":"..."}"#))
//!         .max_delay(Duration::from_secs(30))
//!         .build()
//!         .await?;
//!
//!     let messages = connection.events(Topic::Message);
//!     connection.connect("wss://stream.example.com/ws");
//!     connection.send(r#"{"op":"subscribe","channel":"trades"}"#);
//!
//!     while let Ok(event) = messages.recv() {
//!         println!("{:?}", event);
//!     }
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod bus;
pub mod config;
pub mod connection;
pub mod connection_state;
pub mod drain;
pub mod events;
pub mod websocket;

// Re-export main types
pub use builder::ConnectionBuilder;
pub use bus::{handler, EventBus, Handler};
pub use config::{BackoffConfig, ConnectionConfig};
pub use connection::Connection;
pub use connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState, Metrics};
pub use drain::{DrainOutcome, OutboundQueue};
pub use events::{ConnectionEvent, Topic};
pub use websocket::{WebSocketConnector, WebSocketTransport};

// Re-export traits for convenience
pub use crate::traits::*;

/// Create a new connection builder
///
/// # Example
/// ```ignore
/// let connection = upsocket::builder()
///     .buffer(false)
///     .initial_delay(Duration::from_millis(250))
///     .build()
///     .await?;
/// connection.connect("ws://127.0.0.1:9001");
/// ```
pub fn builder() -> ConnectionBuilder {
    ConnectionBuilder::new()
}
