//! # Upsocket Traits
//!
//! Core traits and types shared by every layer of the crate:
//!
//! - **Transport / Connector**: the socket capability being wrapped
//! - **ReconnectionStrategy**: delay schedule between reconnect attempts
//! - **WsMessage**: text or binary payload
//! - **UpsocketError**: the crate-wide error type

pub mod error;
pub mod message;
pub mod reconnect;
pub mod transport;

// Re-export commonly used types
pub use error::{Result, UpsocketError};
pub use message::WsMessage;
pub use reconnect::{ExponentialBackoff, FibonacciBackoff, FixedDelay, ReconnectionStrategy};
pub use transport::{ConnectTarget, Connector, EventSink, ReadyState, Transport, TransportEvent};
