//! Lock-free connection state and metrics
//!
//! Both are written only by the connection driver and read from any thread
//! through the public [`crate::Connection`] handle.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Externally observable connection state
///
/// ```text
/// Idle ──connect──> Connecting ──open──> Open ──close──> Disconnected
///                        ^                                    │
///                        └──────── backoff delay elapsed ─────┘
///
/// any state ──Connection::close──> Closed (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    /// No connect call has been made yet
    Idle = 0,
    /// A transport exists and is opening
    Connecting = 1,
    /// The current transport is open
    Open = 2,
    /// The transport closed; a reconnect may be scheduled
    Disconnected = 3,
    /// Closed by the application; nothing further happens
    Closed = 4,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Idle,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Open,
            3 => ConnectionState::Disconnected,
            _ => ConnectionState::Closed,
        }
    }
}

/// Atomic wrapper around [`ConnectionState`]
#[derive(Debug)]
pub struct AtomicConnectionState {
    state: AtomicU8,
}

impl AtomicConnectionState {
    pub fn new(state: ConnectionState) -> Self {
        Self {
            state: AtomicU8::new(state as u8),
        }
    }

    #[inline]
    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.get() == ConnectionState::Open
    }
}

impl Default for AtomicConnectionState {
    fn default() -> Self {
        Self::new(ConnectionState::Idle)
    }
}

/// Client metrics snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metrics {
    /// Messages fully flushed by a transport, preambles included
    pub messages_sent: u64,
    pub messages_received: u64,
    /// Reconnect attempts started after a close
    pub reconnect_count: u64,
    /// Messages waiting in the outbound buffer
    pub pending_messages: u64,
}

/// Atomic counters backing [`Metrics`]
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    reconnect_count: AtomicU64,
    pending_messages: AtomicU64,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn increment_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_reconnects(&self) {
        self.reconnect_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_pending(&self, pending: usize) {
        self.pending_messages.store(pending as u64, Ordering::Relaxed);
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn reconnect_count(&self) -> u64 {
        self.reconnect_count.load(Ordering::Relaxed)
    }

    pub fn pending_messages(&self) -> u64 {
        self.pending_messages.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> Metrics {
        Metrics {
            messages_sent: self.messages_sent(),
            messages_received: self.messages_received(),
            reconnect_count: self.reconnect_count(),
            pending_messages: self.pending_messages(),
        }
    }
}
