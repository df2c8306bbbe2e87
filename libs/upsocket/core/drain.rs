//! Outbound buffer and drain cycle
//!
//! # Architecture
//!
//! The connection driver owns one [`OutboundQueue`] and runs
//! [`OutboundQueue::cycle`] on a timer while there is something to send:
//!
//! ```text
//! send(m) ──> buffer [m1, m2, ...] ──cycle──> in flight ──buffered_amount == 0──> removed
//!                 ^                                │
//!   preamble ─────┘ (ahead of m1, once per open)   └── transport drops: stays at head
//! ```
//!
//! At most one message is in flight. A message leaves the buffer only after
//! the transport reports nothing outstanding, so anything in flight when a
//! transport drops is issued again on the next open.

use crate::traits::*;
use std::collections::VecDeque;
use tracing::{debug, trace, warn};

/// Which payload the transport is currently flushing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InFlight {
    Preamble,
    Head,
}

/// Result of one drain cycle
#[derive(Debug, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Transport missing or not open; the loop stops
    Disconnected,
    /// Nothing left to send; the loop stops
    Idle,
    /// A payload was handed to the transport
    Issued,
    /// The in-flight payload is still being flushed
    Flushing,
    /// The in-flight payload finished flushing
    Flushed,
    /// The transport rejected the payload; it will be retried
    SendFailed,
}

impl DrainOutcome {
    /// Whether the driver should schedule another cycle
    pub fn should_reschedule(&self) -> bool {
        !matches!(self, DrainOutcome::Disconnected | DrainOutcome::Idle)
    }
}

/// FIFO of pending outbound messages plus the per-open preamble
#[derive(Debug, Default)]
pub struct OutboundQueue {
    buffer: VecDeque<WsMessage>,
    preamble: Option<WsMessage>,
    preamble_pending: bool,
    in_flight: Option<InFlight>,
}

impl OutboundQueue {
    pub fn new(preamble: Option<WsMessage>) -> Self {
        Self {
            preamble,
            ..Default::default()
        }
    }

    pub fn push(&mut self, message: WsMessage) {
        self.buffer.push_back(message);
    }

    /// Messages waiting in the buffer (the preamble is not counted)
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Whether a cycle would still find work to do
    pub fn has_pending(&self) -> bool {
        self.in_flight.is_some() || self.preamble_pending || !self.buffer.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn is_preamble_pending(&self) -> bool {
        self.preamble_pending
    }

    /// Drop every buffered message and forget anything in flight
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.reset_epoch();
    }

    /// Forget per-transport progress; buffered messages stay
    pub fn reset_epoch(&mut self) {
        self.in_flight = None;
        self.preamble_pending = false;
    }

    /// Queue the preamble ahead of the buffer for a freshly opened transport
    ///
    /// Skipped when the buffer already starts with an identical payload.
    pub fn arm_preamble(&mut self) {
        self.reset_epoch();
        if let Some(preamble) = &self.preamble {
            self.preamble_pending = self.buffer.front() != Some(preamble);
        }
    }

    /// Run one drain step against the current transport
    pub fn cycle(
        &mut self,
        transport: Option<&mut (dyn Transport + 'static)>,
        buffering: bool,
    ) -> DrainOutcome {
        let transport = match transport {
            Some(t) if t.is_open() => t,
            _ => {
                if !buffering && !self.buffer.is_empty() {
                    debug!("Discarding {} buffered messages while disconnected", self.buffer.len());
                    self.buffer.clear();
                }
                self.in_flight = None;
                return DrainOutcome::Disconnected;
            }
        };

        if !self.has_pending() {
            return DrainOutcome::Idle;
        }

        match self.in_flight {
            None => {
                let (kind, payload) = if self.preamble_pending {
                    (InFlight::Preamble, self.preamble.clone())
                } else {
                    (InFlight::Head, self.buffer.front().cloned())
                };

                let Some(payload) = payload else {
                    // Preamble flag without a preamble configured
                    self.preamble_pending = false;
                    return DrainOutcome::Idle;
                };

                match transport.send(payload) {
                    Ok(()) => {
                        trace!("Issued {:?} payload to transport", kind);
                        self.in_flight = Some(kind);
                        DrainOutcome::Issued
                    }
                    Err(e) => {
                        warn!("Transport rejected outbound payload: {}", e);
                        DrainOutcome::SendFailed
                    }
                }
            }
            Some(kind) => {
                if transport.buffered_amount() > 0 {
                    return DrainOutcome::Flushing;
                }

                match kind {
                    InFlight::Preamble => self.preamble_pending = false,
                    InFlight::Head => {
                        self.buffer.pop_front();
                    }
                }
                self.in_flight = None;
                DrainOutcome::Flushed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Transport stub whose flushing is driven by the test
    struct StubTransport {
        state: ReadyState,
        buffered: usize,
        hold: bool,
        sent: Vec<WsMessage>,
    }

    impl StubTransport {
        fn open() -> Self {
            Self {
                state: ReadyState::Open,
                buffered: 0,
                hold: false,
                sent: Vec::new(),
            }
        }
    }

    impl Transport for StubTransport {
        fn url(&self) -> &str {
            "stub://"
        }

        fn attach(&mut self, _sink: EventSink) {}

        fn ready_state(&self) -> ReadyState {
            self.state
        }

        fn buffered_amount(&self) -> usize {
            self.buffered
        }

        fn send(&mut self, message: WsMessage) -> Result<()> {
            if self.hold {
                self.buffered += message.len();
            }
            self.sent.push(message);
            Ok(())
        }

        fn close(&mut self) {
            self.state = ReadyState::Closed;
        }
    }

    fn text(s: &str) -> WsMessage {
        WsMessage::from(s)
    }

    fn drain_all(queue: &mut OutboundQueue, transport: &mut StubTransport) {
        for _ in 0..100 {
            if !queue.cycle(Some(&mut *transport), true).should_reschedule() {
                return;
            }
        }
        panic!("drain did not settle");
    }

    #[test]
    fn test_drains_in_fifo_order() {
        let mut queue = OutboundQueue::new(None);
        let mut transport = StubTransport::open();

        for m in ["a", "b", "c"] {
            queue.push(text(m));
        }
        drain_all(&mut queue, &mut transport);

        assert_eq!(transport.sent, vec![text("a"), text("b"), text("c")]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_one_message_in_flight_until_flushed() {
        let mut queue = OutboundQueue::new(None);
        let mut transport = StubTransport::open();
        transport.hold = true;

        queue.push(text("first"));
        queue.push(text("second"));

        assert_eq!(queue.cycle(Some(&mut transport), true), DrainOutcome::Issued);
        for _ in 0..5 {
            assert_eq!(queue.cycle(Some(&mut transport), true), DrainOutcome::Flushing);
        }
        assert_eq!(transport.sent, vec![text("first")]);
        assert_eq!(queue.len(), 2);

        transport.buffered = 0;
        assert_eq!(queue.cycle(Some(&mut transport), true), DrainOutcome::Flushed);
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.cycle(Some(&mut transport), true), DrainOutcome::Issued);
        assert_eq!(transport.sent, vec![text("first"), text("second")]);
    }

    #[test]
    fn test_preamble_goes_first_and_is_not_buffered() {
        let mut queue = OutboundQueue::new(Some(text("auth")));
        let mut transport = StubTransport::open();

        queue.push(text("x"));
        queue.arm_preamble();
        assert_eq!(queue.len(), 1);
        drain_all(&mut queue, &mut transport);

        assert_eq!(transport.sent, vec![text("auth"), text("x")]);

        // Next open sends it again, exactly once
        let mut transport = StubTransport::open();
        queue.arm_preamble();
        drain_all(&mut queue, &mut transport);
        assert_eq!(transport.sent, vec![text("auth")]);
    }

    #[test]
    fn test_preamble_not_duplicated_when_buffered_at_head() {
        let mut queue = OutboundQueue::new(Some(text("auth")));
        let mut transport = StubTransport::open();

        queue.push(text("auth"));
        queue.push(text("y"));
        queue.arm_preamble();
        assert!(!queue.is_preamble_pending());

        drain_all(&mut queue, &mut transport);
        assert_eq!(transport.sent, vec![text("auth"), text("y")]);
    }

    #[test]
    fn test_disconnected_cycle_keeps_or_drops_buffer() {
        let mut queue = OutboundQueue::new(None);
        queue.push(text("a"));

        assert_eq!(queue.cycle(None, true), DrainOutcome::Disconnected);
        assert_eq!(queue.len(), 1);

        let mut closed = StubTransport::open();
        closed.state = ReadyState::Closed;
        assert_eq!(queue.cycle(Some(&mut closed), false), DrainOutcome::Disconnected);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_in_flight_message_is_reissued_after_drop() {
        let mut queue = OutboundQueue::new(None);
        let mut first = StubTransport::open();
        first.hold = true;

        queue.push(text("a"));
        assert_eq!(queue.cycle(Some(&mut first), true), DrainOutcome::Issued);

        first.state = ReadyState::Closed;
        assert_eq!(queue.cycle(Some(&mut first), true), DrainOutcome::Disconnected);

        let mut second = StubTransport::open();
        queue.arm_preamble();
        drain_all(&mut queue, &mut second);
        assert_eq!(second.sent, vec![text("a")]);
    }
}
