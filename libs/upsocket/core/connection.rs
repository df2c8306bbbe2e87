use crate::bus::{EventBus, Handler};
use crate::config::ConnectionConfig;
use crate::connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState, Metrics};
use crate::drain::{DrainOutcome, OutboundQueue};
use crate::events::{ConnectionEvent, Topic};
use crate::traits::*;
use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::{sleep, Sleep};
use tracing::{debug, error, info, trace, warn};

/// Internal command messages for the connection driver
#[derive(Debug)]
enum Command {
    /// Create or adopt a transport
    Connect(ConnectTarget),
    /// Buffer an outbound message
    Send(WsMessage),
    /// Stop for good
    Close,
}

/// Self-healing message connection
///
/// Wraps an unreliable [`Transport`] and presents it as an always-available
/// channel:
/// - Outbound messages are buffered and drained in order, one at a time
/// - Closed transports are replaced after a backoff delay, indefinitely
/// - An optional preamble is sent first on every successful open
/// - Lifecycle and inbound messages are published on the [`Topic`]s
///
/// All state lives in a driver task; the methods here only enqueue commands
/// and never block or fail.
///
/// # Example
/// ```ignore
/// let connection = Connection::builder()
///     .preamble(WsMessage::from(r#"{"type":"auth","token":"..."}"#))
///     .initial_delay(Duration::from_millis(100))
///     .max_delay(Duration::from_secs(10))
///     .build()
///     .await?;
///
/// connection.on(Topic::Message, |event| println!("{:?}", event));
/// connection.connect("wss://api.example.com/stream");
/// connection.send("hello");
/// ```
pub struct Connection {
    /// Command channel sender
    command_tx: UnboundedSender<Command>,
    /// Subscriber registry shared with the driver
    bus: EventBus<ConnectionEvent>,
    /// Atomic connection state
    state: Arc<AtomicConnectionState>,
    /// Atomic metrics
    metrics: Arc<AtomicMetrics>,
    /// Driver task handle
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl Connection {
    /// Start building a connection
    pub fn builder() -> crate::builder::ConnectionBuilder {
        crate::builder::ConnectionBuilder::new()
    }

    /// Spawn the driver for `config`
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn new(config: ConnectionConfig) -> Self {
        let bus = EventBus::new();
        let state = Arc::new(AtomicConnectionState::new(ConnectionState::Idle));
        let metrics = Arc::new(AtomicMetrics::new());

        let (command_tx, command_rx) = unbounded_channel();
        let (event_tx, event_rx) = unbounded_channel();

        let driver = Driver {
            connector: config.connector,
            strategy: config.reconnect_strategy,
            buffering: config.buffering,
            drain_interval: config.drain_interval,
            queue: OutboundQueue::new(config.preamble),
            transport: None,
            url: None,
            epoch: 0,
            should_reconnect: true,
            drain_timer: None,
            reconnect_timer: None,
            event_tx,
            bus: bus.clone(),
            state: Arc::clone(&state),
            metrics: Arc::clone(&metrics),
        };

        let task_handle = tokio::spawn(driver.run(command_rx, event_rx));

        Self {
            command_tx,
            bus,
            state,
            metrics,
            task_handle: Some(task_handle),
        }
    }

    /// Connect to an address or adopt an existing transport
    ///
    /// Replaces the current transport, if any. Reconnects after a close reuse
    /// the address of the transport that closed.
    pub fn connect(&self, target: impl Into<ConnectTarget>) {
        self.command(Command::Connect(target.into()));
    }

    /// Queue a message; it is delivered once a transport is open
    pub fn send(&self, message: impl Into<WsMessage>) {
        self.command(Command::Send(message.into()));
    }

    /// Close the connection for good
    ///
    /// Pending messages are discarded, no reconnect is attempted afterwards,
    /// and later `send`/`connect` calls are ignored. Subscribers still get
    /// the `close` notification of the transport being shut down.
    pub fn close(&self) {
        self.command(Command::Close);
    }

    /// Register `handler` for `topic`
    pub fn subscribe(&self, topic: Topic, handler: Handler<ConnectionEvent>) {
        self.bus.subscribe(topic, handler);
    }

    /// Register a closure for `topic`, returning its handle for unsubscribing
    pub fn on<F>(&self, topic: Topic, f: F) -> Handler<ConnectionEvent>
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        let handler: Handler<ConnectionEvent> = Arc::new(f);
        self.bus.subscribe(topic, Arc::clone(&handler));
        handler
    }

    /// Remove one registration of `handler` from `topic`
    pub fn unsubscribe(&self, topic: Topic, handler: &Handler<ConnectionEvent>) -> bool {
        self.bus.unsubscribe(topic, handler)
    }

    /// Receive the events of `topic` through a channel
    pub fn events(&self, topic: Topic) -> crossbeam_channel::Receiver<ConnectionEvent> {
        self.bus.channel(topic).0
    }

    /// The event bus the connection publishes on
    ///
    /// Exposed for publishing application events or using custom topics.
    pub fn bus(&self) -> &EventBus<ConnectionEvent> {
        &self.bus
    }

    /// Get current connection state
    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// Get current metrics
    pub fn metrics(&self) -> Metrics {
        self.metrics.snapshot()
    }

    /// Close the connection and wait for the driver to exit
    ///
    /// Unlike [`Connection::close`], the driver stops immediately after
    /// closing the transport, so no further notifications are published.
    pub async fn shutdown(mut self) -> Result<()> {
        info!("Shutting down connection");

        self.close();
        let handle = self.task_handle.take();
        drop(self);

        if let Some(handle) = handle {
            handle
                .await
                .map_err(|e| UpsocketError::Other(format!("Driver task failed: {}", e)))?;
        }
        Ok(())
    }

    fn command(&self, command: Command) {
        if let Err(e) = self.command_tx.send(command) {
            debug!("Connection driver gone, dropping {:?}", e.0);
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .field("metrics", &self.metrics())
            .finish()
    }
}

/// Owns every piece of mutable connection state
///
/// Runs as one task; commands, transport notifications and timers are
/// handled strictly one at a time.
struct Driver {
    connector: Arc<dyn Connector>,
    strategy: Box<dyn ReconnectionStrategy>,
    buffering: bool,
    drain_interval: Duration,
    queue: OutboundQueue,
    transport: Option<Box<dyn Transport>>,
    /// Address reconnects go to
    url: Option<String>,
    /// Bumped for every attached transport
    epoch: u64,
    should_reconnect: bool,
    /// Pending drain cycle; `Some` doubles as the "scheduled" flag
    drain_timer: Option<Pin<Box<Sleep>>>,
    /// Pending reconnect attempt
    reconnect_timer: Option<Pin<Box<Sleep>>>,
    event_tx: UnboundedSender<(u64, TransportEvent)>,
    bus: EventBus<ConnectionEvent>,
    state: Arc<AtomicConnectionState>,
    metrics: Arc<AtomicMetrics>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: UnboundedReceiver<Command>,
        mut events: UnboundedReceiver<(u64, TransportEvent)>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => {
                            debug!("Connection handle dropped, stopping driver");
                            break;
                        }
                    }
                }

                Some((epoch, event)) = events.recv() => {
                    self.handle_transport_event(epoch, event);
                }

                _ = wait_for(&mut self.reconnect_timer) => {
                    self.reconnect_timer = None;
                    self.reconnect();
                }

                _ = wait_for(&mut self.drain_timer) => {
                    self.drain_timer = None;
                    self.drain();
                }
            }
        }

        self.teardown();
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect(target) => {
                if !self.should_reconnect {
                    warn!("Connection is closed, ignoring connect to {:?}", target);
                    return;
                }
                // An app-initiated connect that fails is only reported
                self.attach(target);
            }
            Command::Send(message) => {
                if !self.should_reconnect {
                    debug!("Connection is closed, dropping outbound message");
                    return;
                }
                self.queue.push(message);
                self.metrics.set_pending(self.queue.len());
                self.schedule_drain();
            }
            Command::Close => self.close(),
        }
    }

    /// Create or adopt a transport and make it the current one
    ///
    /// Returns false when the connector could not produce a transport.
    fn attach(&mut self, target: ConnectTarget) -> bool {
        let mut transport = match target {
            ConnectTarget::Url(url) => match self.connector.connect(&url) {
                Ok(transport) => transport,
                Err(e) => {
                    error!("Failed to create transport for {}: {}", url, e);
                    self.publish(ConnectionEvent::Error(Arc::new(e)));
                    return false;
                }
            },
            ConnectTarget::Transport(transport) => transport,
        };

        if let Some(mut previous) = self.transport.take() {
            if matches!(previous.ready_state(), ReadyState::Connecting | ReadyState::Open) {
                debug!("Superseding transport epoch {}", self.epoch);
                previous.close();
            }
        }

        self.reconnect_timer = None;
        self.epoch += 1;
        self.queue.reset_epoch();
        self.url = Some(transport.url().to_string());
        self.state.set(ConnectionState::Connecting);

        info!("Connecting to {} (epoch {})", transport.url(), self.epoch);
        transport.attach(EventSink::new(self.epoch, self.event_tx.clone()));
        self.transport = Some(transport);
        true
    }

    fn handle_transport_event(&mut self, epoch: u64, event: TransportEvent) {
        if epoch != self.epoch {
            trace!("Ignoring {:?} from superseded transport epoch {}", event, epoch);
            return;
        }

        match event {
            TransportEvent::Open => self.on_open(),
            TransportEvent::Close => self.on_close(),
            TransportEvent::Error(e) => self.on_error(e),
            TransportEvent::Message(message) => self.on_message(message),
        }
    }

    fn on_open(&mut self) {
        if !self.should_reconnect {
            debug!("Transport opened after close, shutting it down");
            if let Some(transport) = self.transport.as_mut() {
                transport.close();
            }
            return;
        }

        self.state.set(ConnectionState::Open);
        self.queue.arm_preamble();
        self.publish(ConnectionEvent::Open);
        self.strategy.reset();
        self.schedule_drain();
    }

    fn on_close(&mut self) {
        self.queue.reset_epoch();
        if !self.buffering {
            self.queue.clear();
        }
        self.metrics.set_pending(self.queue.len());

        if self.should_reconnect {
            self.state.set(ConnectionState::Disconnected);
        }
        self.publish(ConnectionEvent::Close);

        if !self.should_reconnect {
            debug!("Transport closed after connection close, not reconnecting");
            return;
        }

        let delay = self.strategy.next_delay();
        info!(
            "Reconnecting to {} in {:?}",
            self.url.as_deref().unwrap_or("<unknown>"),
            delay
        );
        self.reconnect_timer = Some(Box::pin(sleep(delay)));
    }

    fn on_error(&mut self, error: UpsocketError) {
        if error.is_connection_refused() {
            debug!("Connection refused, waiting for reconnect: {}", error);
            return;
        }

        warn!("Transport error: {}", error);
        self.publish(ConnectionEvent::Error(Arc::new(error)));
    }

    fn on_message(&mut self, message: WsMessage) {
        self.metrics.increment_received();
        self.publish(ConnectionEvent::Message(message));
    }

    fn reconnect(&mut self) {
        let Some(url) = self.url.clone() else {
            return;
        };

        self.metrics.increment_reconnects();
        if self.attach(ConnectTarget::Url(url.clone())) {
            return;
        }

        let delay = self.strategy.next_delay();
        info!("Retrying {} in {:?}", url, delay);
        self.reconnect_timer = Some(Box::pin(sleep(delay)));
    }

    fn close(&mut self) {
        info!("Closing connection");

        self.should_reconnect = false;
        self.queue.clear();
        self.metrics.set_pending(0);
        self.reconnect_timer = None;
        self.drain_timer = None;
        self.state.set(ConnectionState::Closed);

        if let Some(transport) = self.transport.as_mut() {
            if matches!(transport.ready_state(), ReadyState::Connecting | ReadyState::Open) {
                transport.close();
            }
        }
    }

    fn teardown(&mut self) {
        self.close();
        self.transport = None;
    }

    fn schedule_drain(&mut self) {
        if self.drain_timer.is_none() {
            self.drain_timer = Some(Box::pin(sleep(self.drain_interval)));
        }
    }

    fn drain(&mut self) {
        let outcome = self.queue.cycle(self.transport.as_deref_mut(), self.buffering);

        if outcome == DrainOutcome::Flushed {
            self.metrics.increment_sent();
        }
        self.metrics.set_pending(self.queue.len());

        if outcome.should_reschedule() {
            self.schedule_drain();
        }
    }

    fn publish(&self, event: ConnectionEvent) {
        self.bus.publish(event.topic(), &event);
    }
}

/// Resolve when the timer fires; never resolve when there is none
async fn wait_for(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}
