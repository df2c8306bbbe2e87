use crate::config::{BackoffConfig, ConnectionConfig};
use crate::connection::Connection;
use crate::traits::*;
use crate::websocket::WebSocketConnector;
use std::sync::Arc;
use std::time::Duration;

/// Builder for [`Connection`]
///
/// Every setting has a default; `Connection::builder().build().await` yields
/// a buffering WebSocket connection with Fibonacci backoff from 100 ms to 10 s.
pub struct ConnectionBuilder {
    preamble: Option<WsMessage>,
    buffering: bool,
    backoff: BackoffConfig,
    drain_interval: Duration,
    connector: Option<Arc<dyn Connector>>,
    reconnect_strategy: Option<Box<dyn ReconnectionStrategy>>,
}

impl ConnectionBuilder {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            preamble: None,
            buffering: true,
            backoff: BackoffConfig::default(),
            drain_interval: Duration::from_millis(1),
            connector: None,
            reconnect_strategy: None,
        }
    }

    /// Payload sent first on every successful open (authentication, handshake)
    pub fn preamble(mut self, message: impl Into<WsMessage>) -> Self {
        self.preamble = Some(message.into());
        self
    }

    /// Keep outbound messages while disconnected (default `true`)
    ///
    /// When disabled, the buffer is emptied whenever the transport is found
    /// closed.
    pub fn buffer(mut self, enabled: bool) -> Self {
        self.buffering = enabled;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.backoff.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.backoff.max_delay = delay;
        self
    }

    /// Stretch each reconnect delay by a random factor in `[1, 1 + factor]`
    pub fn randomisation_factor(mut self, factor: f64) -> Self {
        self.backoff.randomisation_factor = factor;
        self
    }

    /// Replace all Fibonacci backoff parameters at once
    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay between drain cycles while messages are pending (default 1 ms)
    pub fn drain_interval(mut self, interval: Duration) -> Self {
        self.drain_interval = interval;
        self
    }

    /// Transport factory used by `connect` and reconnects
    ///
    /// Defaults to [`WebSocketConnector`].
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Use a custom reconnect delay schedule instead of Fibonacci backoff
    ///
    /// The backoff parameters are ignored when a strategy is set.
    pub fn reconnect_strategy(mut self, strategy: impl ReconnectionStrategy) -> Self {
        self.reconnect_strategy = Some(Box::new(strategy));
        self
    }

    /// Validate the settings and start the connection driver
    ///
    /// The connection starts idle; call [`Connection::connect`] to open it.
    pub async fn build(self) -> Result<Connection> {
        let config = self.into_config()?;
        Ok(Connection::new(config))
    }

    fn into_config(self) -> Result<ConnectionConfig> {
        if self.drain_interval.is_zero() {
            return Err(UpsocketError::Configuration(
                "drain_interval must be greater than 0".to_string(),
            ));
        }

        let reconnect_strategy = match self.reconnect_strategy {
            Some(strategy) => strategy,
            None => {
                self.backoff.validate()?;
                Box::new(self.backoff.strategy())
            }
        };

        Ok(ConnectionConfig {
            preamble: self.preamble,
            buffering: self.buffering,
            drain_interval: self.drain_interval,
            connector: self
                .connector
                .unwrap_or_else(|| Arc::new(WebSocketConnector)),
            reconnect_strategy,
        })
    }
}

impl Default for ConnectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConnectionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionBuilder")
            .field("preamble", &self.preamble)
            .field("buffering", &self.buffering)
            .field("backoff", &self.backoff)
            .field("drain_interval", &self.drain_interval)
            .finish_non_exhaustive()
    }
}
