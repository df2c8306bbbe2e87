use crate::traits::*;
use std::sync::Arc;
use std::time::Duration;

/// Backoff parameters for the default Fibonacci reconnection strategy
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// First reconnect delay, and the delay after every successful open
    pub initial_delay: Duration,
    /// Cap applied before randomisation
    pub max_delay: Duration,
    /// Delays are multiplied by a random value in `[1, 1 + factor]`
    pub randomisation_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            randomisation_factor: 0.0,
        }
    }
}

impl BackoffConfig {
    pub fn validate(&self) -> Result<()> {
        if self.initial_delay.is_zero() {
            return Err(UpsocketError::Configuration(
                "initial_delay must be greater than 0".to_string(),
            ));
        }

        if self.max_delay < self.initial_delay {
            return Err(UpsocketError::Configuration(
                "max_delay must be >= initial_delay".to_string(),
            ));
        }

        if !self.randomisation_factor.is_finite() || self.randomisation_factor < 0.0 {
            return Err(UpsocketError::Configuration(
                "randomisation_factor must be a finite number >= 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Build the Fibonacci generator these parameters describe
    pub fn strategy(&self) -> FibonacciBackoff {
        FibonacciBackoff::new(self.initial_delay, self.max_delay)
            .with_randomisation_factor(self.randomisation_factor)
    }
}

/// Configuration for a [`crate::Connection`]
///
/// Built by [`crate::ConnectionBuilder`]; immutable once the connection runs.
pub struct ConnectionConfig {
    /// Payload sent first on every successful open
    pub(crate) preamble: Option<WsMessage>,

    /// Keep outbound messages while disconnected
    pub(crate) buffering: bool,

    /// Delay between drain cycles
    pub(crate) drain_interval: Duration,

    /// Creates transports for `connect` calls and reconnects
    pub(crate) connector: Arc<dyn Connector>,

    /// Delay schedule between reconnect attempts
    pub(crate) reconnect_strategy: Box<dyn ReconnectionStrategy>,
}

impl ConnectionConfig {
    pub fn preamble(&self) -> Option<&WsMessage> {
        self.preamble.as_ref()
    }

    pub fn is_buffering(&self) -> bool {
        self.buffering
    }

    pub fn drain_interval(&self) -> Duration {
        self.drain_interval
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("preamble", &self.preamble)
            .field("buffering", &self.buffering)
            .field("drain_interval", &self.drain_interval)
            .finish_non_exhaustive()
    }
}
