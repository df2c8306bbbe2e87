use rand::Rng;
use std::time::Duration;

/// Trait for defining reconnection strategies
///
/// A strategy is a stateful delay generator: the connection asks it for the
/// next delay every time the transport closes, and resets it every time a
/// transport opens.
pub trait ReconnectionStrategy: Send + 'static {
    /// Get the delay before the next reconnection attempt
    fn next_delay(&mut self) -> Duration;

    /// Reset the strategy state (called after successful connection)
    fn reset(&mut self);
}

/// Fibonacci backoff reconnection strategy
///
/// Delays follow `x[i] = x[i-1] + x[i-2]` starting from `initial_delay`,
/// clamped at `max_delay`. With a randomisation factor `f`, every delay is
/// multiplied by a random value in `[1, 1 + f]` and rounded to whole
/// milliseconds.
///
/// ```text
/// initial 10ms, max 1000ms:
/// 10, 10, 20, 30, 50, 80, 130, 210, 340, 550, 890, 1000, 1000, ...
/// ```
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    initial_delay_ms: u64,
    max_delay_ms: u64,
    randomisation_factor: f64,
    current_ms: u64,
    next_ms: u64,
}

impl FibonacciBackoff {
    /// Create a new Fibonacci backoff strategy
    ///
    /// # Arguments
    /// * `initial_delay` - The first delay returned (and the one after every reset)
    /// * `max_delay` - The cap every delay is clamped to before randomisation
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        let initial_delay_ms = initial_delay.as_millis() as u64;
        Self {
            initial_delay_ms,
            max_delay_ms: max_delay.as_millis() as u64,
            randomisation_factor: 0.0,
            current_ms: 0,
            next_ms: initial_delay_ms,
        }
    }

    /// Spread delays over `[d, d * (1 + factor)]`; negative factors count as 0
    pub fn with_randomisation_factor(mut self, factor: f64) -> Self {
        self.randomisation_factor = if factor.is_finite() { factor.max(0.0) } else { 0.0 };
        self
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn randomisation_factor(&self) -> f64 {
        self.randomisation_factor
    }

    fn randomise(&self, delay_ms: u64) -> u64 {
        if self.randomisation_factor == 0.0 {
            return delay_ms;
        }

        let multiple = 1.0 + rand::thread_rng().gen::<f64>() * self.randomisation_factor;
        (delay_ms as f64 * multiple).round() as u64
    }
}

impl Default for FibonacciBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(10))
    }
}

impl ReconnectionStrategy for FibonacciBackoff {
    fn next_delay(&mut self) -> Duration {
        let candidate = self.next_ms.min(self.max_delay_ms);

        self.next_ms = self.next_ms.saturating_add(self.current_ms);
        self.current_ms = candidate;

        Duration::from_millis(self.randomise(candidate))
    }

    fn reset(&mut self) {
        self.current_ms = 0;
        self.next_ms = self.initial_delay_ms;
    }
}

/// Exponential backoff reconnection strategy
///
/// Delays between reconnection attempts grow exponentially:
/// initial_delay * 2^attempt, capped at max_delay
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    attempt: u32,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff strategy
    ///
    /// # Arguments
    /// * `initial_delay` - The initial delay before first reconnect
    /// * `max_delay` - The maximum delay between reconnects
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            attempt: 0,
        }
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn next_delay(&mut self) -> Duration {
        let factor = 2u32.checked_pow(self.attempt).unwrap_or(u32::MAX);
        let delay = self
            .initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);

        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Fixed delay reconnection strategy
///
/// Always waits the same amount of time between reconnection attempts
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl ReconnectionStrategy for FixedDelay {
    fn next_delay(&mut self) -> Duration {
        self.delay
    }

    fn reset(&mut self) {
        // No state to reset for fixed delay
    }
}
