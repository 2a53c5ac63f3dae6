//! Exponential backoff for connector retries

use std::time::Duration;

use crate::ConnectionConfig;

/// Exponential backoff strategy for `execute_with_retry`.
///
/// The delay after attempt `n` (zero-based) is `initial * multiplier^n`,
/// optionally capped.
///
/// # Example
///
/// ```
/// use erpgate_core::BackoffStrategy;
/// use std::time::Duration;
///
/// let backoff = BackoffStrategy::new(Duration::from_secs(1));
///
/// assert_eq!(backoff.calculate_delay(0), Duration::from_secs(1));
/// assert_eq!(backoff.calculate_delay(1), Duration::from_secs(2));
/// assert_eq!(backoff.calculate_delay(2), Duration::from_secs(4));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffStrategy {
    initial: Duration,
    max: Option<Duration>,
    multiplier: f64,
}

impl BackoffStrategy {
    /// Create a doubling backoff starting at `initial`, without a cap
    pub fn new(initial: Duration) -> Self {
        Self {
            initial,
            max: None,
            multiplier: 2.0,
        }
    }

    /// Backoff derived from a connection's `retry_delay`
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self::new(config.retry_delay)
    }

    /// Cap every delay at `max`
    pub fn with_max_delay(mut self, max: Duration) -> Self {
        self.max = Some(max.max(self.initial));
        self
    }

    /// Set the growth factor. Values below 1.0 are clamped to 1.0.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    /// Delay to wait after the given zero-based attempt failed
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        let delay = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);

        match self.max {
            Some(max) => delay.min(max),
            None => delay,
        }
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial
    }

    pub fn max_delay(&self) -> Option<Duration> {
        self.max
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }
}

impl Default for BackoffStrategy {
    /// One second, doubling, matching the default `retry_delay`
    fn default() -> Self {
        Self::new(crate::DEFAULT_RETRY_DELAY)
    }
}
