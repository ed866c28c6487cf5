//! Reconnection configuration and exponential backoff.

use std::time::Duration;

use crate::error::GatewayError;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Maximum number of reconnection attempts (None = infinite).
    pub max_retries: Option<u32>,
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between reconnection attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_retries: None,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            backoff_multiplier: 1.5,
        }
    }
}

impl ReconnectConfig {
    /// Delay before reconnection attempt number `attempt` (zero-based).
    ///
    /// `min(initial_delay * backoff_multiplier^attempt, max_delay)`
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Check if the retry budget allows another attempt after `retries_so_far`.
    #[must_use]
    pub const fn allows_retry(&self, retries_so_far: u32) -> bool {
        match self.max_retries {
            Some(max) => retries_so_far < max,
            None => true,
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the multiplier is not a finite value above 1, or the
    /// delays are zero or inverted.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier <= 1.0 {
            return Err(GatewayError::Config(format!(
                "backoff multiplier must be greater than 1, got {}",
                self.backoff_multiplier
            )));
        }

        if self.initial_delay.is_zero() {
            return Err(GatewayError::Config(
                "initial reconnect delay must be greater than zero".to_string(),
            ));
        }

        if self.initial_delay > self.max_delay {
            return Err(GatewayError::Config(format!(
                "initial reconnect delay ({}ms) exceeds max delay ({}ms)",
                self.initial_delay.as_millis(),
                self.max_delay.as_millis()
            )));
        }

        Ok(())
    }
}
