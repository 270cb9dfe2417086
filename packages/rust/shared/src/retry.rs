//! Bounded retry policy shared by the external-call sites.
//!
//! Call sites own their loops and status branching; this only answers
//! "how many attempts" and "how long to wait before the next one".

use std::time::Duration;

use crate::config::RetryConfig;

/// Default number of attempts for an external call.
pub const MAX_RETRIES: u32 = 3;

/// Default pause between attempts, in seconds.
pub const SLEEP_LENGTH_SECS: f64 = 15.0;

/// Wait strategy between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Delay {
    /// Retry immediately.
    None,
    /// Same pause before every retry.
    Fixed(Duration),
    /// `base * 2^n` before retry `n` (0-based).
    Exponential { base: Duration },
}

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Delay,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, pause: Duration) -> Self {
        Self {
            max_attempts,
            delay: Delay::Fixed(pause),
        }
    }

    pub fn exponential(max_attempts: u32, base: Duration) -> Self {
        Self {
            max_attempts,
            delay: Delay::Exponential { base },
        }
    }

    /// No waiting at all; used by tests and dry runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay: Delay::None,
        }
    }

    /// The pause to take after failed attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.delay {
            Delay::None => Duration::ZERO,
            Delay::Fixed(d) => d,
            Delay::Exponential { base } => base.saturating_mul(2u32.saturating_pow(attempt)),
        }
    }

    /// True when `attempt` (0-based) is the final one allowed.
    pub fn is_last(&self, attempt: u32) -> bool {
        attempt + 1 >= self.max_attempts
    }

    /// Sleep for the delay belonging to `attempt`, unless it was the last one.
    pub async fn pause(&self, attempt: u32) {
        if self.is_last(attempt) {
            return;
        }
        let wait = self.delay_for(attempt);
        if !wait.is_zero() {
            tracing::debug!(attempt, wait_ms = wait.as_millis() as u64, "backing off");
            tokio::time::sleep(wait).await;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(MAX_RETRIES, Duration::from_secs_f64(SLEEP_LENGTH_SECS))
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::fixed(
            config.max_retries.max(1),
            Duration::from_secs_f64(config.sleep_secs.max(0.0)),
        )
    }
}
