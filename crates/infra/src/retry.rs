//! Backoff for infrastructure failures.
//!
//! Workers must outlive a flapping queue or result store. Each failed
//! operation is retried after a delay computed here; Redis clients open a
//! fresh connection per operation, so a retry is also a reconnect.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffStrategy {
    /// Same delay before every retry.
    Fixed,
    /// `initial_delay * 2^(attempt - 1)`, capped at `max_delay`.
    #[default]
    Exponential,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Failures tolerated for one operation before giving up.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
    /// Spread around the nominal delay as a fraction of it, in `0.0..=1.0`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
            jitter: 0.0,
        }
    }

    /// Delay before retry number `attempt` (1-based). Attempt 0 waits zero.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let nominal = match self.strategy {
            BackoffStrategy::Fixed => self.initial_delay,
            BackoffStrategy::Exponential => {
                let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                self.initial_delay
                    .checked_mul(factor)
                    .unwrap_or(self.max_delay)
            }
        }
        .min(self.max_delay);

        let jitter = self.jitter.clamp(0.0, 1.0);
        nominal.mul_f64(1.0 + jitter * spread(attempt))
    }

    /// Whether another try is allowed after `failures` failed ones.
    pub fn should_retry(&self, failures: u32) -> bool {
        failures < self.max_attempts
    }
}

/// Deterministic offset in `-1.0..=1.0`, different for neighbouring attempts.
fn spread(attempt: u32) -> f64 {
    (attempt.wrapping_mul(37) % 21) as f64 / 10.0 - 1.0
}
