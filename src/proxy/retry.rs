//! Retry budget and backoff schedule.

use serde::Deserialize;
use std::time::Duration;

/// Shape of the delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// `unit × n` after the n-th failed attempt: 1s, 2s, 3s...
    #[default]
    Linear,
    /// `unit × 2^(n-1)`: 1s, 2s, 4s...
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Deadline for a single attempt, body download included.
    pub attempt_timeout: Duration,
    pub backoff_unit: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_millis(30_000),
            backoff_unit: Duration::from_millis(1_000),
            backoff: Backoff::Linear,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after `attempt` (1-based) failed, before the next one.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Linear => self.backoff_unit.saturating_mul(attempt),
            Backoff::Exponential => {
                let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
                self.backoff_unit.saturating_mul(factor)
            }
        }
    }

    /// Upper bound on the time one forward can take.
    pub fn worst_case(&self) -> Duration {
        let waits: Duration = (1..self.max_attempts).map(|n| self.delay_after(n)).sum();
        self.attempt_timeout.saturating_mul(self.max_attempts) + waits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_schedule_matches_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.worst_case(), Duration::from_secs(93));
    }

    #[test]
    fn exponential_schedule_doubles() {
        let policy = RetryPolicy {
            backoff: Backoff::Exponential,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
    }
}
