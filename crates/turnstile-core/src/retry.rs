//! Retry policy: attempt budget + backoff schedule.

use std::time::Duration;

/// Retry policy for failed jobs.
///
/// The schedule is a fixed, non-decreasing list of delays rather than a
/// computed curve; predictable retry timing beats cleverness here.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total executions allowed, the first one included.
    pub max_attempts: u32,

    /// Delay before re-admitting a failed job. Entry `n` covers the retry
    /// after failure `n + 1`; past the end, the last entry repeats.
    pub backoff: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: vec![
                Duration::from_secs(10),
                Duration::from_secs(30),
                Duration::from_secs(60),
            ],
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Vec<Duration>) -> Self {
        debug_assert!(
            backoff.windows(2).all(|w| w[0] <= w[1]),
            "backoff schedule must be non-decreasing"
        );
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Delay before the next attempt, given how many attempts have already
    /// run (1-indexed, like `JobRecord::attempts` after a failure).
    pub fn delay_for(&self, attempts: u32) -> Duration {
        if self.backoff.is_empty() {
            return Duration::ZERO;
        }
        let index = (attempts.saturating_sub(1) as usize).min(self.backoff.len() - 1);
        self.backoff[index]
    }
}
