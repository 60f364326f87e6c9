use std::time::Duration;

/// Delay before the first retry after a failed broker read.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(2);

/// Upper bound on the retry delay.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Capped exponential backoff.
///
/// Each call to [`next_delay`](Backoff::next_delay) returns the current
/// delay and doubles it for the following call, never exceeding `max`.
/// [`reset`](Backoff::reset) returns to the initial delay after a success.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// A backoff that always waits `delay`.
    pub fn fixed(delay: Duration) -> Self {
        Self::new(delay, delay)
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_BACKOFF)
    }
}
