//! Reconnect delay policy for the subscription transport

use std::time::Duration;

/// Reconnect backoff.
///
/// Exponential mode doubles the delay after every failure up to `max`;
/// constant mode always waits `base`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    exponential: bool,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, exponential: bool) -> Self {
        let max = max.max(base);
        Self {
            base,
            max,
            exponential,
            current: base,
        }
    }

    pub fn constant(delay: Duration) -> Self {
        Self::new(delay, delay, false)
    }

    /// Delay to wait before the next attempt, advancing the sequence
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        if self.exponential {
            self.current = next_backoff(self.current, self.max);
        }
        delay
    }

    /// Back to the base delay after a healthy session
    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    let next_ms = current.as_millis().saturating_mul(2).max(1) as u64;
    let max_ms = max.as_millis() as u64;
    Duration::from_millis(next_ms.min(max_ms))
}
