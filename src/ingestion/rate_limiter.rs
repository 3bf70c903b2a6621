//! Sliding-window rate limiter for JSON-RPC calls
//!
//! Keeps outbound traffic under the provider's requests-per-second quota.
//! Callers over the limit wait until the oldest request leaves the window.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{sleep, Instant};

pub struct RateLimiter {
    /// Maximum requests per window (0 = unlimited)
    max_requests: u32,
    window: Duration,
    requests: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a new rate limiter
    ///
    /// # Arguments
    /// * `max_requests` - Maximum requests per window, 0 disables limiting
    /// * `window_secs` - Window size in seconds (typically 1)
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(window_secs.max(1)),
            requests: Mutex::new(VecDeque::new()),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0, 1)
    }

    /// Wait until a request slot is available, then take it
    pub async fn acquire(&self) {
        loop {
            let wait = match self.try_take(Instant::now()) {
                None => return,
                Some(wait) => wait,
            };
            sleep(wait.max(Duration::from_millis(1))).await;
        }
    }

    /// `None` when the slot was taken, otherwise how long to wait
    fn try_take(&self, now: Instant) -> Option<Duration> {
        if self.max_requests == 0 {
            return None;
        }

        let mut requests = self.requests.lock();
        prune(&mut requests, now, self.window);

        if requests.len() < self.max_requests as usize {
            requests.push_back(now);
            return None;
        }

        let oldest = requests.front().copied().unwrap_or(now);
        Some((oldest + self.window).saturating_duration_since(now))
    }
}

fn prune(requests: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = requests.front() {
        if now.duration_since(oldest) >= window {
            requests.pop_front();
        } else {
            break;
        }
    }
}
