//! Minimum-interval rate limiter for upstream API calls

use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Serializes callers so consecutive requests are at least `min_interval`
/// apart. The lock is held across the sleep, so concurrent callers queue.
pub struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        RateLimiter {
            last_request: Mutex::new(None),
            min_interval,
        }
    }

    /// Wait until the next request is allowed
    pub async fn wait(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enforces_minimum_interval() {
        let limiter = RateLimiter::new(Duration::from_millis(50));

        let start = Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        limiter.wait().await;
        let elapsed = start.elapsed();

        // Two gaps of at least 50ms each
        assert!(elapsed >= Duration::from_millis(100), "elapsed: {elapsed:?}");
    }

    #[tokio::test]
    async fn first_call_does_not_wait() {
        let limiter = RateLimiter::new(Duration::from_secs(10));
        let start = Instant::now();
        limiter.wait().await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
