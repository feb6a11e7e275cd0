//! Per-worker token-bucket rate limiter.

use std::time::Duration;

use tokio::time::Instant;

/// Token bucket with capacity R and refill rate R tokens/second, owned by a
/// single worker. Tokens accumulate fractionally with elapsed wall time and
/// the bucket is clamped at capacity, so throughput over any window of
/// length T is bounded by R*T + R.
///
/// A rate of 0 disables limiting entirely.
#[derive(Debug)]
pub struct RateLimiter {
    rate: f64,
    capacity: f64,
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(rps: u32) -> Self {
        let rate = f64::from(rps);
        RateLimiter {
            rate,
            capacity: rate,
            tokens: rate,
            last_refill: Instant::now(),
        }
    }

    /// Take one token, sleeping until the bucket has refilled enough. With a
    /// zero rate this returns immediately.
    pub async fn acquire(&mut self) {
        if self.rate == 0.0 {
            return;
        }
        loop {
            self.refill();
            if self.tokens >= 1.0 {
                self.tokens -= 1.0;
                return;
            }
            // Sleep out the exact deficit instead of polling; clamp below so
            // a sub-millisecond remainder still yields to the scheduler.
            let wait = (1.0 - self.tokens) / self.rate;
            tokio::time::sleep(Duration::from_secs_f64(wait.max(0.001))).await;
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        // Saturating: a clock stepping backwards refills nothing.
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.rate).min(self.capacity);
        self.last_refill = now;
    }
}
