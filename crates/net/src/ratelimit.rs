//! Per-connection inbound rate limiting

use tokio::time::Instant;

/// Sustained commands per second
pub const COMMANDS_PER_SEC: f64 = 5.0;

/// Commands accepted in a burst
pub const BURST: f64 = 10.0;

/// Token bucket owned by one connection's read loop
#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(refill_per_sec: f64, capacity: f64) -> Self {
        Self {
            capacity,
            refill_per_sec,
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    /// Take one token if available
    pub fn allow(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(COMMANDS_PER_SEC, BURST)
    }
}
