//! Token bucket.
//!
//! Tokens refill continuously at `requests_per_second` up to `burst`. The
//! state lock is a plain `parking_lot` mutex held only for the arithmetic;
//! waiting happens outside it, raced against the cancellation token.

use crate::models::RateLimitConfig;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Returned when a wait is abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitCancelled;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Time-based token bucket. Consumed tokens are never returned.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_second: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(config: RateLimitConfig) -> Self {
        let capacity = f64::from(config.burst.max(1));
        Self {
            capacity,
            refill_per_second: config.requests_per_second.max(0.0),
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Whether the bucket never makes callers wait.
    pub fn is_unlimited(&self) -> bool {
        self.refill_per_second == 0.0
    }

    /// Take a token now, or report how long until one is available.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        if self.is_unlimited() {
            return Ok(());
        }
        let mut state = self.state.lock();
        self.refill(&mut state);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - state.tokens;
            // Tiny rates would overflow `Duration`; wait "forever" instead.
            Err(Duration::try_from_secs_f64(missing / self.refill_per_second)
                .unwrap_or(Duration::MAX))
        }
    }

    /// Wait until a token is available or `cancel` fires.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), WaitCancelled> {
        loop {
            if cancel.is_cancelled() {
                return Err(WaitCancelled);
            }
            match self.try_acquire() {
                Ok(()) => return Ok(()),
                Err(wait) => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(WaitCancelled),
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
            }
        }
    }

    /// Tokens available right now (fractional).
    pub fn available(&self) -> f64 {
        if self.is_unlimited() {
            return f64::INFINITY;
        }
        let mut state = self.state.lock();
        self.refill(&mut state);
        state.tokens
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill);
        state.tokens = (state.tokens + elapsed.as_secs_f64() * self.refill_per_second)
            .min(self.capacity);
        state.last_refill = now;
    }
}
