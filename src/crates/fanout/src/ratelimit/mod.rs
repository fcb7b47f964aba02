//! Composite rate limiter.
//!
//! Each model call takes a slot from a global semaphore and then a token
//! from that model's bucket. The slot is held for the duration of the call
//! through a [`RatePermit`]; bucket tokens are time based and never
//! returned.
//!
//! Lock order is fixed (semaphore, then bucket) and neither wait holds a
//! lock, so concurrent acquirers cannot deadlock. Every wait is raced
//! against the caller's cancellation token; a cancelled bucket wait drops
//! the semaphore slot before returning.

mod bucket;

pub use bucket::{TokenBucket, WaitCancelled};

use crate::models::RateLimitConfig;
use dashmap::DashMap;
use llm::{ErrorCategory, LlmError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

const COMPONENT: &str = "rate_limiter";

/// Held while a model call runs. Dropping it frees the concurrency slot.
#[derive(Debug)]
#[must_use = "dropping the permit releases the concurrency slot"]
pub struct RatePermit {
    model: String,
    _permit: OwnedSemaphorePermit,
}

impl RatePermit {
    /// Model the permit was acquired for.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Release the concurrency slot now.
    pub fn release(self) {
        trace!(model = %self.model, "Releasing rate permit");
    }
}

/// Counters since the limiter was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimiterStats {
    /// Permits handed out.
    pub total_acquired: u64,
    /// Acquisitions abandoned because of cancellation.
    pub total_cancelled: u64,
    /// Time callers spent waiting in `acquire`.
    pub total_wait: Duration,
}

/// Global concurrency cap plus per-model token buckets.
#[derive(Debug)]
pub struct RateLimiter {
    semaphore: Arc<Semaphore>,
    max_concurrency: usize,
    default_limit: RateLimitConfig,
    model_limits: DashMap<String, RateLimitConfig>,
    buckets: DashMap<String, Arc<TokenBucket>>,
    acquired: AtomicU64,
    cancelled: AtomicU64,
    wait_micros: AtomicU64,
}

impl RateLimiter {
    /// Limiter allowing `max_concurrency` calls at once (at least one),
    /// applying `default_limit` to models without their own limit.
    pub fn new(max_concurrency: usize, default_limit: RateLimitConfig) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            default_limit,
            model_limits: DashMap::new(),
            buckets: DashMap::new(),
            acquired: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            wait_micros: AtomicU64::new(0),
        }
    }

    /// Set the token bucket for one model. Replaces any existing bucket.
    pub fn set_model_limit(&self, model: impl Into<String>, limit: RateLimitConfig) {
        let model = model.into();
        debug!(
            model = %model,
            rps = limit.requests_per_second,
            burst = limit.burst,
            "Setting model rate limit"
        );
        self.buckets.remove(&model);
        self.model_limits.insert(model, limit);
    }

    /// Limit that applies to `model`.
    pub fn limit_for(&self, model: &str) -> RateLimitConfig {
        self.model_limits
            .get(model)
            .map(|entry| *entry.value())
            .unwrap_or(self.default_limit)
    }

    /// Configured concurrency cap.
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Slots currently held.
    pub fn in_flight(&self) -> usize {
        self.max_concurrency - self.semaphore.available_permits()
    }

    /// Slots currently free.
    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Counters since creation.
    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            total_acquired: self.acquired.load(Ordering::Relaxed),
            total_cancelled: self.cancelled.load(Ordering::Relaxed),
            total_wait: Duration::from_micros(self.wait_micros.load(Ordering::Relaxed)),
        }
    }

    /// Wait for a concurrency slot and a token for `model`.
    ///
    /// Returns a `Cancelled` error as soon as `cancel` fires; no slot is
    /// held in that case.
    pub async fn acquire(
        &self,
        cancel: &CancellationToken,
        model: &str,
    ) -> Result<RatePermit, LlmError> {
        let start = Instant::now();
        if cancel.is_cancelled() {
            return Err(self.cancelled(model, "cancelled before acquiring rate limit"));
        }

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(self.cancelled(model, "cancelled while waiting for a concurrency slot"));
            }
            permit = Arc::clone(&self.semaphore).acquire_owned() => permit.map_err(|_| {
                LlmError::new(COMPONENT, ErrorCategory::Cancelled, "rate limiter closed")
            })?,
        };

        let bucket = self.bucket(model);
        if bucket.acquire(cancel).await.is_err() {
            drop(permit);
            return Err(self.cancelled(model, "cancelled while waiting for a rate limit token"));
        }

        let waited = start.elapsed();
        self.acquired.fetch_add(1, Ordering::Relaxed);
        self.wait_micros.fetch_add(
            u64::try_from(waited.as_micros()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
        trace!(model = %model, wait_ms = waited.as_millis() as u64, "Acquired rate permit");

        Ok(RatePermit {
            model: model.to_string(),
            _permit: permit,
        })
    }

    /// Bucket for `model`, created on first use. The map guard is released
    /// before returning so no shard lock is held across a wait.
    fn bucket(&self, model: &str) -> Arc<TokenBucket> {
        if let Some(bucket) = self.buckets.get(model) {
            return Arc::clone(bucket.value());
        }
        let limit = self.limit_for(model);
        let entry = self
            .buckets
            .entry(model.to_string())
            .or_insert_with(|| Arc::new(TokenBucket::new(limit)));
        Arc::clone(entry.value())
    }

    fn cancelled(&self, model: &str, message: &str) -> LlmError {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
        LlmError::cancelled(COMPONENT, format!("{}: {}", model, message))
    }
}
