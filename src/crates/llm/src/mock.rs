//! Scripted provider client for tests.
//!
//! `MockClient` never touches the network. Each instance answers with fixed
//! content after an optional delay, or fails with a scripted
//! [`ProviderError`]. A shared [`MockStats`] records calls, prompts and the
//! number of concurrently running generations so tests can assert on
//! concurrency bounds and dispatch order.

use crate::client::{estimate_tokens, Generation, ProviderClient, TokenUsage};
use crate::error::{ProviderError, ProviderResult};
use crate::params::Parameters;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

type ErrorFn = Arc<dyn Fn() -> ProviderError + Send + Sync>;

/// Observations shared by every clone of a [`MockClient`].
#[derive(Debug, Default)]
pub struct MockStats {
    calls: AtomicUsize,
    count_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    params: Mutex<Vec<Parameters>>,
    started_at: Mutex<Vec<Instant>>,
}

impl MockStats {
    /// Number of `generate_content` calls started.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of `count_tokens` calls.
    pub fn count_calls(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }

    /// Generations currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of generations observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Prompts received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    /// Parameters received, in call order.
    pub fn params(&self) -> Vec<Parameters> {
        self.params.lock().clone()
    }

    /// Start instants of every generation, in call order.
    pub fn started_at(&self) -> Vec<Instant> {
        self.started_at.lock().clone()
    }
}

/// Decrements the in-flight gauge even when the future is dropped.
struct InFlightGuard<'a>(&'a MockStats);

impl<'a> InFlightGuard<'a> {
    fn enter(stats: &'a MockStats) -> Self {
        let now = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        stats.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(stats)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Scripted [`ProviderClient`].
#[derive(Clone)]
pub struct MockClient {
    provider: String,
    model: String,
    content: String,
    delay: Duration,
    error: Option<ErrorFn>,
    count_error: Option<ErrorFn>,
    token_count: Option<u32>,
    stats: Arc<MockStats>,
}

impl MockClient {
    /// Client that answers `"{model} response"` immediately.
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            provider: provider.into(),
            content: format!("{} response", model),
            model,
            delay: Duration::ZERO,
            error: None,
            count_error: None,
            token_count: None,
            stats: Arc::new(MockStats::default()),
        }
    }

    /// Answer with this content.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Sleep this long inside every generation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail every generation (after the delay) with the produced error.
    pub fn with_error<F>(mut self, error: F) -> Self
    where
        F: Fn() -> ProviderError + Send + Sync + 'static,
    {
        self.error = Some(Arc::new(error));
        self
    }

    /// Fail every generation with an HTTP status and body.
    pub fn with_status_error(self, status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        self.with_error(move || ProviderError::Status {
            status,
            body: body.clone(),
        })
    }

    /// Fail every `count_tokens` call with the produced error.
    pub fn with_count_error<F>(mut self, error: F) -> Self
    where
        F: Fn() -> ProviderError + Send + Sync + 'static,
    {
        self.count_error = Some(Arc::new(error));
        self
    }

    /// Report this many prompt tokens from `count_tokens`.
    pub fn with_token_count(mut self, tokens: u32) -> Self {
        self.token_count = Some(tokens);
        self
    }

    /// Share observations with other clients.
    pub fn with_stats(mut self, stats: Arc<MockStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Observations for this client (and any client sharing them).
    pub fn stats(&self) -> Arc<MockStats> {
        Arc::clone(&self.stats)
    }
}

impl fmt::Debug for MockClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockClient")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("delay", &self.delay)
            .field("fails", &self.error.is_some())
            .finish()
    }
}

#[async_trait]
impl ProviderClient for MockClient {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate_content(
        &self,
        prompt: &str,
        params: &Parameters,
    ) -> ProviderResult<Generation> {
        self.stats.calls.fetch_add(1, Ordering::SeqCst);
        self.stats.prompts.lock().push(prompt.to_string());
        self.stats.params.lock().push(params.clone());
        self.stats.started_at.lock().push(Instant::now());

        let _guard = InFlightGuard::enter(&self.stats);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some(error) = &self.error {
            return Err(error());
        }

        let usage = TokenUsage::new(estimate_tokens(prompt), estimate_tokens(&self.content));
        Ok(Generation::new(self.content.clone())
            .with_usage(usage)
            .with_finish_reason("stop"))
    }

    async fn count_tokens(&self, prompt: &str) -> ProviderResult<u32> {
        self.stats.count_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.count_error {
            return Err(error());
        }
        Ok(self.token_count.unwrap_or_else(|| estimate_tokens(prompt)))
    }
}
