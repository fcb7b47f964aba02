//! Model and provider metadata, plus the per-model and per-run result types.

use llm::{ErrorCategory, LlmError, Parameters, TokenUsage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Token bucket settings.
///
/// `requests_per_second == 0.0` disables throughput limiting for the key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Sustained refill rate.
    pub requests_per_second: f64,
    /// Bucket capacity.
    pub burst: u32,
}

impl RateLimitConfig {
    /// Create a rate limit.
    pub fn new(requests_per_second: f64, burst: u32) -> Self {
        Self {
            requests_per_second,
            burst,
        }
    }

    /// Limit expressed per minute, as providers document them.
    pub fn per_minute(requests_per_minute: u32, burst: u32) -> Self {
        Self::new(f64::from(requests_per_minute) / 60.0, burst)
    }

    /// No throughput limit.
    pub fn unlimited() -> Self {
        Self::new(0.0, 0)
    }

    /// Whether this config disables throughput limiting.
    pub fn is_unlimited(&self) -> bool {
        self.requests_per_second == 0.0
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(1.0, 5)
    }
}

/// Static description of a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDefinition {
    /// Name callers use to request the model.
    pub name: String,
    /// Name of the provider that serves it.
    pub provider: String,
    /// Identifier sent on the wire.
    pub api_model_id: String,
    /// Maximum prompt plus output tokens.
    pub context_window: u32,
    /// Maximum output tokens.
    pub max_output_tokens: u32,
    /// Parameters applied unless the run overrides them.
    #[serde(default)]
    pub default_parameters: Parameters,
}

impl ModelDefinition {
    /// Create a model definition with empty default parameters.
    pub fn new(
        name: impl Into<String>,
        provider: impl Into<String>,
        api_model_id: impl Into<String>,
        context_window: u32,
        max_output_tokens: u32,
    ) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            api_model_id: api_model_id.into(),
            context_window,
            max_output_tokens,
            default_parameters: Parameters::new(),
        }
    }

    /// Set a default parameter.
    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.default_parameters.insert(key.into(), value);
        self
    }
}

/// Static description of a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderDefinition {
    /// Provider name (`openai`, `gemini`, ...).
    pub name: String,
    /// API base URL; `None` uses the public endpoint of a built-in provider.
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env_var: String,
    /// Rate limit applied to this provider's models unless overridden.
    pub default_rate_limit: Option<RateLimitConfig>,
}

impl ProviderDefinition {
    /// Create a provider definition.
    pub fn new(name: impl Into<String>, api_key_env_var: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: None,
            api_key_env_var: api_key_env_var.into(),
            default_rate_limit: None,
        }
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the default rate limit.
    pub fn with_rate_limit(mut self, limit: RateLimitConfig) -> Self {
        self.default_rate_limit = Some(limit);
        self
    }
}

/// Lifecycle of one model within a run.
///
/// `Queued -> RateLimited -> Processing -> {Completed | Failed | Cancelled}`.
/// Results only ever carry a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    /// Task spawned, nothing acquired yet.
    Queued,
    /// Waiting on the concurrency slot or the token bucket.
    RateLimited,
    /// Provider call in flight.
    Processing,
    /// Provider returned content.
    Completed,
    /// Provider or resolution failed.
    Failed,
    /// Cancellation reached the model first.
    Cancelled,
}

impl ModelStatus {
    /// Whether this is a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelStatus::Queued => write!(f, "Queued"),
            ModelStatus::RateLimited => write!(f, "RateLimited"),
            ModelStatus::Processing => write!(f, "Processing"),
            ModelStatus::Completed => write!(f, "Completed"),
            ModelStatus::Failed => write!(f, "Failed"),
            ModelStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Outcome of one model within a run.
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    /// Position of the model in the requested list.
    pub model_index: usize,
    /// Requested model name.
    pub model_name: String,
    /// Provider that served (or would have served) the model.
    pub provider: String,
    /// Terminal status.
    pub status: ModelStatus,
    /// Generated content when `status == Completed`.
    pub content: Option<String>,
    /// Token usage reported by the provider.
    pub token_usage: Option<TokenUsage>,
    /// Failure when `status` is `Failed` or `Cancelled`.
    pub err: Option<LlmError>,
    /// Wall time from dispatch to terminal state.
    pub duration: Duration,
}

impl ProcessingResult {
    /// Successful result.
    pub fn completed(
        model_index: usize,
        model_name: impl Into<String>,
        provider: impl Into<String>,
        content: String,
        token_usage: Option<TokenUsage>,
        duration: Duration,
    ) -> Self {
        Self {
            model_index,
            model_name: model_name.into(),
            provider: provider.into(),
            status: ModelStatus::Completed,
            content: Some(content),
            token_usage,
            err: None,
            duration,
        }
    }

    /// Failed or cancelled result; the status follows the error category.
    pub fn failed(
        model_index: usize,
        model_name: impl Into<String>,
        provider: impl Into<String>,
        err: LlmError,
        duration: Duration,
    ) -> Self {
        let status = if err.category == ErrorCategory::Cancelled {
            ModelStatus::Cancelled
        } else {
            ModelStatus::Failed
        };
        Self {
            model_index,
            model_name: model_name.into(),
            provider: provider.into(),
            status,
            content: None,
            token_usage: None,
            err: Some(err),
            duration,
        }
    }

    /// Whether the model produced content.
    pub fn is_success(&self) -> bool {
        self.status == ModelStatus::Completed
    }

    /// Error category, if the model did not complete.
    pub fn category(&self) -> Option<ErrorCategory> {
        self.err.as_ref().map(|e| e.category)
    }
}

/// Terminal outcome of a run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Identifier shared by every audit event of the run.
    pub correlation_id: String,
    /// One result per requested model, ordered by `model_index`.
    pub results: Vec<ProcessingResult>,
    /// Combined output, when synthesis ran and succeeded.
    pub synthesized: Option<String>,
    /// Synthesis failure; never fails the run.
    pub synthesis_error: Option<LlmError>,
    /// Run-level failure chosen by the failure policy.
    pub overall_err: Option<LlmError>,
}

impl RunOutcome {
    /// Results that produced content.
    pub fn successes(&self) -> impl Iterator<Item = &ProcessingResult> {
        self.results.iter().filter(|r| r.is_success())
    }

    /// Results that did not.
    pub fn failures(&self) -> impl Iterator<Item = &ProcessingResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    /// Number of successful models.
    pub fn success_count(&self) -> usize {
        self.successes().count()
    }

    /// Whether the run as a whole succeeded.
    pub fn is_success(&self) -> bool {
        self.overall_err.is_none()
    }

    /// Total tokens across every model that reported usage.
    pub fn total_tokens(&self) -> u64 {
        self.results
            .iter()
            .filter_map(|r| r.token_usage)
            .map(|u| u64::from(u.total_tokens))
            .sum()
    }
}
