//! Provider-agnostic client capability.
//!
//! Every provider (OpenAI, Gemini, Anthropic, OpenRouter, test doubles) is
//! reached through [`ProviderClient`]. Provider quirks such as request
//! shapes, auth headers and finish-reason handling stay behind this trait.

use crate::error::ProviderResult;
use crate::params::Parameters;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Token accounting reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt.
    pub input_tokens: u32,
    /// Tokens produced by the model.
    pub output_tokens: u32,
    /// Total tokens billed.
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Create usage from input and output counts.
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
        }
    }
}

/// Successful generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    /// Generated text.
    pub content: String,
    /// Token usage, when the provider reports it.
    pub usage: Option<TokenUsage>,
    /// Provider finish reason (`stop`, `length`, `STOP`, ...).
    pub finish_reason: Option<String>,
}

impl Generation {
    /// Create a generation with just content.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: None,
            finish_reason: None,
        }
    }

    /// Attach token usage.
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Attach the finish reason.
    pub fn with_finish_reason(mut self, reason: impl Into<String>) -> Self {
        self.finish_reason = Some(reason.into());
        self
    }
}

/// Capability every provider client implements.
///
/// Implementations hold configuration only; network traffic happens inside
/// `generate_content` / `count_tokens`. Callers cancel an in-flight call by
/// dropping its future.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Provider name (`openai`, `gemini`, `anthropic`, `openrouter`, ...).
    fn provider(&self) -> &str;

    /// Model identifier sent on the wire.
    fn model_id(&self) -> &str;

    /// Generate a completion for a single prompt.
    async fn generate_content(&self, prompt: &str, params: &Parameters)
        -> ProviderResult<Generation>;

    /// Count (or estimate) the tokens `prompt` occupies for this model.
    async fn count_tokens(&self, prompt: &str) -> ProviderResult<u32>;

    /// Release client resources.
    async fn close(&self) -> ProviderResult<()> {
        Ok(())
    }
}

/// Rough token estimate used by providers without a counting endpoint.
///
/// Four characters per token, rounded up.
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count() as u64;
    chars.div_ceil(4).min(u32::MAX as u64) as u32
}
