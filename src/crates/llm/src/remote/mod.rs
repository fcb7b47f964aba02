//! Remote LLM provider implementations.
//!
//! # Providers
//!
//! - **OpenAI** - OpenAI models (GPT-4.1, o3, o4-mini)
//! - **Gemini** - Google's Gemini models
//! - **Claude** - Anthropic's Claude models
//! - **OpenRouter** - Unified API for multiple providers

pub mod claude;
pub mod gemini;
pub mod openai;
pub mod openrouter;

pub use claude::ClaudeClient;
pub use gemini::GeminiClient;
pub use openai::OpenAiClient;
pub use openrouter::OpenRouterClient;

use crate::config::RemoteLlmConfig;
use crate::error::{ProviderError, ProviderResult};
use reqwest::{Client, Response};

/// Build the HTTP client used by every remote provider.
pub(crate) fn build_http_client(config: &RemoteLlmConfig) -> ProviderResult<Client> {
    Client::builder()
        .timeout(config.timeout)
        .build()
        .map_err(|e| ProviderError::Config(format!("failed to create HTTP client: {}", e)))
}

/// Turn a non-success response into [`ProviderError::Status`].
pub(crate) async fn check_status(response: Response) -> ProviderResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        status: status.as_u16(),
        body,
    })
}
