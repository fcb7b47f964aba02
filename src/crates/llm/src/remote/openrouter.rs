//! OpenRouter client implementation.
//!
//! Provides integration with OpenRouter, a unified API that routes requests
//! to multiple LLM providers (DeepSeek, xAI, Meta, etc.).
//!
//! OpenRouter uses an OpenAI-compatible API format. Upstream failures can
//! arrive inside an HTTP 200 body as an `error` object; those are surfaced as
//! [`ProviderError::Status`] with the embedded code so they categorize the
//! same way as a real HTTP error.
//!
//! # Example
//!
//! ```rust,ignore
//! use llm::remote::OpenRouterClient;
//! use llm::{ProviderClient, RemoteLlmConfig, Parameters};
//!
//! let config = RemoteLlmConfig::new(api_key, "https://openrouter.ai/api/v1", "deepseek/deepseek-r1");
//! let client = OpenRouterClient::new(config)?.with_app_name("fanout");
//! let generation = client.generate_content("Hello!", &Parameters::new()).await?;
//! ```

use crate::client::{estimate_tokens, Generation, ProviderClient, TokenUsage};
use crate::config::RemoteLlmConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::params::{self, Parameters};
use crate::remote::{build_http_client, check_status};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Public endpoint used when no base URL is configured.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// OpenRouter API client.
#[derive(Clone, Debug)]
pub struct OpenRouterClient {
    config: RemoteLlmConfig,
    client: Client,
    app_name: Option<String>,
}

impl OpenRouterClient {
    /// Create a new OpenRouter client with the given configuration.
    pub fn new(config: RemoteLlmConfig) -> ProviderResult<Self> {
        let client = build_http_client(&config)?;
        Ok(Self {
            config,
            client,
            app_name: None,
        })
    }

    /// Set the application name for OpenRouter tracking.
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    fn build_request(&self, prompt: &str, params: &Parameters) -> OpenRouterRequest {
        OpenRouterRequest {
            model: self.config.model.clone(),
            messages: vec![OpenRouterMessage {
                role: "user".to_string(),
                content: Some(prompt.to_string()),
            }],
            temperature: params::get_f32(params, params::TEMPERATURE),
            max_tokens: params::get_usize(params, params::MAX_TOKENS),
            top_p: params::get_f32(params, params::TOP_P),
            top_k: params::get_usize(params, params::TOP_K),
            frequency_penalty: params::get_f32(params, params::FREQUENCY_PENALTY),
            presence_penalty: params::get_f32(params, params::PRESENCE_PENALTY),
            stop: params::get_stop(params),
            stream: false,
        }
    }

    /// Convert OpenRouter response to a [`Generation`].
    fn convert_response(&self, router_resp: OpenRouterResponse) -> ProviderResult<Generation> {
        if let Some(error) = router_resp.error {
            let status = error.code.unwrap_or(502);
            return Err(ProviderError::Status {
                status,
                body: serde_json::json!({ "error": { "message": error.message } }).to_string(),
            });
        }

        let choice = router_resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("response has no choices".to_string()))?;

        let content = choice.message.content.unwrap_or_default();
        if choice.finish_reason.as_deref() == Some("content_filter") && content.is_empty() {
            return Err(ProviderError::ContentBlocked(
                "finish_reason: content_filter".to_string(),
            ));
        }

        let mut generation = Generation::new(content);
        if let Some(usage) = router_resp.usage {
            generation = generation.with_usage(TokenUsage::new(
                usage.prompt_tokens,
                usage.completion_tokens,
            ));
        }
        if let Some(reason) = choice.finish_reason {
            generation = generation.with_finish_reason(reason);
        }
        Ok(generation)
    }
}

#[async_trait]
impl ProviderClient for OpenRouterClient {
    fn provider(&self) -> &str {
        "openrouter"
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }

    async fn generate_content(
        &self,
        prompt: &str,
        params: &Parameters,
    ) -> ProviderResult<Generation> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let req_body = self.build_request(prompt, params);

        let mut req = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&req_body);

        // Optional attribution headers
        if let Some(app_name) = &self.app_name {
            req = req
                .header("HTTP-Referer", app_name)
                .header("X-Title", app_name);
        }

        debug!(model = %self.config.model, "Sending OpenRouter chat completion request");
        let response = check_status(req.send().await?).await?;

        let router_resp: OpenRouterResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        self.convert_response(router_resp)
    }

    async fn count_tokens(&self, prompt: &str) -> ProviderResult<u32> {
        Ok(estimate_tokens(prompt))
    }
}

// OpenRouter API types (OpenAI-compatible)
#[derive(Debug, Serialize)]
struct OpenRouterRequest {
    model: String,
    messages: Vec<OpenRouterMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenRouterMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterResponse {
    #[serde(default)]
    choices: Vec<OpenRouterChoice>,
    usage: Option<OpenRouterUsage>,
    error: Option<OpenRouterError>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterChoice {
    message: OpenRouterMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenRouterError {
    code: Option<u16>,
    #[serde(default)]
    message: String,
}
