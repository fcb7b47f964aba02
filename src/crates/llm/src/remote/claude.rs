//! Anthropic Claude client implementation.
//!
//! Provides integration with Anthropic's Messages API:
//! - Claude Sonnet 4
//! - Claude Opus 4
//!
//! # Example
//!
//! ```rust,ignore
//! use llm::remote::ClaudeClient;
//! use llm::{ProviderClient, RemoteLlmConfig, Parameters};
//!
//! let config = RemoteLlmConfig::new(api_key, "https://api.anthropic.com", "claude-sonnet-4-20250514");
//! let client = ClaudeClient::new(config)?;
//! let generation = client.generate_content("Hello!", &Parameters::new()).await?;
//! ```

use crate::client::{Generation, ProviderClient, TokenUsage};
use crate::config::RemoteLlmConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::params::{self, Parameters};
use crate::remote::{build_http_client, check_status};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Public endpoint used when no base URL is configured.
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// The Messages API requires `max_tokens`.
const DEFAULT_MAX_TOKENS: usize = 4096;

/// Anthropic Claude API client.
#[derive(Clone, Debug)]
pub struct ClaudeClient {
    config: RemoteLlmConfig,
    client: Client,
}

impl ClaudeClient {
    /// Create a new Claude client with the given configuration.
    pub fn new(config: RemoteLlmConfig) -> ProviderResult<Self> {
        let client = build_http_client(&config)?;
        Ok(Self { config, client })
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(format!("{}{}", self.config.base_url, path))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
    }

    fn messages(prompt: &str) -> Vec<ClaudeMessage> {
        vec![ClaudeMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        }]
    }

    fn build_request(&self, prompt: &str, params: &Parameters) -> ClaudeRequest {
        ClaudeRequest {
            model: self.config.model.clone(),
            messages: Self::messages(prompt),
            max_tokens: params::get_usize(params, params::MAX_TOKENS).unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: params::get_f32(params, params::TEMPERATURE),
            top_p: params::get_f32(params, params::TOP_P),
            top_k: params::get_usize(params, params::TOP_K),
            stop_sequences: params::get_stop(params),
            stream: false,
        }
    }

    /// Convert Claude response to a [`Generation`].
    fn convert_response(&self, claude_resp: ClaudeResponse) -> ProviderResult<Generation> {
        let content_text = claude_resp
            .content
            .into_iter()
            .filter(|c| c.content_type == "text")
            .filter_map(|c| c.text)
            .collect::<Vec<_>>()
            .join("");

        if claude_resp.stop_reason.as_deref() == Some("refusal") {
            return Err(ProviderError::ContentBlocked(
                "stop_reason: refusal".to_string(),
            ));
        }

        let mut generation = Generation::new(content_text).with_usage(TokenUsage::new(
            claude_resp.usage.input_tokens,
            claude_resp.usage.output_tokens,
        ));
        if let Some(reason) = claude_resp.stop_reason {
            generation = generation.with_finish_reason(reason);
        }
        Ok(generation)
    }
}

#[async_trait]
impl ProviderClient for ClaudeClient {
    fn provider(&self) -> &str {
        "anthropic"
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }

    async fn generate_content(
        &self,
        prompt: &str,
        params: &Parameters,
    ) -> ProviderResult<Generation> {
        let req_body = self.build_request(prompt, params);

        debug!(model = %self.config.model, "Sending Claude messages request");
        let response = self.post("/v1/messages").json(&req_body).send().await?;
        let response = check_status(response).await?;

        let claude_resp: ClaudeResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        self.convert_response(claude_resp)
    }

    async fn count_tokens(&self, prompt: &str) -> ProviderResult<u32> {
        let response = self
            .post("/v1/messages/count_tokens")
            .json(&CountTokensRequest {
                model: self.config.model.clone(),
                messages: Self::messages(prompt),
            })
            .send()
            .await?;
        let response = check_status(response).await?;

        let counted: CountTokensResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok(counted.input_tokens)
    }
}

// Claude API types
#[derive(Debug, Serialize)]
struct ClaudeRequest {
    model: String,
    messages: Vec<ClaudeMessage>,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ClaudeMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    #[serde(default)]
    content: Vec<ClaudeContent>,
    stop_reason: Option<String>,
    usage: ClaudeUsage,
}

#[derive(Debug, Deserialize)]
struct ClaudeContent {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClaudeUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct CountTokensRequest {
    model: String,
    messages: Vec<ClaudeMessage>,
}

#[derive(Debug, Deserialize)]
struct CountTokensResponse {
    input_tokens: u32,
}
