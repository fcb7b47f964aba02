//! OpenAI client implementation.
//!
//! Provides integration with OpenAI's chat completions API, supporting:
//! - GPT-4.1 family
//! - o-series reasoning models (o3, o4-mini)
//!
//! Reasoning models reject `temperature`/`top_p` and take
//! `max_completion_tokens` plus `reasoning_effort` instead of `max_tokens`;
//! the request builder handles that split.
//!
//! # Example
//!
//! ```rust,ignore
//! use llm::remote::OpenAiClient;
//! use llm::{ProviderClient, RemoteLlmConfig, Parameters};
//!
//! let config = RemoteLlmConfig::new(api_key, "https://api.openai.com/v1", "gpt-4.1");
//! let client = OpenAiClient::new(config)?;
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
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI API client.
#[derive(Clone, Debug)]
pub struct OpenAiClient {
    config: RemoteLlmConfig,
    client: Client,
}

impl OpenAiClient {
    /// Create a new OpenAI client with the given configuration.
    pub fn new(config: RemoteLlmConfig) -> ProviderResult<Self> {
        let client = build_http_client(&config)?;
        Ok(Self { config, client })
    }

    /// o-series models use the reasoning parameter shape.
    fn is_reasoning_model(&self) -> bool {
        let mut chars = self.config.model.chars();
        chars.next() == Some('o') && chars.next().is_some_and(|c| c.is_ascii_digit())
    }

    fn build_request(&self, prompt: &str, params: &Parameters) -> OpenAiRequest {
        let reasoning = self.is_reasoning_model();
        let max_tokens = params::get_usize(params, params::MAX_TOKENS);

        OpenAiRequest {
            model: self.config.model.clone(),
            messages: vec![OpenAiMessage {
                role: "user".to_string(),
                content: Some(prompt.to_string()),
            }],
            temperature: if reasoning {
                None
            } else {
                params::get_f32(params, params::TEMPERATURE)
            },
            top_p: if reasoning {
                None
            } else {
                params::get_f32(params, params::TOP_P)
            },
            max_tokens: if reasoning { None } else { max_tokens },
            max_completion_tokens: if reasoning { max_tokens } else { None },
            reasoning_effort: if reasoning {
                params::get_str(params, params::REASONING_EFFORT).map(str::to_string)
            } else {
                None
            },
            frequency_penalty: params::get_f32(params, params::FREQUENCY_PENALTY),
            presence_penalty: params::get_f32(params, params::PRESENCE_PENALTY),
            stop: params::get_stop(params),
            stream: false,
        }
    }

    /// Convert OpenAI response to a [`Generation`].
    fn convert_response(&self, openai_resp: OpenAiResponse) -> ProviderResult<Generation> {
        let choice = openai_resp
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
        if let Some(usage) = openai_resp.usage {
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
impl ProviderClient for OpenAiClient {
    fn provider(&self) -> &str {
        "openai"
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

        if let Some(org) = &self.config.organization {
            req = req.header("OpenAI-Organization", org);
        }

        debug!(model = %self.config.model, "Sending OpenAI chat completion request");
        let response = check_status(req.send().await?).await?;

        let openai_resp: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        self.convert_response(openai_resp)
    }

    async fn count_tokens(&self, prompt: &str) -> ProviderResult<u32> {
        Ok(estimate_tokens(prompt))
    }
}

// OpenAI API types
#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
