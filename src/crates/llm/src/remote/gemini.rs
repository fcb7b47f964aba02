//! Google Gemini client implementation.
//!
//! Talks to the Gemini `generateContent` and `countTokens` endpoints. The API
//! key travels in the `x-goog-api-key` header rather than the query string so
//! it never appears in request URLs.
//!
//! Gemini reports safety blocks in-band: a prompt block comes back as
//! `promptFeedback.blockReason` with no candidates, a response block as a
//! candidate whose `finishReason` is `SAFETY` (or `RECITATION`, ...). Both
//! surface as [`ProviderError::ContentBlocked`].

use crate::client::{Generation, ProviderClient, TokenUsage};
use crate::config::RemoteLlmConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::params::{self, Parameters};
use crate::remote::{build_http_client, check_status};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Public endpoint used when no base URL is configured.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
];

/// Google Gemini API client.
#[derive(Clone, Debug)]
pub struct GeminiClient {
    config: RemoteLlmConfig,
    client: Client,
}

impl GeminiClient {
    /// Create a new Gemini client with the given configuration.
    pub fn new(config: RemoteLlmConfig) -> ProviderResult<Self> {
        let client = build_http_client(&config)?;
        Ok(Self { config, client })
    }

    fn contents(prompt: &str) -> Vec<GeminiContent> {
        vec![GeminiContent {
            role: Some("user".to_string()),
            parts: vec![GeminiPart {
                text: Some(prompt.to_string()),
            }],
        }]
    }

    fn build_request(&self, prompt: &str, params: &Parameters) -> GeminiRequest {
        GeminiRequest {
            contents: Self::contents(prompt),
            generation_config: Some(GeminiGenerationConfig {
                temperature: params::get_f32(params, params::TEMPERATURE),
                top_p: params::get_f32(params, params::TOP_P),
                top_k: params::get_usize(params, params::TOP_K),
                max_output_tokens: params::get_usize(params, params::MAX_TOKENS),
                stop_sequences: params::get_stop(params),
            }),
        }
    }

    /// Convert Gemini response to a [`Generation`].
    fn convert_response(&self, gemini_resp: GeminiResponse) -> ProviderResult<Generation> {
        let Some(candidate) = gemini_resp.candidates.into_iter().next() else {
            if let Some(reason) = gemini_resp
                .prompt_feedback
                .and_then(|feedback| feedback.block_reason)
            {
                return Err(ProviderError::ContentBlocked(format!(
                    "prompt blocked, blockReason: {}",
                    reason
                )));
            }
            return Err(ProviderError::InvalidResponse(
                "response has no candidates".to_string(),
            ));
        };

        let content_text = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if let Some(reason) = candidate.finish_reason.as_deref() {
            if content_text.is_empty() && BLOCKING_FINISH_REASONS.contains(&reason) {
                return Err(ProviderError::ContentBlocked(format!(
                    "finishReason: {}",
                    reason
                )));
            }
        }

        let mut generation = Generation::new(content_text);
        if let Some(usage) = gemini_resp.usage_metadata {
            generation = generation.with_usage(TokenUsage::new(
                usage.prompt_token_count,
                usage.candidates_token_count,
            ));
        }
        if let Some(reason) = candidate.finish_reason {
            generation = generation.with_finish_reason(reason);
        }
        Ok(generation)
    }
}

#[async_trait]
impl ProviderClient for GeminiClient {
    fn provider(&self) -> &str {
        "gemini"
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }

    async fn generate_content(
        &self,
        prompt: &str,
        params: &Parameters,
    ) -> ProviderResult<Generation> {
        // Gemini API URL format: base_url/models/{model}:generateContent
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url, self.config.model
        );
        let req_body = self.build_request(prompt, params);

        debug!(model = %self.config.model, "Sending Gemini generateContent request");
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&req_body)
            .send()
            .await?;
        let response = check_status(response).await?;

        let gemini_resp: GeminiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        self.convert_response(gemini_resp)
    }

    async fn count_tokens(&self, prompt: &str) -> ProviderResult<u32> {
        let url = format!(
            "{}/models/{}:countTokens",
            self.config.base_url, self.config.model
        );
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&CountTokensRequest {
                contents: Self::contents(prompt),
            })
            .send()
            .await?;
        let response = check_status(response).await?;

        let counted: CountTokensResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok(counted.total_tokens)
    }
}

// Gemini API types
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<GeminiPromptFeedback>,
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Serialize)]
struct CountTokensRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CountTokensResponse {
    total_tokens: u32,
}
