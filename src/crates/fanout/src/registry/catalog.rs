//! Built-in providers, models and detection rules.

use super::DetectionRule;
use crate::models::{ModelDefinition, ProviderDefinition, RateLimitConfig};
use llm::remote::{claude, gemini, openai, openrouter};
use serde_json::json;

pub(crate) fn providers() -> Vec<ProviderDefinition> {
    vec![
        ProviderDefinition::new("openai", "OPENAI_API_KEY")
            .with_base_url(openai::DEFAULT_BASE_URL)
            .with_rate_limit(RateLimitConfig::per_minute(500, 10)),
        ProviderDefinition::new("gemini", "GEMINI_API_KEY")
            .with_base_url(gemini::DEFAULT_BASE_URL)
            .with_rate_limit(RateLimitConfig::per_minute(150, 5)),
        ProviderDefinition::new("anthropic", "ANTHROPIC_API_KEY")
            .with_base_url(claude::DEFAULT_BASE_URL)
            .with_rate_limit(RateLimitConfig::per_minute(50, 5)),
        ProviderDefinition::new("openrouter", "OPENROUTER_API_KEY")
            .with_base_url(openrouter::DEFAULT_BASE_URL)
            .with_rate_limit(RateLimitConfig::per_minute(20, 5)),
    ]
}

pub(crate) fn models() -> Vec<ModelDefinition> {
    vec![
        // OpenAI
        ModelDefinition::new("gpt-4.1", "openai", "gpt-4.1", 1_047_576, 32_768)
            .with_parameter("temperature", json!(0.7)),
        ModelDefinition::new("o4-mini", "openai", "o4-mini", 200_000, 100_000)
            .with_parameter("reasoning_effort", json!("medium")),
        ModelDefinition::new("o3", "openai", "o3", 200_000, 100_000)
            .with_parameter("reasoning_effort", json!("medium")),
        // Gemini
        ModelDefinition::new("gemini-2.5-pro", "gemini", "gemini-2.5-pro", 1_048_576, 65_536),
        ModelDefinition::new("gemini-2.5-flash", "gemini", "gemini-2.5-flash", 1_048_576, 65_536),
        // Anthropic
        ModelDefinition::new(
            "claude-sonnet-4",
            "anthropic",
            "claude-sonnet-4-20250514",
            200_000,
            64_000,
        ),
        ModelDefinition::new(
            "claude-opus-4",
            "anthropic",
            "claude-opus-4-20250514",
            200_000,
            32_000,
        ),
        // OpenRouter
        ModelDefinition::new(
            "openrouter/deepseek/deepseek-chat-v3-0324",
            "openrouter",
            "deepseek/deepseek-chat-v3-0324",
            163_840,
            8_192,
        ),
        ModelDefinition::new(
            "openrouter/deepseek/deepseek-r1",
            "openrouter",
            "deepseek/deepseek-r1",
            163_840,
            8_192,
        ),
        ModelDefinition::new(
            "openrouter/x-ai/grok-3-beta",
            "openrouter",
            "x-ai/grok-3-beta",
            131_072,
            8_192,
        ),
        ModelDefinition::new(
            "openrouter/meta-llama/llama-4-maverick",
            "openrouter",
            "meta-llama/llama-4-maverick",
            1_048_576,
            8_192,
        ),
    ]
}

/// Ordered; the first match wins.
pub(crate) fn detection_rules() -> Vec<DetectionRule> {
    [
        (r"^gpt-", "openai"),
        (r"^o[1-9]", "openai"),
        (r"^gemini-", "gemini"),
        (r"^claude-", "anthropic"),
        (r"^openrouter/([^/\s]+/[^/\s]+)$", "openrouter"),
        (r"^([^/\s]+/[^/\s]+)$", "openrouter"),
    ]
    .into_iter()
    .filter_map(|(pattern, provider)| DetectionRule::new(pattern, provider).ok())
    .collect()
}
