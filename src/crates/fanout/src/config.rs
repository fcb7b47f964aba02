//! Run configuration.
//!
//! A [`RunConfig`] describes one fan-out: which models, which instructions,
//! how much concurrency and throughput, whether to synthesize and how to
//! judge the run. It deserializes from TOML or YAML; loading the file is the
//! caller's business.
//!
//! # Example
//!
//! ```toml
//! models = ["gpt-4.1", "gemini-2.5-pro", "claude-sonnet-4"]
//! instructions = "Summarize the attached design."
//! max_concurrency = 3
//! synthesis_model = "gemini-2.5-pro"
//! timeout_secs = 300
//! failure_mode = "strict"
//!
//! [default_rate_limit]
//! requests_per_second = 0.5
//! burst = 2
//!
//! [parameters]
//! temperature = 0.2
//! ```

use crate::error::ConfigError;
use crate::models::RateLimitConfig;
use llm::Parameters;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// How per-model failures affect the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    /// The run fails only if no model succeeds.
    #[default]
    Tolerant,
    /// The run fails if any model fails.
    Strict,
}

impl fmt::Display for FailureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureMode::Tolerant => write!(f, "tolerant"),
            FailureMode::Strict => write!(f, "strict"),
        }
    }
}

/// Configuration for one run.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Models to dispatch to, in result order.
    pub models: Vec<String>,
    /// Prompt sent to every model.
    pub instructions: String,
    /// Maximum concurrent provider calls.
    pub max_concurrency: usize,
    /// Token bucket for models without a more specific limit.
    pub default_rate_limit: RateLimitConfig,
    /// Limits keyed by provider name.
    pub provider_rate_limits: HashMap<String, RateLimitConfig>,
    /// Limits keyed by model name. Win over provider limits.
    pub model_rate_limits: HashMap<String, RateLimitConfig>,
    /// Model that combines the outputs; `None` disables synthesis.
    pub synthesis_model: Option<String>,
    /// Overall deadline in seconds (fractions allowed).
    pub timeout_secs: Option<f64>,
    pub failure_mode: FailureMode,
    /// Parameter overrides applied on top of each model's defaults.
    pub parameters: Parameters,
    /// Count prompt tokens before generating and fail early on overflow.
    pub check_input_limits: bool,
    /// Run identifier; generated when absent.
    pub correlation_id: Option<String>,
    /// API keys keyed by provider name. Never serialized.
    #[serde(skip_serializing)]
    pub api_keys: HashMap<String, String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            instructions: String::new(),
            max_concurrency: 5,
            default_rate_limit: RateLimitConfig::default(),
            provider_rate_limits: HashMap::new(),
            model_rate_limits: HashMap::new(),
            synthesis_model: None,
            timeout_secs: None,
            failure_mode: FailureMode::Tolerant,
            parameters: Parameters::new(),
            check_input_limits: false,
            correlation_id: None,
            api_keys: HashMap::new(),
        }
    }
}

impl RunConfig {
    /// Configuration for `models` and `instructions` with defaults elsewhere.
    pub fn new<I, S>(models: I, instructions: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            models: models.into_iter().map(Into::into).collect(),
            instructions: instructions.into(),
            ..Self::default()
        }
    }

    /// Parse from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_default_rate_limit(mut self, limit: RateLimitConfig) -> Self {
        self.default_rate_limit = limit;
        self
    }

    pub fn with_provider_rate_limit(
        mut self,
        provider: impl Into<String>,
        limit: RateLimitConfig,
    ) -> Self {
        self.provider_rate_limits.insert(provider.into(), limit);
        self
    }

    pub fn with_model_rate_limit(mut self, model: impl Into<String>, limit: RateLimitConfig) -> Self {
        self.model_rate_limits.insert(model.into(), limit);
        self
    }

    pub fn with_synthesis_model(mut self, model: impl Into<String>) -> Self {
        self.synthesis_model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs_f64());
        self
    }

    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_input_limit_check(mut self, enabled: bool) -> Self {
        self.check_input_limits = enabled;
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_api_key(mut self, provider: impl Into<String>, key: impl Into<String>) -> Self {
        self.api_keys.insert(provider.into(), key.into());
        self
    }

    /// Overall deadline, if any.
    ///
    /// `None` also for values [`validate`](Self::validate) rejects.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .filter(|timeout| !timeout.is_zero())
    }

    /// Explicit API key for a provider.
    pub fn api_key(&self, provider: &str) -> Option<&str> {
        self.api_keys.get(provider).map(String::as_str)
    }

    /// Check values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if let Some(secs) = self.timeout_secs {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "timeout_secs must be a positive number, got {}",
                    secs
                )));
            }
            if Duration::try_from_secs_f64(secs).is_err() {
                return Err(ConfigError::Invalid(format!(
                    "timeout_secs is too large, got {}",
                    secs
                )));
            }
        }
        validate_limit("default_rate_limit", &self.default_rate_limit)?;
        for (provider, limit) in &self.provider_rate_limits {
            validate_limit(&format!("provider_rate_limits.{}", provider), limit)?;
        }
        for (model, limit) in &self.model_rate_limits {
            validate_limit(&format!("model_rate_limits.{}", model), limit)?;
        }
        if self
            .synthesis_model
            .as_deref()
            .is_some_and(|m| m.trim().is_empty())
        {
            return Err(ConfigError::Invalid(
                "synthesis_model must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Slowest accepted refill rate: one request a day.
pub const MIN_REQUESTS_PER_SECOND: f64 = 1.0 / 86_400.0;

fn validate_limit(field: &str, limit: &RateLimitConfig) -> Result<(), ConfigError> {
    let rps = limit.requests_per_second;
    if !rps.is_finite() || rps < 0.0 {
        return Err(ConfigError::Invalid(format!(
            "{}: requests_per_second must be a non-negative number, got {}",
            field, rps
        )));
    }
    if rps > 0.0 && rps < MIN_REQUESTS_PER_SECOND {
        return Err(ConfigError::Invalid(format!(
            "{}: requests_per_second must be 0 (unlimited) or at least {}, got {}",
            field, MIN_REQUESTS_PER_SECOND, rps
        )));
    }
    if rps > 0.0 && limit.burst == 0 {
        return Err(ConfigError::Invalid(format!(
            "{}: burst must be at least 1 when requests_per_second is positive",
            field
        )));
    }
    Ok(())
}

// Hand-written so API keys never show up in logs.
impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut providers_with_keys: Vec<&String> = self.api_keys.keys().collect();
        providers_with_keys.sort();
        f.debug_struct("RunConfig")
            .field("models", &self.models)
            .field("instructions_len", &self.instructions.len())
            .field("max_concurrency", &self.max_concurrency)
            .field("default_rate_limit", &self.default_rate_limit)
            .field("provider_rate_limits", &self.provider_rate_limits)
            .field("model_rate_limits", &self.model_rate_limits)
            .field("synthesis_model", &self.synthesis_model)
            .field("timeout_secs", &self.timeout_secs)
            .field("failure_mode", &self.failure_mode)
            .field("parameters", &self.parameters)
            .field("check_input_limits", &self.check_input_limits)
            .field("correlation_id", &self.correlation_id)
            .field("api_keys", &providers_with_keys)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.max_concurrency, 5);
        assert_eq!(config.default_rate_limit, RateLimitConfig::new(1.0, 5));
        assert_eq!(config.failure_mode, FailureMode::Tolerant);
        assert!(config.timeout().is_none());
        assert!(config.synthesis_model.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let config = RunConfig::from_toml_str(
            r#"
            models = ["gpt-4.1", "gemini-2.5-pro"]
            instructions = "Say hi"
            max_concurrency = 2
            synthesis_model = "gemini-2.5-pro"
            timeout_secs = 30
            failure_mode = "strict"

            [default_rate_limit]
            requests_per_second = 0.5
            burst = 2

            [model_rate_limits."gpt-4.1"]
            requests_per_second = 0.0
            burst = 0

            [parameters]
            temperature = 0.2
            "#,
        )
        .unwrap();

        assert_eq!(config.models, vec!["gpt-4.1", "gemini-2.5-pro"]);
        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.failure_mode, FailureMode::Strict);
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
        assert!(config.model_rate_limits["gpt-4.1"].is_unlimited());
        assert_eq!(config.parameters["temperature"], 0.2);
    }

    #[test]
    fn test_from_yaml() {
        let config = RunConfig::from_yaml_str(
            r#"
models:
  - claude-sonnet-4
  - o3
instructions: Explain
provider_rate_limits:
  anthropic:
    requests_per_second: 0.8
    burst: 3
check_input_limits: true
"#,
        )
        .unwrap();

        assert_eq!(config.models.len(), 2);
        assert_eq!(config.provider_rate_limits["anthropic"].burst, 3);
        assert!(config.check_input_limits);
        assert_eq!(config.max_concurrency, 5);
    }

    #[test]
    fn test_validation_failures() {
        let zero = RunConfig::default().with_max_concurrency(0);
        assert!(matches!(zero.validate(), Err(ConfigError::Invalid(_))));

        let negative = RunConfig::default().with_default_rate_limit(RateLimitConfig::new(-1.0, 1));
        assert!(negative.validate().is_err());

        let bad_timeout = RunConfig {
            timeout_secs: Some(0.0),
            ..RunConfig::default()
        };
        assert!(bad_timeout.validate().is_err());

        let nan = RunConfig::default().with_model_rate_limit("m", RateLimitConfig::new(f64::NAN, 1));
        assert!(nan.validate().is_err());

        let no_burst = RunConfig::default().with_provider_rate_limit("p", RateLimitConfig::new(2.0, 0));
        assert!(no_burst.validate().is_err());

        let unlimited = RunConfig::default().with_default_rate_limit(RateLimitConfig::unlimited());
        assert!(unlimited.validate().is_ok());
    }

    #[test]
    fn test_unrepresentable_timeout_rejected() {
        let huge = RunConfig {
            timeout_secs: Some(1e20),
            ..RunConfig::default()
        };
        assert!(matches!(huge.validate(), Err(ConfigError::Invalid(_))));
        assert!(huge.timeout().is_none());

        let long = RunConfig::default().with_timeout(Duration::from_secs(86_400 * 365));
        assert!(long.validate().is_ok());
        assert_eq!(long.timeout(), Some(Duration::from_secs(86_400 * 365)));
    }

    #[test]
    fn test_tiny_rate_rejected() {
        let tiny = RunConfig::default().with_model_rate_limit("gpt-4.1", RateLimitConfig::new(1e-30, 1));
        assert!(matches!(tiny.validate(), Err(ConfigError::Invalid(_))));

        let daily = RunConfig::default()
            .with_model_rate_limit("gpt-4.1", RateLimitConfig::new(MIN_REQUESTS_PER_SECOND, 1));
        assert!(daily.validate().is_ok());
    }

    #[test]
    fn test_api_keys_not_serialized_or_debugged() {
        let config = RunConfig::new(["gpt-4.1"], "hi").with_api_key("openai", "sk-secret-value");
        assert_eq!(config.api_key("openai"), Some("sk-secret-value"));

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret-value"));
        assert!(!format!("{:?}", config).contains("sk-secret-value"));
    }
}
