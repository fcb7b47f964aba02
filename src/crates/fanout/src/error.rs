//! Error types for the fan-out engine.
//!
//! Per-model failures travel as [`LlmError`] values inside results. The
//! enums here cover the seams around them: model resolution, audit sinks
//! and run configuration.

use llm::{ErrorCategory, LlmError};
use thiserror::Error;

/// Result type alias for fan-out operations.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors raised while resolving a model to a client.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// Model is neither registered nor matched by a detection rule.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// Provider referenced by a model is not registered.
    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    /// No explicit key and the provider's environment variable is unset.
    #[error("missing API key for provider {provider}: set {env_var}")]
    MissingApiKey { provider: String, env_var: String },

    /// Client construction failed.
    #[error("failed to create client for {model}: {message}")]
    ClientCreation { model: String, message: String },
}

impl RegistryError {
    /// Canonical category for this failure.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ModelNotFound(_) | Self::ProviderNotFound(_) => ErrorCategory::InvalidRequest,
            Self::MissingApiKey { .. } => ErrorCategory::Auth,
            Self::ClientCreation { .. } => ErrorCategory::InvalidRequest,
        }
    }

    /// Convert into the canonical error, attributed to `provider`.
    pub fn into_llm_error(self, provider: &str) -> LlmError {
        let message = self.to_string();
        LlmError::new(provider, self.category(), message).with_original(self)
    }
}

/// Errors from an audit sink.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The sink could not persist the event.
    #[error("audit write failed: {0}")]
    Write(String),

    /// The sink was already closed.
    #[error("audit logger closed")]
    Closed,

    /// Event could not be serialized.
    #[error("audit serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from loading or validating a run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field holds a value the engine cannot run with.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// TOML parse failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// YAML parse failure.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl From<ConfigError> for LlmError {
    fn from(err: ConfigError) -> Self {
        LlmError::new("config", ErrorCategory::InvalidRequest, err.to_string()).with_original(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_categories() {
        assert_eq!(
            RegistryError::ModelNotFound("nope".into()).category(),
            ErrorCategory::InvalidRequest
        );
        assert_eq!(
            RegistryError::MissingApiKey {
                provider: "openai".into(),
                env_var: "OPENAI_API_KEY".into(),
            }
            .category(),
            ErrorCategory::Auth
        );
    }

    #[test]
    fn test_registry_error_into_llm_error() {
        let err = RegistryError::MissingApiKey {
            provider: "gemini".into(),
            env_var: "GEMINI_API_KEY".into(),
        }
        .into_llm_error("gemini");

        assert_eq!(err.provider, "gemini");
        assert!(err.is_auth_error());
        assert!(err.message.contains("GEMINI_API_KEY"));
        assert!(err.original.is_some());
    }
}
