//! Error types for LLM provider implementations.
//!
//! Two layers live here:
//!
//! - [`ProviderError`] is the raw shape a provider client reports (HTTP
//!   status and body, transport failure, blocked content, ...). It never
//!   leaves the provider boundary on its own.
//! - [`LlmError`] is the canonical error the rest of the system sees. It is
//!   produced by [`crate::categorize`] and carries an [`ErrorCategory`] with a
//!   fixed suggestion.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type for canonical LLM operations.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Result type for raw provider calls.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Errors reported by a provider client before categorization.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider answered with a non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body (usually a JSON error document).
        body: String,
    },

    /// HTTP request failed before a response was received.
    #[error("HTTP request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// Failed to serialize/deserialize data.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The provider answered, but the payload was not what we expected.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The provider refused to produce content (safety, moderation, recitation).
    #[error("Content blocked: {0}")]
    ContentBlocked(String),

    /// Request timeout.
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Client configuration error (bad base URL, unbuildable HTTP client, ...).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with context.
    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// HTTP status attached to this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Status { status, .. } => Some(*status),
            ProviderError::Transport(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        // reqwest includes the request URL in its Display output; drop it so
        // query-string credentials can never leak into messages.
        let err = err.without_url();
        if err.is_timeout() {
            ProviderError::Timeout(err.to_string())
        } else {
            ProviderError::Transport(err)
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Serialization(err.to_string())
    }
}

/// Canonical failure taxonomy shared by every provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Too many requests or quota exhausted.
    RateLimit,
    /// Missing, invalid or unauthorized credentials.
    Auth,
    /// The request itself was malformed or referenced something unknown.
    InvalidRequest,
    /// The provider blocked the prompt or the response.
    ContentFiltered,
    /// The prompt does not fit the model's context window.
    InputLimit,
    /// Connectivity problems between us and the provider.
    Network,
    /// The provider failed internally.
    Server,
    /// The operation was cancelled or its deadline elapsed.
    Cancelled,
    /// Anything we could not classify.
    Unknown,
}

impl ErrorCategory {
    /// All categories, in declaration order.
    pub const ALL: [ErrorCategory; 9] = [
        ErrorCategory::RateLimit,
        ErrorCategory::Auth,
        ErrorCategory::InvalidRequest,
        ErrorCategory::ContentFiltered,
        ErrorCategory::InputLimit,
        ErrorCategory::Network,
        ErrorCategory::Server,
        ErrorCategory::Cancelled,
        ErrorCategory::Unknown,
    ];

    /// Fixed, provider-independent advice shown to users.
    pub fn suggestion(&self) -> &'static str {
        match self {
            ErrorCategory::RateLimit => {
                "Rate limit or quota exceeded: retry after backoff, or lower the request rate for this provider"
            }
            ErrorCategory::Auth => {
                "Authentication failed: check API key and account status for this provider"
            }
            ErrorCategory::InvalidRequest => {
                "The request was rejected: check the model name and generation parameters"
            }
            ErrorCategory::ContentFiltered => {
                "The provider's safety filters blocked the content: rephrase the instructions"
            }
            ErrorCategory::InputLimit => {
                "The input exceeds the model's context window: shorten the instructions or pick a larger model"
            }
            ErrorCategory::Network => {
                "Could not reach the provider: check network connectivity and retry"
            }
            ErrorCategory::Server => {
                "The provider reported an internal error: retry later"
            }
            ErrorCategory::Cancelled => "The operation was cancelled or timed out",
            ErrorCategory::Unknown => {
                "An unexpected error occurred: see the error details for more information"
            }
        }
    }

    /// Rank used when a single category must represent many failures.
    ///
    /// Higher is more severe: Auth > InvalidRequest > InputLimit =
    /// ContentFiltered > RateLimit > Network = Server > Cancelled > Unknown.
    pub fn severity(&self) -> u8 {
        match self {
            ErrorCategory::Auth => 7,
            ErrorCategory::InvalidRequest => 6,
            ErrorCategory::InputLimit | ErrorCategory::ContentFiltered => 5,
            ErrorCategory::RateLimit => 4,
            ErrorCategory::Network | ErrorCategory::Server => 3,
            ErrorCategory::Cancelled => 2,
            ErrorCategory::Unknown => 1,
        }
    }

    /// Whether a caller-level retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorCategory::RateLimit | ErrorCategory::Network | ErrorCategory::Server
        )
    }

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::Auth => "auth",
            ErrorCategory::InvalidRequest => "invalid_request",
            ErrorCategory::ContentFiltered => "content_filtered",
            ErrorCategory::InputLimit => "input_limit",
            ErrorCategory::Network => "network",
            ErrorCategory::Server => "server",
            ErrorCategory::Cancelled => "cancelled",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical error produced at every provider boundary.
///
/// `original` is type-erased so provider-native error types never travel
/// upward. Cloning is cheap; the original error is shared.
#[derive(Debug, Clone, Error)]
#[error("{provider} {category} error: {message}")]
pub struct LlmError {
    /// Provider name (`openai`, `gemini`, ...), or the component that failed.
    pub provider: String,
    /// Canonical category.
    pub category: ErrorCategory,
    /// HTTP status, when the failure came from an HTTP response.
    pub status_code: Option<u16>,
    /// Sanitized, user-facing message.
    pub message: String,
    /// Underlying error, if any.
    #[source]
    pub original: Option<Arc<dyn std::error::Error + Send + Sync + 'static>>,
    /// Fixed advice for the category.
    pub suggestion: String,
    /// Debug detail (sanitized).
    pub details: Option<String>,
}

impl LlmError {
    /// Create an error for the given provider and category.
    pub fn new(
        provider: impl Into<String>,
        category: ErrorCategory,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            category,
            status_code: None,
            message: message.into(),
            original: None,
            suggestion: category.suggestion().to_string(),
            details: None,
        }
    }

    /// Shorthand for a cancellation error.
    pub fn cancelled(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ErrorCategory::Cancelled, message)
    }

    /// Attach an HTTP status.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    /// Attach debug detail.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Attach the underlying error.
    pub fn with_original<E>(mut self, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.original = Some(Arc::new(err));
        self
    }

    /// Check if this error is retryable by a caller-level policy.
    pub fn is_retryable(&self) -> bool {
        self.category.is_transient()
    }

    /// Check if this error is due to authentication.
    pub fn is_auth_error(&self) -> bool {
        self.category == ErrorCategory::Auth
    }

    /// Check if this error represents a cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.category == ErrorCategory::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_category_has_a_suggestion() {
        for category in ErrorCategory::ALL {
            assert!(!category.suggestion().is_empty(), "{category} has no suggestion");
        }
    }

    #[test]
    fn test_suggestions_mention_expected_actions() {
        assert!(ErrorCategory::RateLimit.suggestion().contains("retry after backoff"));
        assert!(ErrorCategory::Auth.suggestion().contains("check API key"));
    }

    #[test]
    fn test_severity_order() {
        use ErrorCategory::*;
        assert!(Auth.severity() > InvalidRequest.severity());
        assert!(InvalidRequest.severity() > RateLimit.severity());
        assert!(RateLimit.severity() > Network.severity());
        assert_eq!(Network.severity(), Server.severity());
        assert!(Server.severity() > Cancelled.severity());
        assert!(Cancelled.severity() > Unknown.severity());
    }

    #[test]
    fn test_llm_error_builder() {
        let err = LlmError::new("openai", ErrorCategory::RateLimit, "slow down")
            .with_status(429)
            .with_details("x-ratelimit-remaining: 0")
            .with_original(ProviderError::Other("raw".to_string()));

        assert_eq!(err.status_code, Some(429));
        assert!(err.is_retryable());
        assert!(!err.is_auth_error());
        assert_eq!(err.suggestion, ErrorCategory::RateLimit.suggestion());
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.to_string(), "openai rate_limit error: slow down");
    }

    #[test]
    fn test_provider_error_status() {
        let err = ProviderError::Status {
            status: 503,
            body: "unavailable".to_string(),
        };
        assert_eq!(err.status(), Some(503));
        assert_eq!(ProviderError::Other("x".to_string()).status(), None);
    }

    #[test]
    fn test_category_serde_names() {
        let json = serde_json::to_string(&ErrorCategory::ContentFiltered).unwrap();
        assert_eq!(json, "\"content_filtered\"");
    }
}
