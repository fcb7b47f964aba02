//! Error categorization.
//!
//! Maps provider-native failures ([`ProviderError`]) onto the canonical
//! [`ErrorCategory`] taxonomy. The mapping is deterministic: HTTP status
//! first, then provider-specific substrings, then substrings shared by every
//! provider. Anything left over is [`ErrorCategory::Unknown`].
//!
//! Messages are sanitized before they are stored in an [`LlmError`]: bearer
//! tokens, key-shaped strings and `key=` query parameters are redacted.

use crate::error::{ErrorCategory, LlmError, ProviderError};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Longest message kept in an [`LlmError`].
pub const MAX_MESSAGE_LEN: usize = 512;

type PatternTable = &'static [(&'static str, ErrorCategory)];

const OPENAI_PATTERNS: PatternTable = &[
    ("insufficient_quota", ErrorCategory::RateLimit),
    ("context_length_exceeded", ErrorCategory::InputLimit),
    ("content_policy_violation", ErrorCategory::ContentFiltered),
    ("content_filter", ErrorCategory::ContentFiltered),
    ("invalid_api_key", ErrorCategory::Auth),
    ("model_not_found", ErrorCategory::InvalidRequest),
];

const GEMINI_PATTERNS: PatternTable = &[
    ("api key not valid", ErrorCategory::Auth),
    ("api_key_invalid", ErrorCategory::Auth),
    ("resource_exhausted", ErrorCategory::RateLimit),
    ("finishreason: safety", ErrorCategory::ContentFiltered),
    ("finish reason: safety", ErrorCategory::ContentFiltered),
    ("blockreason", ErrorCategory::ContentFiltered),
    ("recitation", ErrorCategory::ContentFiltered),
    ("exceeds the maximum number of tokens", ErrorCategory::InputLimit),
    ("user location is not supported", ErrorCategory::InvalidRequest),
];

const ANTHROPIC_PATTERNS: PatternTable = &[
    ("overloaded_error", ErrorCategory::Server),
    ("authentication_error", ErrorCategory::Auth),
    ("permission_error", ErrorCategory::Auth),
    ("rate_limit_error", ErrorCategory::RateLimit),
    ("prompt is too long", ErrorCategory::InputLimit),
    ("not_found_error", ErrorCategory::InvalidRequest),
];

const OPENROUTER_PATTERNS: PatternTable = &[
    ("insufficient credits", ErrorCategory::Auth),
    ("no endpoints found", ErrorCategory::InvalidRequest),
    ("flagged for moderation", ErrorCategory::ContentFiltered),
    ("provider returned error", ErrorCategory::Server),
];

// Order matters: earlier entries win. Auth and rate-limit phrases must be
// checked before the generic "invalid" phrases.
const COMMON_PATTERNS: PatternTable = &[
    ("invalid api key", ErrorCategory::Auth),
    ("incorrect api key", ErrorCategory::Auth),
    ("missing api key", ErrorCategory::Auth),
    ("invalid x-api-key", ErrorCategory::Auth),
    ("unauthorized", ErrorCategory::Auth),
    ("unauthenticated", ErrorCategory::Auth),
    ("authentication", ErrorCategory::Auth),
    ("permission denied", ErrorCategory::Auth),
    ("permission_denied", ErrorCategory::Auth),
    ("forbidden", ErrorCategory::Auth),
    ("rate limit", ErrorCategory::RateLimit),
    ("rate_limit", ErrorCategory::RateLimit),
    ("ratelimit", ErrorCategory::RateLimit),
    ("too many requests", ErrorCategory::RateLimit),
    ("quota", ErrorCategory::RateLimit),
    ("resource exhausted", ErrorCategory::RateLimit),
    ("context length", ErrorCategory::InputLimit),
    ("context_length", ErrorCategory::InputLimit),
    ("context window", ErrorCategory::InputLimit),
    ("maximum context", ErrorCategory::InputLimit),
    ("too many tokens", ErrorCategory::InputLimit),
    ("token limit", ErrorCategory::InputLimit),
    ("input is too long", ErrorCategory::InputLimit),
    ("request too large", ErrorCategory::InputLimit),
    ("safety", ErrorCategory::ContentFiltered),
    ("content filter", ErrorCategory::ContentFiltered),
    ("content_filter", ErrorCategory::ContentFiltered),
    ("content policy", ErrorCategory::ContentFiltered),
    ("moderation", ErrorCategory::ContentFiltered),
    ("harmful", ErrorCategory::ContentFiltered),
    ("blocked", ErrorCategory::ContentFiltered),
    ("deadline exceeded", ErrorCategory::Cancelled),
    ("context canceled", ErrorCategory::Cancelled),
    ("cancelled", ErrorCategory::Cancelled),
    ("canceled", ErrorCategory::Cancelled),
    ("timed out", ErrorCategory::Network),
    ("timeout", ErrorCategory::Network),
    ("connection refused", ErrorCategory::Network),
    ("connection reset", ErrorCategory::Network),
    ("connection closed", ErrorCategory::Network),
    ("broken pipe", ErrorCategory::Network),
    ("no such host", ErrorCategory::Network),
    ("dns error", ErrorCategory::Network),
    ("network", ErrorCategory::Network),
    ("internal server error", ErrorCategory::Server),
    ("internal error", ErrorCategory::Server),
    ("server error", ErrorCategory::Server),
    ("overloaded", ErrorCategory::Server),
    ("service unavailable", ErrorCategory::Server),
    ("bad gateway", ErrorCategory::Server),
    ("invalid request", ErrorCategory::InvalidRequest),
    ("invalid_request", ErrorCategory::InvalidRequest),
    ("invalid argument", ErrorCategory::InvalidRequest),
    ("invalid_argument", ErrorCategory::InvalidRequest),
    ("bad request", ErrorCategory::InvalidRequest),
    ("does not exist", ErrorCategory::InvalidRequest),
    ("not found", ErrorCategory::InvalidRequest),
    ("unsupported", ErrorCategory::InvalidRequest),
    ("malformed", ErrorCategory::InvalidRequest),
];

fn provider_patterns(provider: &str) -> PatternTable {
    match provider.to_ascii_lowercase().as_str() {
        "openai" => OPENAI_PATTERNS,
        "gemini" | "google" => GEMINI_PATTERNS,
        "anthropic" | "claude" => ANTHROPIC_PATTERNS,
        "openrouter" => OPENROUTER_PATTERNS,
        _ => &[],
    }
}

/// Categorize a free-form error message for a provider.
///
/// Returns [`ErrorCategory::Unknown`] when no pattern matches.
pub fn categorize_message(provider: &str, message: &str) -> ErrorCategory {
    let lower = message.to_lowercase();
    provider_patterns(provider)
        .iter()
        .chain(COMMON_PATTERNS.iter())
        .find(|(pattern, _)| lower.contains(pattern))
        .map(|(_, category)| *category)
        .unwrap_or(ErrorCategory::Unknown)
}

/// Categorize an HTTP failure from its status code and response text.
pub fn categorize_status(provider: &str, status: u16, message: &str) -> ErrorCategory {
    match status {
        401 | 403 => ErrorCategory::Auth,
        // Payment required: billing or credit problems on the account.
        402 => ErrorCategory::Auth,
        404 => ErrorCategory::InvalidRequest,
        408 => ErrorCategory::Network,
        413 => ErrorCategory::InputLimit,
        429 => ErrorCategory::RateLimit,
        499 => ErrorCategory::Cancelled,
        500..=599 => match categorize_message(provider, message) {
            ErrorCategory::RateLimit => ErrorCategory::RateLimit,
            _ => ErrorCategory::Server,
        },
        400..=499 => match categorize_message(provider, message) {
            ErrorCategory::Unknown => ErrorCategory::InvalidRequest,
            category => category,
        },
        _ => categorize_message(provider, message),
    }
}

/// Convert a provider-native error into the canonical [`LlmError`].
pub fn categorize(provider: &str, err: &ProviderError) -> LlmError {
    let (category, status, message, details) = match err {
        ProviderError::Status { status, body } => {
            let summary = extract_error_message(body);
            let category = categorize_status(provider, *status, body);
            (
                category,
                Some(*status),
                format!("{} API returned HTTP {}: {}", provider, status, summary),
                Some(body.clone()),
            )
        }
        ProviderError::Transport(e) => {
            let category = if let Some(status) = e.status() {
                categorize_status(provider, status.as_u16(), &e.to_string())
            } else if e.is_decode() || e.is_body() {
                ErrorCategory::Server
            } else if e.is_timeout() || e.is_connect() || e.is_request() {
                ErrorCategory::Network
            } else {
                match categorize_message(provider, &e.to_string()) {
                    ErrorCategory::Unknown => ErrorCategory::Network,
                    category => category,
                }
            };
            (
                category,
                e.status().map(|s| s.as_u16()),
                format!("request to {} failed: {}", provider, e),
                None,
            )
        }
        ProviderError::Timeout(msg) => (
            ErrorCategory::Network,
            None,
            format!("request to {} timed out: {}", provider, msg),
            None,
        ),
        ProviderError::Serialization(msg) | ProviderError::InvalidResponse(msg) => (
            ErrorCategory::Server,
            None,
            format!("{} returned an unreadable response: {}", provider, msg),
            None,
        ),
        ProviderError::ContentBlocked(reason) => (
            ErrorCategory::ContentFiltered,
            None,
            format!("{} blocked the content: {}", provider, reason),
            None,
        ),
        ProviderError::Config(msg) => (
            ErrorCategory::InvalidRequest,
            None,
            format!("{} client misconfigured: {}", provider, msg),
            None,
        ),
        ProviderError::Other(msg) => (
            categorize_message(provider, msg),
            None,
            msg.clone(),
            None,
        ),
    };

    let mut llm_error = LlmError::new(provider, category, sanitize(&message));
    llm_error.status_code = status;
    llm_error.details = details.map(|d| sanitize(&d));
    llm_error.original = Some(std::sync::Arc::new(SanitizedSource(sanitize(&err.to_string()))));
    llm_error
}

/// Redact credential-shaped substrings and cap the length.
pub fn sanitize(message: &str) -> String {
    static BEARER: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)bearer\s+[A-Za-z0-9._\-]+").expect("bearer pattern")
    });
    static SECRET_KEY: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"sk-[A-Za-z0-9_\-]{8,}").expect("secret key pattern")
    });
    static GOOGLE_KEY: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"AIza[0-9A-Za-z_\-]{20,}").expect("google key pattern")
    });
    static QUERY_KEY: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"(?i)\b(api[_-]?key|key)=[^&\s"']+"#).expect("query key pattern")
    });
    static HEADER_KEY: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"(?i)(x-api-key|x-goog-api-key)["']?\s*[:=]\s*["']?[^\s"',}]+"#)
            .expect("header key pattern")
    });

    let redacted = BEARER.replace_all(message, "Bearer [REDACTED]");
    let redacted = SECRET_KEY.replace_all(&redacted, "[REDACTED]");
    let redacted = GOOGLE_KEY.replace_all(&redacted, "[REDACTED]");
    let redacted = QUERY_KEY.replace_all(&redacted, "$1=[REDACTED]");
    let redacted = HEADER_KEY.replace_all(&redacted, "$1: [REDACTED]");
    truncate(redacted.trim(), MAX_MESSAGE_LEN)
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push_str("...");
    truncated
}

/// Pull a human-readable message out of a provider error body.
///
/// Understands `{"error": {"message": ..}}`, `{"error": ".."}`,
/// `{"message": ..}` and Gemini's array-wrapped variant; falls back to the
/// raw body.
fn extract_error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };
    let value = match &value {
        Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
        other => other.clone(),
    };

    value
        .pointer("/error/message")
        .and_then(Value::as_str)
        .or_else(|| value.get("error").and_then(Value::as_str))
        .or_else(|| value.get("message").and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}

/// Type-erased, sanitized stand-in for the provider error kept as `original`.
#[derive(Debug)]
struct SanitizedSource(String);

impl std::fmt::Display for SanitizedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for SanitizedSource {}
