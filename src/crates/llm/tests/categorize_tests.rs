//! Every category is reachable from some provider failure, and provider
//! dialects land in the same taxonomy.

use llm::mock::MockClient;
use llm::{categorize, ErrorCategory, Parameters, ProviderClient, ProviderError};

fn status(code: u16, body: &str) -> ProviderError {
    ProviderError::Status {
        status: code,
        body: body.to_string(),
    }
}

#[test]
fn test_every_category_is_reachable() {
    let cases = vec![
        (status(429, "slow down"), ErrorCategory::RateLimit),
        (status(401, "nope"), ErrorCategory::Auth),
        (status(400, "unknown field `foo`"), ErrorCategory::InvalidRequest),
        (ProviderError::ContentBlocked("SAFETY".into()), ErrorCategory::ContentFiltered),
        (status(413, "too big"), ErrorCategory::InputLimit),
        (ProviderError::Timeout("after 30s".into()), ErrorCategory::Network),
        (status(502, "bad gateway"), ErrorCategory::Server),
        (status(499, "client closed request"), ErrorCategory::Cancelled),
        (ProviderError::Other("something odd".into()), ErrorCategory::Unknown),
    ];

    let mut seen = Vec::new();
    for (err, expected) in cases {
        let categorized = categorize("openai", &err);
        assert_eq!(categorized.category, expected, "for {:?}", err);
        assert_eq!(categorized.provider, "openai");
        seen.push(categorized.category);
    }

    for category in [
        ErrorCategory::RateLimit,
        ErrorCategory::Auth,
        ErrorCategory::InvalidRequest,
        ErrorCategory::ContentFiltered,
        ErrorCategory::InputLimit,
        ErrorCategory::Network,
        ErrorCategory::Server,
        ErrorCategory::Cancelled,
        ErrorCategory::Unknown,
    ] {
        assert!(seen.contains(&category), "{} unreachable", category);
    }
}

#[test]
fn test_provider_dialects_agree() {
    let rate_limited = [
        ("openai", status(429, r#"{"error":{"code":"rate_limit_exceeded"}}"#)),
        ("gemini", status(429, r#"{"error":{"status":"RESOURCE_EXHAUSTED"}}"#)),
        ("anthropic", status(429, r#"{"error":{"type":"rate_limit_error"}}"#)),
        ("openrouter", status(429, "Rate limit exceeded")),
    ];
    for (provider, err) in &rate_limited {
        assert_eq!(categorize(provider, err).category, ErrorCategory::RateLimit, "{}", provider);
    }

    let input_limit = [
        ("openai", status(400, r#"{"error":{"code":"context_length_exceeded"}}"#)),
        ("gemini", status(400, "The input token count exceeds the maximum number of tokens allowed")),
        ("anthropic", status(400, "prompt is too long: 210000 tokens > 200000 maximum")),
    ];
    for (provider, err) in &input_limit {
        assert_eq!(categorize(provider, err).category, ErrorCategory::InputLimit, "{}", provider);
    }
}

#[test]
fn test_server_errors_mentioning_quota_are_rate_limits() {
    let err = status(503, "quota exceeded for this project");
    assert_eq!(categorize("gemini", &err).category, ErrorCategory::RateLimit);
}

#[test]
fn test_status_code_and_details_are_kept() {
    let err = categorize("anthropic", &status(529, r#"{"error":{"type":"overloaded_error"}}"#));
    assert_eq!(err.category, ErrorCategory::Server);
    assert_eq!(err.status_code, Some(529));
    assert!(err.details.is_some());
    assert!(err.original.is_some());
    assert!(!err.suggestion.is_empty());
}

#[test]
fn test_credentials_never_leak_into_messages() {
    let err = status(401, "Incorrect API key provided: sk-abcdefghijklmnopqrstuvwxyz");
    let categorized = categorize("openai", &err);
    assert_eq!(categorized.category, ErrorCategory::Auth);
    assert!(!categorized.message.contains("sk-abcdefghijklmnop"));
    assert!(!categorized
        .details
        .as_deref()
        .unwrap_or_default()
        .contains("sk-abcdefghijklmnop"));
}

#[tokio::test]
async fn test_mock_failures_categorize_like_real_ones() {
    let client = MockClient::new("gemini", "gemini-2.5-pro")
        .with_error(|| ProviderError::ContentBlocked("promptFeedback.blockReason=SAFETY".into()));
    let err = client
        .generate_content("tell me", &Parameters::new())
        .await
        .unwrap_err();

    assert_eq!(categorize(client.provider(), &err).category, ErrorCategory::ContentFiltered);
}
