//! Integration tests for run-level behavior: result ordering, failure
//! policy, key resolution, input limits and audit trail.

mod common;

use common::{init_tracing, model_names, orchestrator, unthrottled, TEST_TIMEOUT};
use fanout::testing::{MockClientFactory, TEST_API_KEY};
use fanout::{
    AuditLevel, AuditOperation, CancellationToken, ErrorCategory, FailureMode, MemoryAuditLogger,
    ModelProcessor, ModelStatus, Orchestrator, ProcessorOptions, RateLimitConfig, RateLimiter,
    Registry, RunConfig,
};
use llm::mock::MockClient;
use llm::ProviderError;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_results_follow_request_order() {
    init_tracing();
    let models = model_names("order", 6);
    // Later models finish first.
    let factory = models.iter().enumerate().fold(MockClientFactory::new(), |factory, (i, name)| {
        let delay = Duration::from_millis(10 * (6 - i as u64));
        factory.with_client(
            name.as_str(),
            MockClient::new("openai", name.as_str())
                .with_delay(delay)
                .with_content(format!("answer {}", i)),
        )
    });
    let (orchestrator, _) = orchestrator(Arc::new(factory));
    let config = unthrottled(models.clone(), "Who finishes first?");

    let outcome = tokio::time::timeout(
        TEST_TIMEOUT,
        orchestrator.execute(&CancellationToken::new(), &config),
    )
    .await
    .expect("run timed out");

    assert_eq!(outcome.results.len(), 6);
    for (i, result) in outcome.results.iter().enumerate() {
        assert_eq!(result.model_index, i);
        assert_eq!(result.model_name, models[i]);
        assert_eq!(result.content.as_deref(), Some(format!("answer {}", i).as_str()));
        assert!(result.token_usage.is_some());
    }
    assert!(outcome.total_tokens() > 0);
}

fn mixed_factory() -> MockClientFactory {
    MockClientFactory::new()
        .with_client(
            "gemini-2.5-pro",
            MockClient::new("gemini", "gemini-2.5-pro")
                .with_status_error(401, r#"{"error":{"message":"API key not valid"}}"#),
        )
        .with_client(
            "claude-sonnet-4",
            MockClient::new("anthropic", "claude-sonnet-4-20250514")
                .with_status_error(529, r#"{"type":"error","error":{"type":"overloaded_error"}}"#),
        )
}

fn mixed_models() -> Vec<String> {
    vec![
        "gpt-4.1".to_string(),
        "gemini-2.5-pro".to_string(),
        "claude-sonnet-4".to_string(),
    ]
}

#[tokio::test]
async fn test_tolerant_run_survives_partial_failure() {
    init_tracing();
    let (orchestrator, audit) = orchestrator(Arc::new(mixed_factory()));
    let config = unthrottled(mixed_models(), "Partial");

    let outcome = orchestrator.execute(&CancellationToken::new(), &config).await;

    assert!(outcome.is_success());
    assert!(outcome.overall_err.is_none());
    assert_eq!(outcome.success_count(), 1);
    assert_eq!(outcome.results[1].category(), Some(ErrorCategory::Auth));
    assert_eq!(outcome.results[1].status, ModelStatus::Failed);
    assert_eq!(outcome.results[2].category(), Some(ErrorCategory::Server));

    assert_eq!(audit.count(AuditOperation::ModelProcessingComplete), 1);
    assert_eq!(audit.count(AuditOperation::ModelProcessingFailed), 2);
    let end = audit.events_for(AuditOperation::ExecuteEnd);
    assert_eq!(end.len(), 1);
    assert_eq!(end[0].level, AuditLevel::Info);
}

#[tokio::test]
async fn test_strict_run_reports_most_severe_failure() {
    init_tracing();
    let (orchestrator, audit) = orchestrator(Arc::new(mixed_factory()));
    let config = unthrottled(mixed_models(), "Strict").with_failure_mode(FailureMode::Strict);

    let outcome = orchestrator.execute(&CancellationToken::new(), &config).await;

    // Results are still all present.
    assert_eq!(outcome.results.len(), 3);
    assert_eq!(outcome.results[0].status, ModelStatus::Completed);

    let err = outcome.overall_err.expect("strict run should fail");
    assert_eq!(err.category, ErrorCategory::Auth);
    assert_eq!(err.status_code, Some(401));
    assert!(err.message.contains("2 of 3 models failed"));
    assert!(err.message.contains("gemini-2.5-pro"));
    let details = err.details.expect("details");
    assert!(details.contains("[1] gemini-2.5-pro (auth)"), "details: {}", details);
    assert!(details.contains("[2] claude-sonnet-4 (server)"), "details: {}", details);

    let end = audit.events_for(AuditOperation::ExecuteEnd);
    assert_eq!(end[0].level, AuditLevel::Error);
}

#[tokio::test]
async fn test_tolerant_run_fails_when_nothing_succeeds() {
    init_tracing();
    let factory = MockClientFactory::new()
        .with_client(
            "gpt-4.1",
            MockClient::new("openai", "gpt-4.1").with_status_error(429, "Rate limit reached"),
        )
        .with_client(
            "o3",
            MockClient::new("openai", "o3").with_error(|| ProviderError::Timeout("30s".into())),
        );
    let (orchestrator, _) = orchestrator(Arc::new(factory));
    let config = unthrottled(vec!["gpt-4.1".to_string(), "o3".to_string()], "Nothing works");

    let outcome = orchestrator.execute(&CancellationToken::new(), &config).await;

    let err = outcome.overall_err.expect("run should fail");
    // RateLimit outranks Network.
    assert_eq!(err.category, ErrorCategory::RateLimit);
    assert_eq!(err.provider, "openai");
    assert!(err.original.is_some());
}

#[tokio::test]
async fn test_unknown_model_fails_without_stopping_others() {
    init_tracing();
    let factory = Arc::new(MockClientFactory::new());
    let (orchestrator, _) = orchestrator(factory.clone());
    let models = vec!["gpt-4.1".to_string(), "mystery model".to_string()];
    let config = unthrottled(models, "Who are you?");

    let outcome = orchestrator.execute(&CancellationToken::new(), &config).await;

    assert_eq!(outcome.results[0].status, ModelStatus::Completed);
    let unknown = &outcome.results[1];
    assert_eq!(unknown.status, ModelStatus::Failed);
    assert_eq!(unknown.provider, "unknown");
    assert_eq!(unknown.category(), Some(ErrorCategory::InvalidRequest));
    assert_eq!(factory.created(), vec!["gpt-4.1".to_string()]);
}

#[tokio::test]
async fn test_missing_api_key_is_auth_failure() {
    init_tracing();
    let factory = Arc::new(MockClientFactory::new());
    let registry = Registry::builtin()
        .with_env_lookup(Arc::new(|var: &str| {
            (var == "OPENAI_API_KEY").then(|| "env-key".to_string())
        }))
        .with_client_factory(factory.clone());
    let orchestrator = Orchestrator::new(Arc::new(registry));
    let models = vec![
        "gpt-4.1".to_string(),
        "gemini-2.5-pro".to_string(),
        "claude-opus-4".to_string(),
    ];
    let config = unthrottled(models, "Keys please").with_api_key("anthropic", "explicit-key");

    let outcome = orchestrator.execute(&CancellationToken::new(), &config).await;

    assert_eq!(outcome.results[0].status, ModelStatus::Completed);
    assert_eq!(outcome.results[1].category(), Some(ErrorCategory::Auth));
    assert!(outcome.results[1]
        .err
        .as_ref()
        .is_some_and(|e| e.message.contains("GEMINI_API_KEY")));
    assert_eq!(outcome.results[2].status, ModelStatus::Completed);

    assert_eq!(factory.key_for("gpt-4.1").as_deref(), Some("env-key"));
    assert_eq!(factory.key_for("claude-opus-4").as_deref(), Some("explicit-key"));
    assert_eq!(factory.key_for("gemini-2.5-pro"), None);
}

#[tokio::test]
async fn test_input_limit_preflight_blocks_oversized_prompt() {
    init_tracing();
    let oversized = MockClient::new("anthropic", "claude-sonnet-4-20250514").with_token_count(250_000);
    let stats = oversized.stats();
    let factory = MockClientFactory::new().with_client("claude-sonnet-4", oversized);
    let (orchestrator, _) = orchestrator(Arc::new(factory));
    let models = vec!["claude-sonnet-4".to_string(), "gpt-4.1".to_string()];
    let config = unthrottled(models, "A very long prompt").with_input_limit_check(true);

    let outcome = orchestrator.execute(&CancellationToken::new(), &config).await;

    assert_eq!(outcome.results[0].category(), Some(ErrorCategory::InputLimit));
    assert_eq!(stats.count_calls(), 1);
    assert_eq!(stats.calls(), 0);
    assert_eq!(outcome.results[1].status, ModelStatus::Completed);
}

#[tokio::test]
async fn test_failed_token_count_still_generates() {
    init_tracing();
    let client = MockClient::new("openai", "gpt-4.1")
        .with_count_error(|| ProviderError::Other("count endpoint down".into()));
    let stats = client.stats();
    let factory = MockClientFactory::new().with_client("gpt-4.1", client);
    let (orchestrator, _) = orchestrator(Arc::new(factory));
    let config = unthrottled(vec!["gpt-4.1".to_string()], "Count me").with_input_limit_check(true);

    let outcome = orchestrator.execute(&CancellationToken::new(), &config).await;

    assert!(outcome.is_success());
    assert_eq!(stats.count_calls(), 1);
    assert_eq!(stats.calls(), 1);
}

#[tokio::test]
async fn test_parameters_merge_over_model_defaults() {
    init_tracing();
    let gpt = MockClient::new("openai", "gpt-4.1");
    let claude = MockClient::new("anthropic", "claude-sonnet-4-20250514");
    let (gpt_stats, claude_stats) = (gpt.stats(), claude.stats());
    let factory = MockClientFactory::new()
        .with_client("gpt-4.1", gpt)
        .with_client("claude-sonnet-4", claude);
    let (orchestrator, _) = orchestrator(Arc::new(factory));
    let models = vec!["gpt-4.1".to_string(), "claude-sonnet-4".to_string()];
    let config = unthrottled(models, "Tune").with_parameter("top_p", json!(0.9));

    orchestrator.execute(&CancellationToken::new(), &config).await;

    let gpt_params = &gpt_stats.params()[0];
    assert_eq!(gpt_params["temperature"], json!(0.7));
    assert_eq!(gpt_params["top_p"], json!(0.9));
    assert_eq!(gpt_params["max_tokens"], json!(32_768));

    let claude_params = &claude_stats.params()[0];
    assert!(claude_params.get("temperature").is_none());
    assert_eq!(claude_params["max_tokens"], json!(64_000));
}

#[tokio::test]
async fn test_run_level_override_beats_model_default() {
    init_tracing();
    let gpt = MockClient::new("openai", "gpt-4.1");
    let stats = gpt.stats();
    let (orchestrator, _) = orchestrator(Arc::new(MockClientFactory::new().with_client("gpt-4.1", gpt)));
    let config = unthrottled(vec!["gpt-4.1".to_string()], "Cooler")
        .with_parameter("temperature", json!(0.1))
        .with_parameter("max_tokens", json!(256));

    orchestrator.execute(&CancellationToken::new(), &config).await;

    let params = &stats.params()[0];
    assert_eq!(params["temperature"], json!(0.1));
    assert_eq!(params["max_tokens"], json!(256));
}

#[tokio::test]
async fn test_empty_model_list_is_rejected() {
    init_tracing();
    let (orchestrator, audit) = orchestrator(Arc::new(MockClientFactory::new()));
    let config = unthrottled(Vec::new(), "Nobody home");

    let outcome = orchestrator.execute(&CancellationToken::new(), &config).await;

    assert!(outcome.results.is_empty());
    let err = outcome.overall_err.expect("empty run fails");
    assert_eq!(err.category, ErrorCategory::InvalidRequest);
    assert_eq!(audit.count(AuditOperation::ExecuteStart), 1);
    assert_eq!(audit.count(AuditOperation::ExecuteEnd), 1);
}

#[tokio::test]
async fn test_invalid_config_fails_every_model() {
    init_tracing();
    let factory = Arc::new(MockClientFactory::new());
    let (orchestrator, _) = orchestrator(factory.clone());
    let config = unthrottled(model_names("invalid", 3), "Bad config").with_max_concurrency(0);

    let outcome = orchestrator.execute(&CancellationToken::new(), &config).await;

    assert_eq!(outcome.results.len(), 3);
    assert!(outcome
        .results
        .iter()
        .all(|r| r.category() == Some(ErrorCategory::InvalidRequest)));
    assert_eq!(factory.stats().calls(), 0);
}

#[tokio::test]
async fn test_unrepresentable_timeout_is_rejected_not_fatal() {
    init_tracing();
    let factory = Arc::new(MockClientFactory::new());
    let (orchestrator, _) = orchestrator(factory.clone());
    let mut config = unthrottled(model_names("huge", 2), "Forever and a day");
    config.timeout_secs = Some(1e20);

    let outcome = tokio::time::timeout(
        TEST_TIMEOUT,
        orchestrator.execute(&CancellationToken::new(), &config),
    )
    .await
    .expect("run timed out");

    assert_eq!(outcome.results.len(), 2);
    assert!(outcome
        .results
        .iter()
        .all(|r| r.category() == Some(ErrorCategory::InvalidRequest)));
    let err = outcome.overall_err.expect("run rejected");
    assert!(err.message.contains("timeout_secs"), "message: {}", err.message);
    assert_eq!(factory.stats().calls(), 0);
}

#[tokio::test]
async fn test_tiny_rate_limit_is_rejected_not_fatal() {
    init_tracing();
    let factory = Arc::new(MockClientFactory::new());
    let (orchestrator, _) = orchestrator(factory.clone());
    let config = unthrottled(vec!["gpt-4.1".to_string(); 2], "Trickle")
        .with_model_rate_limit("gpt-4.1", RateLimitConfig::new(1e-30, 1));

    let outcome = tokio::time::timeout(
        TEST_TIMEOUT,
        orchestrator.execute(&CancellationToken::new(), &config),
    )
    .await
    .expect("run timed out");

    let err = outcome.overall_err.expect("run rejected");
    assert_eq!(err.category, ErrorCategory::InvalidRequest);
    assert_eq!(factory.stats().calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_tiny_bucket_rate_waits_until_cancelled() {
    init_tracing();
    let factory = Arc::new(MockClientFactory::new());
    let limiter = RateLimiter::new(2, RateLimitConfig::unlimited());
    limiter.set_model_limit("gpt-4.1", RateLimitConfig::new(1e-30, 1));
    let processor = ModelProcessor::new(
        Arc::new(fanout::testing::mock_registry(factory.clone())),
        Arc::new(limiter),
        Arc::new(MemoryAuditLogger::new()),
        ProcessorOptions::from_config(&RunConfig::default(), "trickle"),
    );

    let cancel = CancellationToken::new();
    let first = processor.process(&cancel, 0, "gpt-4.1", "first").await;
    assert_eq!(first.status, ModelStatus::Completed);

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });
    let second = processor.process(&cancel, 1, "gpt-4.1", "second").await;

    assert_eq!(second.status, ModelStatus::Cancelled);
    assert_eq!(factory.stats().calls(), 1);
}

#[tokio::test]
async fn test_audit_trail_shares_correlation_id() {
    init_tracing();
    let audit = Arc::new(MemoryAuditLogger::new());
    let factory = Arc::new(MockClientFactory::new());
    let orchestrator = Orchestrator::new(Arc::new(fanout::testing::mock_registry(factory)))
        .with_audit_logger(audit.clone());
    let config = unthrottled(model_names("audit", 4), "Trace me").with_correlation_id("run-42");

    let outcome = orchestrator.execute(&CancellationToken::new(), &config).await;

    assert_eq!(outcome.correlation_id, "run-42");
    let events = audit.events();
    // start + one per model + end
    assert_eq!(events.len(), 6);
    assert!(events.iter().all(|e| e.correlation_id == "run-42"));
    assert_eq!(events.first().map(|e| e.operation), Some(AuditOperation::ExecuteStart));
    assert_eq!(events.last().map(|e| e.operation), Some(AuditOperation::ExecuteEnd));

    let lines = audit.to_json_lines().expect("serializable");
    assert_eq!(lines.lines().count(), 6);
    assert!(!lines.contains(TEST_API_KEY));
}

#[tokio::test]
async fn test_generated_correlation_ids_are_unique() {
    init_tracing();
    let (orchestrator, _) = orchestrator(Arc::new(MockClientFactory::new()));
    let config = unthrottled(vec!["gpt-4.1".to_string()], "Twice");

    let first = orchestrator.execute(&CancellationToken::new(), &config).await;
    let second = orchestrator.execute(&CancellationToken::new(), &config).await;

    assert!(!first.correlation_id.is_empty());
    assert_ne!(first.correlation_id, second.correlation_id);
}
