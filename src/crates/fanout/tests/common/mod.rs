//! Common test utilities and setup

#![allow(dead_code)]

use fanout::testing::{mock_registry, MockClientFactory};
use fanout::{MemoryAuditLogger, Orchestrator, RateLimitConfig, RunConfig};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for any single test run.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Route tracing output to the test harness. `RUST_LOG` picks the filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Orchestrator over `factory` that records audit events in memory.
pub fn orchestrator(factory: Arc<MockClientFactory>) -> (Orchestrator, Arc<MemoryAuditLogger>) {
    let audit = Arc::new(MemoryAuditLogger::new());
    let orchestrator =
        Orchestrator::new(Arc::new(mock_registry(factory))).with_audit_logger(audit.clone());
    (orchestrator, audit)
}

/// `count` distinct OpenAI-style model names. They resolve through the
/// detection rules, so each gets its own token bucket.
pub fn model_names(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("gpt-{}-{}", prefix, i)).collect()
}

/// Run config with no rate throttling on any built-in provider.
pub fn unthrottled(models: Vec<String>, instructions: &str) -> RunConfig {
    ["openai", "gemini", "anthropic", "openrouter"]
        .into_iter()
        .fold(RunConfig::new(models, instructions), |config, provider| {
            config.with_provider_rate_limit(provider, RateLimitConfig::unlimited())
        })
        .with_default_rate_limit(RateLimitConfig::unlimited())
}
