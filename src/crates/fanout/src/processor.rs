//! Single-model dispatch.
//!
//! [`ModelProcessor::process`] takes one model from `Queued` to a terminal
//! state and always returns a [`ProcessingResult`]; failures are data, not
//! errors. The order of work is fixed:
//!
//! 1. resolve the client (no network, no rate capacity consumed)
//! 2. acquire a rate permit
//! 3. optionally count prompt tokens against the context window
//! 4. generate, racing the call against cancellation
//! 5. categorize any provider failure
//!
//! The rate permit is released on every exit path. No retries happen here.

use crate::audit::{self, AuditEvent, AuditLogger, AuditOperation};
use crate::config::RunConfig;
use crate::models::{ModelStatus, ProcessingResult};
use crate::ratelimit::RateLimiter;
use crate::registry::Registry;
use llm::params::{self, Parameters};
use llm::{categorize, ErrorCategory, Generation, LlmError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Provider name used when a model cannot be resolved at all.
pub const UNKNOWN_PROVIDER: &str = "unknown";

/// Per-run settings the processor applies to every model.
#[derive(Clone, Default)]
pub struct ProcessorOptions {
    /// Explicit API keys keyed by provider.
    pub api_keys: HashMap<String, String>,
    /// Overrides layered on each model's default parameters.
    pub parameters: Parameters,
    /// Count prompt tokens before generating.
    pub check_input_limits: bool,
    /// Stamped on every audit event.
    pub correlation_id: String,
}

impl ProcessorOptions {
    /// Options taken from a run configuration.
    pub fn from_config(config: &RunConfig, correlation_id: impl Into<String>) -> Self {
        Self {
            api_keys: config.api_keys.clone(),
            parameters: config.parameters.clone(),
            check_input_limits: config.check_input_limits,
            correlation_id: correlation_id.into(),
        }
    }
}

/// Runs one model call through registry, rate limiter and categorizer.
#[derive(Clone)]
pub struct ModelProcessor {
    registry: Arc<Registry>,
    limiter: Arc<RateLimiter>,
    audit: Arc<dyn AuditLogger>,
    options: Arc<ProcessorOptions>,
}

impl ModelProcessor {
    pub fn new(
        registry: Arc<Registry>,
        limiter: Arc<RateLimiter>,
        audit: Arc<dyn AuditLogger>,
        options: ProcessorOptions,
    ) -> Self {
        Self {
            registry,
            limiter,
            audit,
            options: Arc::new(options),
        }
    }

    /// Correlation id stamped on this processor's audit events.
    pub fn correlation_id(&self) -> &str {
        &self.options.correlation_id
    }

    /// Audit sink shared with the rest of the run.
    pub fn audit(&self) -> &Arc<dyn AuditLogger> {
        &self.audit
    }

    /// Process one model. Never panics and never returns an error; the
    /// outcome is in the result's `status` and `err`.
    pub async fn process(
        &self,
        cancel: &CancellationToken,
        model_index: usize,
        model_name: &str,
        instructions: &str,
    ) -> ProcessingResult {
        let start = Instant::now();
        let provider = self
            .registry
            .provider_name(model_name)
            .unwrap_or_else(|| UNKNOWN_PROVIDER.to_string());
        debug!(model = %model_name, index = model_index, status = %ModelStatus::Queued, "Model queued");

        let outcome = self
            .dispatch(cancel, model_name, &provider, instructions)
            .await;
        let duration = start.elapsed();

        let result = match outcome {
            Ok(generation) => ProcessingResult::completed(
                model_index,
                model_name,
                &provider,
                generation.content,
                generation.usage,
                duration,
            ),
            Err(err) => ProcessingResult::failed(model_index, model_name, &provider, err, duration),
        };
        self.record(&result);
        result
    }

    async fn dispatch(
        &self,
        cancel: &CancellationToken,
        model_name: &str,
        provider: &str,
        instructions: &str,
    ) -> Result<Generation, LlmError> {
        if cancel.is_cancelled() {
            return Err(LlmError::cancelled(provider, "cancelled before dispatch"));
        }

        let resolved = self
            .registry
            .resolve(model_name, self.options.api_keys.get(provider).map(String::as_str))
            .map_err(|e| e.into_llm_error(provider))?;
        let client = resolved.client;

        debug!(model = %model_name, status = %ModelStatus::RateLimited, "Waiting for rate limit");
        let permit = self
            .limiter
            .acquire(cancel, model_name)
            .await
            .map_err(|e| LlmError::cancelled(provider, e.message))?;

        debug!(model = %model_name, status = %ModelStatus::Processing, "Calling provider");
        if self.options.check_input_limits {
            let counted = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(LlmError::cancelled(provider, "cancelled while counting tokens"));
                }
                counted = client.count_tokens(instructions) => counted,
            };
            match counted {
                Ok(tokens) if tokens > resolved.definition.context_window => {
                    return Err(LlmError::new(
                        provider,
                        ErrorCategory::InputLimit,
                        format!(
                            "prompt is {} tokens, {} accepts at most {}",
                            tokens, model_name, resolved.definition.context_window
                        ),
                    ));
                }
                Ok(tokens) => debug!(model = %model_name, tokens, "Prompt fits context window"),
                Err(e) => {
                    warn!(model = %model_name, error = %e, "Token count failed, generating anyway")
                }
            }
        }

        let mut parameters = params::merge(&resolved.definition.default_parameters, &self.options.parameters);
        parameters
            .entry(params::MAX_TOKENS)
            .or_insert_with(|| resolved.definition.max_output_tokens.into());

        let generated = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LlmError::cancelled(provider, "cancelled during generation")),
            generated = client.generate_content(instructions, &parameters) => {
                generated.map_err(|e| categorize(provider, &e))
            }
        };
        permit.release();

        if let Err(e) = client.close().await {
            debug!(model = %model_name, error = %e, "Client close failed");
        }
        generated
    }

    fn record(&self, result: &ProcessingResult) {
        let correlation_id = self.options.correlation_id.as_str();
        let duration_ms = result.duration.as_millis() as u64;

        let event = match (&result.status, &result.err) {
            (ModelStatus::Completed, _) => {
                info!(
                    model = %result.model_name,
                    provider = %result.provider,
                    duration_ms,
                    "Model completed"
                );
                let tokens = result.token_usage.map(|u| u.total_tokens).unwrap_or(0);
                AuditEvent::info(
                    AuditOperation::ModelProcessingComplete,
                    correlation_id,
                    format!("{} completed", result.model_name),
                )
                .with_output("content_length", result.content.as_ref().map_or(0, String::len))
                .with_output("total_tokens", tokens)
            }
            (ModelStatus::Cancelled, err) => {
                warn!(model = %result.model_name, duration_ms, "Model cancelled");
                AuditEvent::warn(
                    AuditOperation::ModelProcessingCancelled,
                    correlation_id,
                    format!("{} cancelled", result.model_name),
                )
                .with_output("category", ErrorCategory::Cancelled.as_str())
                .with_output(
                    "error",
                    err.as_ref().map(|e| e.message.clone()).unwrap_or_default(),
                )
            }
            (_, err) => {
                let category = err.as_ref().map_or(ErrorCategory::Unknown, |e| e.category);
                let message = err.as_ref().map(|e| e.message.clone()).unwrap_or_default();
                warn!(
                    model = %result.model_name,
                    provider = %result.provider,
                    category = %category,
                    duration_ms,
                    error = %message,
                    "Model failed"
                );
                AuditEvent::error(
                    AuditOperation::ModelProcessingFailed,
                    correlation_id,
                    format!("{} failed: {}", result.model_name, category),
                )
                .with_output("category", category.as_str())
                .with_output("error", message)
                .with_output(
                    "status_code",
                    err.as_ref().and_then(|e| e.status_code).map(u64::from),
                )
            }
        };

        audit::emit(
            self.audit.as_ref(),
            event
                .with_input("model", result.model_name.as_str())
                .with_input("model_index", result.model_index)
                .with_metadata("provider", result.provider.as_str())
                .with_metadata("duration_ms", duration_ms),
        );
    }
}
