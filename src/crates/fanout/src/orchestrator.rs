//! Fan-out / fan-in of one run.
//!
//! The orchestrator spawns one task per requested model, collects results in
//! completion order, restores request order by `model_index`, applies the
//! failure policy and optionally synthesizes the successful outputs.
//!
//! Concurrency is bounded by the run's [`RateLimiter`], not by the number of
//! spawned tasks. Cancellation flows through one token: the caller's token,
//! or a child of it that a timer cancels when the run has a deadline.

use crate::audit::{self, AuditEvent, AuditLogger, AuditOperation, NoopAuditLogger};
use crate::config::{FailureMode, RunConfig};
use crate::models::{ProcessingResult, RateLimitConfig, RunOutcome};
use crate::processor::{ModelProcessor, ProcessorOptions, UNKNOWN_PROVIDER};
use crate::ratelimit::RateLimiter;
use crate::registry::Registry;
use crate::synthesis::{SynthesisService, MIN_SYNTHESIS_INPUTS};
use llm::{ErrorCategory, LlmError};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const COMPONENT: &str = "orchestrator";

/// Runs fan-outs against a shared registry.
#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<Registry>,
    audit: Arc<dyn AuditLogger>,
}

impl Orchestrator {
    /// Orchestrator that discards audit events.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            audit: Arc::new(NoopAuditLogger),
        }
    }

    /// Send audit events to `audit`.
    pub fn with_audit_logger(mut self, audit: Arc<dyn AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Run the models and instructions named in `config`.
    pub async fn execute(&self, cancel: &CancellationToken, config: &RunConfig) -> RunOutcome {
        self.run(cancel, &config.models, &config.instructions, config)
            .await
    }

    /// Dispatch `instructions` to every model in `model_names`.
    ///
    /// Always returns one result per requested model, in request order.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        model_names: &[String],
        instructions: &str,
        config: &RunConfig,
    ) -> RunOutcome {
        let started = Instant::now();
        let correlation_id = config
            .correlation_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        info!(
            correlation_id = %correlation_id,
            models = model_names.len(),
            mode = %config.failure_mode,
            "Starting fan-out run"
        );
        audit::emit(
            self.audit.as_ref(),
            AuditEvent::info(
                AuditOperation::ExecuteStart,
                correlation_id.as_str(),
                format!("dispatching to {} models", model_names.len()),
            )
            .with_input("models", model_names.to_vec())
            .with_input("instructions_length", instructions.len())
            .with_metadata("failure_mode", config.failure_mode.to_string())
            .with_metadata("max_concurrency", config.max_concurrency),
        );

        let outcome = match self.precheck(model_names, config) {
            Err(err) => self.rejected(correlation_id, model_names, err),
            Ok(()) => {
                self.fan_out(cancel, model_names, instructions, config, correlation_id)
                    .await
            }
        };

        self.record_end(&outcome, started.elapsed());
        outcome
    }

    fn precheck(&self, model_names: &[String], config: &RunConfig) -> Result<(), LlmError> {
        if model_names.is_empty() {
            return Err(LlmError::new(
                COMPONENT,
                ErrorCategory::InvalidRequest,
                "no models requested",
            ));
        }
        config.validate()?;
        Ok(())
    }

    /// Outcome for a run that never dispatched.
    fn rejected(&self, correlation_id: String, model_names: &[String], err: LlmError) -> RunOutcome {
        warn!(correlation_id = %correlation_id, error = %err, "Run rejected");
        let results = model_names
            .iter()
            .enumerate()
            .map(|(index, name)| {
                ProcessingResult::failed(
                    index,
                    name,
                    self.provider_of(name),
                    err.clone(),
                    Duration::ZERO,
                )
            })
            .collect();
        RunOutcome {
            correlation_id,
            results,
            synthesized: None,
            synthesis_error: None,
            overall_err: Some(err),
        }
    }

    async fn fan_out(
        &self,
        cancel: &CancellationToken,
        model_names: &[String],
        instructions: &str,
        config: &RunConfig,
        correlation_id: String,
    ) -> RunOutcome {
        let run_cancel = cancel.child_token();
        let timer = config.timeout().map(|timeout| {
            let token = run_cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                warn!(timeout_ms = timeout.as_millis() as u64, "Run deadline reached, cancelling");
                token.cancel();
            })
        });

        let limiter = Arc::new(self.build_limiter(model_names, config));
        let processor = ModelProcessor::new(
            Arc::clone(&self.registry),
            limiter,
            Arc::clone(&self.audit),
            ProcessorOptions::from_config(config, correlation_id.as_str()),
        );

        let results = self
            .collect(&run_cancel, &processor, model_names, instructions)
            .await;

        let deadline_hit = run_cancel.is_cancelled() && !cancel.is_cancelled();
        let overall_err = evaluate(config.failure_mode, &results, deadline_hit);

        let (synthesized, synthesis_error) = match config.synthesis_model.as_deref() {
            Some(model) => {
                self.maybe_synthesize(&run_cancel, &processor, &results, instructions, model)
                    .await
            }
            None => (None, None),
        };

        if let Some(timer) = timer {
            timer.abort();
        }

        RunOutcome {
            correlation_id,
            results,
            synthesized,
            synthesis_error,
            overall_err,
        }
    }

    /// Spawn one task per model and gather the results in request order.
    async fn collect(
        &self,
        cancel: &CancellationToken,
        processor: &ModelProcessor,
        model_names: &[String],
        instructions: &str,
    ) -> Vec<ProcessingResult> {
        let instructions: Arc<str> = Arc::from(instructions);
        let mut tasks = JoinSet::new();
        for (index, name) in model_names.iter().enumerate() {
            let processor = processor.clone();
            let cancel = cancel.clone();
            let name = name.clone();
            let instructions = Arc::clone(&instructions);
            tasks.spawn(async move { processor.process(&cancel, index, &name, &instructions).await });
        }

        let mut slots: Vec<Option<ProcessingResult>> = vec![None; model_names.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => {
                    debug!(model = %result.model_name, index = result.model_index, status = %result.status, "Model finished");
                    let index = result.model_index;
                    slots[index] = Some(result);
                }
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => error!(error = %e, "Model task aborted"),
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    let name = &model_names[index];
                    ProcessingResult::failed(
                        index,
                        name,
                        self.provider_of(name),
                        LlmError::new(COMPONENT, ErrorCategory::Unknown, "model task reported no result"),
                        Duration::ZERO,
                    )
                })
            })
            .collect()
    }

    async fn maybe_synthesize(
        &self,
        cancel: &CancellationToken,
        processor: &ModelProcessor,
        results: &[ProcessingResult],
        instructions: &str,
        model: &str,
    ) -> (Option<String>, Option<LlmError>) {
        let successes: Vec<ProcessingResult> =
            results.iter().filter(|r| r.is_success()).cloned().collect();

        let skip_reason = if cancel.is_cancelled() {
            Some("run was cancelled".to_string())
        } else if successes.len() < MIN_SYNTHESIS_INPUTS {
            Some(format!(
                "{} successful outputs, {} required",
                successes.len(),
                MIN_SYNTHESIS_INPUTS
            ))
        } else {
            None
        };

        if let Some(reason) = skip_reason {
            info!(model = %model, reason = %reason, "Skipping synthesis");
            audit::emit(
                self.audit.as_ref(),
                AuditEvent::info(
                    AuditOperation::SynthesisSkipped,
                    processor.correlation_id(),
                    format!("synthesis skipped: {}", reason),
                )
                .with_input("synthesis_model", model)
                .with_output("successes", successes.len()),
            );
            return (None, None);
        }

        match SynthesisService::new(processor.clone(), instructions)
            .synthesize(cancel, &successes, model)
            .await
        {
            Ok(content) => (Some(content), None),
            Err(err) => (None, Some(err)),
        }
    }

    /// Token bucket settings per model: run-level model limit, then
    /// run-level provider limit, then the provider's own default. Models
    /// with none of these use the run's default limit.
    fn build_limiter(&self, model_names: &[String], config: &RunConfig) -> RateLimiter {
        let limiter = RateLimiter::new(config.max_concurrency, config.default_rate_limit);
        let synthesis = config.synthesis_model.iter();
        for name in model_names.iter().chain(synthesis) {
            if let Some(limit) = self.limit_for(name, config) {
                limiter.set_model_limit(name.as_str(), limit);
            }
        }
        limiter
    }

    fn limit_for(&self, model: &str, config: &RunConfig) -> Option<RateLimitConfig> {
        if let Some(limit) = config.model_rate_limits.get(model) {
            return Some(*limit);
        }
        let provider = self.registry.provider_name(model)?;
        config
            .provider_rate_limits
            .get(&provider)
            .copied()
            .or_else(|| self.registry.provider(&provider)?.default_rate_limit)
    }

    fn provider_of(&self, model: &str) -> String {
        self.registry
            .provider_name(model)
            .unwrap_or_else(|| UNKNOWN_PROVIDER.to_string())
    }

    fn record_end(&self, outcome: &RunOutcome, elapsed: Duration) {
        let successes = outcome.success_count();
        let failures = outcome.results.len() - successes;
        let duration_ms = elapsed.as_millis() as u64;

        let event = match &outcome.overall_err {
            None => {
                info!(
                    correlation_id = %outcome.correlation_id,
                    successes,
                    failures,
                    duration_ms,
                    "Fan-out run completed"
                );
                AuditEvent::info(
                    AuditOperation::ExecuteEnd,
                    outcome.correlation_id.as_str(),
                    format!("{} of {} models succeeded", successes, outcome.results.len()),
                )
            }
            Some(err) => {
                error!(
                    correlation_id = %outcome.correlation_id,
                    category = %err.category,
                    successes,
                    failures,
                    duration_ms,
                    "Fan-out run failed"
                );
                AuditEvent::error(
                    AuditOperation::ExecuteEnd,
                    outcome.correlation_id.as_str(),
                    format!("run failed: {}", err),
                )
                .with_output("category", err.category.as_str())
            }
        };

        audit::emit(
            self.audit.as_ref(),
            event
                .with_output("successes", successes)
                .with_output("failures", failures)
                .with_output("synthesized", outcome.synthesized.is_some())
                .with_output("total_tokens", outcome.total_tokens())
                .with_metadata("duration_ms", duration_ms),
        );
    }
}

/// Apply the failure policy.
///
/// Tolerant runs fail only when nothing succeeded; strict runs fail on any
/// failure. The reported error carries the most severe category, ties going
/// to the lowest `model_index`, and `details` lists every failure.
pub fn evaluate(
    mode: FailureMode,
    results: &[ProcessingResult],
    deadline_hit: bool,
) -> Option<LlmError> {
    let failures: Vec<(&ProcessingResult, &LlmError)> = results
        .iter()
        .filter(|r| !r.is_success())
        .filter_map(|r| r.err.as_ref().map(|e| (r, e)))
        .collect();

    let run_failed = match mode {
        FailureMode::Tolerant => results.iter().all(|r| !r.is_success()),
        FailureMode::Strict => !failures.is_empty(),
    };
    if !run_failed || failures.is_empty() {
        return None;
    }

    let (worst_result, worst) = most_severe(&failures)?;

    let mut details = String::new();
    if deadline_hit {
        details.push_str("run deadline reached\n");
    }
    for (result, err) in &failures {
        let _ = writeln!(
            details,
            "[{}] {} ({}): {}",
            result.model_index, result.model_name, err.category, err.message
        );
    }

    let message = format!(
        "{} of {} models failed; most severe: {} from {}",
        failures.len(),
        results.len(),
        worst.category,
        worst_result.model_name
    );
    let mut overall = LlmError::new(worst.provider.as_str(), worst.category, message)
        .with_details(details.trim_end())
        .with_original(worst.clone());
    overall.status_code = worst.status_code;
    Some(overall)
}

fn most_severe<'a>(
    failures: &[(&'a ProcessingResult, &'a LlmError)],
) -> Option<(&'a ProcessingResult, &'a LlmError)> {
    let mut worst: Option<(&ProcessingResult, &LlmError)> = None;
    // Input is in model_index order; strict comparison keeps the lowest index on ties.
    for &(result, err) in failures {
        match worst {
            Some((_, current)) if err.category.severity() <= current.category.severity() => {}
            _ => worst = Some((result, err)),
        }
    }
    worst
}
