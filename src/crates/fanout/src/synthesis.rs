//! Combines several successful outputs into one.
//!
//! The synthesis call goes through the same [`ModelProcessor`] as every
//! other model, so it is rate limited, categorized and audited like one.

use crate::audit::{self, AuditEvent, AuditOperation};
use crate::models::ProcessingResult;
use crate::processor::ModelProcessor;
use llm::{ErrorCategory, LlmError};
use std::fmt::Write as _;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const COMPONENT: &str = "synthesis";

/// Minimum number of successful outputs worth combining.
pub const MIN_SYNTHESIS_INPUTS: usize = 2;

/// Builds the synthesis prompt and dispatches it.
#[derive(Clone)]
pub struct SynthesisService {
    processor: ModelProcessor,
    instructions: String,
}

impl SynthesisService {
    /// Service for a run with the given original instructions.
    pub fn new(processor: ModelProcessor, instructions: impl Into<String>) -> Self {
        Self {
            processor,
            instructions: instructions.into(),
        }
    }

    /// Prompt embedding the instructions and each output, labelled by model.
    pub fn build_prompt(instructions: &str, results: &[&ProcessingResult]) -> String {
        let mut prompt = String::new();
        let _ = writeln!(
            prompt,
            "You are given the responses of {} language models to the same instructions.",
            results.len()
        );
        prompt.push_str(
            "Combine them into a single answer. Keep what they agree on, resolve \
             contradictions explicitly and drop repetition.\n\n",
        );
        prompt.push_str("## Original instructions\n\n");
        prompt.push_str(instructions.trim_end());
        prompt.push_str("\n\n## Responses\n");
        for result in results {
            let _ = write!(
                prompt,
                "\n### {}\n\n{}\n",
                result.model_name,
                result.content.as_deref().unwrap_or_default().trim_end()
            );
        }
        prompt.push_str("\n## Synthesized answer\n");
        prompt
    }

    /// Combine `successes` with `synthesis_model`.
    ///
    /// Results without content are ignored; fewer than two usable inputs is
    /// an `InvalidRequest` error.
    pub async fn synthesize(
        &self,
        cancel: &CancellationToken,
        successes: &[ProcessingResult],
        synthesis_model: &str,
    ) -> Result<String, LlmError> {
        let correlation_id = self.processor.correlation_id().to_string();
        let inputs: Vec<&ProcessingResult> = successes
            .iter()
            .filter(|r| r.is_success() && r.content.is_some())
            .collect();

        if inputs.len() < MIN_SYNTHESIS_INPUTS {
            return Err(LlmError::new(
                COMPONENT,
                ErrorCategory::InvalidRequest,
                format!(
                    "synthesis needs at least {} successful outputs, got {}",
                    MIN_SYNTHESIS_INPUTS,
                    inputs.len()
                ),
            ));
        }

        let sources: Vec<&str> = inputs.iter().map(|r| r.model_name.as_str()).collect();
        info!(model = %synthesis_model, inputs = inputs.len(), "Starting synthesis");
        audit::emit(
            self.processor.audit().as_ref(),
            AuditEvent::info(
                AuditOperation::SynthesisStart,
                correlation_id.as_str(),
                format!("synthesizing {} outputs with {}", inputs.len(), synthesis_model),
            )
            .with_input("synthesis_model", synthesis_model)
            .with_input("sources", sources),
        );

        let prompt = Self::build_prompt(&self.instructions, &inputs);
        let result = self
            .processor
            .process(cancel, inputs.len(), synthesis_model, &prompt)
            .await;

        match (result.content, result.err) {
            (Some(content), None) => {
                audit::emit(
                    self.processor.audit().as_ref(),
                    AuditEvent::info(
                        AuditOperation::SynthesisComplete,
                        correlation_id.as_str(),
                        format!("synthesis with {} completed", synthesis_model),
                    )
                    .with_output("content_length", content.len()),
                );
                Ok(content)
            }
            (_, err) => {
                let err = err.unwrap_or_else(|| {
                    LlmError::new(COMPONENT, ErrorCategory::Unknown, "synthesis produced no content")
                });
                warn!(model = %synthesis_model, category = %err.category, "Synthesis failed");
                audit::emit(
                    self.processor.audit().as_ref(),
                    AuditEvent::warn(
                        AuditOperation::SynthesisFailed,
                        correlation_id.as_str(),
                        format!("synthesis with {} failed: {}", synthesis_model, err.category),
                    )
                    .with_output("category", err.category.as_str())
                    .with_output("error", err.message.as_str()),
                );
                Err(err)
            }
        }
    }
}
