//! Concurrent multi-provider LLM fan-out.
//!
//! One set of instructions goes to many models at once. The engine bounds
//! concurrency globally, throttles each model with a token bucket,
//! categorizes every provider failure into one taxonomy and can synthesize
//! the successful outputs into a single answer.
//!
//! # Components
//!
//! - **Registry** - model/provider catalog, API key resolution, client construction
//! - **RateLimiter** - global semaphore plus per-model token buckets
//! - **ModelProcessor** - one model from queued to a terminal state
//! - **Orchestrator** - fan-out, ordered fan-in, failure policy
//! - **SynthesisService** - combines successful outputs
//!
//! Error categorization lives in the `llm` crate next to the provider
//! clients.
//!
//! # Example
//!
//! ```rust,ignore
//! use fanout::{Orchestrator, Registry, RunConfig};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let orchestrator = Orchestrator::new(Arc::new(Registry::builtin()));
//!     let config = RunConfig::new(["gpt-4.1", "gemini-2.5-pro", "claude-sonnet-4"], "Explain CRDTs")
//!         .with_synthesis_model("gemini-2.5-pro");
//!
//!     let outcome = orchestrator.execute(&CancellationToken::new(), &config).await;
//!     for result in &outcome.results {
//!         println!("{} {}", result.model_name, result.status);
//!     }
//! }
//! ```

pub mod audit;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod output;
pub mod processor;
pub mod ratelimit;
pub mod registry;
pub mod synthesis;
pub mod testing;

pub use audit::{
    AuditEvent, AuditLevel, AuditLogger, AuditOperation, MemoryAuditLogger, NoopAuditLogger,
    TracingAuditLogger,
};
pub use config::{FailureMode, RunConfig};
pub use error::{AuditError, ConfigError, RegistryError, Result};
pub use models::{
    ModelDefinition, ModelStatus, ProcessingResult, ProviderDefinition, RateLimitConfig,
    RunOutcome,
};
pub use orchestrator::Orchestrator;
pub use output::{write_outcome, OutputWriter};
pub use processor::{ModelProcessor, ProcessorOptions};
pub use ratelimit::{RateLimiter, RateLimiterStats, RatePermit};
pub use registry::{ClientFactory, DetectionRule, EnvLookup, HttpClientFactory, Registry};
pub use synthesis::SynthesisService;

pub use llm::{ErrorCategory, LlmError};
pub use tokio_util::sync::CancellationToken;
