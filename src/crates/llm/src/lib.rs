//! Provider boundary for the fan-out engine.
//!
//! This crate defines the [`ProviderClient`] capability that every LLM
//! provider implements, the canonical error model ([`LlmError`],
//! [`ErrorCategory`]) and the categorizer that maps provider-native failures
//! onto it.
//!
//! # Remote Providers
//!
//! - **OpenAI** - GPT-4.1 and the o-series reasoning models
//! - **Gemini** - Google's Gemini 2.5 models
//! - **Claude** - Anthropic's Claude 4 models
//! - **OpenRouter** - Unified API for DeepSeek, Grok, Llama and others
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use llm::remote::OpenAiClient;
//! use llm::{categorize, Parameters, ProviderClient, RemoteLlmConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RemoteLlmConfig::new(api_key, "https://api.openai.com/v1", "gpt-4.1");
//!     let client = OpenAiClient::new(config)?;
//!
//!     match client.generate_content("Explain quantum computing briefly", &Parameters::new()).await {
//!         Ok(generation) => println!("{}", generation.content),
//!         Err(e) => {
//!             let err = categorize(client.provider(), &e);
//!             eprintln!("{} ({})", err, err.suggestion);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod categorize;
pub mod client;
pub mod config;
pub mod error;
pub mod mock;
pub mod params;

#[cfg(feature = "remote")]
pub mod remote;

// Re-export commonly used types
pub use categorize::{categorize, categorize_message, categorize_status, sanitize};
pub use client::{estimate_tokens, Generation, ProviderClient, TokenUsage};
pub use config::RemoteLlmConfig;
pub use error::{ErrorCategory, LlmError, ProviderError, ProviderResult, Result};
pub use params::Parameters;
