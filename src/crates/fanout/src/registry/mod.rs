//! Model registry and client construction.
//!
//! The registry maps a requested model name to its [`ModelDefinition`] and
//! [`ProviderDefinition`], resolves the API key and builds a
//! [`ProviderClient`] through a [`ClientFactory`]. Names that are not
//! registered fall through an ordered list of regex [`DetectionRule`]s that
//! synthesize a conservative definition for the detected provider.
//!
//! Resolution has no side effects: no network traffic happens until the
//! client's first call, and environment reads go through an injected
//! [`EnvLookup`].
//!
//! # Example
//!
//! ```rust,ignore
//! use fanout::Registry;
//!
//! let registry = Registry::builtin();
//! let client = registry.create_client("gemini-2.5-pro", None)?;
//! ```

mod catalog;

use crate::error::RegistryError;
use crate::models::{ModelDefinition, ProviderDefinition};
use llm::remote::{ClaudeClient, GeminiClient, OpenAiClient, OpenRouterClient};
use llm::{ProviderClient, ProviderError, RemoteLlmConfig};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Context window assumed for detected (unregistered) models.
pub const DETECTED_CONTEXT_WINDOW: u32 = 128_000;
/// Output limit assumed for detected (unregistered) models.
pub const DETECTED_MAX_OUTPUT_TOKENS: u32 = 8_192;

/// Reads an environment variable by name.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Lookup backed by the process environment.
pub fn process_env() -> EnvLookup {
    Arc::new(|name| std::env::var(name).ok())
}

/// Builds provider clients from resolved definitions.
pub trait ClientFactory: Send + Sync {
    /// Create a client for `model`, served by `provider`, using `api_key`.
    fn create(
        &self,
        model: &ModelDefinition,
        provider: &ProviderDefinition,
        api_key: String,
    ) -> Result<Arc<dyn ProviderClient>, RegistryError>;
}

/// Factory producing the HTTP clients from the `llm` crate.
///
/// Built-in providers without a `base_url` use the client's public
/// endpoint. Any other provider is treated as an OpenAI-compatible endpoint
/// and must carry a `base_url`.
#[derive(Debug, Clone)]
pub struct HttpClientFactory {
    timeout: Duration,
    app_name: Option<String>,
}

impl HttpClientFactory {
    /// Factory with a 120 second request timeout.
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            app_name: None,
        }
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Application name reported to OpenRouter.
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }
}

impl Default for HttpClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientFactory for HttpClientFactory {
    fn create(
        &self,
        model: &ModelDefinition,
        provider: &ProviderDefinition,
        api_key: String,
    ) -> Result<Arc<dyn ProviderClient>, RegistryError> {
        let creation_error = |e: ProviderError| RegistryError::ClientCreation {
            model: model.name.clone(),
            message: e.to_string(),
        };
        let base_url = provider
            .base_url
            .clone()
            .or_else(|| default_base_url(&provider.name).map(str::to_string))
            .ok_or_else(|| RegistryError::ClientCreation {
                model: model.name.clone(),
                message: format!("provider {} has no base URL", provider.name),
            })?;
        let config =
            RemoteLlmConfig::new(api_key, base_url, &model.api_model_id).with_timeout(self.timeout);

        let client: Arc<dyn ProviderClient> = match provider.name.as_str() {
            "gemini" => Arc::new(GeminiClient::new(config).map_err(creation_error)?),
            "anthropic" => Arc::new(ClaudeClient::new(config).map_err(creation_error)?),
            "openrouter" => {
                let mut client = OpenRouterClient::new(config).map_err(creation_error)?;
                if let Some(app_name) = &self.app_name {
                    client = client.with_app_name(app_name);
                }
                Arc::new(client)
            }
            _ => Arc::new(OpenAiClient::new(config).map_err(creation_error)?),
        };
        Ok(client)
    }
}

/// Public endpoint of a built-in provider.
fn default_base_url(provider: &str) -> Option<&'static str> {
    match provider {
        "openai" => Some(llm::remote::openai::DEFAULT_BASE_URL),
        "gemini" => Some(llm::remote::gemini::DEFAULT_BASE_URL),
        "anthropic" => Some(llm::remote::claude::DEFAULT_BASE_URL),
        "openrouter" => Some(llm::remote::openrouter::DEFAULT_BASE_URL),
        _ => None,
    }
}

/// Maps unregistered model names to a provider.
#[derive(Debug, Clone)]
pub struct DetectionRule {
    pattern: Regex,
    provider: String,
}

impl DetectionRule {
    /// Create a rule. If the pattern has a capture group, group 1 becomes
    /// the wire model id; otherwise the whole name is sent.
    pub fn new(pattern: &str, provider: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            provider: provider.into(),
        })
    }

    /// Provider and wire model id when `model` matches.
    fn detect(&self, model: &str) -> Option<(String, String)> {
        let captures = self.pattern.captures(model)?;
        let api_model_id = captures
            .get(1)
            .map_or(model, |m| m.as_str())
            .to_string();
        Some((self.provider.clone(), api_model_id))
    }
}

/// A model ready to call.
#[derive(Clone)]
pub struct ResolvedModel {
    pub definition: ModelDefinition,
    pub provider: ProviderDefinition,
    pub client: Arc<dyn ProviderClient>,
}

/// Model and provider catalog.
pub struct Registry {
    models: HashMap<String, ModelDefinition>,
    providers: HashMap<String, ProviderDefinition>,
    rules: Vec<DetectionRule>,
    env: EnvLookup,
    factory: Arc<dyn ClientFactory>,
}

impl Registry {
    /// Empty registry with the built-in detection rules.
    pub fn new() -> Self {
        Self {
            models: HashMap::new(),
            providers: HashMap::new(),
            rules: catalog::detection_rules(),
            env: process_env(),
            factory: Arc::new(HttpClientFactory::new()),
        }
    }

    /// Registry preloaded with the built-in providers and models.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for provider in catalog::providers() {
            registry.register_provider(provider);
        }
        for model in catalog::models() {
            registry.register_model(model);
        }
        registry
    }

    /// Replace the environment lookup.
    pub fn with_env_lookup(mut self, env: EnvLookup) -> Self {
        self.env = env;
        self
    }

    /// Replace the client factory.
    pub fn with_client_factory(mut self, factory: Arc<dyn ClientFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Add a detection rule, tried before the built-in ones.
    pub fn with_detection_rule(mut self, rule: DetectionRule) -> Self {
        self.rules.insert(0, rule);
        self
    }

    /// Register (or replace) a model.
    pub fn register_model(&mut self, model: ModelDefinition) {
        self.models.insert(model.name.clone(), model);
    }

    /// Register (or replace) a provider.
    pub fn register_provider(&mut self, provider: ProviderDefinition) {
        self.providers.insert(provider.name.clone(), provider);
    }

    /// Registered model names, sorted.
    pub fn model_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.keys().cloned().collect();
        names.sort();
        names
    }

    /// Registered provider names, sorted.
    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Registered models served by `provider`, sorted by name.
    pub fn models_for_provider(&self, provider: &str) -> Vec<&ModelDefinition> {
        let mut models: Vec<&ModelDefinition> = self
            .models
            .values()
            .filter(|m| m.provider == provider)
            .collect();
        models.sort_by(|a, b| a.name.cmp(&b.name));
        models
    }

    /// Provider definition by name.
    pub fn provider(&self, name: &str) -> Option<&ProviderDefinition> {
        self.providers.get(name)
    }

    /// Resolve a model name to its definitions.
    pub fn lookup(
        &self,
        model: &str,
    ) -> Result<(ModelDefinition, ProviderDefinition), RegistryError> {
        let definition = match self.models.get(model) {
            Some(definition) => definition.clone(),
            None => self.detect(model)?,
        };
        let provider = self
            .providers
            .get(&definition.provider)
            .cloned()
            .ok_or_else(|| RegistryError::ProviderNotFound(definition.provider.clone()))?;
        Ok((definition, provider))
    }

    /// Provider name for a model, without requiring the provider to exist.
    pub fn provider_name(&self, model: &str) -> Option<String> {
        match self.models.get(model) {
            Some(definition) => Some(definition.provider.clone()),
            None => self
                .rules
                .iter()
                .find_map(|rule| rule.detect(model))
                .map(|(provider, _)| provider),
        }
    }

    /// Build a client for `model`.
    ///
    /// A non-empty `explicit_api_key` wins over the provider's environment
    /// variable.
    pub fn create_client(
        &self,
        model: &str,
        explicit_api_key: Option<&str>,
    ) -> Result<Arc<dyn ProviderClient>, RegistryError> {
        self.resolve(model, explicit_api_key).map(|resolved| resolved.client)
    }

    /// Look up `model` and build its client in one step.
    pub fn resolve(
        &self,
        model: &str,
        explicit_api_key: Option<&str>,
    ) -> Result<ResolvedModel, RegistryError> {
        let (definition, provider) = self.lookup(model)?;
        let api_key = self.resolve_api_key(&provider, explicit_api_key)?;
        debug!(model = %model, provider = %provider.name, "Creating provider client");
        let client = self.factory.create(&definition, &provider, api_key)?;
        Ok(ResolvedModel {
            definition,
            provider,
            client,
        })
    }

    fn resolve_api_key(
        &self,
        provider: &ProviderDefinition,
        explicit: Option<&str>,
    ) -> Result<String, RegistryError> {
        if let Some(key) = explicit.filter(|k| !k.trim().is_empty()) {
            return Ok(key.to_string());
        }
        (self.env)(&provider.api_key_env_var)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| RegistryError::MissingApiKey {
                provider: provider.name.clone(),
                env_var: provider.api_key_env_var.clone(),
            })
    }

    fn detect(&self, model: &str) -> Result<ModelDefinition, RegistryError> {
        let (provider, api_model_id) = self
            .rules
            .iter()
            .find_map(|rule| rule.detect(model))
            .ok_or_else(|| RegistryError::ModelNotFound(model.to_string()))?;
        debug!(model = %model, provider = %provider, "Detected provider for unregistered model");
        Ok(ModelDefinition::new(
            model,
            provider,
            api_model_id,
            DETECTED_CONTEXT_WINDOW,
            DETECTED_MAX_OUTPUT_TOKENS,
        ))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("models", &self.models.len())
            .field("providers", &self.provider_names())
            .field("rules", &self.rules.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with(pairs: &[(&str, &str)]) -> EnvLookup {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Arc::new(move |name| vars.get(name).cloned())
    }

    #[test]
    fn test_builtin_catalog() {
        let registry = Registry::builtin();
        assert_eq!(
            registry.provider_names(),
            vec!["anthropic", "gemini", "openai", "openrouter"]
        );
        assert_eq!(registry.model_names().len(), 11);
        assert_eq!(registry.models_for_provider("gemini").len(), 2);
        assert_eq!(registry.models_for_provider("openrouter").len(), 4);
    }

    #[test]
    fn test_lookup_registered_model() {
        let registry = Registry::builtin();
        let (model, provider) = registry.lookup("claude-sonnet-4").unwrap();
        assert_eq!(model.api_model_id, "claude-sonnet-4-20250514");
        assert_eq!(provider.name, "anthropic");
        assert_eq!(provider.api_key_env_var, "ANTHROPIC_API_KEY");
    }

    #[test]
    fn test_heuristic_detection() {
        let registry = Registry::builtin();

        let (model, provider) = registry.lookup("gpt-5-preview").unwrap();
        assert_eq!(provider.name, "openai");
        assert_eq!(model.context_window, DETECTED_CONTEXT_WINDOW);
        assert_eq!(model.max_output_tokens, DETECTED_MAX_OUTPUT_TOKENS);

        assert_eq!(registry.lookup("o1-pro").unwrap().1.name, "openai");
        assert_eq!(registry.lookup("gemini-3-ultra").unwrap().1.name, "gemini");
        assert_eq!(registry.lookup("claude-haiku-9").unwrap().1.name, "anthropic");

        let (model, provider) = registry.lookup("mistralai/mistral-large").unwrap();
        assert_eq!(provider.name, "openrouter");
        assert_eq!(model.api_model_id, "mistralai/mistral-large");

        let (model, _) = registry.lookup("openrouter/qwen/qwen3-235b").unwrap();
        assert_eq!(model.api_model_id, "qwen/qwen3-235b");
    }

    #[test]
    fn test_unknown_model() {
        let registry = Registry::builtin();
        let err = registry.lookup("totally-unknown").unwrap_err();
        assert!(matches!(err, RegistryError::ModelNotFound(ref m) if m == "totally-unknown"));
        assert_eq!(registry.provider_name("totally-unknown"), None);
    }

    #[test]
    fn test_custom_detection_rule_takes_precedence() {
        let mut registry = Registry::builtin();
        registry.register_provider(
            ProviderDefinition::new("local", "LOCAL_API_KEY").with_base_url("http://localhost:8080/v1"),
        );
        let registry = registry.with_detection_rule(DetectionRule::new(r"^gpt-oss", "local").unwrap());

        assert_eq!(registry.lookup("gpt-oss-20b").unwrap().1.name, "local");
        assert_eq!(registry.lookup("gpt-4o").unwrap().1.name, "openai");
    }

    #[test]
    fn test_api_key_precedence() {
        let registry =
            Registry::builtin().with_env_lookup(env_with(&[("OPENAI_API_KEY", "env-key")]));
        let (_, provider) = registry.lookup("gpt-4.1").unwrap();

        assert_eq!(
            registry.resolve_api_key(&provider, Some("explicit")).unwrap(),
            "explicit"
        );
        assert_eq!(registry.resolve_api_key(&provider, None).unwrap(), "env-key");
        assert_eq!(registry.resolve_api_key(&provider, Some("  ")).unwrap(), "env-key");
    }

    #[test]
    fn test_missing_api_key() {
        let registry = Registry::builtin().with_env_lookup(env_with(&[]));
        let err = match registry.create_client("gemini-2.5-flash", None) {
            Err(err) => err,
            Ok(_) => panic!("expected missing key"),
        };
        assert!(matches!(
            err,
            RegistryError::MissingApiKey { ref env_var, .. } if env_var == "GEMINI_API_KEY"
        ));
    }

    #[test]
    fn test_http_factory_builds_each_provider() {
        let registry = Registry::builtin().with_env_lookup(env_with(&[]));
        for (model, provider) in [
            ("gpt-4.1", "openai"),
            ("gemini-2.5-pro", "gemini"),
            ("claude-opus-4", "anthropic"),
            ("openrouter/deepseek/deepseek-r1", "openrouter"),
        ] {
            let client = registry.create_client(model, Some("key")).unwrap();
            assert_eq!(client.provider(), provider);
        }
        let client = registry
            .create_client("openrouter/x-ai/grok-3-beta", Some("key"))
            .unwrap();
        assert_eq!(client.model_id(), "x-ai/grok-3-beta");
    }

    #[test]
    fn test_builtin_provider_without_base_url_uses_default() {
        let mut registry = Registry::builtin().with_env_lookup(env_with(&[]));
        registry.register_provider(ProviderDefinition::new("openai", "OPENAI_API_KEY"));
        registry.register_provider(ProviderDefinition::new("anthropic", "ANTHROPIC_API_KEY"));

        let client = registry.create_client("gpt-4.1", Some("key")).unwrap();
        assert_eq!(client.provider(), "openai");
        let client = registry.create_client("claude-sonnet-4", Some("key")).unwrap();
        assert_eq!(client.provider(), "anthropic");
    }

    #[test]
    fn test_custom_provider_requires_base_url() {
        let mut registry = Registry::builtin().with_env_lookup(env_with(&[]));
        registry.register_provider(ProviderDefinition::new("local", "LOCAL_API_KEY"));
        registry.register_model(ModelDefinition::new("local-llama", "local", "llama", 8_192, 2_048));

        let err = match registry.create_client("local-llama", Some("key")) {
            Err(err) => err,
            Ok(_) => panic!("expected missing base URL"),
        };
        assert!(matches!(err, RegistryError::ClientCreation { .. }));

        registry.register_provider(
            ProviderDefinition::new("local", "LOCAL_API_KEY").with_base_url("http://localhost:8080/v1"),
        );
        assert!(registry.create_client("local-llama", Some("key")).is_ok());
    }
}
