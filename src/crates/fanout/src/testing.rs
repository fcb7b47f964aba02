//! Test infrastructure.
//!
//! [`MockClientFactory`] plugs scripted [`MockClient`]s into a [`Registry`]
//! so the whole dispatch path (key resolution, rate limiting,
//! categorization, auditing) runs without network access.
//!
//! # Example
//! ```rust,ignore
//! use fanout::testing::{mock_registry, MockClientFactory};
//!
//! let factory = Arc::new(MockClientFactory::new().with_default_delay(Duration::from_millis(50)));
//! let registry = Arc::new(mock_registry(factory.clone()));
//! ```

use crate::error::RegistryError;
use crate::models::{ModelDefinition, ProviderDefinition};
use crate::registry::{ClientFactory, EnvLookup, Registry};
use llm::mock::{MockClient, MockStats};
use llm::ProviderClient;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// API key every env lookup in [`mock_registry`] returns.
pub const TEST_API_KEY: &str = "test-key";

/// Factory handing out scripted clients.
///
/// Models registered with [`with_client`](Self::with_client) get that
/// client (and keep its own stats). Every other model gets a default client
/// that shares [`stats`](Self::stats).
#[derive(Default)]
pub struct MockClientFactory {
    clients: Mutex<HashMap<String, MockClient>>,
    default_delay: Duration,
    stats: Arc<MockStats>,
    created: Mutex<Vec<(String, String)>>,
}

impl MockClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `client` for `model`.
    pub fn with_client(self, model: impl Into<String>, client: MockClient) -> Self {
        self.clients.lock().insert(model.into(), client);
        self
    }

    /// Delay for default clients.
    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// Stats shared by default clients.
    pub fn stats(&self) -> Arc<MockStats> {
        Arc::clone(&self.stats)
    }

    /// Model names clients were created for, in creation order.
    pub fn created(&self) -> Vec<String> {
        self.created.lock().iter().map(|(m, _)| m.clone()).collect()
    }

    /// API key handed over for the most recent client of `model`.
    pub fn key_for(&self, model: &str) -> Option<String> {
        self.created
            .lock()
            .iter()
            .rev()
            .find(|(m, _)| m == model)
            .map(|(_, k)| k.clone())
    }
}

impl ClientFactory for MockClientFactory {
    fn create(
        &self,
        model: &ModelDefinition,
        provider: &ProviderDefinition,
        api_key: String,
    ) -> Result<Arc<dyn ProviderClient>, RegistryError> {
        self.created.lock().push((model.name.clone(), api_key));
        let client = self.clients.lock().get(&model.name).cloned().unwrap_or_else(|| {
            MockClient::new(provider.name.as_str(), model.api_model_id.as_str())
                .with_delay(self.default_delay)
                .with_stats(Arc::clone(&self.stats))
        });
        Ok(Arc::new(client))
    }
}

/// Env lookup answering [`TEST_API_KEY`] for every variable.
pub fn test_env() -> EnvLookup {
    Arc::new(|_| Some(TEST_API_KEY.to_string()))
}

/// Built-in registry wired to `factory`, with every API key present.
pub fn mock_registry(factory: Arc<MockClientFactory>) -> Registry {
    Registry::builtin()
        .with_env_lookup(test_env())
        .with_client_factory(factory)
}
