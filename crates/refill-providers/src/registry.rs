//! Provider registry (spec §4.2): one client per distinct provider name referenced
//! by any active asset, keyed by canonical name. Initialize once from
//! configuration, hand out singletons by key.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as Json;

use crate::fireblocks::FireblocksProvider;
use crate::liminal::LiminalProvider;
use crate::provider::{Credentials, Provider, ProviderError};

/// Per-provider settings needed to construct and authenticate a client.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub name: String,
    pub base_url: String,
    pub credentials: Credentials,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown provider name: {0}")]
    UnknownProvider(String),
    #[error(transparent)]
    Init(#[from] ProviderError),
}

/// Registry of configured provider clients, indexed by canonical name.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Instantiates exactly one client per entry in `settings` and authenticates it.
    /// Idempotent in spirit: call once at boot with the full settings list.
    pub async fn initialize(settings: Vec<ProviderSettings>) -> Result<Self, RegistryError> {
        let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
        for setting in settings {
            let provider: Arc<dyn Provider> = match setting.name.as_str() {
                "liminal" => Arc::new(LiminalProvider::new(setting.base_url.clone())),
                "fireblocks" => Arc::new(FireblocksProvider::new(setting.base_url.clone())),
                other => return Err(RegistryError::UnknownProvider(other.to_string())),
            };
            provider.init(setting.credentials.clone()).await?;
            providers.insert(setting.name, provider);
        }
        Ok(Self { providers })
    }

    /// `get(name) -> provider?` (spec §4.2).
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// The full provider map, handed to the reconciliation monitor (C7) which
    /// polls every configured provider rather than one resolved by name.
    pub fn all(&self) -> HashMap<String, Arc<dyn Provider>> {
        self.providers.clone()
    }

    #[cfg(test)]
    pub fn from_providers(providers: HashMap<String, Arc<dyn Provider>>) -> Self {
        Self { providers }
    }
}

impl ProviderSettings {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, credentials: Json) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            credentials,
        }
    }
}
