use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{AppConfig, ProviderEntry};
use crate::errors::{PilotError, PilotResult};
use crate::llm::provider::DecisionService;
use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::types::CallConfig;

/// Registry of all configured decision services, keyed by their config.toml identifier.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn DecisionService>>,
    active: String,
}

impl ProviderRegistry {
    pub fn new(active: String) -> Self {
        Self {
            providers: HashMap::new(),
            active,
        }
    }

    pub fn register(&mut self, provider: Arc<dyn DecisionService>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get_active(&self) -> PilotResult<Arc<dyn DecisionService>> {
        self.providers.get(&self.active).cloned().ok_or_else(|| {
            PilotError::Config(format!(
                "Active provider '{}' not found in registry",
                self.active
            ))
        })
    }

    pub fn set_active(&mut self, name: String) -> PilotResult<()> {
        if self.providers.contains_key(&name) {
            self.active = name;
            Ok(())
        } else {
            Err(PilotError::Config(format!("Provider '{name}' not registered")))
        }
    }

    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build a registry from the loaded app config, reading API keys from the
    /// process environment.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::from_config_with(config, |name| std::env::var(name).ok())
    }

    pub fn from_config_with(config: &AppConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let mut registry = Self::new(config.llm.active_provider.clone());
        for (id, entry) in &config.llm.providers {
            let api_key = resolve_api_key(id, entry, &env);
            if api_key.is_empty() {
                tracing::warn!(provider = %id, "no API key configured");
            }
            let call = CallConfig {
                model: entry.model.clone(),
                temperature: entry.temperature,
                stream: entry.stream,
            };
            let provider = OpenAiCompatibleProvider::new(
                id.clone(),
                entry.api_base.clone(),
                api_key,
                call,
            );
            registry.register(Arc::new(provider));
        }
        registry
    }
}

/// `PILOT_<ID>_API_KEY`, then the key stored in config.toml, then `OPENAI_API_KEY`.
fn resolve_api_key(id: &str, entry: &ProviderEntry, env: &impl Fn(&str) -> Option<String>) -> String {
    env(&format!("PILOT_{}_API_KEY", id.to_uppercase()))
        .or_else(|| entry.api_key.clone())
        .or_else(|| env("OPENAI_API_KEY"))
        .unwrap_or_default()
}
