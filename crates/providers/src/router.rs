//! Provider selection from configuration.
//!
//! Every built-in backend speaks the OpenAI chat-completions dialect, so
//! providers differ only in name, base URL and credentials.

use std::collections::HashMap;
use std::sync::Arc;

use convoy_config::AppConfig;
use convoy_core::provider::Provider;
use tracing::debug;

use crate::openai_compat::OpenAiCompatProvider;

/// A backend convoy knows the default endpoint of.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinProvider {
    pub name: &'static str,
    pub base_url: &'static str,
    /// Model used when config names none for this backend.
    pub default_model: &'static str,
    pub description: &'static str,
}

pub const BUILTIN_PROVIDERS: &[BuiltinProvider] = &[
    BuiltinProvider {
        name: "openrouter",
        base_url: "https://openrouter.ai/api/v1",
        default_model: "moonshotai/kimi-k2",
        description: "Unified API over many hosted models",
    },
    BuiltinProvider {
        name: "openai",
        base_url: "https://api.openai.com/v1",
        default_model: "gpt-4o-mini",
        description: "OpenAI hosted models",
    },
    BuiltinProvider {
        name: "groq",
        base_url: "https://api.groq.com/openai/v1",
        default_model: "llama-3.3-70b-versatile",
        description: "Groq LPU inference",
    },
    BuiltinProvider {
        name: "cerebras",
        base_url: "https://api.cerebras.ai/v1",
        default_model: "llama3.1-70b",
        description: "Cerebras wafer-scale inference",
    },
    BuiltinProvider {
        name: "sambanova",
        base_url: "https://api.sambanova.ai/v1",
        default_model: "Meta-Llama-3.3-70B-Instruct",
        description: "SambaNova Cloud",
    },
    BuiltinProvider {
        name: "mistral",
        base_url: "https://api.mistral.ai/v1",
        default_model: "mistral-large-latest",
        description: "Mistral AI models",
    },
    BuiltinProvider {
        name: "nvidia",
        base_url: "https://integrate.api.nvidia.com/v1",
        default_model: "minimaxai/minimax-m2.1",
        description: "NVIDIA NIM endpoints",
    },
    BuiltinProvider {
        name: "ollama",
        base_url: "http://localhost:11434/v1",
        default_model: "llama3.1:8b",
        description: "Local models via Ollama (no key)",
    },
];

pub fn builtin(name: &str) -> Option<&'static BuiltinProvider> {
    BUILTIN_PROVIDERS.iter().find(|p| p.name == name)
}

/// Base URL for a provider name. Unknown names get a placeholder host and
/// need `api_url` set in config.
pub fn default_base_url(name: &str) -> String {
    builtin(name).map_or_else(
        || format!("https://{name}.api.example.com/v1"),
        |p| p.base_url.to_string(),
    )
}

/// Model to request from `name`: the configured one if any, else the
/// backend's built-in default.
pub fn model_for(config: &AppConfig, name: &str) -> Option<String> {
    config.model_for(name, builtin(name).map(|p| p.default_model))
}

/// Providers by name, with one of them marked as the default.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
}

impl ProviderRouter {
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// The provider runs use unless told otherwise.
    pub fn default(&self) -> Option<Arc<dyn Provider>> {
        self.get(&self.default_provider)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn provider_for(config: &AppConfig, name: &str) -> Arc<dyn Provider> {
    let base_url = config
        .providers
        .get(name)
        .and_then(|p| p.api_url.clone())
        .unwrap_or_else(|| default_base_url(name));
    let api_key = config.api_key_for(name).unwrap_or_default();
    debug!(provider = name, base_url = %base_url, "Registering provider");
    Arc::new(OpenAiCompatProvider::new(name, base_url, api_key))
}

/// Builds a router holding every configured provider plus the default one.
///
/// `default_override` (the CLI `--provider` flag) wins over
/// `config.default_provider`.
pub fn build_from_config(config: &AppConfig, default_override: Option<&str>) -> ProviderRouter {
    let default_name = default_override.unwrap_or(&config.default_provider);
    let mut router = ProviderRouter::new(default_name);

    let names = config
        .providers
        .keys()
        .map(String::as_str)
        .chain(std::iter::once(default_name));
    for name in names {
        if router.get(name).is_none() {
            router.register(name, provider_for(config, name));
        }
    }
    router
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_config::ProviderConfig;

    #[test]
    fn builtin_names_are_unique() {
        let mut names: Vec<_> = BUILTIN_PROVIDERS.iter().map(|p| p.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), BUILTIN_PROVIDERS.len());
    }

    #[test]
    fn base_urls_for_known_and_unknown_names() {
        assert_eq!(default_base_url("groq"), "https://api.groq.com/openai/v1");
        assert!(default_base_url("ollama").contains("localhost:11434"));
        assert_eq!(default_base_url("acme"), "https://acme.api.example.com/v1");
    }

    #[test]
    fn overridden_provider_gets_its_own_model() {
        let config = AppConfig::default();
        assert_eq!(model_for(&config, "openrouter").as_deref(), Some("moonshotai/kimi-k2"));
        assert_eq!(model_for(&config, "groq").as_deref(), Some("llama-3.3-70b-versatile"));
        assert_eq!(model_for(&config, "ollama").as_deref(), Some("llama3.1:8b"));
        assert_eq!(model_for(&config, "acme"), None);
    }

    #[test]
    fn configured_model_wins_over_builtin() {
        let mut config = AppConfig {
            default_provider: "groq".into(),
            default_model: Some("llama-3.1-8b-instant".into()),
            ..AppConfig::default()
        };
        config.providers.insert(
            "mistral".into(),
            ProviderConfig {
                default_model: Some("mistral-small-latest".into()),
                ..ProviderConfig::default()
            },
        );
        assert_eq!(model_for(&config, "groq").as_deref(), Some("llama-3.1-8b-instant"));
        assert_eq!(model_for(&config, "mistral").as_deref(), Some("mistral-small-latest"));
        // The top-level model belongs to groq, not to an overriding provider.
        assert_eq!(model_for(&config, "cerebras").as_deref(), Some("llama3.1-70b"));
    }

    #[test]
    fn default_config_yields_openrouter() {
        let router = build_from_config(&AppConfig::default(), None);
        assert_eq!(router.default().map(|p| p.name().to_string()).as_deref(), Some("openrouter"));
    }

    #[test]
    fn override_replaces_default() {
        let router = build_from_config(&AppConfig::default(), Some("cerebras"));
        assert_eq!(router.default().map(|p| p.name().to_string()).as_deref(), Some("cerebras"));
    }

    #[test]
    fn configured_providers_are_all_registered() {
        let mut config = AppConfig::default();
        config.providers.insert("groq".into(), ProviderConfig::default());
        config.providers.insert("ollama".into(), ProviderConfig::default());

        let router = build_from_config(&config, None);
        assert_eq!(router.list(), vec!["groq", "ollama", "openrouter"]);
        assert!(router.get("mistral").is_none());
    }
}
