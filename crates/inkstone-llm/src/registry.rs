//! Explicit provider selection at startup.

use std::collections::HashMap;
use std::sync::Arc;

use crate::anthropic::AnthropicProvider;
use crate::config::ProviderSettings;
use crate::error::{ProviderError, Result};
use crate::openai_compat::OpenAiCompatProvider;
use crate::provider::VisionProvider;

/// Name-keyed set of constructed providers.
///
/// Built once at process start from configuration; no reflection, no
/// runtime discovery.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn VisionProvider>>,
}

impl ProviderRegistry {
    /// Build a registry from provider settings. The variant is chosen by
    /// each setting's `name`.
    pub fn from_settings(settings: Vec<ProviderSettings>) -> Self {
        let mut providers: HashMap<String, Arc<dyn VisionProvider>> = HashMap::new();
        for s in settings {
            let name = s.name.clone();
            let provider: Arc<dyn VisionProvider> = match name.as_str() {
                "anthropic" => Arc::new(AnthropicProvider::new(s)),
                _ => Arc::new(OpenAiCompatProvider::new(s)),
            };
            providers.insert(name, provider);
        }
        Self { providers }
    }

    /// Look up a provider by name.
    ///
    /// # Errors
    ///
    /// [`ProviderError::RequestFailed`] naming the unknown provider and the
    /// configured alternatives.
    pub fn get(&self, name: &str) -> Result<Arc<dyn VisionProvider>> {
        self.providers.get(name).cloned().ok_or_else(|| {
            let known: Vec<&str> = self.providers.keys().map(String::as_str).collect();
            ProviderError::RequestFailed(format!(
                "unknown provider '{name}', configured: {}",
                known.join(", ")
            ))
        })
    }

    /// Names of all configured providers.
    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ProviderRegistry {
        ProviderRegistry::from_settings(vec![
            ProviderSettings::openai("https://api.openai.com/v1", "gpt-4o"),
            ProviderSettings::anthropic("https://api.anthropic.com/v1", "claude-sonnet-4-5"),
        ])
    }

    #[test]
    fn selects_by_name() {
        let registry = registry();
        assert_eq!(registry.get("openai").unwrap().name(), "openai");
        assert_eq!(registry.get("anthropic").unwrap().name(), "anthropic");
    }

    #[test]
    fn unknown_provider_lists_alternatives() {
        let Err(err) = registry().get("gemini") else {
            panic!("expected unknown provider error");
        };
        let message = err.to_string();
        assert!(message.contains("gemini"));
        assert!(message.contains("openai"));
    }
}
