use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use super::LlmProvider;
use super::backend::{BackendProvider, Credential, ProviderKind};
use crate::config::ProviderSettings;
use crate::error::CouncilError;

/// Mapping from provider identifier to adapter.
///
/// Constructed explicitly and passed down (wrap it in an `Arc` to share it).
/// Lookups take a read lock, registration a write lock.
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Arc<dyn LlmProvider>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
        }
    }

    /// Registry holding the built-in backends, configured from settings.
    ///
    /// Every backend is registered; whether it resolves depends on the
    /// credentials present at lookup time.
    pub fn from_settings(settings: &ProviderSettings) -> Self {
        let registry = Self::new();
        for kind in ProviderKind::ALL {
            let credential = match settings.api_key(kind) {
                Some(key) => Credential::Key(key.to_string()),
                None => Credential::Env(kind.api_key_var().to_string()),
            };
            let mut provider = BackendProvider::new(kind, credential);
            if kind == ProviderKind::Ollama {
                provider = provider.with_base_url(settings.ollama_base_url.clone());
            }
            registry.register(kind.id(), provider);
        }
        registry
    }

    /// Bind an adapter to an identifier, replacing any previous binding.
    pub fn register(&self, id: impl Into<String>, provider: impl LlmProvider + 'static) {
        self.register_arc(id, Arc::new(provider));
    }

    pub fn register_arc(&self, id: impl Into<String>, provider: Arc<dyn LlmProvider>) {
        let id = id.into();
        debug!(provider = %id, "registering provider");
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, provider);
    }

    /// Look up a usable adapter.
    ///
    /// Fails with [`CouncilError::ProviderUnavailable`] when nothing is bound
    /// to `id` or the bound adapter reports itself unavailable.
    pub fn resolve(&self, id: &str) -> Result<Arc<dyn LlmProvider>, CouncilError> {
        let provider = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| CouncilError::ProviderUnavailable {
                provider: id.to_string(),
                reason: "no provider registered".to_string(),
            })?;

        if !provider.is_available() {
            return Err(CouncilError::ProviderUnavailable {
                provider: id.to_string(),
                reason: "provider is not configured (missing credentials?)".to_string(),
            });
        }

        Ok(provider)
    }

    /// Identifiers of providers passing their availability check right now.
    pub fn list_available(&self) -> BTreeSet<String> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, provider)| provider.is_available())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// All registered identifiers, available or not.
    pub fn names(&self) -> BTreeSet<String> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::llm::{GenerateRequest, ProviderError};

    struct Fixed {
        reply: &'static str,
        available: Arc<AtomicBool>,
    }

    impl Fixed {
        fn new(reply: &'static str) -> Self {
            Self {
                reply,
                available: Arc::new(AtomicBool::new(true)),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for Fixed {
        async fn generate(&self, _request: &GenerateRequest<'_>) -> Result<String, ProviderError> {
            Ok(self.reply.to_string())
        }

        fn is_available(&self) -> bool {
            self.available.load(Ordering::SeqCst)
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn request() -> GenerateRequest<'static> {
        GenerateRequest {
            prompt: "p",
            system_prompt: "s",
            temperature: 0.0,
            max_tokens: 8,
            model: None,
        }
    }

    #[test]
    fn test_resolve_missing_provider() {
        let registry = ProviderRegistry::new();
        let err = registry.resolve("openai").err().unwrap();
        assert!(matches!(
            err,
            CouncilError::ProviderUnavailable { ref provider, .. } if provider == "openai"
        ));
    }

    #[tokio::test]
    async fn test_register_last_write_wins() {
        let registry = ProviderRegistry::new();
        registry.register("mock", Fixed::new("first"));
        registry.register("mock", Fixed::new("second"));

        let provider = registry.resolve("mock").unwrap();
        assert_eq!(provider.generate(&request()).await.unwrap(), "second");
        assert_eq!(registry.names().len(), 1);
    }

    #[test]
    fn test_availability_is_checked_at_call_time() {
        let registry = ProviderRegistry::new();
        let fixed = Fixed::new("x");
        let toggle = Arc::clone(&fixed.available);
        registry.register("mock", fixed);
        registry.register("other", Fixed::new("y"));

        assert!(registry.resolve("mock").is_ok());
        assert_eq!(registry.list_available().len(), 2);

        toggle.store(false, Ordering::SeqCst);
        assert!(matches!(
            registry.resolve("mock"),
            Err(CouncilError::ProviderUnavailable { .. })
        ));
        let available = registry.list_available();
        assert!(!available.contains("mock"));
        assert!(available.contains("other"));
    }

    #[test]
    fn test_from_settings_registers_builtins() {
        let settings = ProviderSettings {
            openai_api_key: Some("sk-test".to_string()),
            ollama_base_url: String::new(),
            ..ProviderSettings::default()
        };
        let registry = ProviderRegistry::from_settings(&settings);

        assert_eq!(registry.names().len(), 4);
        assert!(registry.list_available().contains("openai"));
        assert!(!registry.list_available().contains("ollama"));
    }
}
