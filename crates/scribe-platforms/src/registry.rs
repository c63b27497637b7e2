use std::sync::Arc;

use tracing::info;

use crate::adapter::PlatformAdapter;
use scribe_core::types::Provider;

/// Holds one adapter per platform and resolves them by provider or URL.
///
/// Adapters are stored behind `Arc` so the interceptor, runner, and
/// recovery paths can share them across tasks.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn PlatformAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// All three stock adapters.
    pub fn with_defaults() -> Self {
        let mut reg = Self::new();
        reg.register(Arc::new(crate::chatgpt::ChatgptAdapter::new()));
        reg.register(Arc::new(crate::gemini::GeminiAdapter::new()));
        reg.register(Arc::new(crate::grok::GrokAdapter::new()));
        reg
    }

    /// Register an adapter. An adapter with the same name is replaced.
    pub fn register(&mut self, adapter: Arc<dyn PlatformAdapter>) {
        let name = adapter.name().to_string();
        info!(adapter = %name, "registering platform adapter");
        self.adapters.retain(|a| a.name() != name);
        self.adapters.push(adapter);
    }

    pub fn by_provider(&self, provider: Provider) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters
            .iter()
            .find(|a| a.provider() == provider)
            .cloned()
    }

    /// Adapter whose platform owns the given page URL.
    pub fn for_page_url(&self, url: &str) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters
            .iter()
            .find(|a| a.is_platform_url(url))
            .cloned()
    }

    /// Adapter whose API endpoint or completion trigger matches the URL.
    pub fn for_api_url(&self, url: &str) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters
            .iter()
            .find(|a| a.matches_api_endpoint(url) || a.is_completion_trigger(url))
            .cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn PlatformAdapter>> {
        self.adapters.iter()
    }
}
