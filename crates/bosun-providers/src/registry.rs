//! Provider registry: type selector to constructor

use crate::archive::HttpArchiveSourceProvider;
use crate::git::GitSourceProvider;
use crate::http::HttpMetadataProvider;
use crate::provider::{ProviderContext, SharedProvider};
use bosun_core::{Error, Result};
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Constructor of a provider from its options
pub type ProviderFactory =
    Arc<dyn Fn(&ProviderContext, Map<String, Value>) -> Result<SharedProvider> + Send + Sync>;

/// Registry of provider constructors
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: Arc<DashMap<String, ProviderFactory>>,
}

impl ProviderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in providers
    pub fn with_builtins() -> Self {
        let registry = Self::new();

        registry.register(HttpMetadataProvider::KIND, |ctx, options| {
            let provider: SharedProvider = Arc::new(HttpMetadataProvider::from_options(ctx, options)?);
            Ok(provider)
        });
        registry.register(GitSourceProvider::KIND, |ctx, options| {
            let provider: SharedProvider = Arc::new(GitSourceProvider::from_options(ctx, options)?);
            Ok(provider)
        });
        registry.register(HttpArchiveSourceProvider::KIND, |ctx, options| {
            let provider: SharedProvider = Arc::new(HttpArchiveSourceProvider::from_options(ctx, options)?);
            Ok(provider)
        });

        registry
    }

    /// Register a constructor, replacing any previous one for `kind`
    pub fn register<F>(&self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&ProviderContext, Map<String, Value>) -> Result<SharedProvider>
            + Send
            + Sync
            + 'static,
    {
        let kind = kind.into();
        debug!(provider = %kind, "Registering provider");
        self.factories.insert(kind, Arc::new(factory));
    }

    /// Construct a provider; `init` is left to the caller
    pub fn create(
        &self,
        kind: &str,
        ctx: &ProviderContext,
        options: Map<String, Value>,
    ) -> Result<SharedProvider> {
        let factory = self
            .factories
            .get(kind)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::Config(format!("Unknown provider type: {kind}")))?;

        factory(ctx, options)
    }

    /// Whether a selector is registered
    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered selectors, sorted
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        kinds.sort();
        kinds
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockProvider;

    fn context() -> ProviderContext {
        ProviderContext::new(std::env::temp_dir()).unwrap()
    }

    #[test]
    fn test_builtins_registered() {
        let registry = ProviderRegistry::with_builtins();
        assert_eq!(registry.kinds(), vec!["git", "http", "http_archive"]);
    }

    #[test]
    fn test_unknown_selector() {
        let registry = ProviderRegistry::with_builtins();
        let err = registry.create("svn", &context(), Map::new()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_create_builtin() {
        let registry = ProviderRegistry::with_builtins();
        let provider = registry.create("http", &context(), Map::new()).unwrap();
        assert_eq!(provider.name(), "http");
    }

    #[test]
    fn test_custom_factory_receives_options() {
        let registry = ProviderRegistry::new();
        let mock = MockProvider::new("mock");
        let handle = mock.clone();

        registry.register("mock", move |_ctx, options| {
            handle.record_options(options);
            let provider: SharedProvider = Arc::new(handle.clone());
            Ok(provider)
        });

        let mut options = Map::new();
        options.insert("token".to_string(), Value::String("t".to_string()));
        registry.create("mock", &context(), options).unwrap();

        assert_eq!(mock.created_with()[0].get("token"), Some(&Value::String("t".to_string())));
    }
}
