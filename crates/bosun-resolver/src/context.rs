//! Resources shared by every resolver node

use bosun_core::{Error, Result};
use bosun_providers::{ProviderContext, ProviderRegistry};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Source of bundled data objects for `resource` backends
pub trait ResourceLoader: Send + Sync + fmt::Debug {
    /// Load a resource by name
    fn load(&self, name: &str) -> Result<Vec<u8>>;
}

/// Resources read from files under a root directory
#[derive(Debug, Clone)]
pub struct DirectoryResources {
    root: PathBuf,
}

impl DirectoryResources {
    /// Create a loader rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ResourceLoader for DirectoryResources {
    fn load(&self, name: &str) -> Result<Vec<u8>> {
        let relative = Path::new(name);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(Error::Config(format!("Invalid resource name: {name}")));
        }

        std::fs::read(self.root.join(relative))
            .map_err(|e| Error::Config(format!("Failed to load resource '{name}': {e}")))
    }
}

/// Resources held in memory
#[derive(Debug, Clone, Default)]
pub struct StaticResources {
    entries: HashMap<String, Vec<u8>>,
}

impl StaticResources {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource
    pub fn with(mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.entries.insert(name.into(), data.into());
        self
    }
}

impl ResourceLoader for StaticResources {
    fn load(&self, name: &str) -> Result<Vec<u8>> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Config(format!("Unknown resource: {name}")))
    }
}

/// Everything a resolver tree needs at build time
#[derive(Debug, Clone)]
pub struct ResolverContext {
    providers: ProviderRegistry,
    provider_ctx: ProviderContext,
    resources: Arc<dyn ResourceLoader>,
    module_config: Map<String, Value>,
}

impl ResolverContext {
    /// Create a context with no resources and an empty module config
    pub fn new(providers: ProviderRegistry, provider_ctx: ProviderContext) -> Self {
        Self {
            providers,
            provider_ctx,
            resources: Arc::new(StaticResources::new()),
            module_config: Map::new(),
        }
    }

    /// Set the bundled resource loader
    pub fn with_resources(mut self, resources: Arc<dyn ResourceLoader>) -> Self {
        self.resources = resources;
        self
    }

    /// Set the owning module's live configuration
    pub fn with_module_config(mut self, module_config: Map<String, Value>) -> Self {
        self.module_config = module_config;
        self
    }

    /// Provider constructors
    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Context handed to provider constructors
    pub fn provider_ctx(&self) -> &ProviderContext {
        &self.provider_ctx
    }

    /// Bundled resources
    pub fn resources(&self) -> &dyn ResourceLoader {
        self.resources.as_ref()
    }

    /// Read a key of the module configuration
    pub fn module_config(&self, key: &str) -> Option<&Value> {
        self.module_config.get(key)
    }
}
