//! Configuration builder

use crate::repo::RepoConfig;
use crate::types::{
    AnnounceConfig, Config, DebugConfig, DrainConfig, LoggingConfig, RuntimeConfig,
};
use serde_json::{Map, Value};

/// Builder for constructing configuration programmatically
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    runtime: Option<RuntimeConfig>,
    plugin_repo: RepoConfig,
    preordered_plugins: Vec<String>,
    announce: AnnounceConfig,
    drain: DrainConfig,
    debug: DebugConfig,
    module: Map<String, Value>,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set runtime configuration
    pub fn runtime(mut self, runtime: RuntimeConfig) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Set runtime identity with default directories
    pub fn runtime_id(mut self, id: impl Into<String>) -> Self {
        let runtime = self
            .runtime
            .get_or_insert_with(|| RuntimeConfig::new(String::new()));
        runtime.id = id.into();
        self
    }

    /// Set plugin repository backends
    pub fn plugin_repo(mut self, repo: impl Into<RepoConfig>) -> Self {
        self.plugin_repo = repo.into();
        self
    }

    /// Add a plugin preloaded at startup
    pub fn preorder(mut self, plugin: impl Into<String>) -> Self {
        self.preordered_plugins.push(plugin.into());
        self
    }

    /// Set announcement configuration
    pub fn announce(mut self, announce: AnnounceConfig) -> Self {
        self.announce = announce;
        self
    }

    /// Set drain configuration
    pub fn drain(mut self, drain: DrainConfig) -> Self {
        self.drain = drain;
        self
    }

    /// Set debug capture configuration
    pub fn debug(mut self, debug: DebugConfig) -> Self {
        self.debug = debug;
        self
    }

    /// Set a key of the owning module's configuration
    pub fn module_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.module.insert(key.into(), value);
        self
    }

    /// Build the configuration
    pub fn build(self) -> bosun_core::Result<Config> {
        let runtime = self
            .runtime
            .ok_or_else(|| bosun_core::Error::Config("runtime is required".to_string()))?;

        Ok(Config {
            runtime,
            plugin_repo: self.plugin_repo,
            preordered_plugins: self.preordered_plugins,
            announce: self.announce,
            drain: self.drain,
            debug: self.debug,
            logging: LoggingConfig::default(),
            module: self.module,
        })
    }
}
