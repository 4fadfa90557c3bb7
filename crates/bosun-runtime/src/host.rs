//! Contracts implemented by the hosting process

use async_trait::async_trait;
use bosun_core::{InstalledPluginState, MetadataDocument, PluginName, Result, SourceArtifact};
use serde_json::Value;
use std::fmt;

/// Installed plugin storage
#[async_trait]
pub trait PluginStore: Send + Sync + fmt::Debug {
    /// Whether a plugin is installed
    async fn plugin_exists(&self, name: &str) -> Result<bool>;

    /// Install or replace a plugin from a fetched source
    async fn add_plugin(&self, name: &str, artifact: SourceArtifact) -> Result<()>;

    /// Remove an installed plugin
    async fn delete_plugin(&self, name: &str) -> Result<()>;

    /// Metadata of an installed plugin
    async fn get_plugin_metadata(&self, name: &str) -> Result<MetadataDocument>;
}

/// Module manager of the hosting process
#[async_trait]
pub trait PluginHost: Send + Sync + fmt::Debug {
    /// Drop cached build artifacts of a plugin
    async fn purge_build_cache(&self, name: &str) -> Result<()>;

    /// Drop records of installed plugin dependencies
    async fn clear_dependency_records(&self, name: &str) -> Result<()>;

    /// Set the "installed" flag; `false` makes the host re-provision on next activation
    async fn set_installed(&self, name: &str, installed: bool) -> Result<()>;

    /// Store raw configuration bytes for a plugin
    async fn write_config(&self, name: &str, data: &[u8]) -> Result<()>;

    /// Whether a plugin is currently loaded
    fn is_loaded(&self, name: &str) -> bool;

    /// Reload a loaded plugin's configuration from the config store
    async fn reload_config(&self, name: &str) -> Result<()>;

    /// Optional hook letting a plugin react to new configuration
    async fn reconfigure(&self, name: &str) -> Result<()> {
        let _ = name;
        Ok(())
    }

    /// Plugin names in load (dependency) order
    fn load_order(&self) -> Vec<PluginName>;

    /// Ask the host to reload a plugin
    async fn request_reload(&self, name: &str) -> Result<()>;

    /// Snapshot of every known plugin
    fn descriptors(&self) -> Vec<InstalledPluginState>;
}

/// Outbound event bus
#[async_trait]
pub trait EventPublisher: Send + Sync + fmt::Debug {
    /// Publish an event
    async fn publish(&self, event: &str, payload: Value) -> Result<()>;
}
