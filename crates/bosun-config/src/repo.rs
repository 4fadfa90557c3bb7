//! Plugin repository backend declarations
//!
//! A repository configuration is either a single backend or an ordered list
//! of them. List order is resolution priority: earlier entries shadow later
//! ones.

use bosun_core::{ResolutionResult, SourceKind};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Backend type assumed when a declaration has no `type`
pub const DEFAULT_BACKEND_TYPE: &str = "github";

/// Repository configuration: one backend or an ordered list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RepoConfig {
    /// Ordered list of backends, earlier wins
    List(Vec<RepoConfig>),
    /// Single backend declaration
    Single(BackendConfig),
}

impl Default for RepoConfig {
    fn default() -> Self {
        RepoConfig::List(Vec::new())
    }
}

impl From<BackendConfig> for RepoConfig {
    fn from(config: BackendConfig) -> Self {
        RepoConfig::Single(config)
    }
}

/// One backend declaration with optional provider overrides
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendConfig {
    /// Backend kind and its options
    #[serde(flatten)]
    pub kind: BackendKind,

    /// Metadata provider override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_provider: Option<ProviderConfig>,

    /// Source provider override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_provider: Option<ProviderConfig>,
}

impl BackendConfig {
    /// Backend without provider overrides
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            metadata_provider: None,
            source_provider: None,
        }
    }

    /// Override the metadata provider
    pub fn with_metadata_provider(mut self, provider: ProviderConfig) -> Self {
        self.metadata_provider = Some(provider);
        self
    }

    /// Override the source provider
    pub fn with_source_provider(mut self, provider: ProviderConfig) -> Self {
        self.source_provider = Some(provider);
        self
    }
}

#[derive(Deserialize)]
struct RawBackendConfig {
    #[serde(flatten)]
    kind: BackendKind,
    #[serde(default)]
    metadata_provider: Option<ProviderConfig>,
    #[serde(default)]
    source_provider: Option<ProviderConfig>,
}

impl<'de> Deserialize<'de> for BackendConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut value = Value::deserialize(deserializer)?;

        if let Value::Object(map) = &mut value {
            map.entry("type")
                .or_insert_with(|| Value::String(DEFAULT_BACKEND_TYPE.to_string()));
        }

        let raw: RawBackendConfig =
            serde_json::from_value(value).map_err(serde::de::Error::custom)?;

        Ok(Self {
            kind: raw.kind,
            metadata_provider: raw.metadata_provider,
            source_provider: raw.source_provider,
        })
    }
}

/// Backend kinds, including shorthand declarations expanded before use
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendKind {
    /// Lookup table bundled as a named resource
    Resource {
        /// Resource name
        name: String,
    },

    /// Lookup table given inline
    Config {
        /// Plugin name to resolution
        #[serde(default)]
        data: BTreeMap<String, ResolutionResult>,
    },

    /// Lookup table read from a key of the owning module's config
    ConfigKey {
        /// Config key
        name: String,
    },

    /// Authenticated artifact depot, probed per plugin
    Depot(DepotConfig),

    /// Source host, git transport
    Github(SourceHostConfig),

    /// Source host, zip snapshot transport
    GithubZip(SourceHostConfig),

    /// Source host, tarball snapshot transport
    GithubTar(SourceHostConfig),

    /// Shorthand: one depot leaf per group
    DepotTiers(DepotTiersConfig),

    /// Shorthand: one source host leaf per namespace
    GithubFederation(FederationConfig),
}

impl BackendKind {
    /// Type selector as written in configuration
    pub fn type_name(&self) -> &'static str {
        match self {
            BackendKind::Resource { .. } => "resource",
            BackendKind::Config { .. } => "config",
            BackendKind::ConfigKey { .. } => "config_key",
            BackendKind::Depot(_) => "depot",
            BackendKind::Github(_) => "github",
            BackendKind::GithubZip(_) => "github_zip",
            BackendKind::GithubTar(_) => "github_tar",
            BackendKind::DepotTiers(_) => "depot_tiers",
            BackendKind::GithubFederation(_) => "github_federation",
        }
    }

    /// Whether this is a shorthand that expands into other backends
    pub fn is_meta(&self) -> bool {
        matches!(
            self,
            BackendKind::DepotTiers(_) | BackendKind::GithubFederation(_)
        )
    }
}

/// Artifact depot backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepotConfig {
    /// Depot base URL
    pub base_url: String,

    /// Plugin group inside the depot
    pub group: String,

    /// Bearer token for metadata and source requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Archive format served by the depot
    #[serde(default = "default_archive_format")]
    pub archive_format: SourceKind,
}

fn default_archive_format() -> SourceKind {
    SourceKind::Zip
}

/// Source host backend (git, zip or tar transport)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceHostConfig {
    /// Organization or user owning plugin repositories
    pub namespace: String,

    /// Branch or tag name
    pub branch: String,

    /// Metadata file path inside the repository
    pub metadata_file: String,

    /// Only these plugins are looked up when set
    #[serde(alias = "whitelist", skip_serializing_if = "Option::is_none")]
    pub allow_list: Option<Vec<String>>,

    /// Ref namespace of snapshot archives (`heads` or `tags`)
    pub ref_type: String,

    /// Host base URL for clone and archive URLs
    pub base_url: String,

    /// Raw content base URL for metadata probes
    pub raw_base_url: String,

    /// Bearer token for metadata probes and downloads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for SourceHostConfig {
    fn default() -> Self {
        Self {
            namespace: "centry-core".to_string(),
            branch: "main".to_string(),
            metadata_file: "metadata.json".to_string(),
            allow_list: None,
            ref_type: "heads".to_string(),
            base_url: "https://github.com".to_string(),
            raw_base_url: "https://raw.githubusercontent.com".to_string(),
            token: None,
        }
    }
}

/// Shorthand for a tiered artifact depot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepotTiersConfig {
    /// Depot base URL
    pub base_url: String,

    /// Groups in priority order, e.g. local, customer, global
    pub groups: Vec<String>,

    /// Bearer token shared by every tier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Archive format served by the depot
    #[serde(default = "default_archive_format")]
    pub archive_format: SourceKind,
}

/// Shorthand for source hosts federated across namespaces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FederationConfig {
    /// Namespaces in priority order
    pub namespaces: Vec<String>,

    /// Transport of every expanded leaf
    #[serde(default = "default_transport")]
    pub transport: SourceKind,

    /// Options shared by every expanded leaf
    #[serde(flatten)]
    pub template: SourceHostConfig,
}

fn default_transport() -> SourceKind {
    SourceKind::Git
}

/// Provider declaration: a type selector plus provider options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider type selector
    #[serde(rename = "type")]
    pub kind: String,

    /// Options passed to the provider constructor
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl ProviderConfig {
    /// Provider with no options
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            options: Map::new(),
        }
    }

    /// Add an option
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Add an option only when present
    pub fn with_optional(self, key: impl Into<String>, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(value) => self.with_option(key, value),
            None => self,
        }
    }
}
