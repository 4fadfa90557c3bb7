//! Shared data model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Plugin name, unique among installed plugins
pub type PluginName = String;

/// Version reported for plugins whose metadata has none
pub const DEFAULT_VERSION: &str = "0.0.0";

/// Prefix marking a change entry as a removal
pub const REMOVAL_PREFIX: char = '!';

/// Source transports the runtime knows how to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Git repository clone
    Git,
    /// Zip archive download
    Zip,
    /// Gzipped tarball download
    Tar,
}

impl SourceKind {
    /// Parse a source type selector, `None` for unsupported kinds
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "git" => Some(SourceKind::Git),
            "zip" => Some(SourceKind::Zip),
            "tar" => Some(SourceKind::Tar),
            _ => None,
        }
    }

    /// Selector string
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Git => "git",
            SourceKind::Zip => "zip",
            SourceKind::Tar => "tar",
        }
    }

    /// File extension of snapshot archives for this kind
    pub fn archive_extension(&self) -> Option<&'static str> {
        match self {
            SourceKind::Git => None,
            SourceKind::Zip => Some("zip"),
            SourceKind::Tar => Some("tar.gz"),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Location handed to a provider: a URL plus transport-specific options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceTarget {
    /// Source URL
    #[serde(alias = "url")]
    pub source: String,

    /// Branch or tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    /// Extra provider options
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SourceTarget {
    /// Create a target for a URL
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            branch: None,
            extra: Map::new(),
        }
    }

    /// Set the branch
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Read an extra string option
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }
}

/// Source specification of a resolved plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Source type selector (`git`, `zip`, `tar`)
    #[serde(rename = "type")]
    pub kind: String,

    /// Where to fetch from
    #[serde(flatten)]
    pub target: SourceTarget,
}

impl SourceSpec {
    /// Create a spec of a known kind
    pub fn new(kind: SourceKind, target: SourceTarget) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            target,
        }
    }

    /// Parsed kind, `None` when unsupported
    pub fn source_kind(&self) -> Option<SourceKind> {
        SourceKind::parse(&self.kind)
    }
}

/// Objects attached to a resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedObjects {
    /// Metadata document URL
    pub metadata: String,
}

/// Result of matching a plugin name inside one resolver leaf
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    /// Where the plugin source lives
    pub source: SourceSpec,

    /// Related objects
    pub objects: ResolvedObjects,
}

impl ResolutionResult {
    /// Build a result from a source spec and metadata URL
    pub fn new(source: SourceSpec, metadata_url: impl Into<String>) -> Self {
        Self {
            source,
            objects: ResolvedObjects {
                metadata: metadata_url.into(),
            },
        }
    }

    /// Target for fetching the metadata document
    pub fn metadata_target(&self) -> SourceTarget {
        SourceTarget::new(self.objects.metadata.clone())
    }
}

/// Plugin metadata document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataDocument {
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Plugin version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Plugins this one requires
    #[serde(default)]
    pub depends_on: Vec<PluginName>,

    /// Everything else
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MetadataDocument {
    /// Version, defaulting to [`DEFAULT_VERSION`]
    pub fn version(&self) -> &str {
        self.version.as_deref().unwrap_or(DEFAULT_VERSION)
    }

    /// Display name, empty when absent
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }
}

/// Host-owned state of an installed plugin
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstalledPluginState {
    /// Plugin name
    pub name: PluginName,

    /// Plugin metadata as loaded by the host
    pub metadata: MetadataDocument,

    /// Requirements prepared
    pub prepared: bool,

    /// Plugin activated
    pub activated: bool,

    /// Parsed configuration
    pub config: Value,

    /// Raw configuration bytes
    #[serde(default)]
    pub config_data: Vec<u8>,
}

/// One entry of a change payload's plugin list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginChange {
    /// Install or update
    Install(PluginName),
    /// Remove
    Remove(PluginName),
}

impl PluginChange {
    /// Parse `"name"` or `"!name"`
    pub fn parse(entry: &str) -> Self {
        match entry.strip_prefix(REMOVAL_PREFIX) {
            Some(name) => PluginChange::Remove(name.to_string()),
            None => PluginChange::Install(entry.to_string()),
        }
    }

    /// Plugin name
    pub fn name(&self) -> &str {
        match self {
            PluginChange::Install(name) | PluginChange::Remove(name) => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolution_result_wire_shape() {
        let value = json!({
            "source": {
                "type": "git",
                "source": "https://github.com/centry-core/demo.git",
                "branch": "main"
            },
            "objects": {
                "metadata": "https://raw.githubusercontent.com/centry-core/demo/main/metadata.json"
            }
        });

        let result: ResolutionResult = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(result.source.source_kind(), Some(SourceKind::Git));
        assert_eq!(result.source.target.branch.as_deref(), Some("main"));
        assert_eq!(serde_json::to_value(&result).unwrap(), value);
    }

    #[test]
    fn test_source_target_url_alias() {
        let target: SourceTarget =
            serde_json::from_value(json!({"url": "https://example.com/a.git", "depth": 1}))
                .unwrap();
        assert_eq!(target.source, "https://example.com/a.git");
        assert_eq!(target.extra.get("depth"), Some(&json!(1)));
    }

    #[test]
    fn test_unsupported_source_kind() {
        let spec = SourceSpec {
            kind: "svn".to_string(),
            target: SourceTarget::new("svn://example.com/demo"),
        };
        assert_eq!(spec.source_kind(), None);
    }

    #[test]
    fn test_metadata_defaults() {
        let doc: MetadataDocument = serde_json::from_value(json!({"module": "x"})).unwrap();
        assert_eq!(doc.version(), DEFAULT_VERSION);
        assert!(doc.depends_on.is_empty());
        assert_eq!(doc.extra.get("module"), Some(&json!("x")));
    }

    #[test]
    fn test_plugin_change_parse() {
        assert_eq!(
            PluginChange::parse("!foo"),
            PluginChange::Remove("foo".to_string())
        );
        assert_eq!(
            PluginChange::parse("foo"),
            PluginChange::Install("foo".to_string())
        );
        assert_eq!(PluginChange::parse("!foo").name(), "foo");
    }
}
