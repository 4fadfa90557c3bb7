//! Leaf resolvers: one backend, one lookup strategy, two providers

use crate::context::ResolverContext;
use bosun_config::{BackendConfig, BackendKind, DepotConfig, ProviderConfig, SourceHostConfig};
use bosun_core::{Error, ResolutionResult, Result, SourceKind, SourceSpec, SourceTarget};
use bosun_providers::{
    GitSourceProvider, HttpArchiveSourceProvider, HttpMetadataProvider, SharedProvider,
};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Lookup strategy selected by backend kind
#[derive(Debug, Clone)]
pub enum Lookup {
    /// Name to result table (`resource`, `config`, `config_key`)
    Table(BTreeMap<String, ResolutionResult>),

    /// Live metadata probe against an artifact depot
    Depot(DepotConfig),

    /// Live metadata probe against a source host
    SourceHost {
        /// Transport of returned sources
        transport: SourceKind,
        /// Host options
        host: SourceHostConfig,
    },
}

/// Resolver node bound to exactly one backend
#[derive(Debug)]
pub struct LeafResolver {
    backend: &'static str,
    lookup: Lookup,
    metadata_provider: Option<SharedProvider>,
    source_provider: Option<SharedProvider>,
}

impl LeafResolver {
    /// Leaf that resolves nothing and owns no providers
    pub fn empty(backend: &'static str) -> Self {
        Self {
            backend,
            lookup: Lookup::Table(BTreeMap::new()),
            metadata_provider: None,
            source_provider: None,
        }
    }

    /// Build a leaf from a concrete backend declaration, initializing its providers
    pub async fn build(config: &BackendConfig, ctx: &ResolverContext) -> Result<Self> {
        let backend = config.kind.type_name();

        let lookup = match &config.kind {
            BackendKind::Resource { name } => {
                let data = ctx.resources().load(name)?;
                Lookup::Table(serde_json::from_slice(&data).map_err(|e| {
                    Error::Config(format!("Invalid resolver table in resource '{name}': {e}"))
                })?)
            }
            BackendKind::Config { data } => Lookup::Table(data.clone()),
            BackendKind::ConfigKey { name } => match ctx.module_config(name) {
                Some(value) => Lookup::Table(serde_json::from_value(value.clone()).map_err(|e| {
                    Error::Config(format!("Invalid resolver table in config key '{name}': {e}"))
                })?),
                None => {
                    debug!(config_key = %name, "Config key absent, resolver stays empty");
                    return Ok(Self::empty(backend));
                }
            },
            BackendKind::Depot(depot) => Lookup::Depot(depot.clone()),
            BackendKind::Github(host) => Lookup::SourceHost {
                transport: SourceKind::Git,
                host: host.clone(),
            },
            BackendKind::GithubZip(host) => Lookup::SourceHost {
                transport: SourceKind::Zip,
                host: host.clone(),
            },
            BackendKind::GithubTar(host) => Lookup::SourceHost {
                transport: SourceKind::Tar,
                host: host.clone(),
            },
            BackendKind::DepotTiers(_) | BackendKind::GithubFederation(_) => {
                return Err(Error::Internal(format!(
                    "{backend} must be expanded before building a leaf"
                )));
            }
        };

        let (default_metadata, default_source) = default_providers(&config.kind);
        let metadata_config = config.metadata_provider.clone().unwrap_or(default_metadata);
        let source_config = config.source_provider.clone().unwrap_or(default_source);

        let metadata_provider = create_provider(ctx, &metadata_config).await?;
        let source_provider = match create_provider(ctx, &source_config).await {
            Ok(provider) => provider,
            Err(e) => {
                dispose(backend, metadata_provider).await;
                return Err(e);
            }
        };

        info!(
            backend = %backend,
            metadata_provider = %metadata_config.kind,
            source_provider = %source_config.kind,
            "Initialized resolver leaf"
        );

        Ok(Self {
            backend,
            lookup,
            metadata_provider: Some(metadata_provider),
            source_provider: Some(source_provider),
        })
    }

    /// Backend type selector
    pub fn backend(&self) -> &'static str {
        self.backend
    }

    /// Lookup strategy
    pub fn lookup_strategy(&self) -> &Lookup {
        &self.lookup
    }

    /// Metadata provider, `None` once deinitialized
    pub fn metadata_provider(&self) -> Option<&SharedProvider> {
        self.metadata_provider.as_ref()
    }

    /// Source provider, `None` once deinitialized
    pub fn source_provider(&self) -> Option<&SharedProvider> {
        self.source_provider.as_ref()
    }

    /// Match a plugin name; probe failures are misses
    pub async fn lookup(&self, name: &str) -> Option<ResolutionResult> {
        match &self.lookup {
            Lookup::Table(table) => table.get(name).cloned(),
            Lookup::Depot(depot) => self.depot_lookup(depot, name).await,
            Lookup::SourceHost { transport, host } => {
                self.source_host_lookup(*transport, host, name).await
            }
        }
    }

    async fn depot_lookup(&self, depot: &DepotConfig, name: &str) -> Option<ResolutionResult> {
        let plugin_url = format!(
            "{}/depot/{}/plugins/{}",
            depot.base_url.trim_end_matches('/'),
            depot.group,
            name
        );
        let metadata_url = format!("{plugin_url}/metadata");

        if !self.probe(&metadata_url).await {
            return None;
        }

        let source = SourceSpec::new(
            depot.archive_format,
            SourceTarget::new(format!("{plugin_url}/source")),
        );
        Some(ResolutionResult::new(source, metadata_url))
    }

    async fn source_host_lookup(
        &self,
        transport: SourceKind,
        host: &SourceHostConfig,
        name: &str,
    ) -> Option<ResolutionResult> {
        if let Some(allow_list) = &host.allow_list {
            if !allow_list.iter().any(|allowed| allowed == name) {
                return None;
            }
        }

        let metadata_url = format!(
            "{}/{}/{}/{}/{}",
            host.raw_base_url.trim_end_matches('/'),
            host.namespace,
            name,
            host.branch,
            host.metadata_file
        );

        if !self.probe(&metadata_url).await {
            return None;
        }

        let base_url = host.base_url.trim_end_matches('/');
        let target = match transport.archive_extension() {
            None => SourceTarget::new(format!("{base_url}/{}/{name}.git", host.namespace))
                .with_branch(host.branch.clone()),
            Some(extension) => SourceTarget::new(format!(
                "{base_url}/{}/{name}/archive/refs/{}/{}.{extension}",
                host.namespace, host.ref_type, host.branch
            )),
        };

        Some(ResolutionResult::new(
            SourceSpec::new(transport, target),
            metadata_url,
        ))
    }

    async fn probe(&self, metadata_url: &str) -> bool {
        let Some(provider) = &self.metadata_provider else {
            return false;
        };

        match provider.get_metadata(&SourceTarget::new(metadata_url)).await {
            Ok(_) => true,
            Err(e) => {
                debug!(backend = %self.backend, url = %metadata_url, error = %e, "Metadata probe missed");
                false
            }
        }
    }

    /// Dispose both providers; later calls are no-ops
    pub async fn deinit(&mut self) {
        if let Some(provider) = self.metadata_provider.take() {
            dispose(self.backend, provider).await;
        }
        if let Some(provider) = self.source_provider.take() {
            dispose(self.backend, provider).await;
        }
    }
}

fn default_providers(kind: &BackendKind) -> (ProviderConfig, ProviderConfig) {
    let metadata = ProviderConfig::new(HttpMetadataProvider::KIND);
    let git = ProviderConfig::new(GitSourceProvider::KIND);
    let archive = |format: SourceKind, token: &Option<String>| {
        ProviderConfig::new(HttpArchiveSourceProvider::KIND)
            .with_option("format", format.as_str())
            .with_optional("token", token.clone())
    };

    match kind {
        BackendKind::Depot(depot) => (
            metadata.with_optional("token", depot.token.clone()),
            archive(depot.archive_format, &depot.token),
        ),
        BackendKind::Github(host) => (metadata.with_optional("token", host.token.clone()), git),
        BackendKind::GithubZip(host) => (
            metadata.with_optional("token", host.token.clone()),
            archive(SourceKind::Zip, &host.token),
        ),
        BackendKind::GithubTar(host) => (
            metadata.with_optional("token", host.token.clone()),
            archive(SourceKind::Tar, &host.token),
        ),
        _ => (metadata, git),
    }
}

async fn create_provider(ctx: &ResolverContext, config: &ProviderConfig) -> Result<SharedProvider> {
    let provider = ctx
        .providers()
        .create(&config.kind, ctx.provider_ctx(), config.options.clone())?;
    provider.init().await?;
    Ok(provider)
}

async fn dispose(backend: &str, provider: SharedProvider) {
    if let Err(e) = provider.deinit().await {
        warn!(backend = %backend, provider = %provider.name(), error = %e, "Provider deinit failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bosun_core::MetadataDocument;
    use bosun_providers::testing::MockProvider;
    use bosun_providers::{ProviderContext, ProviderRegistry};
    use serde_json::{json, Map, Value};
    use std::sync::Arc;

    fn context_with(mock: &MockProvider) -> ResolverContext {
        let registry = ProviderRegistry::with_builtins();
        let handle = mock.clone();
        registry.register("mock", move |_ctx, options| {
            handle.record_options(options);
            let provider: SharedProvider = Arc::new(handle.clone());
            Ok(provider)
        });
        ResolverContext::new(registry, ProviderContext::new(std::env::temp_dir()).unwrap())
    }

    fn backend(value: Value) -> BackendConfig {
        let mut config: BackendConfig = serde_json::from_value(value).unwrap();
        config.metadata_provider = Some(ProviderConfig::new("mock"));
        config.source_provider = Some(ProviderConfig::new("mock"));
        config
    }

    #[tokio::test]
    async fn test_source_host_git_lookup() {
        let mock = MockProvider::new("mock").with_metadata(
            "https://raw.githubusercontent.com/centry-core/demo/main/metadata.json",
            MetadataDocument::default(),
        );
        let leaf = LeafResolver::build(&backend(json!({})), &context_with(&mock))
            .await
            .unwrap();

        let result = leaf.lookup("demo").await.unwrap();
        assert_eq!(result.source.kind, "git");
        assert_eq!(result.source.target.source, "https://github.com/centry-core/demo.git");
        assert_eq!(result.source.target.branch.as_deref(), Some("main"));
        assert_eq!(
            result.objects.metadata,
            "https://raw.githubusercontent.com/centry-core/demo/main/metadata.json"
        );

        assert!(leaf.lookup("other").await.is_none());
    }

    #[tokio::test]
    async fn test_source_host_tar_lookup() {
        let mock = MockProvider::new("mock").answering_all(MetadataDocument::default());
        let config = backend(json!({
            "type": "github_tar",
            "namespace": "acme",
            "branch": "v1.0",
            "ref_type": "tags"
        }));
        let leaf = LeafResolver::build(&config, &context_with(&mock)).await.unwrap();

        let result = leaf.lookup("demo").await.unwrap();
        assert_eq!(result.source.kind, "tar");
        assert_eq!(
            result.source.target.source,
            "https://github.com/acme/demo/archive/refs/tags/v1.0.tar.gz"
        );
    }

    #[tokio::test]
    async fn test_allow_list_skips_probe() {
        let mock = MockProvider::new("mock").answering_all(MetadataDocument::default());
        let config = backend(json!({"type": "github", "whitelist": ["demo"]}));
        let leaf = LeafResolver::build(&config, &context_with(&mock)).await.unwrap();

        assert!(leaf.lookup("unlisted").await.is_none());
        assert_eq!(mock.call_count(), 0);

        assert!(leaf.lookup("demo").await.is_some());
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_depot_lookup() {
        let mock = MockProvider::new("mock").with_metadata(
            "https://depot.example.com/depot/global/plugins/demo/metadata",
            MetadataDocument::default(),
        );
        let config = backend(json!({
            "type": "depot",
            "base_url": "https://depot.example.com/",
            "group": "global",
            "archive_format": "tar"
        }));
        let leaf = LeafResolver::build(&config, &context_with(&mock)).await.unwrap();

        let result = leaf.lookup("demo").await.unwrap();
        assert_eq!(result.source.kind, "tar");
        assert_eq!(
            result.source.target.source,
            "https://depot.example.com/depot/global/plugins/demo/source"
        );
        assert!(leaf.lookup("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_config_key_absent_creates_no_providers() {
        let mock = MockProvider::new("mock");
        let config = backend(json!({"type": "config_key", "name": "plugin_repo_data"}));
        let leaf = LeafResolver::build(&config, &context_with(&mock)).await.unwrap();

        assert!(leaf.metadata_provider().is_none());
        assert!(leaf.lookup("demo").await.is_none());
        assert_eq!(mock.init_call_count(), 0);
    }

    #[tokio::test]
    async fn test_config_key_present() {
        let mock = MockProvider::new("mock");
        let mut module = Map::new();
        module.insert(
            "plugin_repo_data".to_string(),
            json!({"demo": {
                "source": {"type": "git", "source": "https://git.example.com/demo.git"},
                "objects": {"metadata": "https://git.example.com/demo/metadata.json"}
            }}),
        );
        let ctx = context_with(&mock).with_module_config(module);

        let config = backend(json!({"type": "config_key", "name": "plugin_repo_data"}));
        let leaf = LeafResolver::build(&config, &ctx).await.unwrap();

        assert!(leaf.lookup("demo").await.is_some());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_default_providers_and_deinit_once() {
        let mock = MockProvider::new("mock");
        let mut config = backend(json!({"type": "config", "data": {}}));
        config.source_provider = None;

        let mut leaf = LeafResolver::build(&config, &context_with(&mock)).await.unwrap();
        assert_eq!(leaf.source_provider().unwrap().name(), "git");
        assert_eq!(mock.init_call_count(), 1);

        leaf.deinit().await;
        leaf.deinit().await;
        assert_eq!(mock.deinit_call_count(), 1);
        assert!(leaf.metadata_provider().is_none());
    }

    #[tokio::test]
    async fn test_unknown_provider_type_fails_build() {
        let mock = MockProvider::new("mock");
        let mut config = backend(json!({"type": "config", "data": {}}));
        config.source_provider = Some(ProviderConfig::new("ftp"));

        let result = LeafResolver::build(&config, &context_with(&mock)).await;
        assert!(result.is_err());
        assert_eq!(mock.deinit_call_count(), 1);
    }

    #[test]
    fn test_default_provider_wiring() {
        let config: BackendConfig = serde_json::from_value(json!({
            "type": "github_zip",
            "token": "gh"
        }))
        .unwrap();

        let (metadata, source) = default_providers(&config.kind);
        assert_eq!(metadata.kind, "http");
        assert_eq!(metadata.options.get("token"), Some(&json!("gh")));
        assert_eq!(source.kind, "http_archive");
        assert_eq!(source.options.get("format"), Some(&json!("zip")));
    }
}
