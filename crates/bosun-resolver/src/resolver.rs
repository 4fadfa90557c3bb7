//! Repository resolver facade

use crate::context::ResolverContext;
use crate::node::{Resolved, ResolverNode};
use bosun_config::RepoConfig;
use bosun_core::{ResolutionResult, Result};
use bosun_providers::SharedProvider;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Owns the resolver tree and swaps it wholesale on reconfiguration
#[derive(Debug)]
pub struct RepoResolver {
    tree: RwLock<ResolverNode>,
    ctx: RwLock<ResolverContext>,
}

impl RepoResolver {
    /// Build a resolver from configuration
    pub async fn new(config: &RepoConfig, ctx: ResolverContext) -> Result<Self> {
        let tree = ResolverNode::build(config, &ctx).await?;

        info!(leaves = tree.leaf_count(), "Repo resolver ready");

        Ok(Self {
            tree: RwLock::new(tree),
            ctx: RwLock::new(ctx),
        })
    }

    /// Resolve a plugin name
    pub async fn resolve(&self, name: &str) -> Option<ResolutionResult> {
        self.tree.read().await.resolve(name).await
    }

    /// Metadata provider of the leaf that resolves `name`
    pub async fn get_metadata_provider(&self, name: &str) -> Option<SharedProvider> {
        self.tree.read().await.get_metadata_provider(name).await
    }

    /// Source provider of the leaf that resolves `name`
    pub async fn get_source_provider(&self, name: &str) -> Option<SharedProvider> {
        self.tree.read().await.get_source_provider(name).await
    }

    /// Resolve and return the owning leaf's providers with one lookup
    pub async fn resolve_with_providers(&self, name: &str) -> Option<Resolved> {
        self.tree.read().await.resolve_with_providers(name).await
    }

    /// Deinitialize every provider; later calls are no-ops
    pub async fn deinit(&self) {
        self.tree.write().await.deinit().await;
    }

    /// Tear down the current tree, then build one from `config`
    ///
    /// The old tree is fully deinitialized first. If the new build fails the
    /// resolver is left empty and the error is returned.
    pub async fn rebuild(&self, config: &RepoConfig) -> Result<()> {
        let ctx = self.ctx.read().await.clone();
        self.rebuild_with(config, ctx).await
    }

    /// Rebuild with a new context, e.g. after the module config changed
    pub async fn rebuild_with(&self, config: &RepoConfig, ctx: ResolverContext) -> Result<()> {
        let mut tree = self.tree.write().await;

        tree.deinit().await;
        *tree = ResolverNode::Composite(Vec::new());

        match ResolverNode::build(config, &ctx).await {
            Ok(new_tree) => {
                info!(leaves = new_tree.leaf_count(), "Repo resolver rebuilt");
                *tree = new_tree;
                *self.ctx.write().await = ctx;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Repo resolver rebuild failed, resolver is empty");
                Err(e)
            }
        }
    }

    /// Number of leaves in the current tree
    pub async fn leaf_count(&self) -> usize {
        self.tree.read().await.leaf_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bosun_providers::testing::MockProvider;
    use bosun_providers::{ProviderContext, ProviderRegistry};
    use serde_json::{json, Map};
    use std::sync::Arc;

    fn context(mock: &MockProvider) -> ResolverContext {
        let registry = ProviderRegistry::with_builtins();
        let handle = mock.clone();
        registry.register("tracked", move |_ctx, _options| {
            let provider: SharedProvider = Arc::new(handle.clone());
            Ok(provider)
        });
        ResolverContext::new(registry, ProviderContext::new(std::env::temp_dir()).unwrap())
    }

    fn table(name: &str) -> RepoConfig {
        serde_json::from_value(json!({
            "type": "config",
            "metadata_provider": {"type": "tracked"},
            "data": {name: {
                "source": {"type": "git", "source": format!("https://git.example.com/{name}.git")},
                "objects": {"metadata": format!("https://git.example.com/{name}/metadata.json")}
            }}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_rebuild_deinitializes_old_tree_first() {
        let mock = MockProvider::new("tracked");
        let resolver = RepoResolver::new(&table("alpha"), context(&mock)).await.unwrap();
        assert!(resolver.resolve("alpha").await.is_some());

        resolver.rebuild(&table("beta")).await.unwrap();
        assert_eq!(mock.deinit_call_count(), 1);
        assert_eq!(mock.init_call_count(), 2);
        assert!(resolver.resolve("alpha").await.is_none());
        assert!(resolver.resolve("beta").await.is_some());

        resolver.deinit().await;
        resolver.deinit().await;
        assert_eq!(mock.deinit_call_count(), 2);
    }

    #[tokio::test]
    async fn test_rebuild_with_module_config() {
        let mock = MockProvider::new("tracked");
        let config: RepoConfig =
            serde_json::from_value(json!({"type": "config_key", "name": "repo_data"})).unwrap();

        let resolver = RepoResolver::new(&config, context(&mock)).await.unwrap();
        assert!(resolver.resolve("demo").await.is_none());

        let mut module = Map::new();
        module.insert(
            "repo_data".to_string(),
            json!({"demo": {
                "source": {"type": "zip", "source": "https://example.com/demo.zip"},
                "objects": {"metadata": "https://example.com/demo.json"}
            }}),
        );
        resolver
            .rebuild_with(&config, context(&mock).with_module_config(module))
            .await
            .unwrap();

        let demo = resolver.resolve("demo").await.unwrap();
        assert_eq!(demo.source.kind, "zip");
    }

    #[tokio::test]
    async fn test_failed_rebuild_leaves_resolver_empty() {
        let mock = MockProvider::new("tracked");
        let resolver = RepoResolver::new(&table("alpha"), context(&mock)).await.unwrap();

        let broken: RepoConfig =
            serde_json::from_value(json!({"type": "resource", "name": "missing.json"})).unwrap();
        assert!(resolver.rebuild(&broken).await.is_err());

        assert_eq!(resolver.leaf_count().await, 0);
        assert!(resolver.resolve("alpha").await.is_none());
    }
}
