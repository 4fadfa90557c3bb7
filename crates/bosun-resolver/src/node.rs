//! Resolver tree

use crate::context::ResolverContext;
use crate::expand::expand;
use crate::leaf::LeafResolver;
use bosun_config::RepoConfig;
use bosun_core::{ResolutionResult, Result};
use bosun_providers::SharedProvider;
use std::future::Future;
use std::pin::Pin;
use tracing::debug;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A resolution together with the providers of the leaf that produced it
#[derive(Debug, Clone)]
pub struct Resolved {
    /// Backend type of the owning leaf
    pub backend: &'static str,

    /// Lookup result
    pub result: ResolutionResult,

    /// Owning leaf's metadata provider
    pub metadata_provider: SharedProvider,

    /// Owning leaf's source provider
    pub source_provider: SharedProvider,
}

/// Composite or leaf resolver
///
/// Earlier children shadow later ones; results are never merged.
#[derive(Debug)]
pub enum ResolverNode {
    /// Ordered children, no own backend
    Composite(Vec<ResolverNode>),

    /// Single backend
    Leaf(LeafResolver),
}

impl ResolverNode {
    /// Build a tree from configuration
    ///
    /// On failure, everything built so far is deinitialized before the
    /// error is returned.
    pub fn build<'a>(
        config: &'a RepoConfig,
        ctx: &'a ResolverContext,
    ) -> BoxFuture<'a, Result<ResolverNode>> {
        Box::pin(async move {
            match config {
                RepoConfig::List(items) => {
                    let mut children = Vec::with_capacity(items.len());

                    for item in items {
                        match ResolverNode::build(item, ctx).await {
                            Ok(child) => children.push(child),
                            Err(e) => {
                                let mut partial = ResolverNode::Composite(children);
                                partial.deinit().await;
                                return Err(e);
                            }
                        }
                    }

                    Ok(ResolverNode::Composite(children))
                }
                RepoConfig::Single(backend) => match expand(backend) {
                    RepoConfig::Single(concrete) => {
                        Ok(ResolverNode::Leaf(LeafResolver::build(&concrete, ctx).await?))
                    }
                    expanded @ RepoConfig::List(_) => {
                        debug!(backend = %backend.kind.type_name(), "Expanded meta backend");
                        ResolverNode::build(&expanded, ctx).await
                    }
                },
            }
        })
    }

    /// First leaf (depth-first, in order) whose lookup succeeds
    fn find<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Option<(&'a LeafResolver, ResolutionResult)>> {
        Box::pin(async move {
            match self {
                ResolverNode::Composite(children) => {
                    for child in children {
                        if let Some(hit) = child.find(name).await {
                            return Some(hit);
                        }
                    }
                    None
                }
                ResolverNode::Leaf(leaf) => leaf.lookup(name).await.map(|result| (leaf, result)),
            }
        })
    }

    /// Resolve a plugin name
    pub async fn resolve(&self, name: &str) -> Option<ResolutionResult> {
        self.find(name).await.map(|(_, result)| result)
    }

    /// Metadata provider of the leaf that currently resolves `name`
    ///
    /// Re-runs the lookup, including any network probe.
    pub async fn get_metadata_provider(&self, name: &str) -> Option<SharedProvider> {
        let (leaf, _) = self.find(name).await?;
        leaf.metadata_provider().cloned()
    }

    /// Source provider of the leaf that currently resolves `name`
    ///
    /// Re-runs the lookup, including any network probe.
    pub async fn get_source_provider(&self, name: &str) -> Option<SharedProvider> {
        let (leaf, _) = self.find(name).await?;
        leaf.source_provider().cloned()
    }

    /// Resolve and return the owning leaf's providers in one traversal
    pub async fn resolve_with_providers(&self, name: &str) -> Option<Resolved> {
        let (leaf, result) = self.find(name).await?;

        let (Some(metadata_provider), Some(source_provider)) =
            (leaf.metadata_provider(), leaf.source_provider())
        else {
            debug!(plugin = %name, backend = %leaf.backend(), "Resolving leaf has no providers");
            return None;
        };

        Some(Resolved {
            backend: leaf.backend(),
            result,
            metadata_provider: metadata_provider.clone(),
            source_provider: source_provider.clone(),
        })
    }

    /// Deinitialize children first, then own providers; idempotent
    pub fn deinit(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            match self {
                ResolverNode::Composite(children) => {
                    for child in children.iter_mut() {
                        child.deinit().await;
                    }
                }
                ResolverNode::Leaf(leaf) => leaf.deinit().await,
            }
        })
    }

    /// Number of leaves in the tree
    pub fn leaf_count(&self) -> usize {
        match self {
            ResolverNode::Composite(children) => children.iter().map(ResolverNode::leaf_count).sum(),
            ResolverNode::Leaf(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bosun_core::MetadataDocument;
    use bosun_providers::testing::MockProvider;
    use bosun_providers::{ProviderContext, ProviderRegistry};
    use serde_json::json;
    use std::sync::Arc;

    fn context(mocks: &[(&str, &MockProvider)]) -> ResolverContext {
        let registry = ProviderRegistry::with_builtins();
        for (kind, mock) in mocks {
            let handle = (*mock).clone();
            registry.register(*kind, move |_ctx, _options| {
                let provider: SharedProvider = Arc::new(handle.clone());
                Ok(provider)
            });
        }
        ResolverContext::new(registry, ProviderContext::new(std::env::temp_dir()).unwrap())
    }

    fn entry(url: &str) -> serde_json::Value {
        json!({
            "source": {"type": "git", "source": url},
            "objects": {"metadata": format!("{url}/metadata.json")}
        })
    }

    #[tokio::test]
    async fn test_first_sibling_wins_without_merge() {
        let ctx = context(&[]);
        let config: RepoConfig = serde_json::from_value(json!([
            {"type": "config", "data": {"demo": entry("https://first/demo")}},
            {"type": "config", "data": {
                "demo": entry("https://second/demo"),
                "extra": entry("https://second/extra")
            }}
        ]))
        .unwrap();

        let mut tree = ResolverNode::build(&config, &ctx).await.unwrap();

        let demo = tree.resolve("demo").await.unwrap();
        assert_eq!(demo.source.target.source, "https://first/demo");
        assert!(demo.source.target.extra.is_empty());

        let extra = tree.resolve("extra").await.unwrap();
        assert_eq!(extra.source.target.source, "https://second/extra");
        assert!(tree.resolve("unknown").await.is_none());

        tree.deinit().await;
    }

    #[tokio::test]
    async fn test_nested_composite_shadows_later_sibling() {
        let ctx = context(&[]);
        let config: RepoConfig = serde_json::from_value(json!([
            [
                {"type": "config", "data": {}},
                {"type": "config", "data": {"demo": entry("https://nested/demo")}}
            ],
            {"type": "config", "data": {"demo": entry("https://later/demo")}}
        ]))
        .unwrap();

        let tree = ResolverNode::build(&config, &ctx).await.unwrap();
        assert_eq!(tree.leaf_count(), 3);

        let demo = tree.resolve("demo").await.unwrap();
        assert_eq!(demo.source.target.source, "https://nested/demo");
    }

    #[tokio::test]
    async fn test_meta_backend_becomes_composite() {
        let probe = MockProvider::new("probe").with_metadata(
            "https://depot.example.com/depot/customer/plugins/demo/metadata",
            MetadataDocument::default(),
        );
        let ctx = context(&[("probe", &probe)]);
        let config: RepoConfig = serde_json::from_value(json!({
            "type": "depot_tiers",
            "base_url": "https://depot.example.com",
            "groups": ["local", "customer", "global"],
            "metadata_provider": {"type": "probe"}
        }))
        .unwrap();

        let tree = ResolverNode::build(&config, &ctx).await.unwrap();
        assert!(matches!(tree, ResolverNode::Composite(_)));
        assert_eq!(tree.leaf_count(), 3);

        let demo = tree.resolve("demo").await.unwrap();
        assert_eq!(
            demo.objects.metadata,
            "https://depot.example.com/depot/customer/plugins/demo/metadata"
        );
        assert_eq!(
            probe.metadata_calls(),
            vec![
                "https://depot.example.com/depot/local/plugins/demo/metadata".to_string(),
                "https://depot.example.com/depot/customer/plugins/demo/metadata".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_provider_lookups_reprobe() {
        let probe = MockProvider::new("probe").answering_all(MetadataDocument::default());
        let ctx = context(&[("probe", &probe)]);
        let config: RepoConfig = serde_json::from_value(json!({
            "type": "github",
            "metadata_provider": {"type": "probe"}
        }))
        .unwrap();

        let tree = ResolverNode::build(&config, &ctx).await.unwrap();

        tree.resolve("demo").await.unwrap();
        let metadata = tree.get_metadata_provider("demo").await.unwrap();
        let source = tree.get_source_provider("demo").await.unwrap();
        assert_eq!(metadata.name(), "probe");
        assert_eq!(source.name(), "git");
        assert_eq!(probe.metadata_calls().len(), 3);

        let resolved = tree.resolve_with_providers("demo").await.unwrap();
        assert_eq!(resolved.backend, "github");
        assert_eq!(probe.metadata_calls().len(), 4);
    }

    #[tokio::test]
    async fn test_deinit_children_once() {
        let tracked = MockProvider::new("tracked");
        let ctx = context(&[("tracked", &tracked)]);
        let config: RepoConfig = serde_json::from_value(json!([
            {"type": "config", "data": {}, "metadata_provider": {"type": "tracked"}},
            [{"type": "config", "data": {}, "source_provider": {"type": "tracked"}}]
        ]))
        .unwrap();

        let mut tree = ResolverNode::build(&config, &ctx).await.unwrap();
        assert_eq!(tracked.init_call_count(), 2);

        tree.deinit().await;
        tree.deinit().await;
        assert_eq!(tracked.deinit_call_count(), 2);
        assert!(tree.resolve_with_providers("demo").await.is_none());
    }

    #[tokio::test]
    async fn test_failed_build_disposes_partial_tree() {
        let tracked = MockProvider::new("tracked");
        let ctx = context(&[("tracked", &tracked)]);
        let config: RepoConfig = serde_json::from_value(json!([
            {"type": "config", "data": {}, "metadata_provider": {"type": "tracked"}},
            {"type": "resource", "name": "missing.json"}
        ]))
        .unwrap();

        assert!(ResolverNode::build(&config, &ctx).await.is_err());
        assert_eq!(tracked.deinit_call_count(), 1);
    }
}
