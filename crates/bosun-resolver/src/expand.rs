//! Meta-repo expansion
//!
//! Shorthand backends (`depot_tiers`, `github_federation`) expand into a
//! list of concrete leaf declarations before the tree is built. Expansion is
//! pure: the same declaration always yields the same leaves, in declared
//! order.

use bosun_config::{
    BackendConfig, BackendKind, DepotConfig, DepotTiersConfig, FederationConfig, ProviderConfig,
    RepoConfig, SourceHostConfig,
};
use bosun_core::SourceKind;
use bosun_providers::{HttpArchiveSourceProvider, HttpMetadataProvider};

/// Expand one declaration; concrete backends pass through as `Single`
pub fn expand(config: &BackendConfig) -> RepoConfig {
    match &config.kind {
        BackendKind::DepotTiers(tiers) => RepoConfig::List(expand_depot_tiers(config, tiers)),
        BackendKind::GithubFederation(federation) => {
            RepoConfig::List(expand_federation(config, federation))
        }
        _ => RepoConfig::Single(config.clone()),
    }
}

fn expand_depot_tiers(config: &BackendConfig, tiers: &DepotTiersConfig) -> Vec<RepoConfig> {
    let metadata_provider = config.metadata_provider.clone().unwrap_or_else(|| {
        ProviderConfig::new(HttpMetadataProvider::KIND).with_optional("token", tiers.token.clone())
    });
    let source_provider = config.source_provider.clone().unwrap_or_else(|| {
        ProviderConfig::new(HttpArchiveSourceProvider::KIND)
            .with_option("format", tiers.archive_format.as_str())
            .with_optional("token", tiers.token.clone())
    });

    tiers
        .groups
        .iter()
        .map(|group| {
            let depot = DepotConfig {
                base_url: tiers.base_url.clone(),
                group: group.clone(),
                token: tiers.token.clone(),
                archive_format: tiers.archive_format,
            };

            BackendConfig::new(BackendKind::Depot(depot))
                .with_metadata_provider(metadata_provider.clone())
                .with_source_provider(source_provider.clone())
                .into()
        })
        .collect()
}

fn expand_federation(config: &BackendConfig, federation: &FederationConfig) -> Vec<RepoConfig> {
    federation
        .namespaces
        .iter()
        .map(|namespace| {
            let host = SourceHostConfig {
                namespace: namespace.clone(),
                ..federation.template.clone()
            };

            let kind = match federation.transport {
                SourceKind::Git => BackendKind::Github(host),
                SourceKind::Zip => BackendKind::GithubZip(host),
                SourceKind::Tar => BackendKind::GithubTar(host),
            };

            BackendConfig {
                kind,
                metadata_provider: config.metadata_provider.clone(),
                source_provider: config.source_provider.clone(),
            }
            .into()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn backend(value: serde_json::Value) -> BackendConfig {
        serde_json::from_value(value).unwrap()
    }

    fn leaves(repo: RepoConfig) -> Vec<BackendConfig> {
        let RepoConfig::List(items) = repo else {
            panic!("expected expansion to a list");
        };
        items
            .into_iter()
            .map(|item| match item {
                RepoConfig::Single(config) => config,
                RepoConfig::List(_) => panic!("expansion must be flat"),
            })
            .collect()
    }

    #[test]
    fn test_depot_tiers_in_group_order() {
        let config = backend(json!({
            "type": "depot_tiers",
            "base_url": "https://depot.example.com",
            "groups": ["local", "customer", "global"],
            "token": "t0k"
        }));

        let leaves = leaves(expand(&config));
        let groups: Vec<_> = leaves
            .iter()
            .map(|leaf| match &leaf.kind {
                BackendKind::Depot(depot) => depot.group.clone(),
                other => panic!("unexpected leaf {other:?}"),
            })
            .collect();
        assert_eq!(groups, vec!["local", "customer", "global"]);

        let metadata = leaves[0].metadata_provider.as_ref().unwrap();
        assert_eq!(metadata.kind, "http");
        assert_eq!(metadata.options.get("token"), Some(&json!("t0k")));

        let source = leaves[2].source_provider.as_ref().unwrap();
        assert_eq!(source.kind, "http_archive");
        assert_eq!(source.options.get("format"), Some(&json!("zip")));
    }

    #[test]
    fn test_federation_transport_and_template() {
        let config = backend(json!({
            "type": "github_federation",
            "namespaces": ["acme", "centry-core"],
            "transport": "zip",
            "branch": "release",
            "allow_list": ["demo"]
        }));

        let leaves = leaves(expand(&config));
        assert_eq!(leaves.len(), 2);

        for (leaf, namespace) in leaves.iter().zip(["acme", "centry-core"]) {
            let BackendKind::GithubZip(host) = &leaf.kind else {
                panic!("expected zip source host");
            };
            assert_eq!(host.namespace, namespace);
            assert_eq!(host.branch, "release");
            assert_eq!(host.allow_list, Some(vec!["demo".to_string()]));
        }
    }

    #[test]
    fn test_concrete_passes_through() {
        let config = backend(json!({"type": "config_key", "name": "plugin_repo_data"}));
        assert_eq!(expand(&config), RepoConfig::Single(config));
    }

    #[test]
    fn test_expansion_is_pure() {
        let config = backend(json!({
            "type": "depot_tiers",
            "base_url": "https://depot.example.com",
            "groups": ["customer", "global"]
        }));
        assert_eq!(expand(&config), expand(&config));
    }
}
