//! Resolver tests against live HTTP probes

use bosun_config::RepoConfig;
use bosun_providers::{ProviderContext, ProviderRegistry};
use bosun_resolver::{RepoResolver, ResolverContext, StaticResources};
use serde_json::json;
use std::sync::Arc;
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn context() -> ResolverContext {
    ResolverContext::new(
        ProviderRegistry::with_builtins(),
        ProviderContext::new(std::env::temp_dir().join("bosun-resolver-tests")).unwrap(),
    )
}

#[tokio::test]
async fn test_allow_listed_host_never_probes_unknown_names() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"version": "1.0.0"})))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config: RepoConfig = serde_json::from_value(json!({
        "namespace": "centry-core",
        "allow_list": ["demo"],
        "raw_base_url": mock_server.uri()
    }))
    .unwrap();

    let resolver = RepoResolver::new(&config, context()).await.unwrap();
    assert!(resolver.resolve("other").await.is_none());
    assert!(resolver.get_metadata_provider("other").await.is_none());

    resolver.deinit().await;
}

#[tokio::test]
async fn test_depot_tiers_fall_through_to_global() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/depot/global/plugins/demo/metadata"))
        .and(header("Authorization", "Bearer depot-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"version": "2.0.0"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/depot/customer/plugins/demo/metadata"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config: RepoConfig = serde_json::from_value(json!({
        "type": "depot_tiers",
        "base_url": mock_server.uri(),
        "groups": ["customer", "global"],
        "token": "depot-token"
    }))
    .unwrap();

    let resolver = RepoResolver::new(&config, context()).await.unwrap();
    let resolved = resolver.resolve_with_providers("demo").await.unwrap();

    assert_eq!(resolved.backend, "depot");
    assert_eq!(resolved.result.source.kind, "zip");
    assert_eq!(
        resolved.result.source.target.source,
        format!("{}/depot/global/plugins/demo/source", mock_server.uri())
    );
    assert_eq!(resolved.source_provider.name(), "http_archive");

    resolver.deinit().await;
}

#[tokio::test]
async fn test_local_bundle_shadows_source_host() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&mock_server)
        .await;

    let bundle = json!({
        "demo": {
            "source": {"type": "git", "source": "https://bundle.example.com/demo.git"},
            "objects": {"metadata": "https://bundle.example.com/demo/metadata.json"}
        }
    });
    let resources = StaticResources::new().with("data/repo.json", bundle.to_string());

    let config: RepoConfig = serde_json::from_value(json!([
        {"type": "resource", "name": "data/repo.json"},
        {"type": "github", "raw_base_url": mock_server.uri()}
    ]))
    .unwrap();

    let resolver = RepoResolver::new(&config, context().with_resources(Arc::new(resources)))
        .await
        .unwrap();

    let demo = resolver.resolve("demo").await.unwrap();
    assert_eq!(demo.source.target.source, "https://bundle.example.com/demo.git");

    resolver.deinit().await;
}
