//! Configuration validation

use crate::repo::{BackendConfig, BackendKind, ProviderConfig, RepoConfig, SourceHostConfig};
use crate::Config;
use bosun_core::{Error, Result, SourceKind};
use url::Url;

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_runtime(config)?;

    validate_repo(&config.plugin_repo)?;

    validate_drain(config)?;

    Ok(())
}

fn validate_runtime(config: &Config) -> Result<()> {
    if config.runtime.id.trim().is_empty() {
        return Err(Error::Config("runtime.id cannot be empty".to_string()));
    }

    if config.announce.enabled {
        if config.announce.interval.is_zero() {
            return Err(Error::Config("announce.interval must be > 0".to_string()));
        }
        if config.announce.tick.is_zero() {
            return Err(Error::Config("announce.tick must be > 0".to_string()));
        }
    }

    if config.debug.log_buffer_size == 0 {
        return Err(Error::Config("debug.log_buffer_size must be > 0".to_string()));
    }

    Ok(())
}

fn validate_drain(config: &Config) -> Result<()> {
    if config.drain.interval.is_zero() {
        return Err(Error::Config("drain.interval must be > 0".to_string()));
    }

    if config.drain.timeout.is_none() {
        tracing::warn!("drain.timeout is unbounded, restarts may wait forever");
    }

    for target in &config.drain.targets {
        if target.component.is_empty() {
            return Err(Error::Config(
                "drain target component cannot be empty".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validate a repository configuration tree
pub fn validate_repo(repo: &RepoConfig) -> Result<()> {
    match repo {
        RepoConfig::List(items) => items.iter().try_for_each(validate_repo),
        RepoConfig::Single(backend) => validate_backend(backend),
    }
}

fn validate_backend(backend: &BackendConfig) -> Result<()> {
    let kind = backend.kind.type_name();

    match &backend.kind {
        BackendKind::Resource { name } | BackendKind::ConfigKey { name } => {
            if name.is_empty() {
                return Err(Error::Config(format!("{kind} backend requires a name")));
            }
        }
        BackendKind::Config { .. } => {}
        BackendKind::Depot(depot) => {
            validate_url(kind, &depot.base_url)?;
            if depot.group.is_empty() {
                return Err(Error::Config("depot backend requires a group".to_string()));
            }
            validate_archive_format(kind, depot.archive_format)?;
        }
        BackendKind::Github(host) | BackendKind::GithubZip(host) | BackendKind::GithubTar(host) => {
            validate_source_host(kind, host)?;
        }
        BackendKind::DepotTiers(tiers) => {
            validate_url(kind, &tiers.base_url)?;
            if tiers.groups.is_empty() {
                return Err(Error::Config(
                    "depot_tiers backend requires at least one group".to_string(),
                ));
            }
            validate_archive_format(kind, tiers.archive_format)?;
        }
        BackendKind::GithubFederation(federation) => {
            if federation.namespaces.is_empty() {
                return Err(Error::Config(
                    "github_federation backend requires at least one namespace".to_string(),
                ));
            }
            validate_source_host(kind, &federation.template)?;
        }
    }

    for provider in [&backend.metadata_provider, &backend.source_provider]
        .into_iter()
        .flatten()
    {
        validate_provider(kind, provider)?;
    }

    Ok(())
}

fn validate_source_host(kind: &str, host: &SourceHostConfig) -> Result<()> {
    validate_url(kind, &host.base_url)?;
    validate_url(kind, &host.raw_base_url)?;

    if host.branch.is_empty() || host.metadata_file.is_empty() {
        return Err(Error::Config(format!(
            "{kind} backend requires branch and metadata_file"
        )));
    }

    match host.ref_type.as_str() {
        "heads" | "tags" => Ok(()),
        other => Err(Error::Config(format!(
            "Invalid ref_type for {kind} backend: {other} (must be heads or tags)"
        ))),
    }
}

fn validate_archive_format(kind: &str, format: SourceKind) -> Result<()> {
    if format == SourceKind::Git {
        return Err(Error::Config(format!(
            "{kind} backend archive_format must be zip or tar"
        )));
    }
    Ok(())
}

fn validate_provider(kind: &str, provider: &ProviderConfig) -> Result<()> {
    if provider.kind.is_empty() {
        return Err(Error::Config(format!(
            "{kind} backend provider requires a type"
        )));
    }
    Ok(())
}

fn validate_url(kind: &str, value: &str) -> Result<()> {
    Url::parse(value)
        .map(|_| ())
        .map_err(|e| Error::Config(format!("Invalid URL for {kind} backend '{value}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::DepotConfig;
    use crate::types::RuntimeConfig;
    use crate::ConfigBuilder;

    fn config_with(repo: RepoConfig) -> Config {
        ConfigBuilder::new()
            .runtime(RuntimeConfig::new("pylon-1"))
            .plugin_repo(repo)
            .build()
            .unwrap()
    }

    #[test]
    fn test_valid_default_config() {
        let config = config_with(RepoConfig::default());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_empty_runtime_id() {
        let mut config = config_with(RepoConfig::default());
        config.runtime.id = "  ".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_depot_requires_valid_url() {
        let repo = RepoConfig::Single(BackendConfig::new(BackendKind::Depot(DepotConfig {
            base_url: "not a url".to_string(),
            group: "global".to_string(),
            token: None,
            archive_format: SourceKind::Zip,
        })));
        assert!(validate_config(&config_with(repo)).is_err());
    }

    #[test]
    fn test_depot_rejects_git_archive_format() {
        let repo = RepoConfig::Single(BackendConfig::new(BackendKind::Depot(DepotConfig {
            base_url: "https://depot.example.com".to_string(),
            group: "global".to_string(),
            token: None,
            archive_format: SourceKind::Git,
        })));
        assert!(validate_config(&config_with(repo)).is_err());
    }

    #[test]
    fn test_nested_lists_are_validated() {
        let bad = RepoConfig::Single(BackendConfig::new(BackendKind::Github(
            SourceHostConfig {
                ref_type: "branches".to_string(),
                ..Default::default()
            },
        )));
        let repo = RepoConfig::List(vec![RepoConfig::List(vec![bad])]);
        assert!(validate_config(&config_with(repo)).is_err());
    }

    #[test]
    fn test_zero_drain_interval() {
        let mut config = config_with(RepoConfig::default());
        config.drain.interval = std::time::Duration::ZERO;
        assert!(validate_config(&config).is_err());
    }
}
