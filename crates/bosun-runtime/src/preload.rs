//! Startup install of preordered plugins and their dependency closure

use crate::host::PluginStore;
use crate::reconcile::install_from_repo;
use bosun_core::{MetadataDocument, Result};
use bosun_resolver::RepoResolver;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use tracing::{error, info};

/// What a preload run did
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PreloadReport {
    /// Every plugin processed, in visit order
    pub visited: Vec<String>,
    /// Plugins fetched and added to the store
    pub installed: Vec<String>,
    /// Plugins already installed
    pub present: Vec<String>,
    /// Plugins that could not be installed
    pub skipped: Vec<String>,
}

/// Install `names` and everything they depend on
///
/// Breadth-first over `depends_on`; each plugin is visited once, so
/// dependency cycles terminate.
pub async fn preload(
    resolver: &RepoResolver,
    store: &dyn PluginStore,
    names: &[String],
) -> PreloadReport {
    let mut report = PreloadReport::default();
    let mut queue: VecDeque<String> = VecDeque::new();
    let mut known: HashSet<String> = HashSet::new();

    for name in names {
        if known.insert(name.clone()) {
            queue.push_back(name.clone());
        }
    }

    while let Some(name) = queue.pop_front() {
        info!(plugin = %name, "Preloading plugin");
        report.visited.push(name.clone());

        let metadata = match load_one(resolver, store, &name).await {
            Ok((metadata, true)) => {
                report.present.push(name.clone());
                metadata
            }
            Ok((metadata, false)) => {
                report.installed.push(name.clone());
                metadata
            }
            Err(e) => {
                error!(plugin = %name, error = %e, "Failed to preload plugin");
                report.skipped.push(name);
                continue;
            }
        };

        for dependency in metadata.depends_on {
            if known.insert(dependency.clone()) {
                queue.push_back(dependency);
            }
        }
    }

    info!(
        visited = report.visited.len(),
        installed = report.installed.len(),
        skipped = report.skipped.len(),
        "Preload finished"
    );
    report
}

/// Metadata of `name` and whether it was already installed
async fn load_one(
    resolver: &RepoResolver,
    store: &dyn PluginStore,
    name: &str,
) -> Result<(MetadataDocument, bool)> {
    if store.plugin_exists(name).await? {
        info!(plugin = %name, "Plugin already exists");
        return Ok((store.get_plugin_metadata(name).await?, true));
    }

    let metadata = install_from_repo(resolver, store, name).await?;
    Ok((metadata, false))
}
