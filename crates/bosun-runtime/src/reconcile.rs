//! Reconciliation of change payloads
//!
//! A payload is applied in a fixed order: plugin changes, config pushes,
//! actions, reloads, then the optional drain and restart. Per-item failures
//! are logged and skipped; only a malformed payload aborts, and it does so
//! before any effect.

use crate::drain::{DrainCoordinator, DrainOutcome};
use crate::host::{PluginHost, PluginStore};
use crate::payload::{Action, ChangePayload, Misdirected};
use crate::restart::{current_pid, RestartScheduler};
use crate::settings::Settings;
use crate::toggle::{DebugMode, LogControl, Profiler, Profiling};
use bosun_config::RepoConfig;
use bosun_core::{Error, MetadataDocument, PluginChange, Result};
use bosun_resolver::RepoResolver;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Process-wide toggles driven by payload actions
#[derive(Debug, Clone)]
pub struct RuntimeControls {
    /// Debug log capture
    pub debug: Arc<DebugMode>,
    /// On-demand profiling
    pub profiling: Arc<Profiling>,
    /// Process-wide tunables
    pub settings: Settings,
}

impl RuntimeControls {
    /// Build toggles over a log pipeline and profiler
    pub fn new(
        log_control: Arc<dyn LogControl>,
        profiler: Arc<dyn Profiler>,
        settings: Settings,
        log_buffer_size: usize,
    ) -> Self {
        Self {
            debug: Arc::new(DebugMode::new(log_control, log_buffer_size)),
            profiling: Arc::new(Profiling::new(profiler)),
            settings,
        }
    }
}

/// Drain followed by a delayed termination request
#[derive(Debug, Clone)]
pub struct RestartController {
    drain: DrainCoordinator,
    scheduler: RestartScheduler,
}

impl RestartController {
    /// Create a controller
    pub fn new(drain: DrainCoordinator, scheduler: RestartScheduler) -> Self {
        Self { drain, scheduler }
    }

    /// Drain, then schedule termination of `pid`
    pub async fn restart(&self, pid: i32) -> DrainOutcome {
        let outcome = self.drain.wait_for_tasks().await;
        info!(pid, outcome = ?outcome, "Restarting");
        self.scheduler.schedule(pid);
        outcome
    }
}

/// Outcome of applying a payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// Addressed elsewhere; nothing was touched
    Ignored {
        /// Why it was ignored
        #[serde(skip)]
        reason: Misdirected,
    },
    /// Applied
    Applied(ReconcileReport),
}

/// What an applied payload changed
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    /// Installed or updated plugins
    pub installed: Vec<String>,
    /// Removed plugins
    pub removed: Vec<String>,
    /// Plugins that could not be installed
    pub skipped: Vec<String>,
    /// Plugins whose config was written
    pub configs: Vec<String>,
    /// Recognized actions, in order
    pub actions: Vec<String>,
    /// Plugins a reload was requested for, in load order
    pub reloaded: Vec<String>,
    /// Whether a termination request was scheduled
    pub restart_scheduled: bool,
    /// Drain result, when a restart ran
    pub drain: Option<DrainOutcome>,
}

/// Resolve, fetch and hand a plugin to the store
///
/// Returns the fetched metadata. A resolution miss is [`Error::NotResolved`]
/// and an unknown source type is [`Error::UnsupportedSource`].
pub(crate) async fn install_from_repo(
    resolver: &RepoResolver,
    store: &dyn PluginStore,
    name: &str,
) -> Result<MetadataDocument> {
    let resolved = resolver
        .resolve_with_providers(name)
        .await
        .ok_or_else(|| Error::NotResolved(name.to_string()))?;

    let source = &resolved.result.source;
    if source.source_kind().is_none() {
        return Err(Error::UnsupportedSource(source.kind.clone()));
    }

    let metadata = resolved
        .metadata_provider
        .get_metadata(&resolved.result.metadata_target())
        .await?;
    let artifact = resolved.source_provider.get_source(&source.target).await?;

    debug!(
        plugin = %name,
        backend = resolved.backend,
        origin = %artifact.origin(),
        "Fetched plugin source"
    );
    store.add_plugin(name, artifact).await?;

    Ok(metadata)
}

/// Applies change payloads addressed to this process
#[derive(Debug)]
pub struct Reconciler {
    identity: String,
    resolver: Arc<RepoResolver>,
    store: Arc<dyn PluginStore>,
    host: Arc<dyn PluginHost>,
    controls: RuntimeControls,
    restart: RestartController,
    apply_lock: Mutex<()>,
}

impl Reconciler {
    /// Create a reconciler for the process named `identity`
    pub fn new(
        identity: impl Into<String>,
        resolver: Arc<RepoResolver>,
        store: Arc<dyn PluginStore>,
        host: Arc<dyn PluginHost>,
        controls: RuntimeControls,
        restart: RestartController,
    ) -> Self {
        Self {
            identity: identity.into(),
            resolver,
            store,
            host,
            controls,
            restart,
            apply_lock: Mutex::new(()),
        }
    }

    /// Process identity payloads are matched against
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Toggles driven by actions
    pub fn controls(&self) -> &RuntimeControls {
        &self.controls
    }

    /// Replace the backend tree between payloads
    ///
    /// Installs keep the providers they resolved until they finish, so the
    /// old tree is only torn down once no payload is being applied.
    pub async fn rebuild_repo(&self, plugin_repo: &RepoConfig) -> Result<()> {
        let _guard = self.apply_lock.lock().await;
        self.resolver.rebuild(plugin_repo).await
    }

    /// Apply one payload; payloads are applied one at a time
    pub async fn apply(&self, payload: Value) -> Result<ReconcileOutcome> {
        let payload = match ChangePayload::parse_for(&self.identity, payload)? {
            Ok(payload) => payload,
            Err(reason) => {
                debug!(reason = ?reason, "Ignoring change payload");
                return Ok(ReconcileOutcome::Ignored { reason });
            }
        };

        let _guard = self.apply_lock.lock().await;
        let span = info_span!("reconcile", target = %self.identity);
        let report = self.apply_payload(&payload).instrument(span).await;

        Ok(ReconcileOutcome::Applied(report))
    }

    async fn apply_payload(&self, payload: &ChangePayload) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for change in payload.plugin_changes() {
            match change {
                PluginChange::Remove(name) => {
                    self.remove_plugin(&name).await;
                    report.removed.push(name);
                }
                PluginChange::Install(name) => match self.install_plugin(&name).await {
                    Ok(()) => report.installed.push(name),
                    Err(e) => {
                        if e.is_miss() {
                            error!(plugin = %name, error = %e, "Skipping plugin");
                        } else {
                            error!(plugin = %name, error = %e, "Plugin install failed");
                        }
                        report.skipped.push(name);
                    }
                },
            }
        }

        for (name, data) in payload.config_bytes() {
            if self.push_config(&name, &data).await {
                report.configs.push(name);
            }
        }

        for action in payload.parsed_actions() {
            if self.run_action(&action).await {
                report.actions.push(action.name().to_string());
            }
        }

        report.reloaded = self.request_reloads(&payload.reload).await;

        if payload.restart {
            let pid = payload.target_pid.unwrap_or_else(current_pid);
            report.drain = Some(self.restart.restart(pid).await);
            report.restart_scheduled = true;
        }

        report
    }

    async fn install_plugin(&self, name: &str) -> Result<()> {
        if self.store.plugin_exists(name).await? {
            info!(plugin = %name, "Updating plugin");
        } else {
            info!(plugin = %name, "Installing plugin");
        }

        let metadata = install_from_repo(&self.resolver, self.store.as_ref(), name).await?;

        if let Err(e) = self.host.set_installed(name, false).await {
            warn!(plugin = %name, error = %e, "Failed to clear installed flag");
        }

        info!(plugin = %name, version = %metadata.version(), "Plugin updated");
        Ok(())
    }

    async fn remove_plugin(&self, name: &str) {
        info!(plugin = %name, "Deleting plugin");

        match self.store.plugin_exists(name).await {
            Ok(true) => {
                if let Err(e) = self.store.delete_plugin(name).await {
                    warn!(plugin = %name, error = %e, "Failed to delete plugin");
                }
            }
            Ok(false) => debug!(plugin = %name, "Plugin not installed"),
            Err(e) => warn!(plugin = %name, error = %e, "Failed to query plugin store"),
        }

        self.purge_requirements(name).await;
        if let Err(e) = self.host.set_installed(name, false).await {
            warn!(plugin = %name, error = %e, "Failed to clear installed flag");
        }
    }

    async fn purge_requirements(&self, name: &str) {
        if let Err(e) = self.host.purge_build_cache(name).await {
            warn!(plugin = %name, error = %e, "Failed to purge build cache");
        }
        if let Err(e) = self.host.clear_dependency_records(name).await {
            warn!(plugin = %name, error = %e, "Failed to clear dependency records");
        }
    }

    async fn push_config(&self, name: &str, data: &[u8]) -> bool {
        info!(plugin = %name, bytes = data.len(), "Updating plugin config");

        if let Err(e) = self.host.write_config(name, data).await {
            warn!(plugin = %name, error = %e, "Failed to write plugin config");
            return false;
        }

        if self.host.is_loaded(name) {
            if let Err(e) = self.host.reload_config(name).await {
                warn!(plugin = %name, error = %e, "Failed to reload plugin config");
            } else if let Err(e) = self.host.reconfigure(name).await {
                warn!(plugin = %name, error = %e, "Plugin reconfigure hook failed");
            }
        }

        true
    }

    async fn run_action(&self, action: &Action) -> bool {
        info!(action = action.name(), "Running action");

        let result = match action {
            Action::EnableDebugMode => self.controls.debug.enable().map(|_| ()),
            Action::DisableDebugMode => self.controls.debug.disable().map(|_| ()),
            Action::EnableOndemandProfiling => self.controls.profiling.enable().map(|_| ()),
            Action::DisableOndemandProfiling => self.controls.profiling.disable().map(|_| ()),
            Action::DeleteRequirements(names) => {
                for name in names {
                    if let Err(e) = self.host.clear_dependency_records(name).await {
                        warn!(plugin = %name, error = %e, "Failed to clear dependency records");
                    }
                    if let Err(e) = self.host.purge_build_cache(name).await {
                        warn!(plugin = %name, error = %e, "Failed to purge build cache");
                    }
                }
                Ok(())
            }
            Action::UpdateSettings(data) => self
                .controls
                .settings
                .merge_encoded(data)
                .map(|count| debug!(keys = count, "Settings merged")),
            Action::Unknown(name) => {
                warn!(action = %name, "Ignoring unknown action");
                return false;
            }
        };

        if let Err(e) = result {
            warn!(action = action.name(), error = %e, "Action failed");
        }
        true
    }

    async fn request_reloads(&self, wanted: &[String]) -> Vec<String> {
        if wanted.is_empty() {
            return Vec::new();
        }

        let wanted: HashSet<&str> = wanted.iter().map(String::as_str).collect();
        let mut reloaded = Vec::new();

        for name in self.host.load_order() {
            if !wanted.contains(name.as_str()) {
                continue;
            }
            info!(plugin = %name, "Requesting plugin reload");
            if let Err(e) = self.host.request_reload(&name).await {
                warn!(plugin = %name, error = %e, "Reload request failed");
                continue;
            }
            reloaded.push(name);
        }

        reloaded
    }
}
