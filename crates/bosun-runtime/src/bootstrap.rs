//! Runtime facade: resolver, preload, announcer and reconciler wired together

use crate::announcer::RuntimeAnnouncer;
use crate::drain::{DrainCoordinator, WorkerDirectory};
use crate::host::{EventPublisher, PluginHost, PluginStore};
use crate::preload::{preload, PreloadReport};
use crate::reconcile::{Reconciler, RestartController, RuntimeControls};
use crate::restart::{ProcessTerminator, RestartScheduler, SignalTerminator};
use crate::settings::Settings;
use crate::shutdown::ShutdownSignal;
use crate::tasks::LocalWorkerDirectory;
use crate::telemetry::TelemetryHandle;
use crate::toggle::{LogControl, Profiler};
use bosun_config::{validate_config, Config, RepoConfig};
use bosun_core::Result;
use bosun_providers::{ProviderContext, ProviderRegistry};
use bosun_resolver::{DirectoryResources, RepoResolver, ResolverContext, ResourceLoader};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Host-side collaborators handed to [`Bootstrap::start`]
#[derive(Debug, Clone)]
pub struct HostParts {
    store: Arc<dyn PluginStore>,
    host: Arc<dyn PluginHost>,
    publisher: Arc<dyn EventPublisher>,
    workers: Arc<dyn WorkerDirectory>,
    log_control: Arc<dyn LogControl>,
    profiler: Arc<dyn Profiler>,
    terminator: Arc<dyn ProcessTerminator>,
    providers: ProviderRegistry,
    resources: Option<Arc<dyn ResourceLoader>>,
}

impl HostParts {
    /// Required collaborators; `telemetry` drives debug mode and profiling
    pub fn new(
        store: Arc<dyn PluginStore>,
        host: Arc<dyn PluginHost>,
        publisher: Arc<dyn EventPublisher>,
        telemetry: TelemetryHandle,
    ) -> Self {
        let log_control = Arc::new(telemetry.clone());
        Self::with_log_pipeline(store, host, publisher, log_control, Arc::new(telemetry))
    }

    /// Required collaborators over a host-provided log pipeline
    pub fn with_log_pipeline(
        store: Arc<dyn PluginStore>,
        host: Arc<dyn PluginHost>,
        publisher: Arc<dyn EventPublisher>,
        log_control: Arc<dyn LogControl>,
        profiler: Arc<dyn Profiler>,
    ) -> Self {
        Self {
            store,
            host,
            publisher,
            workers: Arc::new(LocalWorkerDirectory::new()),
            log_control,
            profiler,
            terminator: Arc::new(SignalTerminator),
            providers: ProviderRegistry::with_builtins(),
            resources: None,
        }
    }

    /// Queues and nodes drained before restart
    pub fn with_workers(mut self, workers: Arc<dyn WorkerDirectory>) -> Self {
        self.workers = workers;
        self
    }

    /// Replace the termination mechanism
    pub fn with_terminator(mut self, terminator: Arc<dyn ProcessTerminator>) -> Self {
        self.terminator = terminator;
        self
    }

    /// Replace the provider registry
    pub fn with_providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = providers;
        self
    }

    /// Replace the bundled resource loader
    pub fn with_resources(mut self, resources: Arc<dyn ResourceLoader>) -> Self {
        self.resources = Some(resources);
        self
    }
}

/// Running runtime
#[derive(Debug)]
pub struct Bootstrap {
    resolver: Arc<RepoResolver>,
    reconciler: Arc<Reconciler>,
    preload: PreloadReport,
    shutdown: ShutdownSignal,
    announcer: Mutex<Option<JoinHandle<()>>>,
}

impl Bootstrap {
    /// Build the resolver, preload plugins and start announcing
    pub async fn start(config: Config, parts: HostParts) -> Result<Self> {
        validate_config(&config)?;

        let resources = parts.resources.unwrap_or_else(|| {
            let loader: Arc<dyn ResourceLoader> =
                Arc::new(DirectoryResources::new(&config.runtime.resources_dir));
            loader
        });
        let ctx = ResolverContext::new(
            parts.providers,
            ProviderContext::new(&config.runtime.work_dir)?,
        )
        .with_resources(resources)
        .with_module_config(config.module.clone());

        let resolver = Arc::new(RepoResolver::new(&config.plugin_repo, ctx).await?);
        info!(
            target_id = %config.runtime.id,
            leaves = resolver.leaf_count().await,
            "Repo resolver ready"
        );

        let preload = preload(&resolver, parts.store.as_ref(), &config.preordered_plugins).await;

        let settings = Settings::new();
        let controls = RuntimeControls::new(
            parts.log_control,
            parts.profiler,
            settings.clone(),
            config.debug.log_buffer_size,
        );

        let shutdown = ShutdownSignal::new();
        let announcer = if config.announce.enabled {
            let announcer = RuntimeAnnouncer::new(
                config.runtime.id.clone(),
                parts.host.clone(),
                parts.publisher,
                settings,
                controls.debug.clone(),
                &config.announce,
            );
            Some(announcer.spawn(shutdown.clone()))
        } else {
            None
        };

        let restart = RestartController::new(
            DrainCoordinator::new(parts.workers, &config.drain),
            RestartScheduler::new(parts.terminator, config.drain.restart_delay),
        );
        let reconciler = Arc::new(Reconciler::new(
            config.runtime.id.clone(),
            resolver.clone(),
            parts.store,
            parts.host,
            controls,
            restart,
        ));

        Ok(Self {
            resolver,
            reconciler,
            preload,
            shutdown,
            announcer: Mutex::new(announcer),
        })
    }

    /// Controller applying change payloads
    pub fn reconciler(&self) -> Arc<Reconciler> {
        self.reconciler.clone()
    }

    /// Shared resolver
    pub fn resolver(&self) -> Arc<RepoResolver> {
        self.resolver.clone()
    }

    /// Result of the startup preload
    pub fn preload_report(&self) -> &PreloadReport {
        &self.preload
    }

    /// Signal fired by [`Bootstrap::shutdown`]
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Replace the backend tree
    pub async fn reconfigure(&self, plugin_repo: &RepoConfig) -> Result<()> {
        self.reconciler.rebuild_repo(plugin_repo).await
    }

    /// Stop announcing and release every provider
    pub async fn shutdown(&self) {
        self.shutdown.trigger();

        if let Some(handle) = self.announcer.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Runtime announcer task failed");
            }
        }

        self.resolver.deinit().await;
        info!("Runtime stopped");
    }
}
