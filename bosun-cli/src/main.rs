//! Bosun CLI

mod local;

use anyhow::Result;
use bosun_config::{load_config, LoggingConfig};
use bosun_providers::{ProviderContext, ProviderRegistry};
use bosun_resolver::{DirectoryResources, RepoResolver, ResolverContext, ResourceLoader};
use bosun_runtime::shutdown::SignalHook;
use bosun_runtime::{
    telemetry, Bootstrap, HostParts, PluginHost, ReconcileOutcome, Reconciler, SignalHandler,
};
use clap::{Parser, Subcommand};
use futures::future::join_all;
use local::{LocalHost, LogPublisher};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

#[derive(Parser)]
#[command(name = "bosun")]
#[command(about = "Bosun plugin runtime", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the runtime and apply change payloads as they arrive
    Serve {
        /// Path to configuration file
        #[arg(short, long, default_value = "bosun.yaml", env = "BOSUN_CONFIG")]
        config: PathBuf,

        /// Plugin data directory
        #[arg(short, long, default_value = "bosun-data", env = "BOSUN_ROOT")]
        root: PathBuf,

        /// Log level override (trace, debug, info, warn, error)
        #[arg(short, long)]
        log_level: Option<String>,

        /// JSON-lines file of change payloads (defaults to stdin)
        #[arg(short, long)]
        payloads: Option<PathBuf>,
    },

    /// Apply a single change payload and exit
    Apply {
        /// Path to configuration file
        #[arg(short, long, default_value = "bosun.yaml", env = "BOSUN_CONFIG")]
        config: PathBuf,

        /// Plugin data directory
        #[arg(short, long, default_value = "bosun-data", env = "BOSUN_ROOT")]
        root: PathBuf,

        /// JSON file holding the payload
        payload: PathBuf,
    },

    /// Show where plugins resolve to
    Resolve {
        /// Path to configuration file
        #[arg(short, long, default_value = "bosun.yaml", env = "BOSUN_CONFIG")]
        config: PathBuf,

        /// Plugin names
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Validate configuration file
    Validate {
        /// Path to configuration file
        #[arg(short, long, default_value = "bosun.yaml", env = "BOSUN_CONFIG")]
        config: PathBuf,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            root,
            log_level,
            payloads,
        } => serve(&config, root, log_level, payloads).await,

        Commands::Apply {
            config,
            root,
            payload,
        } => apply(&config, root, &payload).await,

        Commands::Resolve { config, names } => resolve(&config, names).await,

        Commands::Validate { config } => {
            telemetry::init(&LoggingConfig::default())?;
            info!("Validating configuration: {}", config.display());

            match load_config(&config) {
                Ok(cfg) => {
                    info!("✓ Configuration is valid");
                    info!("  Runtime: {}", cfg.runtime.id);
                    info!("  Drain targets: {}", cfg.drain.targets.len());
                    info!("  Preordered plugins: {}", cfg.preordered_plugins.len());
                    Ok(())
                }
                Err(e) => {
                    error!("✗ Configuration validation failed: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Version => {
            println!("Bosun plugin runtime");
            println!("Version: {}", env!("CARGO_PKG_VERSION"));
            println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
            Ok(())
        }
    }
}

async fn serve(
    path: &Path,
    root: PathBuf,
    log_level: Option<String>,
    payloads: Option<PathBuf>,
) -> Result<()> {
    let mut config = load_config(path)?;
    if let Some(level) = log_level {
        config.logging.level = level;
    }
    let logs = telemetry::init(&config.logging)?;

    info!(
        config = %path.display(),
        target_id = %config.runtime.id,
        "Starting Bosun runtime"
    );

    let host = Arc::new(LocalHost::open(root)?);
    let parts = HostParts::new(host.clone(), host.clone(), Arc::new(LogPublisher), logs);
    let runtime = Bootstrap::start(config, parts).await?;

    let reconciler = runtime.reconciler();
    let shutdown = runtime.shutdown_signal();

    let handler = SignalHandler::new(shutdown.clone())
        .on_diagnostics(diagnostics(reconciler.clone(), host))
        .on_user(toggle_debug(reconciler.clone()));
    tokio::spawn(handler.run());

    let feed = tokio::spawn(feed_payloads(reconciler, payloads));

    shutdown.wait().await;
    feed.abort();
    runtime.shutdown().await;

    info!("Bosun runtime stopped");
    Ok(())
}

async fn apply(path: &Path, root: PathBuf, payload: &Path) -> Result<()> {
    let mut config = load_config(path)?;
    config.announce.enabled = false;
    let logs = telemetry::init(&config.logging)?;

    let payload: Value = serde_json::from_slice(&tokio::fs::read(payload).await?)?;

    let host = Arc::new(LocalHost::open(root)?);
    let parts = HostParts::new(host.clone(), host, Arc::new(LogPublisher), logs);
    let runtime = Bootstrap::start(config, parts).await?;

    let outcome = runtime.reconciler().apply(payload).await;
    runtime.shutdown().await;

    println!("{}", serde_json::to_string_pretty(&outcome?)?);
    Ok(())
}

async fn resolve(path: &Path, names: Vec<String>) -> Result<()> {
    let config = load_config(path)?;
    telemetry::init(&config.logging)?;

    let resources: Arc<dyn ResourceLoader> =
        Arc::new(DirectoryResources::new(&config.runtime.resources_dir));
    let ctx = ResolverContext::new(
        ProviderRegistry::with_builtins(),
        ProviderContext::new(&config.runtime.work_dir)?,
    )
    .with_resources(resources)
    .with_module_config(config.module.clone());
    let resolver = RepoResolver::new(&config.plugin_repo, ctx).await?;

    let results = join_all(names.iter().map(|name| resolver.resolve(name))).await;
    resolver.deinit().await;

    let mut report = Map::new();
    for (name, result) in names.into_iter().zip(results) {
        report.insert(name, serde_json::to_value(result)?);
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Apply newline-delimited payloads from a file or stdin
async fn feed_payloads(reconciler: Arc<Reconciler>, source: Option<PathBuf>) {
    let result = match source {
        Some(path) => match tokio::fs::File::open(&path).await {
            Ok(file) => apply_lines(&reconciler, BufReader::new(file)).await,
            Err(e) => Err(e),
        },
        None => apply_lines(&reconciler, BufReader::new(tokio::io::stdin())).await,
    };

    if let Err(e) = result {
        error!(error = %e, "Payload feed failed");
    }
    info!("Payload feed closed");
}

async fn apply_lines<R>(reconciler: &Reconciler, reader: R) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let payload: Value = match serde_json::from_str(line) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed payload line");
                continue;
            }
        };

        match reconciler.apply(payload).await {
            Ok(ReconcileOutcome::Applied(report)) => info!(
                installed = report.installed.len(),
                removed = report.removed.len(),
                configs = report.configs.len(),
                restart = report.restart_scheduled,
                "Change payload applied"
            ),
            Ok(ReconcileOutcome::Ignored { .. }) => debug!("Change payload ignored"),
            Err(e) => error!(error = %e, "Failed to apply change payload"),
        }
    }
    Ok(())
}

/// SIGUSR1: log a snapshot of runtime state
fn diagnostics(reconciler: Arc<Reconciler>, host: Arc<LocalHost>) -> SignalHook {
    Arc::new(move || {
        let controls = reconciler.controls();
        let plugins = host.descriptors();

        info!(
            target_id = %reconciler.identity(),
            plugins = plugins.len(),
            load_order = ?host.load_order(),
            debug = controls.debug.is_enabled(),
            profiling = controls.profiling.is_enabled(),
            settings = %controls.settings.snapshot(),
            "Runtime diagnostics"
        );
        for plugin in plugins {
            info!(
                plugin = %plugin.name,
                version = plugin.metadata.version(),
                prepared = plugin.prepared,
                activated = plugin.activated,
                "Plugin state"
            );
        }
    })
}

/// SIGUSR2: flip debug mode
fn toggle_debug(reconciler: Arc<Reconciler>) -> SignalHook {
    Arc::new(move || {
        let debug_mode = &reconciler.controls().debug;
        let result = if debug_mode.is_enabled() {
            debug_mode.disable()
        } else {
            debug_mode.enable()
        };

        match result {
            Ok(_) => info!(enabled = debug_mode.is_enabled(), "Debug mode toggled"),
            Err(e) => warn!(error = %e, "Failed to toggle debug mode"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bosun_runtime::LogControl;
    use bosun_config::Config;
    use serde_json::json;

    #[tokio::test]
    async fn test_user_signal_flips_debug_mode() {
        let data = tempfile::tempdir().unwrap();
        let config: Config = serde_json::from_value(json!({
            "runtime": {"id": "p1", "work_dir": data.path().join("work")},
            "plugin_repo": [],
            "announce": {"enabled": false}
        }))
        .unwrap();
        let logging = LoggingConfig {
            level: "info".to_string(),
            format: "off".to_string(),
        };
        let (logs, _subscriber) = telemetry::build(&logging).unwrap();

        let host = Arc::new(LocalHost::open(data.path().join("root")).unwrap());
        let parts = HostParts::new(host.clone(), host, Arc::new(LogPublisher), logs.clone());
        let runtime = Bootstrap::start(config, parts).await.unwrap();
        let reconciler = runtime.reconciler();

        let hook = toggle_debug(reconciler.clone());
        hook();
        assert!(reconciler.controls().debug.is_enabled());
        assert_eq!(logs.current_filter(), "debug");

        hook();
        assert!(!reconciler.controls().debug.is_enabled());
        assert_eq!(logs.current_filter(), "info");

        runtime.shutdown().await;
    }
}
