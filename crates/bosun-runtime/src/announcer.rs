//! Periodic runtime announcements

use crate::host::{EventPublisher, PluginHost};
use crate::settings::Settings;
use crate::shutdown::ShutdownSignal;
use crate::toggle::DebugMode;
use bosun_config::AnnounceConfig;
use bosun_core::{InstalledPluginState, Result};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Periodic runtime state event
pub const RUNTIME_INFO_EVENT: &str = "bootstrap_runtime_info";

/// Event sent when the runtime stops announcing
pub const RUNTIME_PRUNE_EVENT: &str = "bootstrap_runtime_prune";

/// Broadcasts installed plugin state on a fixed cadence
#[derive(Debug, Clone)]
pub struct RuntimeAnnouncer {
    target_id: String,
    host: Arc<dyn PluginHost>,
    publisher: Arc<dyn EventPublisher>,
    settings: Settings,
    debug: Arc<DebugMode>,
    interval: Duration,
    tick: Duration,
}

impl RuntimeAnnouncer {
    /// Create an announcer
    pub fn new(
        target_id: impl Into<String>,
        host: Arc<dyn PluginHost>,
        publisher: Arc<dyn EventPublisher>,
        settings: Settings,
        debug: Arc<DebugMode>,
        config: &AnnounceConfig,
    ) -> Self {
        Self {
            target_id: target_id.into(),
            host,
            publisher,
            settings,
            debug,
            interval: config.interval,
            tick: config.tick,
        }
    }

    /// Current `bootstrap_runtime_info` payload
    pub fn snapshot(&self) -> Value {
        let runtime_info: Vec<Value> = self.host.descriptors().iter().map(describe).collect();

        json!({
            "target_id": self.target_id,
            "runtime_info": runtime_info,
            "settings": self.settings.snapshot(),
            "log_buffer": self.debug.buffered_lines(),
        })
    }

    /// Publish one `bootstrap_runtime_info` event
    pub async fn announce(&self) -> Result<()> {
        self.publisher
            .publish(RUNTIME_INFO_EVENT, self.snapshot())
            .await
    }

    /// Publish the `bootstrap_runtime_prune` event
    pub async fn prune(&self) -> Result<()> {
        self.publisher
            .publish(RUNTIME_PRUNE_EVENT, json!({ "target_id": self.target_id }))
            .await
    }

    /// Run until `shutdown` fires, then publish the prune event
    pub fn spawn(self, shutdown: ShutdownSignal) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    async fn run(self, shutdown: ShutdownSignal) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            tick_ms = self.tick.as_millis() as u64,
            "Runtime announcer started"
        );

        let mut ticker = tokio::time::interval_at(Instant::now() + self.tick, self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_announce = Instant::now();

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                _ = ticker.tick() => {
                    if last_announce.elapsed() < self.interval {
                        continue;
                    }
                    last_announce = Instant::now();

                    match self.announce().await {
                        Ok(()) => debug!("Runtime info announced"),
                        Err(e) => warn!(error = %e, "Runtime announcement failed, continuing"),
                    }
                }
            }
        }

        if let Err(e) = self.prune().await {
            warn!(error = %e, "Failed to publish runtime prune event");
        }
        info!("Runtime announcer stopped");
    }
}

fn describe(state: &InstalledPluginState) -> Value {
    let mut entry = Map::new();
    entry.insert("name".into(), json!(state.name));
    entry.insert("description".into(), json!(state.metadata.display_name()));
    entry.insert("prepared".into(), json!(state.prepared));
    entry.insert("activated".into(), json!(state.activated));
    entry.insert("local_version".into(), json!(state.metadata.version()));
    entry.insert("repo_version".into(), json!("-"));
    entry.insert("config".into(), state.config.clone());

    if let Ok(text) = std::str::from_utf8(&state.config_data) {
        entry.insert("config_data".into(), json!(text));
    }

    Value::Object(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryLogControl, MemoryPluginHost, RecordingPublisher};
    use bosun_core::MetadataDocument;

    fn announcer(host: MemoryPluginHost, publisher: Arc<RecordingPublisher>) -> RuntimeAnnouncer {
        let debug = Arc::new(DebugMode::new(Arc::new(MemoryLogControl::new("info")), 10));
        RuntimeAnnouncer::new(
            "p1",
            Arc::new(host),
            publisher,
            Settings::new(),
            debug,
            &AnnounceConfig {
                enabled: true,
                interval: Duration::from_secs(15),
                tick: Duration::from_secs(1),
            },
        )
    }

    fn state(name: &str, config_data: Vec<u8>) -> InstalledPluginState {
        InstalledPluginState {
            name: name.to_string(),
            metadata: MetadataDocument {
                name: Some(format!("{name} plugin")),
                version: Some("1.2.0".to_string()),
                ..Default::default()
            },
            prepared: true,
            activated: false,
            config: json!({"enabled": true}),
            config_data,
        }
    }

    #[test]
    fn test_snapshot_shape() {
        let host = MemoryPluginHost::new()
            .with_descriptor(state("demo", b"enabled: true\n".to_vec()))
            .with_descriptor(state("binary", vec![0xff, 0xfe]));
        let announcer = announcer(host, Arc::new(RecordingPublisher::new()));

        let snapshot = announcer.snapshot();
        assert_eq!(snapshot["target_id"], "p1");

        let info = snapshot["runtime_info"].as_array().unwrap();
        assert_eq!(info[0]["description"], "demo plugin");
        assert_eq!(info[0]["local_version"], "1.2.0");
        assert_eq!(info[0]["repo_version"], "-");
        assert_eq!(info[0]["config_data"], "enabled: true\n");
        assert!(info[1].get("config_data").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_announces_each_interval_and_prunes() {
        let publisher = Arc::new(RecordingPublisher::new());
        let shutdown = ShutdownSignal::new();
        let handle = announcer(MemoryPluginHost::new(), publisher.clone()).spawn(shutdown.clone());

        tokio::time::sleep(Duration::from_millis(14_500)).await;
        assert!(publisher.payloads(RUNTIME_INFO_EVENT).is_empty());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(publisher.payloads(RUNTIME_INFO_EVENT).len(), 3);

        shutdown.trigger();
        handle.await.unwrap();

        let prune = publisher.payloads(RUNTIME_PRUNE_EVENT);
        assert_eq!(prune, vec![json!({"target_id": "p1"})]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_failure_keeps_loop_running() {
        let publisher = Arc::new(RecordingPublisher::new().failing_first(1));
        let shutdown = ShutdownSignal::new();
        let handle = announcer(MemoryPluginHost::new(), publisher.clone()).spawn(shutdown.clone());

        tokio::time::sleep(Duration::from_millis(30_500)).await;
        assert_eq!(publisher.payloads(RUNTIME_INFO_EVENT).len(), 1);

        shutdown.trigger();
        handle.await.unwrap();
    }
}
