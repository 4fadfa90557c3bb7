//! Configuration types

use crate::repo::RepoConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Process identity and directories
    pub runtime: RuntimeConfig,

    /// Plugin repository backends, in priority order
    #[serde(default)]
    pub plugin_repo: RepoConfig,

    /// Plugins installed (with their dependency closure) at startup
    #[serde(default)]
    pub preordered_plugins: Vec<String>,

    /// Runtime announcements
    #[serde(default)]
    pub announce: AnnounceConfig,

    /// Drain before restart
    #[serde(default)]
    pub drain: DrainConfig,

    /// Debug log capture
    #[serde(default)]
    pub debug: DebugConfig,

    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Live configuration of the owning module, read by `config_key` backends
    #[serde(default)]
    pub module: Map<String, Value>,
}

/// Process identity and directories
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    /// Identity matched against change payload targets
    pub id: String,

    /// Scratch directory for fetched sources
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Directory of bundled resources (for `resource` backends)
    #[serde(default = "default_resources_dir")]
    pub resources_dir: PathBuf,
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("bosun")
}

fn default_resources_dir() -> PathBuf {
    PathBuf::from("resources")
}

impl RuntimeConfig {
    /// Runtime identity with default directories
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            work_dir: default_work_dir(),
            resources_dir: default_resources_dir(),
        }
    }
}

/// Runtime announcement configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnnounceConfig {
    /// Enable periodic announcements
    pub enabled: bool,

    /// Minimum time between broadcasts
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// How often the announcer wakes up to check the interval
    #[serde(with = "humantime_serde")]
    pub tick: Duration,
}

impl Default for AnnounceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(15),
            tick: Duration::from_secs(1),
        }
    }
}

/// Drain-before-restart configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DrainConfig {
    /// Wait budget: `null` waits forever, `0` skips draining
    #[serde(default = "default_task_wait_timeout", with = "humantime_serde")]
    pub timeout: Option<Duration>,

    /// Poll interval while waiting
    #[serde(default = "default_task_wait_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Delay between scheduling and sending the termination signal
    #[serde(default = "default_restart_delay", with = "humantime_serde")]
    pub restart_delay: Duration,

    /// Known co-located components holding queues and nodes
    #[serde(default = "default_drain_targets")]
    pub targets: Vec<DrainTargetConfig>,
}

fn default_task_wait_timeout() -> Option<Duration> {
    Some(Duration::from_secs(15 * 60))
}

fn default_task_wait_interval() -> Duration {
    Duration::from_secs(15)
}

fn default_restart_delay() -> Duration {
    Duration::from_secs(1)
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            timeout: default_task_wait_timeout(),
            interval: default_task_wait_interval(),
            restart_delay: default_restart_delay(),
            targets: default_drain_targets(),
        }
    }
}

/// Drainable component declaration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DrainTargetConfig {
    /// Component name
    pub component: String,

    /// Queues owned by the component
    #[serde(default)]
    pub queues: Vec<QueueTargetConfig>,

    /// Worker nodes owned by the component
    #[serde(default)]
    pub nodes: Vec<String>,
}

/// Queue declaration with the task names it carries
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueTargetConfig {
    /// Queue name
    pub queue: String,

    /// Task names whose admission is revoked while draining
    #[serde(default)]
    pub tasks: Vec<String>,
}

impl QueueTargetConfig {
    fn new(queue: &str, tasks: &[&str]) -> Self {
        Self {
            queue: queue.to_string(),
            tasks: tasks.iter().map(|t| t.to_string()).collect(),
        }
    }
}

fn default_drain_targets() -> Vec<DrainTargetConfig> {
    vec![
        DrainTargetConfig {
            component: "indexer_worker".to_string(),
            queues: vec![QueueTargetConfig::new(
                "index_task_queue",
                &["indexer_index", "indexer_index_stream"],
            )],
            nodes: vec!["agent_task_node".to_string(), "index_task_node".to_string()],
        },
        DrainTargetConfig {
            component: "worker_core".to_string(),
            queues: vec![
                QueueTargetConfig::new("task_queue_preload", &["invoke_model"]),
                QueueTargetConfig::new(
                    "task_queue",
                    &[
                        "indexer_ask",
                        "indexer_ask_stream",
                        "indexer_search",
                        "indexer_deduplicate",
                        "indexer_delete",
                    ],
                ),
            ],
            nodes: vec!["task_node_light".to_string(), "task_node_heavy".to_string()],
        },
    ]
}

/// Debug capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Lines kept by the debug log ring buffer
    pub log_buffer_size: usize,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_buffer_size: 1000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text or json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_defaults() {
        let drain = DrainConfig::default();
        assert_eq!(drain.timeout, Some(Duration::from_secs(900)));
        assert_eq!(drain.interval, Duration::from_secs(15));
        assert_eq!(drain.targets.len(), 2);
        assert_eq!(drain.targets[1].queues[1].tasks.len(), 5);
    }

    #[test]
    fn test_unbounded_drain_timeout() {
        let drain: DrainConfig = serde_yaml::from_str("timeout: null").unwrap();
        assert_eq!(drain.timeout, None);

        let drain: DrainConfig = serde_yaml::from_str("timeout: 0s").unwrap();
        assert_eq!(drain.timeout, Some(Duration::ZERO));

        let drain: DrainConfig = serde_yaml::from_str("interval: 2s").unwrap();
        assert_eq!(drain.timeout, Some(Duration::from_secs(900)));
    }
}
