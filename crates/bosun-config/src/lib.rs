//! # Bosun Configuration
//!
//! One document describes a runtime process: its identity and work
//! directory, the plugin repository backends it resolves against, the
//! plugins it preloads, how it announces itself and which queues it drains
//! before a restart. Files may be YAML (the default), TOML or JSON, and
//! `${VAR}` / `${VAR:-default}` references are expanded before parsing so
//! depot tokens and hosts can come from the environment.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod builder;
pub mod loader;
pub mod repo;
pub mod types;
pub mod validator;

pub use builder::ConfigBuilder;
pub use loader::{load_config, load_from_file, load_from_str, ConfigFormat};
pub use repo::{
    BackendConfig, BackendKind, DepotConfig, DepotTiersConfig, FederationConfig, ProviderConfig,
    RepoConfig, SourceHostConfig,
};
pub use types::{
    AnnounceConfig, Config, DebugConfig, DrainConfig, DrainTargetConfig, LoggingConfig,
    QueueTargetConfig, RuntimeConfig,
};
pub use validator::validate_config;
