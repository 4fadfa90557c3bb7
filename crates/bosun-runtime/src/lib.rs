//! # Bosun Runtime
//!
//! Keeps a plugin-hosting process in its desired state:
//! - Host contracts (plugin store, module manager, event bus)
//! - Change payload reconciliation
//! - Drain of in-flight work and delayed restart
//! - Dependency-closure preload at startup
//! - Periodic runtime announcements
//! - Debug log capture and on-demand profiling
//! - Signal handling

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod announcer;
pub mod bootstrap;
pub mod drain;
pub mod host;
pub mod logbuf;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod payload;
pub mod preload;
pub mod reconcile;
pub mod restart;
pub mod settings;
pub mod shutdown;
pub mod tasks;
pub mod telemetry;
pub mod toggle;

pub use announcer::{RuntimeAnnouncer, RUNTIME_INFO_EVENT, RUNTIME_PRUNE_EVENT};
pub use bootstrap::{Bootstrap, HostParts};
pub use drain::{
    DrainCoordinator, DrainOutcome, DrainableNode, DrainableQueue, Revocation, WorkerDirectory,
};
pub use host::{EventPublisher, PluginHost, PluginStore};
pub use logbuf::{LogBuffer, LogLine};
pub use payload::{Action, ChangePayload, Misdirected};
pub use preload::{preload, PreloadReport};
pub use reconcile::{ReconcileOutcome, ReconcileReport, Reconciler, RestartController, RuntimeControls};
pub use restart::{ProcessTerminator, RestartScheduler, SignalTerminator};
pub use settings::Settings;
pub use shutdown::{ShutdownSignal, SignalHandler};
pub use tasks::{LocalWorkerDirectory, TaskNode, TaskQueue};
pub use telemetry::TelemetryHandle;
pub use toggle::{DebugMode, LogControl, Profiler, Profiling};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::bootstrap::{Bootstrap, HostParts};
    pub use crate::host::{EventPublisher, PluginHost, PluginStore};
    pub use crate::reconcile::{ReconcileOutcome, ReconcileReport, Reconciler};
    pub use crate::shutdown::{ShutdownSignal, SignalHandler};
}
