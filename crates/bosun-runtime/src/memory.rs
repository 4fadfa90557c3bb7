//! In-memory implementations of the host contracts
//!
//! Every call is recorded so embedders and tests can inspect what the
//! runtime did.

use crate::host::{EventPublisher, PluginHost, PluginStore};
use crate::logbuf::{LogBuffer, LogLine};
use crate::restart::ProcessTerminator;
use crate::toggle::{LogControl, ProfileReport, Profiler};
use async_trait::async_trait;
use bosun_core::{
    Error, InstalledPluginState, MetadataDocument, PluginName, Result, SourceArtifact,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Recorded plugin store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    /// `add_plugin(name, origin)`
    Add(String, String),
    /// `delete_plugin(name)`
    Delete(String),
}

/// Plugin store keeping metadata in memory
#[derive(Debug, Default)]
pub struct MemoryPluginStore {
    installed: Mutex<BTreeMap<String, MetadataDocument>>,
    catalog: Mutex<BTreeMap<String, MetadataDocument>>,
    calls: Mutex<Vec<StoreCall>>,
}

impl MemoryPluginStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an installed plugin
    pub fn with_installed(self, name: impl Into<String>, metadata: MetadataDocument) -> Self {
        self.installed.lock().insert(name.into(), metadata);
        self
    }

    /// Metadata reported for a plugin once it gets added
    pub fn with_catalog_entry(self, name: impl Into<String>, metadata: MetadataDocument) -> Self {
        self.catalog.lock().insert(name.into(), metadata);
        self
    }

    /// Recorded calls, in order
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().clone()
    }

    /// Names of `add_plugin` calls, in order
    pub fn added(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                StoreCall::Add(name, _) => Some(name.clone()),
                StoreCall::Delete(_) => None,
            })
            .collect()
    }

    /// Installed plugin names
    pub fn installed(&self) -> Vec<String> {
        self.installed.lock().keys().cloned().collect()
    }
}

#[async_trait]
impl PluginStore for MemoryPluginStore {
    async fn plugin_exists(&self, name: &str) -> Result<bool> {
        Ok(self.installed.lock().contains_key(name))
    }

    async fn add_plugin(&self, name: &str, artifact: SourceArtifact) -> Result<()> {
        self.calls
            .lock()
            .push(StoreCall::Add(name.to_string(), artifact.origin().to_string()));

        let metadata = self.catalog.lock().get(name).cloned().unwrap_or_default();
        self.installed.lock().insert(name.to_string(), metadata);
        Ok(())
    }

    async fn delete_plugin(&self, name: &str) -> Result<()> {
        self.calls.lock().push(StoreCall::Delete(name.to_string()));
        self.installed.lock().remove(name);
        Ok(())
    }

    async fn get_plugin_metadata(&self, name: &str) -> Result<MetadataDocument> {
        self.installed
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::host(format!("plugin not installed: {name}")))
    }
}

/// Recorded module manager call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    /// Build cache purged
    PurgeBuildCache(String),
    /// Dependency records cleared
    ClearDependencyRecords(String),
    /// Installed flag set
    SetInstalled(String, bool),
    /// Config bytes written
    WriteConfig(String, Vec<u8>),
    /// Config reloaded
    ReloadConfig(String),
    /// Reconfigure hook invoked
    Reconfigure(String),
    /// Reload requested
    RequestReload(String),
}

/// Module manager keeping state in memory
#[derive(Debug, Default)]
pub struct MemoryPluginHost {
    load_order: Vec<PluginName>,
    loaded: HashSet<String>,
    descriptors: Vec<InstalledPluginState>,
    failing: HashSet<String>,
    calls: Mutex<Vec<HostCall>>,
}

impl MemoryPluginHost {
    /// Create a host with nothing loaded
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark plugins loaded, in load order
    pub fn with_loaded<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            self.loaded.insert(name.clone());
            self.load_order.push(name);
        }
        self
    }

    /// Add a descriptor snapshot
    pub fn with_descriptor(mut self, descriptor: InstalledPluginState) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Make every side-channel call for `name` fail
    pub fn failing_for(mut self, name: impl Into<String>) -> Self {
        self.failing.insert(name.into());
        self
    }

    /// Recorded calls, in order
    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().clone()
    }

    fn record(&self, name: &str, call: HostCall) -> Result<()> {
        self.calls.lock().push(call);
        if self.failing.contains(name) {
            return Err(Error::host(format!("simulated failure for {name}")));
        }
        Ok(())
    }
}

#[async_trait]
impl PluginHost for MemoryPluginHost {
    async fn purge_build_cache(&self, name: &str) -> Result<()> {
        self.record(name, HostCall::PurgeBuildCache(name.to_string()))
    }

    async fn clear_dependency_records(&self, name: &str) -> Result<()> {
        self.record(name, HostCall::ClearDependencyRecords(name.to_string()))
    }

    async fn set_installed(&self, name: &str, installed: bool) -> Result<()> {
        self.record(name, HostCall::SetInstalled(name.to_string(), installed))
    }

    async fn write_config(&self, name: &str, data: &[u8]) -> Result<()> {
        self.record(name, HostCall::WriteConfig(name.to_string(), data.to_vec()))
    }

    fn is_loaded(&self, name: &str) -> bool {
        self.loaded.contains(name)
    }

    async fn reload_config(&self, name: &str) -> Result<()> {
        self.record(name, HostCall::ReloadConfig(name.to_string()))
    }

    async fn reconfigure(&self, name: &str) -> Result<()> {
        self.record(name, HostCall::Reconfigure(name.to_string()))
    }

    fn load_order(&self) -> Vec<PluginName> {
        self.load_order.clone()
    }

    async fn request_reload(&self, name: &str) -> Result<()> {
        self.record(name, HostCall::RequestReload(name.to_string()))
    }

    fn descriptors(&self) -> Vec<InstalledPluginState> {
        self.descriptors.clone()
    }
}

/// Publisher recording every event
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<(String, Value)>>,
    failures_left: AtomicUsize,
}

impl RecordingPublisher {
    /// Create a publisher that accepts everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` publishes
    pub fn failing_first(self, count: usize) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    /// Published events, in order
    pub fn events(&self) -> Vec<(String, Value)> {
        self.events.lock().clone()
    }

    /// Payloads of events named `event`
    pub fn payloads(&self, event: &str) -> Vec<Value> {
        self.events
            .lock()
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &str, payload: Value) -> Result<()> {
        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(Error::host("event bus unavailable"));
        }

        self.events.lock().push((event.to_string(), payload));
        Ok(())
    }
}

/// Log control that only tracks state
#[derive(Debug)]
pub struct MemoryLogControl {
    filter: Mutex<String>,
    sink: Mutex<Option<LogBuffer>>,
    attaches: AtomicUsize,
    detaches: AtomicUsize,
}

impl MemoryLogControl {
    /// Create with an initial filter directive
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            filter: Mutex::new(filter.into()),
            sink: Mutex::new(None),
            attaches: AtomicUsize::new(0),
            detaches: AtomicUsize::new(0),
        }
    }

    /// Push a line into the attached sink, if any
    pub fn emit(&self, message: &str) {
        if let Some(sink) = &*self.sink.lock() {
            sink.push(LogLine::new("DEBUG", "bosun", message));
        }
    }

    /// Currently attached sink
    pub fn attached(&self) -> Option<LogBuffer> {
        self.sink.lock().clone()
    }

    /// Number of attaches
    pub fn attach_count(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }

    /// Number of detaches
    pub fn detach_count(&self) -> usize {
        self.detaches.load(Ordering::SeqCst)
    }
}

impl LogControl for MemoryLogControl {
    fn current_filter(&self) -> String {
        self.filter.lock().clone()
    }

    fn set_filter(&self, directive: &str) -> Result<()> {
        *self.filter.lock() = directive.to_string();
        Ok(())
    }

    fn attach_sink(&self, buffer: LogBuffer) {
        self.attaches.fetch_add(1, Ordering::SeqCst);
        *self.sink.lock() = Some(buffer);
    }

    fn detach_sink(&self) -> Option<LogBuffer> {
        self.detaches.fetch_add(1, Ordering::SeqCst);
        self.sink.lock().take()
    }
}

/// Profiler that only tracks active slots
#[derive(Debug, Default)]
pub struct MemoryProfiler {
    active: Mutex<BTreeSet<String>>,
}

impl MemoryProfiler {
    /// Active slots, sorted
    pub fn active_slots(&self) -> Vec<String> {
        self.active.lock().iter().cloned().collect()
    }
}

impl Profiler for MemoryProfiler {
    fn start(&self, slot: &str) -> Result<()> {
        if !self.active.lock().insert(slot.to_string()) {
            return Err(Error::Internal(format!("profiling slot busy: {slot}")));
        }
        Ok(())
    }

    fn stop(&self, slot: &str) -> Result<ProfileReport> {
        if !self.active.lock().remove(slot) {
            return Err(Error::Internal(format!("profiling slot idle: {slot}")));
        }
        Ok(ProfileReport {
            slot: slot.to_string(),
            spans: Vec::new(),
        })
    }
}

/// Terminator recording pids instead of signalling them
#[derive(Debug, Default)]
pub struct RecordingTerminator {
    pids: Mutex<Vec<i32>>,
}

impl RecordingTerminator {
    /// Terminated pids, in order
    pub fn pids(&self) -> Vec<i32> {
        self.pids.lock().clone()
    }
}

impl ProcessTerminator for RecordingTerminator {
    fn terminate(&self, pid: i32) -> Result<()> {
        self.pids.lock().push(pid);
        Ok(())
    }
}
