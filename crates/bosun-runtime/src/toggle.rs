//! Debug log capture and on-demand profiling toggles

use crate::logbuf::LogBuffer;
use bosun_core::Result;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Profiling slot driven by payload actions
pub const ONDEMAND_SLOT: &str = "ondemand";

/// Filter directive applied while debug mode is on
pub const DEBUG_FILTER: &str = "debug";

/// Control over the process log pipeline
pub trait LogControl: Send + Sync + fmt::Debug {
    /// Current filter directive
    fn current_filter(&self) -> String;

    /// Replace the filter directive
    fn set_filter(&self, directive: &str) -> Result<()>;

    /// Start copying log lines into `buffer`
    fn attach_sink(&self, buffer: LogBuffer);

    /// Stop copying log lines, returning the detached buffer
    fn detach_sink(&self) -> Option<LogBuffer>;
}

/// Aggregated timing of one span name
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SpanStat {
    /// Span name
    pub name: String,
    /// Closed spans
    pub count: u64,
    /// Total lifetime of closed spans
    pub total: Duration,
}

/// Result of a finished profiling session
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProfileReport {
    /// Slot the session ran in
    pub slot: String,
    /// Per-span statistics, slowest first
    pub spans: Vec<SpanStat>,
}

/// Named profiling sessions
pub trait Profiler: Send + Sync + fmt::Debug {
    /// Start a session in `slot`
    fn start(&self, slot: &str) -> Result<()>;

    /// Stop the session in `slot`
    fn stop(&self, slot: &str) -> Result<ProfileReport>;
}

#[derive(Debug)]
enum DebugState {
    Off,
    On {
        buffer: LogBuffer,
        previous_filter: String,
    },
}

/// Debug mode: `Off` or `On` with an attached ring buffer
#[derive(Debug)]
pub struct DebugMode {
    control: Arc<dyn LogControl>,
    buffer_size: usize,
    state: Mutex<DebugState>,
}

impl DebugMode {
    /// Create in the `Off` state
    pub fn new(control: Arc<dyn LogControl>, buffer_size: usize) -> Self {
        Self {
            control,
            buffer_size,
            state: Mutex::new(DebugState::Off),
        }
    }

    /// Attach a buffer and raise the level; returns `false` if already on
    pub fn enable(&self) -> Result<bool> {
        let mut state = self.state.lock();
        if matches!(*state, DebugState::On { .. }) {
            return Ok(false);
        }

        let previous_filter = self.control.current_filter();
        let buffer = LogBuffer::new(self.buffer_size);

        self.control.attach_sink(buffer.clone());
        if let Err(e) = self.control.set_filter(DEBUG_FILTER) {
            self.control.detach_sink();
            return Err(e);
        }

        *state = DebugState::On {
            buffer,
            previous_filter,
        };
        info!(buffer_size = self.buffer_size, "Debug mode enabled");

        Ok(true)
    }

    /// Detach and clear the buffer, restore the level; returns `false` if already off
    pub fn disable(&self) -> Result<bool> {
        let mut state = self.state.lock();
        let DebugState::On {
            buffer,
            previous_filter,
        } = std::mem::replace(&mut *state, DebugState::Off)
        else {
            return Ok(false);
        };

        self.control.detach_sink();
        let flushed = buffer.len();
        buffer.clear();

        if let Err(e) = self.control.set_filter(&previous_filter) {
            warn!(filter = %previous_filter, error = %e, "Failed to restore log filter");
        }

        info!(flushed_lines = flushed, "Debug mode disabled");

        Ok(true)
    }

    /// Whether debug mode is on
    pub fn is_enabled(&self) -> bool {
        matches!(*self.state.lock(), DebugState::On { .. })
    }

    /// Rendered buffer lines, empty when off
    pub fn buffered_lines(&self) -> Vec<String> {
        match &*self.state.lock() {
            DebugState::On { buffer, .. } => buffer.rendered(),
            DebugState::Off => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProfilingState {
    Off,
    On,
}

/// On-demand profiling: `Off` or `On` over the [`ONDEMAND_SLOT`]
#[derive(Debug)]
pub struct Profiling {
    profiler: Arc<dyn Profiler>,
    state: Mutex<ProfilingState>,
}

impl Profiling {
    /// Create in the `Off` state
    pub fn new(profiler: Arc<dyn Profiler>) -> Self {
        Self {
            profiler,
            state: Mutex::new(ProfilingState::Off),
        }
    }

    /// Start profiling; returns `false` if already on
    pub fn enable(&self) -> Result<bool> {
        let mut state = self.state.lock();
        if *state == ProfilingState::On {
            return Ok(false);
        }

        self.profiler.start(ONDEMAND_SLOT)?;
        *state = ProfilingState::On;
        info!(slot = ONDEMAND_SLOT, "Profiling enabled");

        Ok(true)
    }

    /// Stop profiling; `None` if already off
    pub fn disable(&self) -> Result<Option<ProfileReport>> {
        let mut state = self.state.lock();
        if *state == ProfilingState::Off {
            return Ok(None);
        }

        *state = ProfilingState::Off;
        let report = self.profiler.stop(ONDEMAND_SLOT)?;

        for span in report.spans.iter().take(10) {
            info!(
                span = %span.name,
                count = span.count,
                total_ms = span.total.as_millis() as u64,
                "Profile"
            );
        }

        Ok(Some(report))
    }

    /// Whether profiling is on
    pub fn is_enabled(&self) -> bool {
        *self.state.lock() == ProfilingState::On
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryLogControl, MemoryProfiler};

    #[test]
    fn test_debug_enable_twice_is_noop() {
        let control = Arc::new(MemoryLogControl::new("info"));
        let debug = DebugMode::new(control.clone(), 10);

        assert!(debug.enable().unwrap());
        assert!(!debug.enable().unwrap());

        assert!(debug.is_enabled());
        assert_eq!(control.current_filter(), "debug");
        assert_eq!(control.attach_count(), 1);
    }

    #[test]
    fn test_debug_disable_when_off_is_noop() {
        let control = Arc::new(MemoryLogControl::new("warn"));
        let debug = DebugMode::new(control.clone(), 10);

        assert!(!debug.disable().unwrap());
        assert_eq!(control.current_filter(), "warn");
        assert_eq!(control.detach_count(), 0);
    }

    #[test]
    fn test_debug_disable_restores_and_clears() {
        let control = Arc::new(MemoryLogControl::new("bosun=trace,info"));
        let debug = DebugMode::new(control.clone(), 10);

        debug.enable().unwrap();
        control.emit("captured line");
        assert_eq!(debug.buffered_lines().len(), 1);

        assert!(debug.disable().unwrap());
        assert_eq!(control.current_filter(), "bosun=trace,info");
        assert!(debug.buffered_lines().is_empty());
        assert!(control.attached().is_none());
    }

    #[test]
    fn test_profiling_state_machine() {
        let profiler = Arc::new(MemoryProfiler::default());
        let profiling = Profiling::new(profiler.clone());

        assert!(profiling.disable().unwrap().is_none());
        assert!(profiling.enable().unwrap());
        assert!(!profiling.enable().unwrap());
        assert_eq!(profiler.active_slots(), vec![ONDEMAND_SLOT.to_string()]);

        let report = profiling.disable().unwrap().unwrap();
        assert_eq!(report.slot, ONDEMAND_SLOT);
        assert!(profiler.active_slots().is_empty());
    }
}
