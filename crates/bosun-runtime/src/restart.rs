//! Delayed process termination

use bosun_core::{Error, Result};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Asks a process to terminate
pub trait ProcessTerminator: Send + Sync + fmt::Debug {
    /// Send the termination request to `pid`
    fn terminate(&self, pid: i32) -> Result<()>;
}

/// Terminates processes with SIGTERM
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalTerminator;

impl ProcessTerminator for SignalTerminator {
    #[cfg(unix)]
    fn terminate(&self, pid: i32) -> Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        kill(Pid::from_raw(pid), Signal::SIGTERM)
            .map_err(|e| Error::Process(format!("SIGTERM to {pid} failed: {e}")))
    }

    #[cfg(not(unix))]
    fn terminate(&self, pid: i32) -> Result<()> {
        Err(Error::Process(format!(
            "signal termination of {pid} is not supported on this platform"
        )))
    }
}

/// Schedules a termination request after a delay
#[derive(Debug, Clone)]
pub struct RestartScheduler {
    terminator: Arc<dyn ProcessTerminator>,
    delay: Duration,
}

impl RestartScheduler {
    /// Create a scheduler
    pub fn new(terminator: Arc<dyn ProcessTerminator>, delay: Duration) -> Self {
        Self { terminator, delay }
    }

    /// Scheduler sending SIGTERM
    pub fn with_signal(delay: Duration) -> Self {
        Self::new(Arc::new(SignalTerminator), delay)
    }

    /// Configured delay
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Spawn a detached task terminating `pid` after the delay
    pub fn schedule(&self, pid: i32) -> JoinHandle<()> {
        let terminator = self.terminator.clone();
        let delay = self.delay;

        info!(pid, delay_ms = delay.as_millis() as u64, "Restart scheduled");

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match terminator.terminate(pid) {
                Ok(()) => info!(pid, "Termination requested"),
                Err(e) => error!(pid, error = %e, "Failed to request termination"),
            }
        })
    }
}

/// Pid of the current process
pub fn current_pid() -> i32 {
    std::process::id() as i32
}
