//! Drain coordination before restart
//!
//! Admission is revoked on every known queue and node, then pending work is
//! polled until it empties or the wait budget runs out. Handles are looked up
//! fresh on each drain and no lock is held across a sleep.

use bosun_config::{DrainConfig, DrainTargetConfig};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Result of revoking admission on a queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revocation {
    /// Admission revoked for this many registered tasks
    Revoked(usize),
    /// A task has a legacy registration without an admission policy
    Legacy(String),
}

/// Task queue that can stop admitting work
pub trait DrainableQueue: Send + Sync + fmt::Debug {
    /// Whether the queue is running
    fn is_started(&self) -> bool;

    /// Revoke admission for the listed tasks under one lock
    ///
    /// Unregistered task names are skipped. Stops at the first legacy
    /// registration; earlier revocations stay in effect.
    fn revoke_admission(&self, tasks: &[String]) -> Revocation;

    /// Tasks waiting to run
    fn pending_count(&self) -> usize;
}

/// Worker pool that can stop admitting work
pub trait DrainableNode: Send + Sync + fmt::Debug {
    /// Whether the node is running
    fn is_started(&self) -> bool;

    /// Allow or deny new work
    fn set_admission(&self, allow: bool);

    /// Whether any task is running
    fn has_in_flight(&self) -> bool;
}

/// Lookup of co-located components' queues and nodes
pub trait WorkerDirectory: Send + Sync + fmt::Debug {
    /// Queue `name` of `component`, if present
    fn queue(&self, component: &str, name: &str) -> Option<Arc<dyn DrainableQueue>>;

    /// Node `name` of `component`, if present
    fn node(&self, component: &str, name: &str) -> Option<Arc<dyn DrainableNode>>;
}

/// How a drain ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainOutcome {
    /// Zero budget, nothing touched
    Skipped,
    /// All queues and nodes went idle
    Completed,
    /// Budget ran out with work remaining
    TimedOut,
    /// A legacy registration was found
    Abandoned,
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    started: Instant,
    timeout: Option<Duration>,
}

impl Deadline {
    fn new(timeout: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            timeout,
        }
    }

    fn expired(&self) -> bool {
        match self.timeout {
            None => false,
            Some(t) if t.is_zero() => true,
            Some(t) => self.started.elapsed() >= t,
        }
    }

    fn nap(&self, interval: Duration) -> Duration {
        match self.timeout {
            None => interval,
            Some(t) => interval.min(t.saturating_sub(self.started.elapsed())),
        }
    }
}

/// Drain coordinator
#[derive(Debug, Clone)]
pub struct DrainCoordinator {
    directory: Arc<dyn WorkerDirectory>,
    targets: Vec<DrainTargetConfig>,
    timeout: Option<Duration>,
    interval: Duration,
}

impl DrainCoordinator {
    /// Create a coordinator over `directory`
    pub fn new(directory: Arc<dyn WorkerDirectory>, config: &DrainConfig) -> Self {
        Self {
            directory,
            targets: config.targets.clone(),
            timeout: config.timeout,
            interval: config.interval,
        }
    }

    /// Override the wait budget
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the poll interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Stop admission and wait for in-flight work; never fails
    pub async fn wait_for_tasks(&self) -> DrainOutcome {
        let deadline = Deadline::new(self.timeout);
        if deadline.expired() {
            return DrainOutcome::Skipped;
        }

        info!(timeout = ?self.timeout, "Waiting for tasks to stop");

        let mut queues = Vec::new();
        for target in &self.targets {
            for declared in &target.queues {
                let Some(queue) = self.directory.queue(&target.component, &declared.queue) else {
                    continue;
                };
                if !queue.is_started() {
                    continue;
                }

                match queue.revoke_admission(&declared.tasks) {
                    Revocation::Revoked(count) => {
                        info!(
                            component = %target.component,
                            queue = %declared.queue,
                            tasks = count,
                            "Disabled task admission"
                        );
                    }
                    Revocation::Legacy(task) => {
                        warn!(
                            component = %target.component,
                            queue = %declared.queue,
                            task = %task,
                            "Legacy task registration, skipping task waiting"
                        );
                        return DrainOutcome::Abandoned;
                    }
                }

                queues.push((declared.queue.clone(), queue));
            }
        }

        if !self
            .poll(&deadline, &queues, |queue| queue.pending_count() > 0, "Queue")
            .await
        {
            return DrainOutcome::TimedOut;
        }

        let mut nodes = Vec::new();
        for target in &self.targets {
            for name in &target.nodes {
                let Some(node) = self.directory.node(&target.component, name) else {
                    continue;
                };
                if !node.is_started() {
                    continue;
                }

                node.set_admission(false);
                info!(component = %target.component, node = %name, "Disabled node admission");
                nodes.push((name.clone(), node));
            }
        }

        if !self
            .poll(&deadline, &nodes, |node| node.has_in_flight(), "Node")
            .await
        {
            return DrainOutcome::TimedOut;
        }

        info!("Task wait completed");
        DrainOutcome::Completed
    }

    /// Poll until no handle is busy; `false` on timeout
    async fn poll<T: ?Sized>(
        &self,
        deadline: &Deadline,
        handles: &[(String, Arc<T>)],
        busy: impl Fn(&T) -> bool,
        kind: &str,
    ) -> bool {
        if handles.is_empty() {
            return true;
        }

        loop {
            let mut waiting = false;
            for (name, handle) in handles {
                if busy(handle.as_ref()) {
                    debug!(kind, name = %name, "Still has tasks, waiting");
                    waiting = true;
                }
            }

            if !waiting {
                debug!(kind, "No more busy targets");
                return true;
            }

            if deadline.expired() {
                warn!(kind, "Task wait timeout reached");
                return false;
            }

            tokio::time::sleep(deadline.nap(self.interval)).await;
        }
    }
}
