//! In-process task queue and worker node primitives

use crate::drain::{DrainableNode, DrainableQueue, Revocation, WorkerDirectory};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Registration {
    Managed { admit: bool },
    Legacy,
}

#[derive(Debug, Default)]
struct QueueState {
    started: bool,
    registry: HashMap<String, Registration>,
    pending: VecDeque<String>,
}

/// Named task queue with per-task admission
#[derive(Debug, Default)]
pub struct TaskQueue {
    state: Mutex<QueueState>,
}

impl TaskQueue {
    /// Create a stopped, empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task that admits submissions
    pub fn register(&self, task: impl Into<String>) {
        self.state
            .lock()
            .registry
            .insert(task.into(), Registration::Managed { admit: true });
    }

    /// Register a task without an admission policy
    pub fn register_legacy(&self, task: impl Into<String>) {
        self.state
            .lock()
            .registry
            .insert(task.into(), Registration::Legacy);
    }

    /// Mark the queue running
    pub fn start(&self) {
        self.state.lock().started = true;
    }

    /// Enqueue a task; `false` if unregistered or admission is revoked
    pub fn submit(&self, task: &str) -> bool {
        let mut state = self.state.lock();
        let admitted = match state.registry.get(task) {
            Some(Registration::Managed { admit }) => *admit,
            Some(Registration::Legacy) => true,
            None => false,
        };
        if admitted {
            state.pending.push_back(task.to_string());
        }
        admitted
    }

    /// Dequeue the oldest pending task
    pub fn take(&self) -> Option<String> {
        self.state.lock().pending.pop_front()
    }
}

impl DrainableQueue for TaskQueue {
    fn is_started(&self) -> bool {
        self.state.lock().started
    }

    fn revoke_admission(&self, tasks: &[String]) -> Revocation {
        let mut state = self.state.lock();
        let mut revoked = 0;
        for task in tasks {
            match state.registry.get_mut(task) {
                None => continue,
                Some(Registration::Legacy) => return Revocation::Legacy(task.clone()),
                Some(Registration::Managed { admit }) => {
                    *admit = false;
                    revoked += 1;
                }
            }
        }
        Revocation::Revoked(revoked)
    }

    fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }
}

/// Worker pool with a node-wide admission flag and in-flight tracking
#[derive(Debug)]
pub struct TaskNode {
    started: AtomicBool,
    admit: AtomicBool,
    in_flight: Arc<AtomicUsize>,
}

impl TaskNode {
    /// Create a stopped node that admits work
    pub fn new() -> Self {
        Self {
            started: AtomicBool::new(false),
            admit: AtomicBool::new(true),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Mark the node running
    pub fn start(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    /// Whether new work is admitted
    pub fn admits(&self) -> bool {
        self.admit.load(Ordering::SeqCst)
    }

    /// Start a unit of work; `None` when admission is revoked
    ///
    /// The work counts as in flight until the guard is dropped.
    pub fn begin(&self) -> Option<InFlightGuard> {
        // Counted before the admission check; a rejected begin backs out on drop
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlightGuard {
            in_flight: self.in_flight.clone(),
        };
        if !self.admits() {
            return None;
        }
        Some(guard)
    }
}

impl Default for TaskNode {
    fn default() -> Self {
        Self::new()
    }
}

impl DrainableNode for TaskNode {
    fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    fn set_admission(&self, allow: bool) {
        self.admit.store(allow, Ordering::SeqCst);
    }

    fn has_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }
}

/// Marks one unit of node work as running
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Worker directory over explicitly registered queues and nodes
#[derive(Debug, Default)]
pub struct LocalWorkerDirectory {
    queues: HashMap<(String, String), Arc<TaskQueue>>,
    nodes: HashMap<(String, String), Arc<TaskNode>>,
}

impl LocalWorkerDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a queue under `component`
    pub fn with_queue(
        mut self,
        component: impl Into<String>,
        name: impl Into<String>,
        queue: Arc<TaskQueue>,
    ) -> Self {
        self.queues.insert((component.into(), name.into()), queue);
        self
    }

    /// Register a node under `component`
    pub fn with_node(
        mut self,
        component: impl Into<String>,
        name: impl Into<String>,
        node: Arc<TaskNode>,
    ) -> Self {
        self.nodes.insert((component.into(), name.into()), node);
        self
    }
}

impl WorkerDirectory for LocalWorkerDirectory {
    fn queue(&self, component: &str, name: &str) -> Option<Arc<dyn DrainableQueue>> {
        let queue: Arc<dyn DrainableQueue> = self
            .queues
            .get(&(component.to_string(), name.to_string()))?
            .clone();
        Some(queue)
    }

    fn node(&self, component: &str, name: &str) -> Option<Arc<dyn DrainableNode>> {
        let node: Arc<dyn DrainableNode> = self
            .nodes
            .get(&(component.to_string(), name.to_string()))?
            .clone();
        Some(node)
    }
}
