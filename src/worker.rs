//! Worker entity and the run-wide worker registry

use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::channel::{EngineEvent, EventSender};
use crate::protocol::{ActionKind, NodeId, RemoteFileId, WorkerId, WorkerSpec};

/// A named, instructed capability-bearer that owns a subset of tasks.
///
/// Workers are created lazily, exactly once per id, and live for the
/// whole run. The task list grows as the engine delegates to the worker
/// and has its own lock since sibling dispatch tasks append concurrently.
pub struct Worker {
    pub id: WorkerId,
    pub name: String,
    /// Free-text role description sent with every oracle request
    pub instructions: String,
    /// Structured actions this worker may invoke on the oracle
    pub actions: Vec<ActionKind>,
    /// References into the knowledge loader's uploads
    pub context_files: Vec<RemoteFileId>,
    tasks: Mutex<Vec<NodeId>>,
}

impl Worker {
    pub fn new(
        spec: &WorkerSpec,
        actions: Vec<ActionKind>,
        context_files: Vec<RemoteFileId>,
    ) -> Self {
        info!(worker = spec.id, name = %spec.name, "Created worker");
        Self {
            id: spec.id,
            name: spec.name.clone(),
            instructions: spec.instructions.clone(),
            actions,
            context_files,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Record a task assignment.
    pub fn assign(&self, node: NodeId) {
        self.tasks.lock().push(node);
    }

    /// Arena keys of every task assigned to this worker so far.
    pub fn tasks(&self) -> Vec<NodeId> {
        self.tasks.lock().clone()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.lock().len()
    }
}

/// Handle to a worker for shared access across dispatch tasks
#[derive(Clone)]
pub struct WorkerHandle {
    inner: Arc<Worker>,
}

impl WorkerHandle {
    pub fn new(worker: Worker) -> Self {
        Self {
            inner: Arc::new(worker),
        }
    }

    pub fn id(&self) -> WorkerId {
        self.inner.id
    }
}

impl std::ops::Deref for WorkerHandle {
    type Target = Worker;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Run-wide worker factory and registry.
///
/// An id collision is reuse, never overwrite: requesting creation with an
/// already-registered id returns the existing worker even if the new spec
/// carries different instructions.
pub struct WorkerRegistry {
    workers: RwLock<HashMap<WorkerId, WorkerHandle>>,
    events: EventSender,
}

impl WorkerRegistry {
    pub fn new(events: EventSender) -> Self {
        Self {
            workers: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Return the worker with this spec's id, constructing and
    /// registering it on first sight.
    ///
    /// New workers get the default action set plus the given context
    /// files; an existing worker is returned untouched.
    pub fn get_or_create(
        &self,
        spec: &WorkerSpec,
        context_files: Vec<RemoteFileId>,
    ) -> WorkerHandle {
        let mut workers = self.workers.write();
        if let Some(existing) = workers.get(&spec.id) {
            if existing.instructions != spec.instructions {
                warn!(
                    worker = spec.id,
                    "Worker id already registered with different instructions, reusing existing"
                );
            }
            return existing.clone();
        }

        let handle = WorkerHandle::new(Worker::new(spec, ActionKind::defaults(), context_files));
        workers.insert(spec.id, handle.clone());
        self.events.emit(EngineEvent::WorkerCreated {
            id: spec.id,
            name: spec.name.clone(),
        });
        handle
    }

    /// Look up an already-registered worker.
    pub fn get(&self, id: WorkerId) -> Option<WorkerHandle> {
        self.workers.read().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.workers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.read().is_empty()
    }
}
