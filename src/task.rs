//! Task entity and the id-indexed task arena

use std::collections::HashMap;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::protocol::{ConversationId, NodeId, SubtaskId, TaskStatus, WorkerId};

/// A node in the decomposition tree.
///
/// Tasks live in a [`TaskArena`] keyed by [`NodeId`]; `parent` is a
/// back-reference into the same arena. `id` is the oracle-assigned
/// sibling-local id, with `0` reserved for meta work.
#[derive(Debug, Clone)]
pub struct Task {
    /// Sibling-local id assigned by the decomposition plan
    pub id: SubtaskId,
    pub title: String,
    pub description: String,
    /// The worker this task is assigned to
    pub worker: WorkerId,
    /// Sibling this task depends on, recorded for prompt context only
    pub depends_on: Option<SubtaskId>,
    /// Arena key of the task that spawned this one
    pub parent: Option<NodeId>,
    /// Tri-state decomposability, set exactly once
    decomposable: Option<bool>,
    status: TaskStatus,
    /// Textual work product, set together with `Completed`
    outcome: Option<String>,
    /// Conversation that produced the outcome, for sink filenames
    conversation: Option<ConversationId>,
}

impl Task {
    pub fn new(
        id: SubtaskId,
        title: impl Into<String>,
        description: impl Into<String>,
        worker: WorkerId,
        depends_on: Option<SubtaskId>,
        parent: Option<NodeId>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            description: description.into(),
            worker,
            depends_on,
            parent,
            decomposable: None,
            status: TaskStatus::Created,
            outcome: None,
            conversation: None,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn decomposable(&self) -> Option<bool> {
        self.decomposable
    }

    pub fn outcome(&self) -> Option<&str> {
        self.outcome.as_deref()
    }

    pub fn conversation(&self) -> Option<ConversationId> {
        self.conversation
    }

    pub fn is_complete(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

/// Owns every task node in a run, keyed by [`NodeId`].
///
/// Mutated concurrently by sibling dispatch tasks; all mutation happens
/// under the single write lock. Aggregation reads happen only after the
/// fan-in barrier, when no writers remain for that subtree.
pub struct TaskArena {
    tasks: RwLock<HashMap<NodeId, Task>>,
}

impl TaskArena {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a task and return its arena key.
    pub fn insert(&self, task: Task) -> NodeId {
        let node = NodeId::next();
        debug!(node = %node, title = %task.title, "Created task");
        self.tasks.write().insert(node, task);
        node
    }

    /// Snapshot of a task.
    pub fn get(&self, node: NodeId) -> Option<Task> {
        self.tasks.read().get(&node).cloned()
    }

    /// Move a task from `Created` to `Dispatched`. Any other transition
    /// is ignored; status never regresses.
    pub fn mark_dispatched(&self, node: NodeId) {
        let mut tasks = self.tasks.write();
        if let Some(task) = tasks.get_mut(&node) {
            if task.status == TaskStatus::Created {
                task.status = TaskStatus::Dispatched;
            }
        }
    }

    /// Record the decomposability decision. Set exactly once; a second
    /// call is ignored with a warning.
    pub fn set_decomposable(&self, node: NodeId, decomposable: bool) {
        let mut tasks = self.tasks.write();
        if let Some(task) = tasks.get_mut(&node) {
            if task.decomposable.is_some() {
                warn!(node = %node, "Decomposability already decided, ignoring");
                return;
            }
            task.decomposable = Some(decomposable);
        }
    }

    /// Complete a task: outcome, conversation handle and `Completed`
    /// status are set together under one lock acquisition.
    ///
    /// Idempotent - once completed, the outcome is never mutated again.
    /// Returns `false` if the task was already complete or missing.
    pub fn complete(
        &self,
        node: NodeId,
        outcome: impl Into<String>,
        conversation: Option<ConversationId>,
    ) -> bool {
        let mut tasks = self.tasks.write();
        match tasks.get_mut(&node) {
            Some(task) if task.status != TaskStatus::Completed => {
                task.outcome = Some(outcome.into());
                task.conversation = conversation;
                task.status = TaskStatus::Completed;
                true
            }
            Some(_) => {
                warn!(node = %node, "Task already completed, outcome unchanged");
                false
            }
            None => false,
        }
    }

    /// Arena keys of a task's direct children.
    pub fn children(&self, parent: NodeId) -> Vec<NodeId> {
        let mut children: Vec<NodeId> = self
            .tasks
            .read()
            .iter()
            .filter(|(_, t)| t.parent == Some(parent))
            .map(|(node, _)| *node)
            .collect();
        children.sort();
        children
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }
}

impl Default for TaskArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task() -> Task {
        Task::new(1, "Write the report", "Summarize findings", 1, None, None)
    }

    #[test]
    fn test_insert_and_get() {
        let arena = TaskArena::new();
        let node = arena.insert(sample_task());

        let task = arena.get(node).unwrap();
        assert_eq!(task.title, "Write the report");
        assert_eq!(task.status(), TaskStatus::Created);
        assert_eq!(task.decomposable(), None);
        assert!(task.outcome().is_none());
    }

    #[test]
    fn test_status_progression() {
        let arena = TaskArena::new();
        let node = arena.insert(sample_task());

        arena.mark_dispatched(node);
        assert_eq!(arena.get(node).unwrap().status(), TaskStatus::Dispatched);

        assert!(arena.complete(node, "done", None));
        assert_eq!(arena.get(node).unwrap().status(), TaskStatus::Completed);

        // No regression after completion
        arena.mark_dispatched(node);
        assert_eq!(arena.get(node).unwrap().status(), TaskStatus::Completed);
    }

    #[test]
    fn test_completion_is_idempotent() {
        let arena = TaskArena::new();
        let node = arena.insert(sample_task());

        assert!(arena.complete(node, "first", None));
        assert!(!arena.complete(node, "second", None));

        let task = arena.get(node).unwrap();
        assert_eq!(task.outcome(), Some("first"));
        assert!(task.is_complete());
    }

    #[test]
    fn test_decomposability_set_once() {
        let arena = TaskArena::new();
        let node = arena.insert(sample_task());

        arena.set_decomposable(node, true);
        arena.set_decomposable(node, false);

        assert_eq!(arena.get(node).unwrap().decomposable(), Some(true));
    }

    #[test]
    fn test_children_listing() {
        let arena = TaskArena::new();
        let root = arena.insert(sample_task());

        let c1 = arena.insert(Task::new(1, "a", "a", 1, None, Some(root)));
        let c2 = arena.insert(Task::new(2, "b", "b", 2, Some(1), Some(root)));
        let _stray = arena.insert(Task::new(1, "c", "c", 1, None, None));

        let children = arena.children(root);
        assert_eq!(children, vec![c1, c2]);
        assert_eq!(arena.get(c2).unwrap().depends_on, Some(1));
    }

    #[test]
    fn test_missing_node() {
        let arena = TaskArena::new();
        let node = NodeId::next();

        assert!(arena.get(node).is_none());
        assert!(!arena.complete(node, "x", None));
        assert!(arena.children(node).is_empty());
    }
}
