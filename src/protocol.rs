//! Shared protocol types - ids, task/worker specs, oracle actions
//!
//! Everything that crosses the boundary between the engine and the oracle
//! lives here: the decomposition plan wire format, the tagged oracle action
//! union, and the id newtypes used throughout the crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Oracle-assigned task identifier, unique among siblings.
///
/// `0` is reserved for internal meta-tasks (decomposability probes and
/// summaries) and never appears as a dispatched subtask id.
pub type SubtaskId = u32;

/// Oracle-assigned worker identifier, unique within a run.
pub type WorkerId = u32;

/// Sibling-local id reserved for meta work (probes, summaries).
pub const META_TASK_ID: SubtaskId = 0;

/// Globally unique arena key for a task node.
///
/// Tasks are id-indexed in an arena rather than pointer-linked, so the
/// whole tree can be inspected for aggregation and debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

static NEXT_NODE: AtomicU64 = AtomicU64::new(1);

impl NodeId {
    /// Allocate the next node id. Monotonic across the process.
    pub fn next() -> Self {
        Self(NEXT_NODE.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Handle to one oracle conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Id of a file uploaded to the oracle side for worker context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteFileId(pub String);

impl fmt::Display for RemoteFileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a task. Transitions are monotonic: Created -> Dispatched
/// -> Completed, no regression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskStatus {
    Created,
    Dispatched,
    Completed,
}

/// Structured actions a worker may invoke on the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    /// Yes/no decision on whether a task can be split.
    DecideDecomposability,
    /// Full decomposition: subtask specs plus worker specs.
    DecomposeAndAssign,
    /// Produce a search term for reference retrieval.
    ProduceSearchTerm,
}

impl ActionKind {
    /// The default action set granted to a newly created worker.
    pub fn defaults() -> Vec<ActionKind> {
        vec![
            ActionKind::DecideDecomposability,
            ActionKind::DecomposeAndAssign,
            ActionKind::ProduceSearchTerm,
        ]
    }
}

/// One child task spec inside a decomposition plan.
///
/// Field names follow the oracle-side function schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtaskSpec {
    #[serde(rename = "subtask_id")]
    pub id: SubtaskId,
    #[serde(rename = "subtask_title")]
    pub title: String,
    #[serde(rename = "subtask_description")]
    pub description: String,
    #[serde(rename = "assigned_agent_id")]
    pub assigned_worker: WorkerId,
    #[serde(rename = "dependent_upon", default)]
    pub dependent_upon: Option<SubtaskId>,
}

impl SubtaskSpec {
    /// The sibling this subtask depends on, if any. A wire value of `0`
    /// means no dependency.
    pub fn depends_on(&self) -> Option<SubtaskId> {
        self.dependent_upon.filter(|id| *id != 0)
    }
}

/// One worker spec inside a decomposition plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSpec {
    #[serde(rename = "agent_id")]
    pub id: WorkerId,
    #[serde(rename = "agent_name")]
    pub name: String,
    #[serde(rename = "agent_instructions")]
    pub instructions: String,
}

/// A decomposition produced by the oracle: child task specs plus the
/// workers needed to execute them. Consumed once.
///
/// Every `assigned_worker` referenced by a subtask must resolve either to
/// a worker spec in this plan or to a worker already registered in the
/// run; the engine validates this before dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecompositionPlan {
    #[serde(default)]
    pub subtasks: Vec<SubtaskSpec>,
    #[serde(rename = "agents", default)]
    pub workers: Vec<WorkerSpec>,
}

impl DecompositionPlan {
    /// Find a worker spec by id within this plan.
    pub fn worker_spec(&self, id: WorkerId) -> Option<&WorkerSpec> {
        self.workers.iter().find(|w| w.id == id)
    }
}

/// A structured action invocation returned by the oracle.
///
/// A single response may carry more than one action - notably a
/// decomposability decision alongside the full plan - so responses hold a
/// `Vec<OracleAction>` rather than assuming mutual exclusivity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "arguments")]
pub enum OracleAction {
    #[serde(rename = "decide_decomposability")]
    Decomposability { decomposable: bool },
    #[serde(rename = "decompose_and_assign")]
    Plan(DecompositionPlan),
    #[serde(rename = "research")]
    SearchTerm { search_term: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_ids_monotonic() {
        let a = NodeId::next();
        let b = NodeId::next();
        assert!(b > a);
    }

    #[test]
    fn test_node_id_display() {
        assert_eq!(NodeId(42).to_string(), "n42");
    }

    #[test]
    fn test_depends_on_zero_means_none() {
        let spec = SubtaskSpec {
            id: 1,
            title: "t".into(),
            description: "d".into(),
            assigned_worker: 1,
            dependent_upon: Some(0),
        };
        assert_eq!(spec.depends_on(), None);

        let spec = SubtaskSpec {
            dependent_upon: Some(2),
            ..spec
        };
        assert_eq!(spec.depends_on(), Some(2));
    }

    #[test]
    fn test_plan_wire_format() {
        let json = serde_json::json!({
            "subtasks": [
                {
                    "subtask_id": 1,
                    "subtask_title": "Write the parser",
                    "subtask_description": "Parse the input format",
                    "assigned_agent_id": 2,
                    "dependent_upon": 0
                },
                {
                    "subtask_id": 2,
                    "subtask_title": "Write the tests",
                    "subtask_description": "Cover the parser",
                    "assigned_agent_id": 3
                }
            ],
            "agents": [
                { "agent_id": 2, "agent_name": "Parser Dev", "agent_instructions": "You write parsers." },
                { "agent_id": 3, "agent_name": "Test Dev", "agent_instructions": "You write tests." }
            ]
        });

        let plan: DecompositionPlan = serde_json::from_value(json).unwrap();
        assert_eq!(plan.subtasks.len(), 2);
        assert_eq!(plan.workers.len(), 2);
        assert_eq!(plan.subtasks[0].depends_on(), None);
        assert_eq!(plan.subtasks[1].dependent_upon, None);
        assert!(plan.worker_spec(3).is_some());
        assert!(plan.worker_spec(7).is_none());
    }

    #[test]
    fn test_action_tagging() {
        let json = serde_json::json!({
            "name": "decide_decomposability",
            "arguments": { "decomposable": true }
        });
        let action: OracleAction = serde_json::from_value(json).unwrap();
        assert_eq!(action, OracleAction::Decomposability { decomposable: true });
    }

    #[test]
    fn test_default_action_set_is_complete() {
        let defaults = ActionKind::defaults();
        assert_eq!(defaults.len(), 3);
        assert!(defaults.contains(&ActionKind::DecideDecomposability));
        assert!(defaults.contains(&ActionKind::DecomposeAndAssign));
        assert!(defaults.contains(&ActionKind::ProduceSearchTerm));
    }
}
