//! Phalanx error types

use thiserror::Error;

use crate::protocol::{NodeId, SubtaskId, WorkerId};

/// Errors that can occur while running an objective
#[derive(Debug, Error)]
pub enum PhalanxError {
    /// The oracle could not be reached or reported a terminal failure
    #[error("Oracle unavailable: {0}")]
    OracleUnavailable(String),

    /// A decomposition plan is missing required cross-references
    #[error("Malformed decomposition plan: {0}")]
    MalformedPlan(String),

    /// A subtask references a worker spec absent from the plan and the registry
    #[error("Subtask {subtask} references unknown worker {worker}")]
    UnresolvedWorker { subtask: SubtaskId, worker: WorkerId },

    /// Writing an outcome to the result sink failed
    #[error("Persistence failure: {0}")]
    PersistenceFailure(#[from] std::io::Error),

    /// A task finished without producing any outcome
    #[error("Task {0} produced no outcome")]
    NoOutcome(NodeId),

    /// Task lookup failed
    #[error("Task not found: {0}")]
    TaskNotFound(NodeId),

    /// A dispatched child panicked or was cancelled
    #[error("Child task failed: {0}")]
    ChildFailed(String),
}
