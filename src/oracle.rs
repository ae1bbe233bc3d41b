//! Oracle contract - the external reasoning capability
//!
//! The engine never reasons itself; it asks the oracle. An invocation
//! carries the worker's identity, a prompt and the actions the worker may
//! invoke, and yields either free text or one or more structured actions.
//! Remote failure is a distinguishable status, not something the engine
//! has to guess at from an error string.

use async_trait::async_trait;

use crate::error::PhalanxError;
use crate::protocol::{
    ActionKind, ConversationId, DecompositionPlan, OracleAction, RemoteFileId,
};

/// What the engine wants out of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Decomposability probe, possibly answered with a plan in the same call
    Probe,
    /// Atomic execution of a task's work
    Execute,
    /// Synthesis of completed children into one result
    Summarize,
}

/// One oracle invocation.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    pub kind: RequestKind,
    /// Name of the worker issuing the request
    pub worker_name: String,
    /// The worker's role instructions
    pub instructions: String,
    /// Task-specific prompt
    pub prompt: String,
    /// Structured actions the oracle may invoke in response
    pub allowed_actions: Vec<ActionKind>,
    /// Reference files seeded into the worker's context
    pub context_files: Vec<RemoteFileId>,
    /// Continue an existing conversation, or start a new one if `None`
    pub conversation: Option<ConversationId>,
}

/// Terminal state of an invocation as reported by the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleStatus {
    Completed,
    Failed,
}

/// The oracle's answer: free text, structured actions, or both.
#[derive(Debug, Clone)]
pub struct OracleResponse {
    pub status: OracleStatus,
    pub text: Option<String>,
    /// May carry more than one action - a decomposability decision and
    /// the full plan arrive in the same response
    pub actions: Vec<OracleAction>,
    pub conversation: ConversationId,
}

impl OracleResponse {
    pub fn succeeded(&self) -> bool {
        self.status == OracleStatus::Completed
    }

    /// The decomposability decision, if the response carries one.
    pub fn decomposability(&self) -> Option<bool> {
        self.actions.iter().find_map(|a| match a {
            OracleAction::Decomposability { decomposable } => Some(*decomposable),
            _ => None,
        })
    }

    /// The decomposition plan, if the response carries one.
    pub fn plan(&self) -> Option<&DecompositionPlan> {
        self.actions.iter().find_map(|a| match a {
            OracleAction::Plan(plan) => Some(plan),
            _ => None,
        })
    }
}

/// The external reasoning capability.
///
/// An invocation may block for an unbounded but finite duration (remote
/// call with polling). Implementations must signal remote-reported
/// failure via [`OracleStatus::Failed`] and reserve `Err` for transport
/// failure; the engine degrades identically on both. No side effects on
/// the task/worker model beyond the returned response.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn invoke(&self, request: OracleRequest) -> Result<OracleResponse, PhalanxError>;
}
