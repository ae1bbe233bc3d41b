//! # Phalanx
//!
//! Recursive objective decomposition engine - divide, delegate, conquer.
//!
//! An objective submitted by the caller becomes the root of a task tree
//! that grows at runtime: an external reasoning oracle decides whether
//! each task is atomic or should be split, and when it splits one it also
//! names the specialized workers to execute the pieces. Children run
//! concurrently, each recursing into the same decision procedure, and
//! results are synthesized bottom-up into one deliverable.
//!
//! ## Architecture
//!
//! ```text
//!                     ┌────────────────────────────┐
//!                     │      Objective (root)      │
//!                     │    assigned: root worker   │
//!                     └─────────────┬──────────────┘
//!                 probe: decomposable? ──► Oracle
//!                     ┌─────────────┴──────────────┐
//!          ▼ fan-out (concurrent)                  ▼
//!   ┌─────────────┐  ┌─────────────┐        ┌─────────────┐
//!   │  Subtask 1  │  │  Subtask 2  │  ...   │  Subtask N  │
//!   │  worker A   │  │  worker B   │        │  worker A   │
//!   └──────┬──────┘  └──────┬──────┘        └──────┬──────┘
//!          │ (each recurses: probe, split or execute)
//!          └────────────────┴────────┬──────────────┘
//!                     fan-in barrier │
//!                     ┌──────────────▼─────────────┐
//!                     │  summarize children ──► Oracle
//!                     │  outcome -> result sink    │
//!                     └────────────────────────────┘
//! ```
//!
//! ## Key Concepts
//!
//! - **Task**: a node in the decomposition tree, atomic or further split
//! - **Worker**: a named, instructed capability-bearer owning tasks
//! - **Oracle**: the external reasoning capability behind every decision
//! - **Engine**: builds, schedules and reconciles the tree

pub mod channel;
pub mod engine;
pub mod error;
pub mod knowledge;
pub mod oracle;
pub mod protocol;
pub mod remote;
pub mod sink;
pub mod task;
pub mod worker;

pub use channel::{event_channel, EngineEvent, EventReceiver, EventSender};
pub use engine::{Engine, EngineConfig, ROOT_WORKER_ID};
pub use error::PhalanxError;
pub use oracle::{Oracle, OracleRequest, OracleResponse, OracleStatus, RequestKind};
pub use remote::RemoteOracle;
pub use sink::{FsResultSink, ResultSink};
pub use task::{Task, TaskArena};
pub use worker::{Worker, WorkerHandle, WorkerRegistry};

// Re-export commonly used protocol types
pub use protocol::{
    ActionKind, ConversationId, DecompositionPlan, NodeId, OracleAction, RemoteFileId,
    SubtaskId, SubtaskSpec, TaskStatus, WorkerId, WorkerSpec,
};
