//! Engine event stream
//!
//! The engine reports progress over an unbounded channel so callers (the
//! CLI, tests) can observe worker creation, task lifecycle changes and
//! degraded decisions without polling the arena.

use tokio::sync::mpsc;

use crate::protocol::{NodeId, WorkerId};

/// Progress events emitted while an objective runs
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A worker was constructed and registered
    WorkerCreated { id: WorkerId, name: String },
    /// A task node was materialized in the arena
    TaskCreated { node: NodeId, title: String },
    /// A task was handed to its worker
    TaskDispatched { node: NodeId, worker: WorkerId },
    /// A task reached `Completed`
    TaskCompleted { node: NodeId, title: String },
    /// A degraded decision (skipped child, fallback, failed write)
    Warning { message: String },
}

/// Sender half of the event stream.
///
/// Emission never fails: if the receiver is gone the event is dropped,
/// since progress reporting must not stall the engine.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl EventSender {
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(EngineEvent::Warning {
            message: message.into(),
        });
    }
}

/// Receiver half of the event stream.
pub type EventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

/// Create a connected sender/receiver pair.
pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, rx)
}
