//! Orchestration engine - recursive decomposition, dispatch and aggregation
//!
//! The engine drives the whole run: it asks the oracle whether a task can
//! be split, materializes the workers and child tasks a decomposition
//! names, dispatches children concurrently, waits at the fan-in barrier,
//! and synthesizes the children's outcomes into the parent's result.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::channel::{event_channel, EngineEvent, EventReceiver, EventSender};
use crate::error::PhalanxError;
use crate::oracle::{Oracle, OracleRequest, OracleResponse, RequestKind};
use crate::protocol::{
    ActionKind, ConversationId, DecompositionPlan, NodeId, RemoteFileId, SubtaskSpec,
    WorkerId, WorkerSpec, META_TASK_ID,
};
use crate::sink::{outcome_file_name, ResultSink};
use crate::task::{Task, TaskArena};
use crate::worker::{WorkerHandle, WorkerRegistry};

/// Worker id reserved for the root worker that receives the objective.
pub const ROOT_WORKER_ID: WorkerId = 0;

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Run-global cap on concurrent oracle invocations.
    ///
    /// Nested decompositions create nested fan-outs, so total parallelism
    /// would otherwise grow multiplicatively with tree depth and width.
    /// Permits are held only across a single invocation, never across a
    /// subtree, so the cap cannot deadlock the recursion.
    pub max_concurrency: usize,
    /// Name given to the root worker
    pub root_worker_name: String,
    /// Role instructions for the root worker
    pub root_instructions: String,
    /// Knowledge files seeded into every new worker's context
    pub context_files: Vec<RemoteFileId>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 16,
            root_worker_name: "Helpful Agent".to_string(),
            root_instructions:
                "You are a helpful agent assisting me in completing the assigned task."
                    .to_string(),
            context_files: Vec::new(),
        }
    }
}

/// The orchestration engine.
///
/// Cheap to clone; clones share the oracle, sink, arena and registries,
/// which is what lets each fan-out branch run on its own tokio task.
#[derive(Clone)]
pub struct Engine {
    oracle: Arc<dyn Oracle>,
    sink: Arc<dyn ResultSink>,
    workers: Arc<WorkerRegistry>,
    tasks: Arc<TaskArena>,
    permits: Arc<Semaphore>,
    events: EventSender,
    config: Arc<EngineConfig>,
}

impl Engine {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        sink: Arc<dyn ResultSink>,
        config: EngineConfig,
        events: EventSender,
    ) -> Self {
        Self {
            oracle,
            sink,
            workers: Arc::new(WorkerRegistry::new(events.clone())),
            tasks: Arc::new(TaskArena::new()),
            permits: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            events,
            config: Arc::new(config),
        }
    }

    /// Create an engine and the event stream to observe it with.
    pub fn with_channel(
        oracle: Arc<dyn Oracle>,
        sink: Arc<dyn ResultSink>,
        config: EngineConfig,
    ) -> (Self, EventReceiver) {
        let (tx, rx) = event_channel();
        (Self::new(oracle, sink, config, tx), rx)
    }

    /// The task arena for this run.
    pub fn tasks(&self) -> &TaskArena {
        &self.tasks
    }

    /// The worker registry for this run.
    pub fn workers(&self) -> &WorkerRegistry {
        &self.workers
    }

    /// Run an objective to completion and return its synthesized outcome.
    ///
    /// The objective becomes the root task, assigned to the root worker.
    /// Degraded decisions below the root (skipped children, probe
    /// failures, failed writes) are warnings; only a total failure to
    /// produce any outcome for the root is an error here.
    #[instrument(skip(self, description))]
    pub async fn run_objective(
        &self,
        title: &str,
        description: &str,
    ) -> Result<String, PhalanxError> {
        info!(title, "Starting objective");

        let root_spec = WorkerSpec {
            id: ROOT_WORKER_ID,
            name: self.config.root_worker_name.clone(),
            instructions: self.config.root_instructions.clone(),
        };
        let root_worker = self
            .workers
            .get_or_create(&root_spec, self.config.context_files.clone());

        let node = self.tasks.insert(Task::new(
            1,
            title,
            description,
            root_worker.id(),
            None,
            None,
        ));
        root_worker.assign(node);
        self.events.emit(EngineEvent::TaskCreated {
            node,
            title: title.to_string(),
        });

        let outcome = self.execute(node).await?;
        if outcome.trim().is_empty() {
            return Err(PhalanxError::NoOutcome(node));
        }

        info!(title, "Objective complete");
        Ok(outcome)
    }

    /// Recursive per-task decision procedure.
    ///
    /// Boxed because the recursion depth is decided at runtime by the
    /// oracle's decompositions.
    fn execute(
        &self,
        node: NodeId,
    ) -> Pin<Box<dyn Future<Output = Result<String, PhalanxError>> + Send + '_>> {
        Box::pin(async move {
            let task = self
                .tasks
                .get(node)
                .ok_or(PhalanxError::TaskNotFound(node))?;
            self.tasks.mark_dispatched(node);
            self.events.emit(EngineEvent::TaskDispatched {
                node,
                worker: task.worker,
            });

            let (outcome, conversation) = match self.probe(node, &task).await {
                Some(plan) => self.decompose(node, &task, plan).await?,
                None => {
                    self.tasks.set_decomposable(node, false);
                    self.execute_atomic(node, &task).await?
                }
            };

            self.finish(node, &task, &outcome, conversation).await;
            Ok(outcome)
        })
    }

    /// Ask the oracle whether this task should be split.
    ///
    /// The probe response may carry the decomposability decision and the
    /// full plan in one call; both are extracted. Any failure - transport
    /// error, oracle-reported failure, or a response with no actionable
    /// result - defaults to non-decomposable rather than aborting.
    async fn probe(&self, node: NodeId, task: &Task) -> Option<DecompositionPlan> {
        let worker = match self.worker_for(task) {
            Ok(worker) => worker,
            Err(e) => {
                warn!(node = %node, error = %e, "No worker for probe, treating as atomic");
                return None;
            }
        };

        let request = self.build_request(RequestKind::Probe, &worker, probe_prompt(task));
        match self.invoke(request).await {
            Ok(response) if response.succeeded() => {
                let decision = response.decomposability();
                let plan = response.plan().cloned();
                match (decision, plan) {
                    (Some(false), _) => None,
                    (_, Some(plan)) if !plan.subtasks.is_empty() => Some(plan),
                    (Some(true), _) => {
                        self.degrade(node, "Oracle declared the task decomposable but returned no usable plan");
                        None
                    }
                    (None, _) => {
                        self.degrade(node, "Probe returned no actionable result");
                        None
                    }
                }
            }
            Ok(_) => {
                self.degrade(node, "Oracle reported failure on decomposability probe");
                None
            }
            Err(e) => {
                self.degrade(node, &format!("Decomposability probe failed: {e}"));
                None
            }
        }
    }

    /// Materialize and dispatch the plan's children, wait for all of
    /// them, then summarize.
    async fn decompose(
        &self,
        node: NodeId,
        task: &Task,
        plan: DecompositionPlan,
    ) -> Result<(String, Option<ConversationId>), PhalanxError> {
        let children = self.resolve_children(node, task, &plan);
        if children.is_empty() {
            self.degrade(node, "No subtask in the plan could be resolved, executing atomically");
            self.tasks.set_decomposable(node, false);
            return self.execute_atomic(node, task).await;
        }

        // Decomposability is recorded only now, once at least one child
        // is known to exist, so `true` always implies owned children.
        self.tasks.set_decomposable(node, true);
        debug!(node = %node, children = children.len(), "Dispatching subtasks");

        let mut join_set = JoinSet::new();
        for child in &children {
            let engine = self.clone();
            let child = *child;
            join_set.spawn(async move {
                let outcome = engine.execute(child).await?;
                Ok::<_, PhalanxError>((child, outcome))
            });
        }

        // Fan-in barrier: every dispatched child must report before the
        // summarization step. A failed child is excluded, not fatal.
        let mut completed = Vec::new();
        while let Some(result) = join_set.join_next().await {
            match result {
                Ok(Ok((child, _))) => completed.push(child),
                Ok(Err(e)) => {
                    self.degrade(node, &format!("Child task failed, excluded from aggregation: {e}"));
                }
                Err(e) => {
                    self.degrade(
                        node,
                        &format!("Child task aborted, excluded from aggregation: {e}"),
                    );
                }
            }
        }
        completed.sort();

        self.summarize(node, task, &completed).await
    }

    /// Resolve each subtask spec to a worker and materialize the child
    /// task nodes. Unresolvable or malformed children are skipped with a
    /// warning; the rest proceed.
    fn resolve_children(
        &self,
        parent: NodeId,
        task: &Task,
        plan: &DecompositionPlan,
    ) -> Vec<NodeId> {
        let mut children = Vec::new();
        for spec in &plan.subtasks {
            if spec.id == META_TASK_ID {
                self.degrade(
                    parent,
                    &format!("Skipping subtask \"{}\": id 0 is reserved", spec.title),
                );
                continue;
            }

            let worker = match plan.worker_spec(spec.assigned_worker) {
                Some(ws) => self
                    .workers
                    .get_or_create(ws, self.config.context_files.clone()),
                None => match self.workers.get(spec.assigned_worker) {
                    Some(worker) => worker,
                    None => {
                        self.degrade(
                            parent,
                            &format!(
                                "Skipping subtask {} \"{}\": no worker {} in plan or registry",
                                spec.id, spec.title, spec.assigned_worker
                            ),
                        );
                        continue;
                    }
                },
            };

            let description = contextualize(task, spec, plan);
            let child = self.tasks.insert(Task::new(
                spec.id,
                &spec.title,
                description,
                worker.id(),
                spec.depends_on(),
                Some(parent),
            ));
            worker.assign(child);
            self.events.emit(EngineEvent::TaskCreated {
                node: child,
                title: spec.title.clone(),
            });
            children.push(child);
        }
        children
    }

    /// Execute a task as a single unit of work: one oracle invocation
    /// whose free text becomes the outcome.
    async fn execute_atomic(
        &self,
        node: NodeId,
        task: &Task,
    ) -> Result<(String, Option<ConversationId>), PhalanxError> {
        let worker = self.worker_for(task)?;
        info!(node = %node, worker = %worker.name, title = %task.title, "Executing task");

        let request = self.build_request(RequestKind::Execute, &worker, atomic_prompt(task));
        let response = self.invoke(request).await?;
        if !response.succeeded() {
            return Err(PhalanxError::OracleUnavailable(format!(
                "oracle reported failure executing \"{}\"",
                task.title
            )));
        }

        let text = response
            .text
            .filter(|t| !t.trim().is_empty())
            .ok_or(PhalanxError::NoOutcome(node))?;
        Ok((text, Some(response.conversation)))
    }

    /// Synthesize completed children into this task's outcome.
    ///
    /// Runs strictly after the fan-in barrier. If synthesis fails, the
    /// aggregated raw child outcomes become the outcome instead - the
    /// parent still completes with whatever its children produced.
    async fn summarize(
        &self,
        node: NodeId,
        task: &Task,
        completed: &[NodeId],
    ) -> Result<(String, Option<ConversationId>), PhalanxError> {
        let aggregated = self.aggregate(completed);
        let worker = self.worker_for(task)?;

        let request = self.build_request(
            RequestKind::Summarize,
            &worker,
            summarize_prompt(task, &aggregated),
        );
        match self.invoke(request).await {
            Ok(response) if response.succeeded() => match response.text {
                Some(text) if !text.trim().is_empty() => {
                    Ok((text, Some(response.conversation)))
                }
                _ => {
                    self.degrade(node, "Synthesis returned no text, using aggregated child outcomes");
                    Ok((aggregated, None))
                }
            },
            Ok(_) => {
                self.degrade(node, "Oracle reported failure on synthesis, using aggregated child outcomes");
                Ok((aggregated, None))
            }
            Err(e) => {
                self.degrade(
                    node,
                    &format!("Synthesis failed ({e}), using aggregated child outcomes"),
                );
                Ok((aggregated, None))
            }
        }
    }

    /// Render completed child tasks into one report, in sibling-id order.
    fn aggregate(&self, completed: &[NodeId]) -> String {
        let mut sections = Vec::with_capacity(completed.len());
        for node in completed {
            let Some(task) = self.tasks.get(*node) else {
                continue;
            };
            let worker_name = self
                .workers
                .get(task.worker)
                .map(|w| w.name.clone())
                .unwrap_or_default();
            sections.push(format!(
                "Task ID: {}, Title: {}, Assigned Worker: {}\n\nTask Outcome:\n{}",
                task.id,
                task.title,
                worker_name,
                task.outcome().unwrap_or("")
            ));
        }
        sections.join("\n\n")
    }

    /// Complete the task and persist its outcome.
    ///
    /// Completion is idempotent; a sink failure is logged and the outcome
    /// still propagates in memory.
    async fn finish(
        &self,
        node: NodeId,
        task: &Task,
        outcome: &str,
        conversation: Option<ConversationId>,
    ) {
        if !self.tasks.complete(node, outcome, conversation) {
            return;
        }
        self.events.emit(EngineEvent::TaskCompleted {
            node,
            title: task.title.clone(),
        });

        let file_name = outcome_file_name(
            conversation.unwrap_or_default(),
            task.id,
            &task.title,
            outcome,
        );
        if let Err(e) = self.sink.write(&file_name, outcome).await {
            warn!(node = %node, error = %e, "Failed to persist outcome");
            self.events
                .warn(format!("Could not persist outcome for \"{}\": {e}", task.title));
        }
    }

    /// Invoke the oracle under the run-global concurrency cap.
    async fn invoke(&self, request: OracleRequest) -> Result<OracleResponse, PhalanxError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| PhalanxError::OracleUnavailable("engine shut down".into()))?;
        self.oracle.invoke(request).await
    }

    fn build_request(
        &self,
        kind: RequestKind,
        worker: &WorkerHandle,
        prompt: String,
    ) -> OracleRequest {
        let allowed: Vec<ActionKind> = match kind {
            RequestKind::Probe => worker
                .actions
                .iter()
                .copied()
                .filter(|a| {
                    matches!(
                        a,
                        ActionKind::DecideDecomposability | ActionKind::DecomposeAndAssign
                    )
                })
                .collect(),
            RequestKind::Execute | RequestKind::Summarize => worker
                .actions
                .iter()
                .copied()
                .filter(|a| matches!(a, ActionKind::ProduceSearchTerm))
                .collect(),
        };

        OracleRequest {
            kind,
            worker_name: worker.name.clone(),
            instructions: worker.instructions.clone(),
            prompt,
            allowed_actions: allowed,
            context_files: worker.context_files.clone(),
            conversation: None,
        }
    }

    fn worker_for(&self, task: &Task) -> Result<WorkerHandle, PhalanxError> {
        self.workers
            .get(task.worker)
            .ok_or(PhalanxError::UnresolvedWorker {
                subtask: task.id,
                worker: task.worker,
            })
    }

    fn degrade(&self, node: NodeId, message: &str) {
        warn!(node = %node, "{message}");
        self.events.warn(message);
    }
}

/// Rewrite a subtask description to embed its place in the task tree:
/// the parent objective, the sibling overview and the dependency note.
fn contextualize(parent: &Task, spec: &SubtaskSpec, plan: &DecompositionPlan) -> String {
    let mut description = format!(
        "{}\n\nThis subtask is part of \"{}\": {}",
        spec.description, parent.title, parent.description
    );

    let siblings: Vec<String> = plan
        .subtasks
        .iter()
        .filter(|s| s.id != spec.id)
        .map(|s| format!("- #{} {}", s.id, s.title))
        .collect();
    if !siblings.is_empty() {
        description.push_str("\n\nSibling subtasks handled separately:\n");
        description.push_str(&siblings.join("\n"));
    }

    if let Some(dep) = spec.depends_on() {
        description.push_str(&format!(
            "\n\nThis subtask builds on the output of subtask #{dep}; state any assumptions you make about it."
        ));
    }

    description
}

fn probe_prompt(task: &Task) -> String {
    format!(
        "Decide whether the following task should be decomposed into subtasks.\n\
         Task Title: {}\n\
         Task Description: {}\n\n\
         If it is decomposable, also produce the decomposition: the subtasks, \
         the workers needed to execute them, and the assignments.",
        task.title, task.description
    )
}

fn atomic_prompt(task: &Task) -> String {
    format!(
        "Complete the following task:\n\
         Task Title: {}\n\
         Task Description: {}\n\n\
         If the task requires writing code, please provide the complete, runnable code.\n\
         For non-coding tasks, provide a detailed description or plan to accomplish the task.\n\n\
         Begin your response now:",
        task.title, task.description
    )
}

fn summarize_prompt(task: &Task, aggregated: &str) -> String {
    format!(
        "The following subtask results were produced for the task below.\n\
         Task Title: {}\n\
         Task Description: {}\n\n\
         {}\n\n\
         Synthesize these results into a single coherent deliverable. \
         If the results are code fragments, compile them into one complete program; \
         otherwise produce a unified narrative.",
        task.title, task.description, aggregated
    )
}
