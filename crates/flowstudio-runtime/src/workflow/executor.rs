//! The executor actor owning workflow runs
//!
//! [`ExecutorHandle`] is the opaque handle the execution store holds while a
//! session is live. The actor tracks in-flight runs and owns the per-run
//! cancel channels; actual block dispatch happens in a spawned
//! [`serial_dispatch`](super::serial_dispatch) task per run.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::debug;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::events::EventBus;
use crate::execution::ExecutionStore;

use super::event::{WorkflowCommand, WorkflowEvent};
use super::serial::serial_dispatch;

/// Errors surfaced by the executor handle
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Failed to send command to executor actor")]
    ActorSendError,
}

/// A request to run one workflow
#[derive(TypedBuilder, Debug, Clone)]
pub struct RunRequest {
    /// Workflow being run
    pub workflow_id: String,
    /// Blocks in scheduling order
    pub blocks: Vec<String>,
    /// Unique id for this run, distinct from the workflow id
    #[builder(default = Uuid::new_v4().to_string())]
    pub execution_id: String,
    /// Whether the run starts in step-debug mode
    #[builder(default)]
    pub debug: bool,
}

pub enum ExecutorMessage {
    RunWorkflow { request: RunRequest },
    StopWorkflow { execution_id: String },
}

/// Cloneable handle to the executor actor
#[derive(Clone)]
pub struct ExecutorHandle {
    pub sender: mpsc::Sender<ExecutorMessage>,
}

impl ExecutorHandle {
    pub fn new(
        store: ExecutionStore,
        event_sender: broadcast::Sender<WorkflowEvent>,
        cmd_sender: mpsc::Sender<WorkflowCommand>,
        event_bus: Option<Arc<dyn EventBus>>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(8);
        let mut actor = Executor::new(receiver, store, event_sender, cmd_sender, event_bus);

        tokio::spawn(async move { actor.run().await });

        Self { sender }
    }

    pub async fn run_workflow(&self, request: RunRequest) -> Result<(), ExecutorError> {
        self.sender
            .send(ExecutorMessage::RunWorkflow { request })
            .await
            .map_err(|_| ExecutorError::ActorSendError)
    }

    pub async fn stop_workflow(
        &self,
        execution_id: impl Into<String>,
    ) -> Result<(), ExecutorError> {
        self.sender
            .send(ExecutorMessage::StopWorkflow {
                execution_id: execution_id.into(),
            })
            .await
            .map_err(|_| ExecutorError::ActorSendError)
    }
}

struct RunData {
    // The channel used to cancel this run's dispatch task
    cancel_channel: oneshot::Sender<()>,
}

pub struct Executor {
    receiver: mpsc::Receiver<ExecutorMessage>,

    store: ExecutionStore,
    runs: HashMap<String, RunData>,

    event_sender: broadcast::Sender<WorkflowEvent>,
    cmd_sender: mpsc::Sender<WorkflowCommand>,
    event_bus: Option<Arc<dyn EventBus>>,
}

impl Executor {
    pub fn new(
        receiver: mpsc::Receiver<ExecutorMessage>,
        store: ExecutionStore,
        event_sender: broadcast::Sender<WorkflowEvent>,
        cmd_sender: mpsc::Sender<WorkflowCommand>,
        event_bus: Option<Arc<dyn EventBus>>,
    ) -> Self {
        Self {
            receiver,
            store,
            runs: HashMap::new(),
            event_sender,
            cmd_sender,
            event_bus,
        }
    }

    pub async fn run(&mut self) {
        while let Some(message) = self.receiver.recv().await {
            match message {
                ExecutorMessage::RunWorkflow { request } => self.start_run(request),
                ExecutorMessage::StopWorkflow { execution_id } => self.stop_run(&execution_id),
            }
        }
    }

    fn start_run(&mut self, request: RunRequest) {
        if let Some(run) = self.runs.get(&request.execution_id) {
            // An open cancel channel means the dispatch task is still alive
            if !run.cancel_channel.is_closed() {
                debug!(
                    execution_id = %request.execution_id,
                    "execution already running, skipping"
                );
                return;
            }
        }

        let (cancel_channel, cancel_receiver) = oneshot::channel();

        // A new run resets the per-run cancellation flag; the durable
        // cancelled-id set is left alone.
        self.store.set_is_cancellation_requested(false);
        self.store.set_is_executing(true);
        self.store.set_is_debugging(request.debug);
        self.store.set_pending_blocks(request.blocks.clone());

        let execution_id = request.execution_id.clone();
        let store = self.store.clone();
        let event_bus = self.event_bus.clone();
        let send_command = self.cmd_sender.clone();
        let recv_event = self.event_sender.subscribe();
        let event_sender = self.event_sender.clone();

        debug!(execution_id = %execution_id, workflow_id = %request.workflow_id, "starting run");

        tokio::spawn(async move {
            serial_dispatch(
                request,
                store,
                event_bus,
                cancel_receiver,
                send_command,
                recv_event,
                event_sender,
            )
            .await;
        });

        self.runs.insert(execution_id, RunData { cancel_channel });
    }

    fn stop_run(&mut self, execution_id: &str) {
        let Some(run) = self.runs.remove(execution_id) else {
            debug!(execution_id, "execution not found, skipping stop");
            return;
        };

        // Record the id before signalling, so a log write racing the stop is
        // already suppressed by the time the dispatch task winds down.
        self.store.add_cancelled_execution_id(execution_id);

        if run.cancel_channel.send(()).is_err() {
            debug!(execution_id, "dispatch task already finished");
        }
    }
}
