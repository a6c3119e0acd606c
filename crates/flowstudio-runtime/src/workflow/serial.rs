//! Serial block dispatch for one workflow run

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

use crate::events::{EventBus, RunEvent};
use crate::execution::{DebugContext, ExecutionStore};

use super::event::{WorkflowCommand, WorkflowEvent};
use super::executor::RunRequest;

enum RunOutcome {
    Finished,
    Cancelled,
    Failed(String),
}

async fn emit(bus: &Option<Arc<dyn EventBus>>, event: RunEvent) {
    if let Some(bus) = bus {
        let _ = bus.emit(event).await;
    }
}

/// Dispatch the blocks of one run in order, one at a time.
///
/// 1. Kick off the first block in the queue
/// 2. When its finish event arrives, kick off the next block
/// 3. Repeat until the queue is drained
/// 4. Between every dispatch boundary, check the cancellation signals; on
///    cancellation stop dispatching, tell the in-flight block to stop, and
///    record the cancelled execution id
///
/// Cancellation is cooperative: an in-flight block is asked to stop, never
/// killed, and its late results are suppressed at the log layer rather than
/// prevented.
#[allow(clippy::too_many_arguments)]
pub async fn serial_dispatch(
    request: RunRequest,
    store: ExecutionStore,
    event_bus: Option<Arc<dyn EventBus>>,
    cancel_channel: oneshot::Receiver<()>,
    send_command: mpsc::Sender<WorkflowCommand>,
    mut recv_event: broadcast::Receiver<WorkflowEvent>,
    event_sender: broadcast::Sender<WorkflowEvent>,
) {
    let execution_id = request.execution_id.clone();
    let blocks = request.blocks.clone();

    let _ = event_sender.send(WorkflowEvent::WorkflowStarted {
        execution_id: execution_id.clone(),
    });
    emit(
        &event_bus,
        RunEvent::ExecutionStarted {
            execution_id: execution_id.clone(),
            workflow_id: request.workflow_id.clone(),
        },
    )
    .await;

    if request.debug {
        store.set_debug_context(Some(DebugContext::new(&execution_id)));
        emit(
            &event_bus,
            RunEvent::DebugSessionStarted {
                execution_id: execution_id.clone(),
            },
        )
        .await;
    }

    let mut cancel_fut = cancel_channel;
    let mut next_index = 0;
    let mut active: Option<String> = None;

    let outcome = loop {
        if active.is_none() {
            // Dispatch boundary: poll both cancellation signals before
            // starting any new work
            if store.is_cancellation_requested() || store.is_execution_cancelled(&execution_id) {
                break RunOutcome::Cancelled;
            }

            let Some(block_id) = blocks.get(next_index) else {
                break RunOutcome::Finished;
            };
            next_index += 1;

            store.set_active_blocks([block_id.clone()]);
            store.set_pending_blocks(blocks[next_index..].to_vec());
            if request.debug {
                let mut ctx = store
                    .debug_context()
                    .unwrap_or_else(|| DebugContext::new(&execution_id));
                ctx.current_block_id = Some(block_id.clone());
                store.set_debug_context(Some(ctx));
            }

            debug!(execution_id = %execution_id, block_id = %block_id, "dispatching block");
            if send_command
                .send(WorkflowCommand::RunBlock {
                    id: block_id.clone(),
                })
                .await
                .is_err()
            {
                warn!("block command channel closed, aborting dispatch");
                break RunOutcome::Failed("block command channel closed".to_string());
            }
            emit(
                &event_bus,
                RunEvent::BlockStarted {
                    block_id: block_id.clone(),
                    execution_id: execution_id.clone(),
                },
            )
            .await;
            active = Some(block_id.clone());
            continue;
        }

        tokio::select! {
            // An Err means the executor actor went away; treat it the same
            // as an explicit cancel
            _ = &mut cancel_fut => {
                break RunOutcome::Cancelled;
            }

            event = recv_event.recv() => {
                match event {
                    Ok(WorkflowEvent::BlockFinished { id }) if Some(&id) == active.as_ref() => {
                        emit(
                            &event_bus,
                            RunEvent::BlockFinished {
                                block_id: id,
                                execution_id: execution_id.clone(),
                                success: true,
                            },
                        )
                        .await;
                        active = None;
                    }
                    Ok(WorkflowEvent::BlockFailed { id, error }) if Some(&id) == active.as_ref() => {
                        emit(
                            &event_bus,
                            RunEvent::BlockFailed {
                                block_id: id,
                                execution_id: execution_id.clone(),
                                error: error.clone(),
                            },
                        )
                        .await;
                        break RunOutcome::Failed(error);
                    }

                    // Events for other blocks or other runs
                    Ok(_) => {}

                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "workflow event stream lagged");
                    }
                    Err(RecvError::Closed) => {
                        break RunOutcome::Failed("workflow event channel closed".to_string());
                    }
                }
            }
        }
    };

    if let RunOutcome::Cancelled = outcome {
        store.add_cancelled_execution_id(&execution_id);

        if let Some(block_id) = active.take() {
            let _ = send_command
                .send(WorkflowCommand::StopBlock {
                    id: block_id.clone(),
                })
                .await;
            emit(
                &event_bus,
                RunEvent::BlockCancelled {
                    block_id,
                    execution_id: execution_id.clone(),
                },
            )
            .await;
        }
    }

    // Clear run state; the executor handle and the durable cancellation
    // history stay as they are
    store.set_active_blocks(Vec::new());
    store.set_pending_blocks(Vec::new());
    store.set_is_executing(false);
    if request.debug {
        store.set_is_debugging(false);
        store.set_debug_context(None);
        emit(
            &event_bus,
            RunEvent::DebugSessionStopped {
                execution_id: execution_id.clone(),
            },
        )
        .await;
    }

    match outcome {
        RunOutcome::Finished => {
            let _ = event_sender.send(WorkflowEvent::WorkflowFinished {
                execution_id: execution_id.clone(),
            });
            emit(
                &event_bus,
                RunEvent::ExecutionCompleted {
                    execution_id,
                    workflow_id: request.workflow_id,
                },
            )
            .await;
        }
        RunOutcome::Cancelled => {
            let _ = event_sender.send(WorkflowEvent::WorkflowCancelled {
                execution_id: execution_id.clone(),
            });
            emit(
                &event_bus,
                RunEvent::ExecutionCancelled {
                    execution_id,
                    workflow_id: request.workflow_id,
                },
            )
            .await;
        }
        RunOutcome::Failed(error) => {
            let _ = event_sender.send(WorkflowEvent::WorkflowFailed {
                execution_id: execution_id.clone(),
                error: error.clone(),
            });
            emit(
                &event_bus,
                RunEvent::ExecutionFailed {
                    execution_id,
                    workflow_id: request.workflow_id,
                    error,
                },
            )
            .await;
        }
    }
}
