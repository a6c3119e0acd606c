//! Event system for runtime monitoring
//!
//! This module provides an event bus abstraction for monitoring runtime
//! execution. Events include run lifecycle, block lifecycle, and debug
//! session state changes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Events emitted by the runtime for monitoring
///
/// These events provide visibility into run dispatch, per-block execution,
/// and debug sessions.
#[derive(TS, Debug, Clone, Serialize, Deserialize)]
#[ts(tag = "type", content = "data", export)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum RunEvent {
    /// A workflow run started
    ExecutionStarted {
        execution_id: String,
        workflow_id: String,
    },

    /// A workflow run completed normally
    ExecutionCompleted {
        execution_id: String,
        workflow_id: String,
    },

    /// A workflow run was cancelled before completing
    ExecutionCancelled {
        execution_id: String,
        workflow_id: String,
    },

    /// A workflow run aborted because a block failed
    ExecutionFailed {
        execution_id: String,
        workflow_id: String,
        error: String,
    },

    /// Block execution started
    BlockStarted {
        block_id: String,
        execution_id: String,
    },

    /// Block execution finished
    BlockFinished {
        block_id: String,
        execution_id: String,
        success: bool,
    },

    /// Block execution failed
    BlockFailed {
        block_id: String,
        execution_id: String,
        error: String,
    },

    /// Block execution was cancelled
    BlockCancelled {
        block_id: String,
        execution_id: String,
    },

    /// A step-debug session started
    DebugSessionStarted { execution_id: String },

    /// A step-debug session ended
    DebugSessionStopped { execution_id: String },
}

/// Trait for emitting events from the runtime
///
/// Implementations of this trait handle the delivery of runtime events
/// to monitoring systems, logs, or other consumers.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Emit an event to the event bus
    ///
    /// # Errors
    /// Returns an error if the event cannot be emitted
    async fn emit(&self, event: RunEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// No-op event bus for testing or when events are not needed
pub struct NoOpEventBus;

#[async_trait]
impl EventBus for NoOpEventBus {
    async fn emit(&self, _event: RunEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

/// Event bus that collects events in memory
///
/// Useful for testing or scenarios where events need to be collected
/// and inspected programmatically.
#[derive(Default)]
pub struct MemoryEventBus {
    events: std::sync::Arc<std::sync::Mutex<Vec<RunEvent>>>,
}

impl MemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn emit(&self, event: RunEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}
