//! Workflow execution and coordination
//!
//! This module provides workflow execution capabilities including:
//! - Graph payload types supplied by the workflow registry
//! - Serial dispatch of blocks in scheduling order
//! - Cooperative cancellation between dispatch boundaries
//! - Workflow event broadcasting

mod event;
mod executor;
mod graph;
mod serial;

pub use event::{WorkflowCommand, WorkflowEvent};
pub use executor::{ExecutorError, ExecutorHandle, ExecutorMessage, RunRequest};
pub use graph::{BlockDefinition, Edge, LoopDefinition, WorkflowGraph};
pub use serial::serial_dispatch;
