//! Runtime library for Flowstudio
//!
//! This crate provides the client-side execution runtime for the Flowstudio
//! workflow builder. It includes:
//!
//! - Execution coordination state shared between the executor, the execution
//!   log, and the UI layer
//! - Workflow graph payload types supplied by the workflow registry
//! - A cooperative serial executor for dispatching block runs
//! - Execution log persistence with cancellation-aware suppression
//! - Event emission for monitoring execution state
//!
//! # Example
//!
//! The typical flow for using this crate involves:
//! 1. Creating an [`execution::ExecutionStore`] for the session
//! 2. Starting a [`workflow::ExecutorHandle`] and installing it in the store
//! 3. Submitting a [`workflow::RunRequest`] and reacting to
//!    [`workflow::WorkflowEvent`]s
//! 4. Reading execution state back through [`execution::ExecutionStore::snapshot`]

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber for standalone logging to the terminal.
///
/// This sets up tracing to output directly to stderr with the log level
/// controlled by the `RUST_LOG` environment variable.
///
/// Use this for standalone applications or CLI tools that don't have an
/// existing logging setup. Applications with their own logging stack can skip
/// this; the `log` feature on `tracing` forwards events to the `log` facade
/// when no subscriber is installed.
///
/// # Examples
///
/// ```ignore
/// // Set RUST_LOG=debug before running to see debug logs
/// // Set RUST_LOG=flowstudio_runtime=trace for trace-level logs in this crate
/// flowstudio_runtime::init_tracing();
/// ```
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

pub mod events;
pub mod exec_log;
pub mod execution;
pub mod workflow;
