//! Execution coordination state for workflow runs
//!
//! This module provides the shared state used to coordinate a running
//! workflow: which blocks are currently executing, the pending dispatch
//! queue, the cooperative cancellation signals, and handles to the active
//! executor and debug session.
//!
//! Key types:
//! - [`ExecutionStore`]: Cloneable handle to the per-session execution state
//! - [`DebugContext`]: Snapshot of step-debugging state for the active session
//! - [`ExecutionSnapshot`]: Serializable read-only view for the client UI
//!
//! Cancellation uses two signals with different lifetimes. The
//! `is_cancellation_requested` flag is a coarse per-run signal the executor
//! polls between dispatch boundaries; it is reset when the next run starts.
//! The cancelled-execution-id set is durable across runs, so log writes that
//! race with run completion can still check whether *their* execution was
//! cancelled after the flag has flipped back for a newer run.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::workflow::ExecutorHandle;

/// Snapshot of step-debugging state for an active debug session
///
/// Captures the block the debugger is currently stepped on and the variable
/// values visible at that point. Installed by the executor when a run starts
/// in debug mode and read by the step-debugging UI.
#[derive(TS, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DebugContext {
    /// Execution id of the run being debugged
    pub execution_id: String,
    /// Block the debugger is currently stepped on, if any
    pub current_block_id: Option<String>,
    /// Variable values visible at the current step
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
}

impl DebugContext {
    pub fn new(execution_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            current_block_id: None,
            variables: HashMap::new(),
        }
    }
}

/// Serializable view of the execution state for the client UI
///
/// Opaque handles are reduced to presence flags; everything else mirrors the
/// store fields directly.
#[derive(TS, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSnapshot {
    pub active_block_ids: HashSet<String>,
    pub is_executing: bool,
    pub is_debugging: bool,
    pub is_cancellation_requested: bool,
    pub pending_blocks: Vec<String>,
    pub has_executor: bool,
    pub debug_context: Option<DebugContext>,
}

#[derive(Default)]
struct ExecutionState {
    active_block_ids: HashSet<String>,
    is_executing: bool,
    is_debugging: bool,
    is_cancellation_requested: bool,
    pending_blocks: Vec<String>,
    executor: Option<ExecutorHandle>,
    debug_context: Option<DebugContext>,
    cancelled_execution_ids: HashSet<String>,
}

/// Shared execution state for one client session
///
/// One instance exists per running session and is injected into every
/// subsystem that coordinates a run (the executor, the execution log, the
/// UI layer). The store is a blackboard: every mutation is a synchronous
/// last-write-wins replacement and the store enforces no pairing between
/// fields. The executor is the one writer expected to keep
/// `executor`/`is_executing` and `debug_context`/`is_debugging` coherent.
#[derive(Clone, Default)]
pub struct ExecutionStore {
    inner: Arc<RwLock<ExecutionState>>,
}

impl std::fmt::Debug for ExecutionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.read().unwrap();
        f.debug_struct("ExecutionStore")
            .field("active_block_ids", &state.active_block_ids)
            .field("is_executing", &state.is_executing)
            .field("is_debugging", &state.is_debugging)
            .field(
                "is_cancellation_requested",
                &state.is_cancellation_requested,
            )
            .field("pending_blocks", &state.pending_blocks)
            .finish()
    }
}

impl ExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the set of actively executing blocks wholesale
    pub fn set_active_blocks(&self, block_ids: impl IntoIterator<Item = String>) {
        self.inner.write().unwrap().active_block_ids = block_ids.into_iter().collect();
    }

    pub fn active_block_ids(&self) -> HashSet<String> {
        self.inner.read().unwrap().active_block_ids.clone()
    }

    pub fn set_is_executing(&self, is_executing: bool) {
        self.inner.write().unwrap().is_executing = is_executing;
    }

    pub fn is_executing(&self) -> bool {
        self.inner.read().unwrap().is_executing
    }

    pub fn set_is_debugging(&self, is_debugging: bool) {
        self.inner.write().unwrap().is_debugging = is_debugging;
    }

    pub fn is_debugging(&self) -> bool {
        self.inner.read().unwrap().is_debugging
    }

    /// Set the cooperative cancellation flag for the current run
    ///
    /// Once true, the executor must stop dispatching new block work and log
    /// persistence for the current execution must be suppressed. The flag is
    /// only meaningful while a run is in progress; the next run resets it.
    pub fn set_is_cancellation_requested(&self, is_cancellation_requested: bool) {
        self.inner.write().unwrap().is_cancellation_requested = is_cancellation_requested;
    }

    pub fn is_cancellation_requested(&self) -> bool {
        self.inner.read().unwrap().is_cancellation_requested
    }

    /// Replace the pending-block queue wholesale; order is scheduling order
    pub fn set_pending_blocks(&self, block_ids: Vec<String>) {
        self.inner.write().unwrap().pending_blocks = block_ids;
    }

    pub fn pending_blocks(&self) -> Vec<String> {
        self.inner.read().unwrap().pending_blocks.clone()
    }

    /// Install or clear the active executor handle
    ///
    /// Clearing the handle while a run is in progress is legal but leaves
    /// `is_executing` stale; the caller must clear that too.
    pub fn set_executor(&self, executor: Option<ExecutorHandle>) {
        self.inner.write().unwrap().executor = executor;
    }

    pub fn executor(&self) -> Option<ExecutorHandle> {
        self.inner.read().unwrap().executor.clone()
    }

    pub fn set_debug_context(&self, debug_context: Option<DebugContext>) {
        self.inner.write().unwrap().debug_context = debug_context;
    }

    pub fn debug_context(&self) -> Option<DebugContext> {
        self.inner.read().unwrap().debug_context.clone()
    }

    /// Record an execution id as cancelled
    ///
    /// The record survives the cancellation flag being reset by the next run.
    /// Inserting the same id twice is a no-op.
    pub fn add_cancelled_execution_id(&self, execution_id: impl Into<String>) {
        self.inner
            .write()
            .unwrap()
            .cancelled_execution_ids
            .insert(execution_id.into());
    }

    /// Whether a specific execution was cancelled
    ///
    /// This is the authoritative check at the moment of log emission:
    /// membership here is independent of the current value of
    /// `is_cancellation_requested`, which a newer run may already have reset.
    pub fn is_execution_cancelled(&self, execution_id: &str) -> bool {
        self.inner
            .read()
            .unwrap()
            .cancelled_execution_ids
            .contains(execution_id)
    }

    pub fn cancelled_execution_ids(&self) -> HashSet<String> {
        self.inner.read().unwrap().cancelled_execution_ids.clone()
    }

    /// Restore every field to its initial value
    ///
    /// Cancellation history is discarded along with everything else.
    /// Typically invoked when a new session starts or the UI unmounts.
    pub fn reset(&self) {
        *self.inner.write().unwrap() = ExecutionState::default();
    }

    /// Read-only view of the current state for the client UI
    pub fn snapshot(&self) -> ExecutionSnapshot {
        let state = self.inner.read().unwrap();
        ExecutionSnapshot {
            active_block_ids: state.active_block_ids.clone(),
            is_executing: state.is_executing,
            is_debugging: state.is_debugging,
            is_cancellation_requested: state.is_cancellation_requested,
            pending_blocks: state.pending_blocks.clone(),
            has_executor: state.executor.is_some(),
            debug_context: state.debug_context.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    use super::*;
    use crate::workflow::ExecutorHandle;

    fn detached_executor() -> ExecutorHandle {
        let (sender, _receiver) = mpsc::channel(1);
        ExecutorHandle { sender }
    }

    fn initial_snapshot() -> ExecutionSnapshot {
        ExecutionSnapshot {
            active_block_ids: HashSet::new(),
            is_executing: false,
            is_debugging: false,
            is_cancellation_requested: false,
            pending_blocks: Vec::new(),
            has_executor: false,
            debug_context: None,
        }
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let store = ExecutionStore::new();

        store.set_active_blocks(["b1".to_string(), "b2".to_string()]);
        store.set_is_executing(true);
        store.set_is_debugging(true);
        store.set_is_cancellation_requested(true);
        store.set_pending_blocks(vec!["b3".to_string()]);
        store.set_executor(Some(detached_executor()));
        store.set_debug_context(Some(DebugContext::new("exec-1")));
        store.add_cancelled_execution_id("exec-1");

        store.reset();

        assert_eq!(store.snapshot(), initial_snapshot());
        assert!(store.executor().is_none());
        assert!(store.cancelled_execution_ids().is_empty());
    }

    #[test]
    fn test_set_active_blocks_replaces_wholesale() {
        let store = ExecutionStore::new();

        store.set_active_blocks(["b1".to_string(), "b2".to_string()]);
        store.set_active_blocks(["b3".to_string()]);

        let expected: HashSet<String> = ["b3".to_string()].into_iter().collect();
        assert_eq!(store.active_block_ids(), expected);
    }

    #[test]
    fn test_set_pending_blocks_replaces_wholesale() {
        let store = ExecutionStore::new();

        store.set_pending_blocks(vec![
            "b1".to_string(),
            "b2".to_string(),
            "b3".to_string(),
        ]);
        store.set_pending_blocks(vec![]);

        assert!(store.pending_blocks().is_empty());
    }

    #[test]
    fn test_add_cancelled_execution_id_is_idempotent() {
        let store = ExecutionStore::new();

        store.add_cancelled_execution_id("exec-1");
        store.add_cancelled_execution_id("exec-1");

        assert_eq!(store.cancelled_execution_ids().len(), 1);
        assert!(store.is_execution_cancelled("exec-1"));
    }

    #[test]
    fn test_cancelled_ids_survive_flag_reset() {
        let store = ExecutionStore::new();

        // Run A starts and is cancelled
        store.set_is_executing(true);
        store.set_is_cancellation_requested(true);
        store.add_cancelled_execution_id("exec-a");

        // Run B starts, resetting the flag
        store.set_is_cancellation_requested(false);
        store.set_is_executing(true);

        assert!(store.is_execution_cancelled("exec-a"));
        assert!(!store.is_cancellation_requested());
    }

    #[test]
    fn test_is_execution_cancelled_is_pure_membership() {
        let store = ExecutionStore::new();

        assert!(!store.is_execution_cancelled("exec-1"));

        store.set_is_cancellation_requested(true);
        assert!(!store.is_execution_cancelled("exec-1"));

        store.add_cancelled_execution_id("exec-1");
        store.set_is_cancellation_requested(false);
        assert!(store.is_execution_cancelled("exec-1"));
    }

    #[test]
    fn test_reset_clears_executor() {
        let store = ExecutionStore::new();

        store.set_executor(Some(detached_executor()));
        assert!(store.executor().is_some());

        store.reset();
        assert!(store.executor().is_none());
    }

    #[test]
    fn test_snapshot_reflects_debug_context() {
        let store = ExecutionStore::new();

        let mut ctx = DebugContext::new("exec-1");
        ctx.current_block_id = Some("b1".to_string());
        ctx.variables
            .insert("count".to_string(), serde_json::json!(3));
        store.set_is_debugging(true);
        store.set_debug_context(Some(ctx.clone()));

        let snapshot = store.snapshot();
        assert!(snapshot.is_debugging);
        assert_eq!(snapshot.debug_context, Some(ctx));
    }
}
