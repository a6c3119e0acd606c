use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Commands sent from the dispatch loop to whatever runs blocks
#[derive(TS, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[ts(export)]
#[serde(tag = "type")]
#[serde(rename_all = "camelCase")]
pub enum WorkflowCommand {
    RunBlock { id: String },
    StopBlock { id: String },
}

/// Events exchanged between block runtimes and the dispatch loop
#[derive(TS, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[ts(export)]
#[serde(tag = "type")]
#[serde(rename_all = "camelCase")]
pub enum WorkflowEvent {
    BlockStarted { id: String },
    BlockFinished { id: String },
    BlockFailed { id: String, error: String },

    WorkflowStarted { execution_id: String },
    WorkflowFinished { execution_id: String },
    WorkflowFailed { execution_id: String, error: String },
    WorkflowCancelled { execution_id: String },
}
