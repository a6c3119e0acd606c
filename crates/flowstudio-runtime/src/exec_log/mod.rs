//! Execution log persistence
//!
//! Stores a log of block executions in a SQLite database, one row per
//! completed block run. Every write consults the session's
//! [`ExecutionStore`] at the moment of emission and drops entries belonging
//! to a cancelled execution. The per-run cancellation flag is no use here: a
//! slow write can arrive after a newer run has already reset it, so the
//! durable cancelled-id set is the authoritative check.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use eyre::Result;
use serde::{Deserialize, Serialize};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    Row, SqlitePool,
};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use ts_rs::TS;

use crate::execution::ExecutionStore;

/// One persisted block execution
#[derive(TS, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ExecLogEntry {
    pub id: i64,
    pub execution_id: String,
    pub block_id: String,
    /// Unix timestamp in milliseconds
    pub started_at: i64,
    /// Unix timestamp in milliseconds
    pub finished_at: i64,
    pub output: String,
}

pub enum ExecLogMessage {
    LogExecution {
        execution_id: String,
        block_id: String,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        output: String,
        reply_to: oneshot::Sender<Result<bool>>,
    },
    EntriesForExecution {
        execution_id: String,
        reply_to: oneshot::Sender<Result<Vec<ExecLogEntry>>>,
    },
    LastExecutionTime {
        block_id: String,
        reply_to: oneshot::Sender<Result<Option<DateTime<Utc>>>>,
    },
}

/// Cloneable handle to the execution log actor
#[derive(Clone)]
pub struct ExecLogHandle {
    sender: mpsc::Sender<ExecLogMessage>,
}

impl ExecLogHandle {
    /// Open (or create) the log database and spawn the log actor
    pub async fn new(path: PathBuf, store: ExecutionStore) -> Result<Self> {
        let (sender, receiver) = mpsc::channel(8);
        let mut actor = ExecLog::new(path, receiver, store).await?;

        tokio::spawn(async move { actor.run().await });

        Ok(Self { sender })
    }

    /// Persist one block execution
    ///
    /// Returns false when the entry was dropped because its execution had
    /// been cancelled.
    pub async fn log_execution(
        &self,
        execution_id: impl Into<String>,
        block_id: impl Into<String>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        output: impl Into<String>,
    ) -> Result<bool> {
        let (reply_to, receiver) = oneshot::channel();
        let msg = ExecLogMessage::LogExecution {
            execution_id: execution_id.into(),
            block_id: block_id.into(),
            started_at,
            finished_at,
            output: output.into(),
            reply_to,
        };

        self.sender.send(msg).await?;
        receiver.await?
    }

    /// All entries persisted for one execution, oldest first
    pub async fn entries_for_execution(
        &self,
        execution_id: impl Into<String>,
    ) -> Result<Vec<ExecLogEntry>> {
        let (reply_to, receiver) = oneshot::channel();
        let msg = ExecLogMessage::EntriesForExecution {
            execution_id: execution_id.into(),
            reply_to,
        };

        self.sender.send(msg).await?;
        receiver.await?
    }

    /// When a block last finished executing, across all runs
    pub async fn last_execution_time(
        &self,
        block_id: impl Into<String>,
    ) -> Result<Option<DateTime<Utc>>> {
        let (reply_to, receiver) = oneshot::channel();
        let msg = ExecLogMessage::LastExecutionTime {
            block_id: block_id.into(),
            reply_to,
        };

        self.sender.send(msg).await?;
        receiver.await?
    }
}

pub struct ExecLog {
    pool: SqlitePool,
    receiver: mpsc::Receiver<ExecLogMessage>,
    store: ExecutionStore,
}

impl ExecLog {
    async fn new(
        path: PathBuf,
        receiver: mpsc::Receiver<ExecLogMessage>,
        store: ExecutionStore,
    ) -> Result<Self> {
        debug!("opening exec log database at {path:?}");

        if !path.exists() {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)?;
            }
        }

        let opts = SqliteConnectOptions::new()
            .filename(&path)
            .journal_mode(SqliteJournalMode::Wal)
            .optimize_on_close(true, None)
            .synchronous(SqliteSynchronous::Normal)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .acquire_timeout(Duration::from_secs_f64(3.0))
            .connect_with(opts)
            .await?;

        Self::setup_db(&pool).await?;

        Ok(Self {
            pool,
            receiver,
            store,
        })
    }

    async fn setup_db(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS exec_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                execution_id TEXT NOT NULL,
                block_id TEXT NOT NULL,
                started_at INTEGER NOT NULL,
                finished_at INTEGER NOT NULL,
                output TEXT NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_exec_log_execution ON exec_log(execution_id)",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    async fn run(&mut self) {
        while let Some(msg) = self.receiver.recv().await {
            match msg {
                ExecLogMessage::LogExecution {
                    execution_id,
                    block_id,
                    started_at,
                    finished_at,
                    output,
                    reply_to,
                } => {
                    let result = self
                        .log_execution(&execution_id, &block_id, started_at, finished_at, &output)
                        .await;
                    let _ = reply_to.send(result);
                }
                ExecLogMessage::EntriesForExecution {
                    execution_id,
                    reply_to,
                } => {
                    let result = self.entries_for_execution(&execution_id).await;
                    let _ = reply_to.send(result);
                }
                ExecLogMessage::LastExecutionTime { block_id, reply_to } => {
                    let result = self.last_execution_time(&block_id).await;
                    let _ = reply_to.send(result);
                }
            }
        }
    }

    async fn log_execution(
        &self,
        execution_id: &str,
        block_id: &str,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        output: &str,
    ) -> Result<bool> {
        if self.store.is_execution_cancelled(execution_id) {
            debug!(execution_id, block_id, "dropping log entry for cancelled execution");
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO exec_log (execution_id, block_id, started_at, finished_at, output)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(execution_id)
        .bind(block_id)
        .bind(started_at.timestamp_millis())
        .bind(finished_at.timestamp_millis())
        .bind(output)
        .execute(&self.pool)
        .await?;

        Ok(true)
    }

    async fn entries_for_execution(&self, execution_id: &str) -> Result<Vec<ExecLogEntry>> {
        let rows = sqlx::query(
            "SELECT id, execution_id, block_id, started_at, finished_at, output
             FROM exec_log WHERE execution_id = ? ORDER BY id",
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(ExecLogEntry {
                id: row.try_get("id")?,
                execution_id: row.try_get("execution_id")?,
                block_id: row.try_get("block_id")?,
                started_at: row.try_get("started_at")?,
                finished_at: row.try_get("finished_at")?,
                output: row.try_get("output")?,
            });
        }

        Ok(entries)
    }

    async fn last_execution_time(&self, block_id: &str) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query("SELECT MAX(finished_at) AS finished_at FROM exec_log WHERE block_id = ?")
            .bind(block_id)
            .fetch_one(&self.pool)
            .await?;

        let millis: Option<i64> = row.try_get("finished_at")?;
        Ok(millis.and_then(DateTime::from_timestamp_millis))
    }
}
