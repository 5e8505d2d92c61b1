//! Job State Recorder.
//!
//! `JobRecorder` persists stage transitions and log lines. `LogSink` is the
//! narrower interface process-output capture writes into; every recorder is
//! also a sink.

use async_trait::async_trait;

use crate::errors::{JobError, JobResult};

use super::db::DbHandle;
use super::models::JobUpdate;

/// Origin of a captured process line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl LogStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

#[async_trait]
pub trait LogSink: Send + Sync {
    /// Deliver one line of process output. Sink failures are reported by the
    /// sink itself and never abort the producing process.
    async fn emit(&self, job_id: &str, stream: LogStream, line: &str);
}

#[async_trait]
pub trait JobRecorder: LogSink {
    /// Partial update of the job record plus an `updated_at` touch.
    async fn record_transition(&self, job_id: &str, update: JobUpdate) -> JobResult<()>;

    /// Append one timestamped log entry. Empty messages are dropped.
    async fn append_log(&self, job_id: &str, message: &str) -> JobResult<()>;
}

/// Recorder backed by the SQLite job store.
#[derive(Clone)]
pub struct SqliteRecorder {
    db: DbHandle,
}

impl SqliteRecorder {
    pub fn new(db: DbHandle) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LogSink for SqliteRecorder {
    async fn emit(&self, job_id: &str, stream: LogStream, line: &str) {
        tracing::debug!(job_id, stream = stream.as_str(), "{}", line);
        let message = format!("{}: {}", stream.as_str(), line);
        if let Err(e) = self.append_log(job_id, &message).await {
            tracing::warn!(job_id, error = %e, "failed to persist process output");
        }
    }
}

#[async_trait]
impl JobRecorder for SqliteRecorder {
    async fn record_transition(&self, job_id: &str, update: JobUpdate) -> JobResult<()> {
        let id = job_id.to_string();
        let updated = self
            .db
            .call(move |db| db.update_job(&id, &update))
            .await
            .map_err(|e| JobError::Store(format!("{:#}", e)))?;
        if !updated {
            tracing::debug!(job_id, "job record not updated (missing or terminal)");
        }
        Ok(())
    }

    async fn append_log(&self, job_id: &str, message: &str) -> JobResult<()> {
        if message.is_empty() {
            return Ok(());
        }
        let id = job_id.to_string();
        let message = message.to_string();
        self.db
            .call(move |db| db.append_log(&id, &message))
            .await
            .map_err(|e| JobError::Store(format!("{:#}", e)))
    }
}
