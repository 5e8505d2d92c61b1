//! Persistent job state: the job record, its append-only log, and the
//! recorder the pipeline writes through.

pub mod db;
pub mod models;
pub mod recorder;

pub use db::{DbHandle, JobDb, MAX_LOG_PAGE};
pub use models::{
    JobLogEntry, JobProgress, JobRecord, JobStatus, JobStep, JobUpdate, SiteResult, TokenUsage,
    WorkItem,
};
pub use recorder::{JobRecorder, LogSink, LogStream, SqliteRecorder};
