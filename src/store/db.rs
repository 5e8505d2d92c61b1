use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

use super::models::*;

/// Largest page of log entries a single query returns.
pub const MAX_LOG_PAGE: usize = 500;

const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

/// Async-safe handle to the job database.
///
/// Wraps `JobDb` behind `Arc<Mutex>` and runs all access on tokio's blocking
/// thread pool via `spawn_blocking`, so synchronous SQLite I/O never ties up
/// async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<JobDb>>,
}

impl DbHandle {
    pub fn new(db: JobDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&JobDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

pub struct JobDb {
    conn: Connection,
}

impl JobDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .busy_timeout(std::time::Duration::from_secs(5))
            .context("Failed to configure SQLite busy timeout")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS jobs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    job_id TEXT UNIQUE NOT NULL,
                    owner_id TEXT,
                    client_id TEXT NOT NULL,
                    prompt TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'queued',
                    progress_step TEXT,
                    result TEXT,
                    error TEXT,
                    tokens_prompt INTEGER,
                    tokens_completion INTEGER,
                    tokens_total INTEGER,
                    model TEXT,
                    claimed_at TEXT,
                    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                );

                CREATE TABLE IF NOT EXISTS job_logs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    job_id TEXT NOT NULL,
                    message TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                );

                CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status, claimed_at);
                CREATE INDEX IF NOT EXISTS idx_jobs_owner ON jobs(owner_id);
                CREATE INDEX IF NOT EXISTS idx_job_logs_job ON job_logs(job_id, created_at);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Jobs ──────────────────────────────────────────────────────────

    pub fn insert_job(
        &self,
        job_id: &str,
        owner_id: Option<&str>,
        client_id: &str,
        prompt: &str,
    ) -> Result<JobRecord> {
        self.conn
            .execute(
                "INSERT INTO jobs (job_id, owner_id, client_id, prompt, status) VALUES (?1, ?2, ?3, ?4, 'queued')",
                params![job_id, owner_id, client_id, prompt],
            )
            .context("Failed to insert job")?;
        self.get_job(job_id)?.context("Job not found after insert")
    }

    pub fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT job_id, owner_id, client_id, prompt, status, progress_step, result, error,
                        tokens_prompt, tokens_completion, tokens_total, model, created_at, updated_at
                 FROM jobs WHERE job_id = ?1",
            )
            .context("Failed to prepare get_job")?;
        let row = stmt
            .query_row(params![job_id], |row| {
                Ok(JobRow {
                    job_id: row.get(0)?,
                    owner_id: row.get(1)?,
                    client_id: row.get(2)?,
                    prompt: row.get(3)?,
                    status: row.get(4)?,
                    progress_step: row.get(5)?,
                    result: row.get(6)?,
                    error: row.get(7)?,
                    tokens_prompt: row.get(8)?,
                    tokens_completion: row.get(9)?,
                    tokens_total: row.get(10)?,
                    model: row.get(11)?,
                    created_at: row.get(12)?,
                    updated_at: row.get(13)?,
                })
            })
            .optional()
            .context("Failed to query job")?;
        match row {
            Some(r) => Ok(Some(r.into_record()?)),
            None => Ok(None),
        }
    }

    /// Write only the supplied fields and touch `updated_at`.
    ///
    /// Rows already in `completed` or `failed` are never modified. Returns
    /// whether a row was updated.
    pub fn update_job(&self, job_id: &str, update: &JobUpdate) -> Result<bool> {
        if update.is_empty() {
            return Ok(false);
        }

        let mut sets: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(status) = update.status {
            sets.push("status = ?".into());
            values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(step) = update.step {
            sets.push("progress_step = ?".into());
            values.push(Value::Text(step.as_str().to_string()));
        }
        if let Some(result) = &update.result {
            sets.push("result = ?".into());
            values.push(Value::Text(
                serde_json::to_string(result).context("Failed to encode job result")?,
            ));
        }
        if let Some(error) = &update.error {
            sets.push("error = ?".into());
            values.push(match error {
                Some(message) => Value::Text(message.clone()),
                None => Value::Null,
            });
        }
        if let Some(tokens) = update.tokens {
            sets.push("tokens_prompt = ?".into());
            values.push(Value::Integer(tokens.prompt as i64));
            sets.push("tokens_completion = ?".into());
            values.push(Value::Integer(tokens.completion as i64));
            sets.push("tokens_total = ?".into());
            values.push(Value::Integer(tokens.total as i64));
        }
        if let Some(model) = &update.model {
            sets.push("model = ?".into());
            values.push(Value::Text(model.clone()));
        }
        sets.push(format!("updated_at = {}", NOW));
        values.push(Value::Text(job_id.to_string()));

        let sql = format!(
            "UPDATE jobs SET {} WHERE job_id = ? AND status NOT IN ('completed', 'failed')",
            sets.join(", ")
        );
        let count = self
            .conn
            .execute(&sql, params_from_iter(values.iter()))
            .context("Failed to update job")?;
        Ok(count > 0)
    }

    /// Claim the oldest unclaimed queued job. Returns `None` when the queue
    /// is empty.
    pub fn claim_next_queued(&self) -> Result<Option<(String, WorkItem)>> {
        let sql = format!(
            "UPDATE jobs SET claimed_at = {now}, updated_at = {now}
             WHERE id = (
                 SELECT id FROM jobs
                 WHERE status = 'queued' AND claimed_at IS NULL
                 ORDER BY created_at, id
                 LIMIT 1
             )
             RETURNING job_id, client_id, prompt",
            now = NOW
        );
        self.conn
            .query_row(&sql, [], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    WorkItem {
                        client_id: row.get(1)?,
                        prompt: row.get(2)?,
                    },
                ))
            })
            .optional()
            .context("Failed to claim queued job")
    }

    // ── Logs ──────────────────────────────────────────────────────────

    pub fn append_log(&self, job_id: &str, message: &str) -> Result<()> {
        if message.is_empty() {
            return Ok(());
        }
        self.conn
            .execute(
                "INSERT INTO job_logs (job_id, message) VALUES (?1, ?2)",
                params![job_id, message],
            )
            .context("Failed to insert job log")?;
        Ok(())
    }

    /// Oldest-first log entries, at most `limit` (capped at `MAX_LOG_PAGE`).
    pub fn list_logs(&self, job_id: &str, limit: usize) -> Result<Vec<JobLogEntry>> {
        let limit = limit.clamp(1, MAX_LOG_PAGE) as i64;
        let mut stmt = self
            .conn
            .prepare(
                "SELECT job_id, message, created_at FROM job_logs
                 WHERE job_id = ?1 ORDER BY created_at, id LIMIT ?2",
            )
            .context("Failed to prepare list_logs")?;
        let rows = stmt
            .query_map(params![job_id, limit], |row| {
                Ok(JobLogEntry {
                    job_id: row.get(0)?,
                    message: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })
            .context("Failed to query job logs")?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.context("Failed to read job log row")?);
        }
        Ok(entries)
    }
}
