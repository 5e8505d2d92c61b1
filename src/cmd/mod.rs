//! CLI command implementations.
//!
//! | Module   | Commands handled                      |
//! |----------|---------------------------------------|
//! | `worker` | `Worker`                              |
//! | `jobs`   | `Submit`, `Status`, `Logs`, `InitDb`  |

pub mod jobs;
pub mod worker;

use anyhow::Result;
use sitegen::config::SiteGenConfig;
use sitegen::store::{DbHandle, JobDb};

pub use jobs::{cmd_init_db, cmd_logs, cmd_status, cmd_submit};
pub use worker::cmd_worker;

/// Open the configured job database, creating the schema if needed.
pub(crate) fn open_db(config: &SiteGenConfig) -> Result<DbHandle> {
    let db = JobDb::new(&config.worker.db_path)?;
    Ok(DbHandle::new(db))
}
