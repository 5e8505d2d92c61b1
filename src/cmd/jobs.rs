//! Job submission and inspection commands.

use anyhow::{Context, Result};
use console::style;

use sitegen::config::SiteGenConfig;
use sitegen::queue::DbQueue;
use sitegen::store::{JobRecord, JobStatus, MAX_LOG_PAGE, WorkItem};

use super::open_db;

pub fn cmd_init_db(config: &SiteGenConfig) -> Result<()> {
    open_db(config)?;
    println!(
        "Initialized job database at {}",
        config.worker.db_path.display()
    );
    Ok(())
}

pub async fn cmd_submit(
    config: &SiteGenConfig,
    client_id: &str,
    prompt: &str,
    owner: Option<&str>,
) -> Result<()> {
    let queue = DbQueue::new(open_db(config)?);
    let item = WorkItem {
        client_id: client_id.to_string(),
        prompt: prompt.to_string(),
    };
    let record = queue.enqueue(owner, item).await?;
    println!("{}", record.id);
    Ok(())
}

pub async fn cmd_status(config: &SiteGenConfig, job_id: &str, json: bool) -> Result<()> {
    let db = open_db(config)?;
    let id = job_id.to_string();
    let record = db
        .call(move |db| db.get_job(&id))
        .await?
        .with_context(|| format!("Job not found: {}", job_id))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print_record(&record);
    }
    Ok(())
}

fn print_record(record: &JobRecord) {
    let status = match record.status {
        JobStatus::Completed => style(record.status.as_str()).green(),
        JobStatus::Failed => style(record.status.as_str()).red(),
        JobStatus::Active => style(record.status.as_str()).yellow(),
        JobStatus::Queued => style(record.status.as_str()).dim(),
    };
    println!("{} {}", style("Job").bold(), record.id);
    println!("  client:  {}", record.client_id);
    println!("  status:  {}", status);
    if let Some(progress) = &record.progress {
        println!("  step:    {}", progress.step.as_str());
    }
    if let Some(error) = &record.error {
        println!("  error:   {}", style(error).red());
    }
    if let Some(result) = &record.result {
        println!("  url:     {}", result.build_url);
        println!("  source:  {}", result.s3_src);
        println!("  build:   {}", result.s3_build);
    }
    if let Some(total) = record.tokens_total {
        println!(
            "  tokens:  {} (prompt {}, completion {})",
            total,
            record.tokens_prompt.unwrap_or(0),
            record.tokens_completion.unwrap_or(0)
        );
    }
    if let Some(model) = &record.model {
        println!("  model:   {}", model);
    }
    println!("  updated: {}", record.updated_at);
}

pub async fn cmd_logs(config: &SiteGenConfig, job_id: &str, limit: usize) -> Result<()> {
    if limit > MAX_LOG_PAGE {
        tracing::debug!(limit, max = MAX_LOG_PAGE, "log page size capped");
    }
    let db = open_db(config)?;
    let id = job_id.to_string();
    let entries = db.call(move |db| db.list_logs(&id, limit)).await?;
    for entry in entries {
        println!("{}  {}", style(&entry.created_at).dim(), entry.message);
    }
    Ok(())
}
