use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;

use sitegen::config::SiteGenConfig;
use sitegen::generate::GenerationClient;
use sitegen::generate::client::describe_timeout;
use sitegen::pipeline::PipelineRunner;
use sitegen::publish::S3ObjectStore;
use sitegen::queue::DbQueue;
use sitegen::store::SqliteRecorder;
use sitegen::worker::WorkerPool;

use super::open_db;

pub async fn cmd_worker(mut config: SiteGenConfig, concurrency: Option<usize>) -> Result<()> {
    if let Some(concurrency) = concurrency {
        config.worker.concurrency = concurrency;
    }
    config.validate_for_worker()?;

    let db = open_db(&config)?;
    let generator = GenerationClient::from_config(&config.model);
    tracing::info!(
        model = %config.model.model,
        api_style = ?generator.style(),
        timeout = %describe_timeout(&config.model),
        bucket = config.storage.bucket.as_deref().unwrap_or_default(),
        "worker configured"
    );
    let store = S3ObjectStore::from_config(&config.storage).await;

    let config = Arc::new(config);
    let runner = PipelineRunner::new(
        config.clone(),
        Arc::new(generator),
        Arc::new(store),
        Arc::new(SqliteRecorder::new(db.clone())),
    );
    let pool = WorkerPool::new(
        Arc::new(runner),
        Arc::new(DbQueue::new(db)),
        config.worker.concurrency,
        Duration::from_millis(config.worker.poll_interval_ms),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("shutdown requested, finishing in-flight jobs"),
            Err(e) => tracing::error!(error = %e, "failed to listen for ctrl-c, stopping"),
        }
        let _ = shutdown_tx.send(true);
    });

    let stats = pool.run(shutdown_rx).await;
    println!(
        "{} {} completed, {} failed",
        console::style("Worker stopped:").bold(),
        console::style(stats.completed).green(),
        console::style(stats.failed).red()
    );
    Ok(())
}
