//! Worker pool: N tokio tasks, each claiming one delivery at a time and
//! running it through the pipeline.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::pipeline::PipelineRunner;
use crate::queue::WorkQueue;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub completed: usize,
    pub failed: usize,
}

impl PoolStats {
    fn merge(&mut self, other: PoolStats) {
        self.completed += other.completed;
        self.failed += other.failed;
    }
}

pub struct WorkerPool {
    runner: Arc<PipelineRunner>,
    queue: Arc<dyn WorkQueue>,
    concurrency: usize,
    poll_interval: Duration,
}

impl WorkerPool {
    pub fn new(
        runner: Arc<PipelineRunner>,
        queue: Arc<dyn WorkQueue>,
        concurrency: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            runner,
            queue,
            concurrency: concurrency.max(1),
            poll_interval,
        }
    }

    /// Run until `shutdown` flips to `true` (or its sender is dropped).
    /// Jobs already claimed run to completion before this returns.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> PoolStats {
        tracing::info!(workers = self.concurrency, "starting worker pool");
        let mut handles = Vec::with_capacity(self.concurrency);
        for worker_id in 0..self.concurrency {
            handles.push(tokio::spawn(run_worker(
                worker_id,
                self.runner.clone(),
                self.queue.clone(),
                self.poll_interval,
                shutdown.clone(),
            )));
        }

        let mut stats = PoolStats::default();
        for (worker_id, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(worker_stats) => stats.merge(worker_stats),
                Err(e) => tracing::error!(worker_id, error = %e, "worker task panicked"),
            }
        }
        tracing::info!(completed = stats.completed, failed = stats.failed, "all workers have stopped");
        stats
    }
}

async fn run_worker(
    worker_id: usize,
    runner: Arc<PipelineRunner>,
    queue: Arc<dyn WorkQueue>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> PoolStats {
    tracing::debug!(worker_id, "worker started");
    let mut stats = PoolStats::default();
    loop {
        if *shutdown.borrow() {
            break;
        }
        match queue.next().await {
            Ok(Some(delivery)) => {
                tracing::debug!(worker_id, job_id = %delivery.job_id, "claimed job");
                match runner.run(&delivery.job_id, &delivery.item).await {
                    Ok(_) => stats.completed += 1,
                    Err(_) => stats.failed += 1,
                }
            }
            Ok(None) => {
                if !idle(poll_interval, &mut shutdown).await {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(worker_id, error = %e, "failed to poll queue");
                if !idle(poll_interval, &mut shutdown).await {
                    break;
                }
            }
        }
    }
    tracing::debug!(worker_id, "worker stopped");
    stats
}

/// Sleep for one poll interval. Returns `false` when shutdown was signalled.
async fn idle(poll_interval: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(poll_interval) => true,
        changed = shutdown.changed() => changed.is_ok() && !*shutdown.borrow(),
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::config::SiteGenConfig;
    use crate::errors::{JobError, JobResult};
    use crate::generate::{GenerateOptions, Generation, Generator};
    use crate::publish::store::testing::MemoryStore;
    use crate::queue::DbQueue;
    use crate::store::{DbHandle, JobDb, JobStatus, SqliteRecorder};

    struct UnreachableGenerator;

    #[async_trait]
    impl Generator for UnreachableGenerator {
        async fn generate(&self, _: &str, _: &str, _: &GenerateOptions) -> JobResult<Generation> {
            Err(JobError::Generation("not expected in this test".into()))
        }
    }

    fn pool(db: &DbHandle, concurrency: usize) -> WorkerPool {
        let mut config = SiteGenConfig::default();
        config.storage.bucket = Some("sites".into());
        let runner = PipelineRunner::new(
            Arc::new(config),
            Arc::new(UnreachableGenerator),
            Arc::new(MemoryStore::default()),
            Arc::new(SqliteRecorder::new(db.clone())),
        );
        WorkerPool::new(
            Arc::new(runner),
            Arc::new(DbQueue::new(db.clone())),
            concurrency,
            Duration::from_millis(10),
        )
    }

    #[tokio::test]
    async fn test_pool_drains_queue_then_stops_on_shutdown() {
        let db = JobDb::new_in_memory().unwrap();
        for i in 0..5 {
            db.insert_job(&format!("job-{}", i), None, "???", "bakery").unwrap();
        }
        let handle = DbHandle::new(db);
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(pool(&handle, 2).run(rx));

        for _ in 0..200 {
            let done = handle
                .call(|db| {
                    let mut all = true;
                    for i in 0..5 {
                        let job = db.get_job(&format!("job-{}", i))?;
                        all &= job.is_some_and(|j| j.status.is_terminal());
                    }
                    Ok(all)
                })
                .await
                .unwrap();
            if done {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tx.send(true).unwrap();
        let stats = task.await.unwrap();
        assert_eq!(stats, PoolStats { completed: 0, failed: 5 });

        let job = handle.call(|db| db.get_job("job-3")).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("Invalid clientId"));
    }

    #[tokio::test]
    async fn test_dropped_shutdown_sender_stops_idle_workers() {
        let handle = DbHandle::new(JobDb::new_in_memory().unwrap());
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(pool(&handle, 3).run(rx));
        drop(tx);
        let stats = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats, PoolStats::default());
    }
}
