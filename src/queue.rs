//! Work queue backed by the job table.
//!
//! A delivery is a `queued` job row claimed atomically by one worker. Claimed
//! rows are never handed out again, so a job is attempted at most once.

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::{JobError, JobResult};
use crate::store::{DbHandle, JobRecord, WorkItem};
use crate::util::sanitize_client_id;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub job_id: String,
    pub item: WorkItem,
}

#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Claim the next pending delivery, or `None` when the queue is empty.
    async fn next(&self) -> JobResult<Option<Delivery>>;
}

#[derive(Clone)]
pub struct DbQueue {
    db: DbHandle,
}

impl DbQueue {
    pub fn new(db: DbHandle) -> Self {
        Self { db }
    }

    /// Insert a `queued` job and return its record. The client id is stored
    /// as given; ids that sanitize to nothing are refused up front.
    pub async fn enqueue(&self, owner_id: Option<&str>, item: WorkItem) -> JobResult<JobRecord> {
        if sanitize_client_id(&item.client_id).is_empty() {
            return Err(JobError::Validation("Invalid clientId".to_string()));
        }
        if item.prompt.trim().is_empty() {
            return Err(JobError::Validation("Missing prompt".to_string()));
        }
        let job_id = Uuid::new_v4().to_string();
        let owner = owner_id.map(String::from);
        let record = self
            .db
            .call(move |db| db.insert_job(&job_id, owner.as_deref(), &item.client_id, &item.prompt))
            .await?;
        tracing::info!(job_id = %record.id, client_id = %record.client_id, "job enqueued");
        Ok(record)
    }
}

#[async_trait]
impl WorkQueue for DbQueue {
    async fn next(&self) -> JobResult<Option<Delivery>> {
        let claimed = self.db.call(|db| db.claim_next_queued()).await?;
        Ok(claimed.map(|(job_id, item)| Delivery { job_id, item }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{JobDb, JobStatus};

    fn queue() -> DbQueue {
        DbQueue::new(DbHandle::new(JobDb::new_in_memory().unwrap()))
    }

    fn item(client_id: &str, prompt: &str) -> WorkItem {
        WorkItem {
            client_id: client_id.to_string(),
            prompt: prompt.to_string(),
        }
    }

    #[tokio::test]
    async fn test_enqueue_then_claim_in_order() {
        let q = queue();
        let first = q.enqueue(Some("user-1"), item("Acme Co!", "bakery")).await.unwrap();
        let second = q.enqueue(None, item("Beta", "florist")).await.unwrap();
        assert_eq!(first.status, JobStatus::Queued);
        assert_eq!(first.owner_id.as_deref(), Some("user-1"));

        let a = q.next().await.unwrap().unwrap();
        let b = q.next().await.unwrap().unwrap();
        assert_eq!(a.job_id, first.id);
        assert_eq!(a.item, item("Acme Co!", "bakery"));
        assert_eq!(b.job_id, second.id);
        assert!(q.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_enqueue_rejects_unusable_input() {
        let q = queue();
        let err = q.enqueue(None, item("!!!", "bakery")).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid clientId");
        let err = q.enqueue(None, item("acme", "  ")).await.unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(q.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_claims_are_exclusive() {
        let q = queue();
        for i in 0..10 {
            q.enqueue(None, item(&format!("c{}", i), "p")).await.unwrap();
        }
        let mut handles = Vec::new();
        for _ in 0..4 {
            let q = q.clone();
            handles.push(tokio::spawn(async move {
                let mut got = Vec::new();
                while let Some(d) = q.next().await.unwrap() {
                    got.push(d.job_id);
                }
                got
            }));
        }
        let mut all = Vec::new();
        for h in handles {
            all.extend(h.await.unwrap());
        }
        let total = all.len();
        all.sort();
        all.dedup();
        assert_eq!(total, 10);
        assert_eq!(all.len(), 10);
    }
}
