use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::{OrderId, WorkerId};
use tokio::sync::RwLock;

use crate::{
    Result,
    job::{JobStatus, ProcessingJob},
};

/// Result of attempting to claim a job.
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    /// The lock was acquired; the caller should process the job.
    Claimed(ProcessingJob),
    /// Another worker holds a fresh lock.
    Busy {
        locked_at: DateTime<Utc>,
        locked_by: Option<WorkerId>,
    },
    /// The job already completed; nothing to do.
    Completed,
}

/// Queue of durable processing jobs.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Inserts a pending job for the order if none exists; returns the job
    /// either way (first-writer-wins on the order id).
    async fn enqueue(&self, order_id: OrderId) -> Result<ProcessingJob>;

    /// Fetches a job by order id.
    async fn get(&self, order_id: &OrderId) -> Result<Option<ProcessingJob>>;

    /// Tries to acquire the lock on a specific job: pending and failed jobs
    /// are claimable, as is a processing job whose lock has gone stale.
    async fn claim(&self, order_id: &OrderId, worker: &WorkerId) -> Result<ClaimOutcome>;

    /// Claims the oldest claimable job, if any. Used by background workers;
    /// the webhook path claims by order id instead.
    async fn claim_next(&self, worker: &WorkerId) -> Result<Option<ProcessingJob>>;

    /// Terminal success transition; clears the lock fields.
    async fn complete(&self, order_id: &OrderId) -> Result<()>;

    /// Terminal failure transition; clears the lock fields.
    async fn fail(&self, order_id: &OrderId, error: &str) -> Result<()>;
}

/// In-memory job queue for testing and local development.
#[derive(Clone)]
pub struct InMemoryJobQueue {
    jobs: Arc<RwLock<HashMap<OrderId, ProcessingJob>>>,
    lock_timeout: Duration,
}

impl InMemoryJobQueue {
    /// Creates a queue with the given stale-lock timeout.
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            lock_timeout,
        }
    }

    /// Overwrites a job's lock timestamp. Test helper for simulating a
    /// crashed worker whose lock has gone stale.
    pub async fn backdate_lock(&self, order_id: &OrderId, locked_at: DateTime<Utc>) {
        if let Some(job) = self.jobs.write().await.get_mut(order_id) {
            job.locked_at = Some(locked_at);
        }
    }

    fn claimable(job: &ProcessingJob, now: DateTime<Utc>, timeout: Duration) -> bool {
        match &job.status {
            JobStatus::Pending | JobStatus::Failed { .. } => true,
            JobStatus::Processing => job.lock_is_stale(now, timeout),
            JobStatus::Completed => false,
        }
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, order_id: OrderId) -> Result<ProcessingJob> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .entry(order_id.clone())
            .or_insert_with(|| ProcessingJob::pending(order_id));
        Ok(job.clone())
    }

    async fn get(&self, order_id: &OrderId) -> Result<Option<ProcessingJob>> {
        Ok(self.jobs.read().await.get(order_id).cloned())
    }

    async fn claim(&self, order_id: &OrderId, worker: &WorkerId) -> Result<ClaimOutcome> {
        let mut jobs = self.jobs.write().await;
        let now = Utc::now();
        let job = jobs
            .entry(order_id.clone())
            .or_insert_with(|| ProcessingJob::pending(order_id.clone()));

        match &job.status {
            JobStatus::Completed => Ok(ClaimOutcome::Completed),
            JobStatus::Processing if !job.lock_is_stale(now, self.lock_timeout) => {
                Ok(ClaimOutcome::Busy {
                    locked_at: job.locked_at.unwrap_or(now),
                    locked_by: job.locked_by.clone(),
                })
            }
            JobStatus::Processing => {
                tracing::warn!(
                    order_id = %order_id,
                    attempts = job.attempts,
                    "reclaiming stale processing lock"
                );
                job.acquire(worker, now);
                Ok(ClaimOutcome::Claimed(job.clone()))
            }
            JobStatus::Pending | JobStatus::Failed { .. } => {
                job.acquire(worker, now);
                Ok(ClaimOutcome::Claimed(job.clone()))
            }
        }
    }

    async fn claim_next(&self, worker: &WorkerId) -> Result<Option<ProcessingJob>> {
        let mut jobs = self.jobs.write().await;
        let now = Utc::now();

        let oldest = jobs
            .values()
            .filter(|j| Self::claimable(j, now, self.lock_timeout))
            .min_by_key(|j| j.created_at)
            .map(|j| j.order_id.clone());

        if let Some(order_id) = oldest
            && let Some(job) = jobs.get_mut(&order_id)
        {
            job.acquire(worker, now);
            return Ok(Some(job.clone()));
        }

        Ok(None)
    }

    async fn complete(&self, order_id: &OrderId) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(order_id)
            .ok_or_else(|| crate::QueueError::NotFound(order_id.clone()))?;
        job.release(JobStatus::Completed);
        Ok(())
    }

    async fn fail(&self, order_id: &OrderId, error: &str) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(order_id)
            .ok_or_else(|| crate::QueueError::NotFound(order_id.clone()))?;
        job.release(JobStatus::Failed {
            error: error.to_string(),
        });
        Ok(())
    }
}
