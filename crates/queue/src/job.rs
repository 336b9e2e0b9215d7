use chrono::{DateTime, Utc};
use common::{OrderId, WorkerId};
use serde::{Deserialize, Serialize};

/// Lifecycle of a processing job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed { error: String },
}

/// One durable job record, keyed by order id.
///
/// At most one live lock per job under normal operation. Two workers can
/// still race on a reclaimed stale lock, so nothing in here is a mutex.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub order_id: OrderId,
    pub status: JobStatus,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_by: Option<WorkerId>,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}

impl ProcessingJob {
    /// Creates a fresh pending job for an order.
    pub fn pending(order_id: OrderId) -> Self {
        Self {
            order_id,
            status: JobStatus::Pending,
            locked_at: None,
            locked_by: None,
            attempts: 0,
            created_at: Utc::now(),
        }
    }

    /// Whether this job's lock is older than `timeout` at `now`.
    pub fn lock_is_stale(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> bool {
        match self.locked_at {
            Some(locked_at) => now - locked_at >= timeout,
            None => true,
        }
    }

    pub(crate) fn acquire(&mut self, worker: &WorkerId, now: DateTime<Utc>) {
        self.status = JobStatus::Processing;
        self.locked_at = Some(now);
        self.locked_by = Some(worker.clone());
        self.attempts += 1;
    }

    pub(crate) fn release(&mut self, status: JobStatus) {
        self.status = status;
        self.locked_at = None;
        self.locked_by = None;
    }
}
