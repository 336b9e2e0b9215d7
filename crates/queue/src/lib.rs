//! Durable processing-job records with advisory locking.
//!
//! One job per order id. A claim stamps a worker identity and timestamp and
//! bumps the attempt counter; a lock older than the configured timeout is
//! reclaimable by a fresh attempt. Reclaim can race, so the lock is a
//! liveness hint only — everything done while "holding" it must itself be
//! idempotent (the order log's item-level completion markers provide that).

mod error;
mod job;
mod queue;

pub use error::{QueueError, Result};
pub use job::{JobStatus, ProcessingJob};
pub use queue::{ClaimOutcome, InMemoryJobQueue, JobQueue};
