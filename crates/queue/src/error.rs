use common::OrderId;
use thiserror::Error;

/// Errors that can occur when interacting with the job queue.
#[derive(Debug, Error)]
pub enum QueueError {
    /// No job exists for the given order.
    #[error("Job not found: {0}")]
    NotFound(OrderId),
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;
