//! Error types shared across the workspace.

use std::time::Duration;

use thiserror::Error;

use crate::JobId;

/// Errors surfaced synchronously by the job queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("No handler registered for job type: {0}")]
    UnknownJobType(String),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Job {0} is not running")]
    NotRunning(JobId),

    #[error("Job {job_id} is owned by {owner}, not {worker_id}")]
    NotOwner {
        job_id: JobId,
        owner: String,
        worker_id: String,
    },

    #[error("Job store error: {0}")]
    Store(String),

    #[error("Queue unavailable: {0}")]
    Unavailable(String),
}

/// Why a single handler invocation did not succeed.
///
/// Caught at the executor boundary; drives retry and never crashes the pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("Job timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Handler panicked: {0}")]
    Panicked(String),

    #[error("Abandoned: {0}")]
    Abandoned(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::Failed(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::Failed(message.to_string())
    }
}

/// Per-subscriber delivery failure. Never reaches the publisher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("Delivery channel closed")]
    Closed,

    #[error("Delivery timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Delivery rejected: {0}")]
    Rejected(String),
}

/// Errors from the job persistence layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Job store backend error: {0}")]
    Backend(String),

    #[error("Job store serialization error: {0}")]
    Serialization(String),
}

impl From<StoreError> for QueueError {
    fn from(e: StoreError) -> Self {
        QueueError::Store(e.to_string())
    }
}
