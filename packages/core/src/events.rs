//! Observability events emitted by the queue and worker pool.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Job, JobId};

/// Events emitted by the job system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// A new job was enqueued.
    JobEnqueued { job: Job, timestamp: DateTime<Utc> },
    /// A worker claimed a job.
    JobStarted {
        job_id: JobId,
        worker_id: String,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },
    /// A handler returned success.
    JobSucceeded {
        job_id: JobId,
        attempts: u32,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// An attempt failed. `will_retry == false` means the retry limit was hit.
    JobFailed {
        job_id: JobId,
        job_type: String,
        error: String,
        attempts: u32,
        will_retry: bool,
        timestamp: DateTime<Utc>,
    },
    /// A running job was taken back from its executor (lease expiry, crash, stop).
    JobReclaimed {
        job_id: JobId,
        worker_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// An executor started.
    WorkerStarted {
        worker_id: String,
        timestamp: DateTime<Utc>,
    },
    /// An executor stopped.
    WorkerStopped {
        worker_id: String,
        timestamp: DateTime<Utc>,
    },
    /// An executor died unexpectedly.
    WorkerCrashed {
        worker_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            JobEvent::JobEnqueued { timestamp, .. }
            | JobEvent::JobStarted { timestamp, .. }
            | JobEvent::JobSucceeded { timestamp, .. }
            | JobEvent::JobFailed { timestamp, .. }
            | JobEvent::JobReclaimed { timestamp, .. }
            | JobEvent::WorkerStarted { timestamp, .. }
            | JobEvent::WorkerStopped { timestamp, .. }
            | JobEvent::WorkerCrashed { timestamp, .. } => *timestamp,
        }
    }

    /// Get the job ID associated with this event, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            JobEvent::JobEnqueued { job, .. } => Some(job.id),
            JobEvent::JobStarted { job_id, .. }
            | JobEvent::JobSucceeded { job_id, .. }
            | JobEvent::JobFailed { job_id, .. }
            | JobEvent::JobReclaimed { job_id, .. } => Some(*job_id),
            _ => None,
        }
    }

    /// True for the terminal failure emitted once retries are exhausted.
    pub fn is_retry_limit_exceeded(&self) -> bool {
        matches!(
            self,
            JobEvent::JobFailed {
                will_retry: false,
                ..
            }
        )
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::JobEnqueued { job, .. } => {
                format!("Job {} ({}) enqueued", job.id, job.job_type)
            }
            JobEvent::JobStarted {
                job_id,
                worker_id,
                attempt,
                ..
            } => format!("Job {} attempt {} started by {}", job_id, attempt, worker_id),
            JobEvent::JobSucceeded {
                job_id,
                duration_ms,
                ..
            } => format!("Job {} succeeded in {}ms", job_id, duration_ms),
            JobEvent::JobFailed {
                job_id,
                error,
                will_retry,
                ..
            } => {
                let retry = if *will_retry {
                    " (will retry)"
                } else {
                    " (retry limit exceeded)"
                };
                format!("Job {} failed: {}{}", job_id, error, retry)
            }
            JobEvent::JobReclaimed {
                job_id,
                worker_id,
                reason,
                ..
            } => format!("Job {} reclaimed from {}: {}", job_id, worker_id, reason),
            JobEvent::WorkerStarted { worker_id, .. } => format!("Worker {} started", worker_id),
            JobEvent::WorkerStopped { worker_id, .. } => format!("Worker {} stopped", worker_id),
            JobEvent::WorkerCrashed {
                worker_id, reason, ..
            } => format!("Worker {} crashed: {}", worker_id, reason),
        }
    }
}
