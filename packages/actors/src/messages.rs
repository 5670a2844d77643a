//! Message types for actor communication.

use dispatch_core::{HandlerError, Job, JobId, JobResult, QueueError, QueueStats};
use ractor::RpcReplyPort;

/// Messages for the QueueActor.
#[derive(Debug)]
pub enum QueueMessage {
    /// Enqueue a new job.
    Enqueue {
        job_type: String,
        payload: serde_json::Value,
        reply: RpcReplyPort<Result<Job, QueueError>>,
    },

    /// Claim the oldest eligible pending job for a worker.
    Dequeue {
        worker_id: String,
        reply: RpcReplyPort<Option<Job>>,
    },

    /// Report job success.
    Complete {
        job_id: JobId,
        worker_id: String,
        reply: RpcReplyPort<Result<(), QueueError>>,
    },

    /// Report a failed attempt.
    Fail {
        job_id: JobId,
        worker_id: String,
        error: HandlerError,
        reply: RpcReplyPort<Result<(), QueueError>>,
    },

    /// Fail every job owned by an executor that went away.
    ReleaseWorker {
        worker_id: String,
        reason: String,
        reply: RpcReplyPort<usize>,
    },

    /// Get a job by ID.
    GetJob {
        job_id: JobId,
        reply: RpcReplyPort<Option<Job>>,
    },

    /// List jobs held in memory.
    ListJobs {
        status_filter: Option<String>,
        limit: usize,
        reply: RpcReplyPort<Vec<Job>>,
    },

    /// Get queue stats.
    GetStats { reply: RpcReplyPort<QueueStats> },

    /// Reclaim expired leases and evict old terminal jobs.
    Sweep { reply: Option<RpcReplyPort<usize>> },

    /// Shutdown the queue.
    Shutdown,
}

/// Messages for the WorkerActor.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Ask the queue for work if idle.
    Poll,

    /// The handler task for the current job finished.
    Finished {
        job_id: JobId,
        outcome: Result<JobResult, HandlerError>,
    },

    /// Stop claiming new jobs. The current job keeps running.
    Drain,

    /// Abort the current job and hand it back through the retry path.
    Abandon {
        reason: String,
        reply: RpcReplyPort<()>,
    },

    /// Check if worker is idle.
    IsIdle { reply: RpcReplyPort<bool> },

    /// Shutdown the worker.
    Shutdown,

    /// Fail the actor as a handler-independent crash would.
    #[cfg(test)]
    Crash,
}

/// Messages for the pool Supervisor.
#[derive(Debug)]
pub enum SupervisorMessage {
    /// Tell every worker to stop claiming jobs.
    Drain,

    /// True when no worker holds a job.
    AllIdle { reply: RpcReplyPort<bool> },

    /// Abandon every in-flight job. Replies once all of them are handed back.
    AbandonAll {
        reason: String,
        reply: RpcReplyPort<()>,
    },

    /// Number of live workers.
    WorkerCount { reply: RpcReplyPort<usize> },

    /// Stop all workers and the supervisor.
    Shutdown,

    /// Periodic tick for housekeeping.
    Tick,

    /// Crash every live worker.
    #[cfg(test)]
    CrashWorkers,
}
