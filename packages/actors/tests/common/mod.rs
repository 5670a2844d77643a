#![allow(dead_code)]

use std::time::Duration;

use actors::{FnHandler, HandlerFuture, InMemoryJobStore, JobQueue};
use dispatch_core::{Job, JobId, JobResult, QueueConfig, QueueError, RetryPolicy};

/// Config with short intervals and no backoff so tests finish quickly.
pub fn fast_config() -> QueueConfig {
    QueueConfig::default()
        .with_retry(RetryPolicy::immediate())
        .with_poll_interval(Duration::from_millis(10))
        .with_sweep_interval(Duration::from_millis(50))
        .with_shutdown_timeout(Duration::from_secs(5))
}

pub async fn spawn_queue(config: QueueConfig) -> Result<(JobQueue, InMemoryJobStore), QueueError> {
    let store = InMemoryJobStore::new();
    let queue = JobQueue::spawn(config, store.clone()).await?;
    Ok((queue, store))
}

pub fn noop_handler(job_type: &str) -> FnHandler<impl Fn(&Job) -> HandlerFuture + Send + Sync + 'static> {
    FnHandler::new(job_type, |_job: &Job| -> HandlerFuture {
        Box::pin(async { Ok(JobResult::new("ok")) })
    })
}

/// Poll `get` until `done` holds or five seconds pass.
pub async fn wait_for(
    queue: &JobQueue,
    job_id: JobId,
    done: impl Fn(&Job) -> bool,
) -> Result<Job, QueueError> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let job = queue.get(job_id).await?.ok_or(QueueError::JobNotFound(job_id))?;
        if done(&job) || tokio::time::Instant::now() >= deadline {
            return Ok(job);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
