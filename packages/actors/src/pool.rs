//! Worker pool: a fixed number of executors draining one queue.

use std::time::Duration;

use dispatch_core::{JobEvent, QueueError};
use ractor::{Actor, ActorRef};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::handler::JobHandler;
use crate::job_queue::JobQueue;
use crate::messages::SupervisorMessage;
use crate::supervisor::{Supervisor, SupervisorArgs};

/// How often `stop(true)` checks whether in-flight jobs have finished.
const IDLE_CHECK_INTERVAL: Duration = Duration::from_millis(50);
const IDLE_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Pool lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Worker pool already started")]
    AlreadyStarted,

    #[error("Worker pool not started")]
    NotStarted,

    #[error("Failed to spawn supervisor: {0}")]
    Spawn(String),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

struct Running {
    supervisor: ActorRef<SupervisorMessage>,
    handle: JoinHandle<()>,
}

/// Executes queued jobs with bounded concurrency.
///
/// Cloning is not supported; share the pool behind an `Arc` if several tasks
/// need to start or stop it.
pub struct WorkerPool {
    queue: JobQueue,
    running: Mutex<Option<Running>>,
}

impl WorkerPool {
    pub fn new(queue: JobQueue) -> Self {
        Self {
            queue,
            running: Mutex::new(None),
        }
    }

    pub fn register_handler<H: JobHandler>(&self, handler: H) {
        self.queue.register_handler(handler);
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<JobEvent> {
        self.queue.subscribe_events()
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Spawn `concurrency` workers. A concurrency of zero uses the queue config.
    pub async fn start(&self, concurrency: usize) -> Result<(), PoolError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(PoolError::AlreadyStarted);
        }

        let concurrency = if concurrency == 0 {
            self.queue.config().concurrency.max(1) as usize
        } else {
            concurrency
        };

        let args = SupervisorArgs {
            queue: self.queue.clone(),
            concurrency,
        };
        let (supervisor, handle) = Actor::spawn(None, Supervisor, args)
            .await
            .map_err(|e| PoolError::Spawn(e.to_string()))?;

        tracing::info!("Worker pool started with {} workers", concurrency);
        *running = Some(Running { supervisor, handle });
        Ok(())
    }

    /// Number of live workers.
    pub async fn worker_count(&self) -> Result<usize, PoolError> {
        let running = self.running.lock().await;
        let Some(running) = running.as_ref() else {
            return Ok(0);
        };
        match ractor::rpc::call(
            &running.supervisor,
            |reply| SupervisorMessage::WorkerCount { reply },
            Some(Duration::from_secs(5)),
        )
        .await
        {
            Ok(ractor::rpc::CallResult::Success(n)) => Ok(n),
            _ => Err(PoolError::Queue(QueueError::Unavailable(
                "Supervisor did not answer".into(),
            ))),
        }
    }

    /// Stop the pool.
    ///
    /// With `graceful`, workers stop claiming jobs and in-flight jobs get up
    /// to the configured shutdown timeout to finish. Anything still running
    /// after that, or everything when not graceful, is abandoned and goes
    /// back through the retry path.
    pub async fn stop(&self, graceful: bool) -> Result<(), PoolError> {
        let Some(Running { supervisor, handle }) = self.running.lock().await.take() else {
            return Err(PoolError::NotStarted);
        };

        let _ = supervisor.send_message(SupervisorMessage::Drain);

        if graceful {
            let deadline = tokio::time::Instant::now() + self.queue.config().shutdown_timeout();
            loop {
                let idle = match ractor::rpc::call(
                    &supervisor,
                    |reply| SupervisorMessage::AllIdle { reply },
                    Some(IDLE_CHECK_TIMEOUT),
                )
                .await
                {
                    Ok(ractor::rpc::CallResult::Success(idle)) => idle,
                    // A supervisor that cannot answer has nothing left to wait for.
                    Ok(_) | Err(_) => true,
                };
                if idle {
                    break;
                }
                if tokio::time::Instant::now() >= deadline {
                    tracing::warn!("Shutdown timeout reached with jobs still running");
                    break;
                }
                tokio::time::sleep(IDLE_CHECK_INTERVAL).await;
            }
        }

        let reason = if graceful {
            "shutdown timeout exceeded"
        } else {
            "worker pool stopped"
        };
        let abandoned = ractor::rpc::call(
            &supervisor,
            |reply| SupervisorMessage::AbandonAll {
                reason: reason.to_string(),
                reply,
            },
            Some(IDLE_CHECK_TIMEOUT),
        )
        .await;
        if !matches!(abandoned, Ok(ractor::rpc::CallResult::Success(()))) {
            tracing::warn!("Supervisor did not confirm abandon; leases will be swept");
        }
        let _ = supervisor.send_message(SupervisorMessage::Shutdown);

        if let Err(e) = handle.await {
            tracing::warn!("Supervisor task ended abnormally: {}", e);
        }
        tracing::info!("Worker pool stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use dispatch_core::{Job, JobResult, JobStatus, QueueConfig, RetryPolicy};

    use super::*;
    use crate::{FnHandler, HandlerFuture, InMemoryJobStore};

    /// Next event matching `wanted`, or `None` after five seconds.
    async fn next_event(
        events: &mut broadcast::Receiver<JobEvent>,
        wanted: impl Fn(&JobEvent) -> bool,
    ) -> Option<JobEvent> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            match tokio::time::timeout_at(deadline, events.recv()).await {
                Ok(Ok(event)) if wanted(&event) => return Some(event),
                Ok(Ok(_)) | Ok(Err(broadcast::error::RecvError::Lagged(_))) => {}
                Ok(Err(broadcast::error::RecvError::Closed)) | Err(_) => return None,
            }
        }
    }

    #[tokio::test]
    async fn test_crashed_worker_releases_job_and_is_replaced() -> Result<(), Box<dyn Error>> {
        let config = QueueConfig::default()
            .with_retry(RetryPolicy::fixed(Duration::from_secs(30)))
            .with_poll_interval(Duration::from_millis(10));
        let queue = JobQueue::spawn(config, InMemoryJobStore::new()).await?;
        let pool = WorkerPool::new(queue.clone());

        let completed = Arc::new(AtomicBool::new(false));
        let flag = completed.clone();
        pool.register_handler(FnHandler::new("slow", move |_job: &Job| -> HandlerFuture {
            let flag = flag.clone();
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(JobResult::new("done"))
            })
        }));

        let mut events = pool.subscribe_events();
        pool.start(1).await?;

        let job_id = queue.enqueue("slow", serde_json::Value::Null).await?;
        next_event(&mut events, |e| {
            matches!(e, JobEvent::JobStarted { job_id: id, .. } if *id == job_id)
        })
        .await
        .ok_or("job never started")?;

        pool.running
            .lock()
            .await
            .as_ref()
            .ok_or("pool not running")?
            .supervisor
            .send_message(SupervisorMessage::CrashWorkers)
            .map_err(|e| e.to_string())?;

        let crashed = next_event(&mut events, |e| matches!(e, JobEvent::WorkerCrashed { .. }))
            .await
            .ok_or("no crash reported")?;
        assert!(matches!(
            crashed,
            JobEvent::WorkerCrashed { ref worker_id, .. } if worker_id == "worker-1"
        ));

        let failed = next_event(&mut events, |e| {
            matches!(e, JobEvent::JobFailed { job_id: id, .. } if *id == job_id)
        })
        .await
        .ok_or("job not released")?;
        assert!(matches!(
            failed,
            JobEvent::JobFailed {
                attempts: 1,
                will_retry: true,
                ..
            }
        ));

        let job = queue.get(job_id).await?.ok_or("job missing")?;
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 1);
        assert!(job.last_error.is_some_and(|e| e.contains("executor lost")));

        next_event(&mut events, |e| {
            matches!(e, JobEvent::WorkerStarted { worker_id, .. } if worker_id == "worker-2")
        })
        .await
        .ok_or("worker not replaced")?;
        assert_eq!(pool.worker_count().await?, 1);

        // The crashed worker's handler was cancelled with it.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!completed.load(Ordering::SeqCst));

        pool.stop(false).await?;
        queue.shutdown();
        Ok(())
    }
}
