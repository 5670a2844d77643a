//! Cloneable handle to the queue actor.

use std::sync::Arc;

use dispatch_core::{
    HandlerError, Job, JobEvent, JobId, JobStore, QueueConfig, QueueError, QueueStats,
};
use ractor::{Actor, ActorRef, RpcReplyPort};
use tokio::sync::broadcast;

use crate::handler::{HandlerRegistry, JobHandler};
use crate::messages::QueueMessage;
use crate::queue_actor::{QueueActor, QueueArgs};

/// Handle to a running job queue.
///
/// All methods are message round-trips to the queue actor; none of them wait
/// for a job to execute.
#[derive(Clone)]
pub struct JobQueue {
    actor: ActorRef<QueueMessage>,
    handlers: Arc<HandlerRegistry>,
    config: QueueConfig,
    event_tx: broadcast::Sender<JobEvent>,
}

impl JobQueue {
    /// Spawn a queue actor backed by `store`, recovering unfinished jobs.
    pub async fn spawn<S: JobStore>(config: QueueConfig, store: S) -> Result<Self, QueueError> {
        let (event_tx, _) = broadcast::channel(1024);
        let handlers = Arc::new(HandlerRegistry::new());

        let args = QueueArgs {
            config: config.clone(),
            handlers: handlers.clone(),
            store: Arc::new(store),
            event_tx: event_tx.clone(),
        };

        let (actor, _handle) = Actor::spawn(None, QueueActor::<S>::new(), args)
            .await
            .map_err(|e| QueueError::Unavailable(format!("Failed to spawn queue: {}", e)))?;

        Ok(Self {
            actor,
            handlers,
            config,
            event_tx,
        })
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(RpcReplyPort<T>) -> QueueMessage,
    ) -> Result<T, QueueError>
    where
        T: Send + 'static,
    {
        let (tx, rx) = ractor::concurrency::oneshot();
        self.actor
            .send_message(build(tx.into()))
            .map_err(|e| QueueError::Unavailable(format!("Failed to send message: {}", e)))?;
        rx.await
            .map_err(|_| QueueError::Unavailable("Failed to receive response".into()))
    }

    /// Register a handler. Jobs of its type may be enqueued from now on.
    pub fn register_handler<H: JobHandler>(&self, handler: H) {
        self.handlers.register(handler);
    }

    pub fn handlers(&self) -> Arc<HandlerRegistry> {
        self.handlers.clone()
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Submit a job. Fails with `UnknownJobType` when no handler is registered.
    pub async fn enqueue(
        &self,
        job_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<JobId, QueueError> {
        let job_type = job_type.into();
        let job = self
            .call(|reply| QueueMessage::Enqueue {
                job_type,
                payload,
                reply,
            })
            .await??;
        Ok(job.id)
    }

    /// Claim the oldest eligible pending job, if any.
    pub async fn dequeue_next(&self, worker_id: &str) -> Result<Option<Job>, QueueError> {
        let worker_id = worker_id.to_string();
        self.call(|reply| QueueMessage::Dequeue { worker_id, reply })
            .await
    }

    pub async fn mark_succeeded(&self, job_id: JobId, worker_id: &str) -> Result<(), QueueError> {
        let worker_id = worker_id.to_string();
        self.call(|reply| QueueMessage::Complete {
            job_id,
            worker_id,
            reply,
        })
        .await?
    }

    /// Record a failed attempt; the job is retried after backoff or marked failed.
    pub async fn mark_failed(
        &self,
        job_id: JobId,
        worker_id: &str,
        error: HandlerError,
    ) -> Result<(), QueueError> {
        let worker_id = worker_id.to_string();
        self.call(|reply| QueueMessage::Fail {
            job_id,
            worker_id,
            error,
            reply,
        })
        .await?
    }

    /// Send every job held by `worker_id` back through the failure path.
    pub async fn release_worker(&self, worker_id: &str, reason: &str) -> Result<usize, QueueError> {
        let worker_id = worker_id.to_string();
        let reason = reason.to_string();
        self.call(|reply| QueueMessage::ReleaseWorker {
            worker_id,
            reason,
            reply,
        })
        .await
    }

    /// Reclaim expired leases now. Returns the number of jobs reclaimed.
    pub async fn sweep(&self) -> Result<usize, QueueError> {
        self.call(|reply| QueueMessage::Sweep { reply: Some(reply) })
            .await
    }

    pub async fn get(&self, job_id: JobId) -> Result<Option<Job>, QueueError> {
        self.call(|reply| QueueMessage::GetJob { job_id, reply })
            .await
    }

    pub async fn list(
        &self,
        status_filter: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Job>, QueueError> {
        let status_filter = status_filter.map(str::to_string);
        self.call(|reply| QueueMessage::ListJobs {
            status_filter,
            limit,
            reply,
        })
        .await
    }

    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        self.call(|reply| QueueMessage::GetStats { reply }).await
    }

    /// Subscribe to the event stream.
    pub fn subscribe_events(&self) -> broadcast::Receiver<JobEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<JobEvent> {
        self.event_tx.clone()
    }

    pub(crate) fn sweep_in_background(&self) -> Result<(), QueueError> {
        self.actor
            .send_message(QueueMessage::Sweep { reply: None })
            .map_err(|e| QueueError::Unavailable(format!("Failed to send message: {}", e)))
    }

    /// Stop the queue actor. Pending jobs stay in the store.
    pub fn shutdown(&self) {
        let _ = self.actor.send_message(QueueMessage::Shutdown);
    }
}
