//! Worker actor for executing jobs.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dispatch_core::{HandlerError, Job, JobEvent, JobId, JobResult};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::sync::broadcast;
use tokio::task::AbortHandle;

use crate::handler::HandlerRegistry;
use crate::job_queue::JobQueue;
use crate::messages::WorkerMessage;

/// The job a worker currently owns. Dropping it cancels the handler task, so
/// a worker that stops or crashes never leaves its handler running.
struct InFlight {
    job_id: JobId,
    abort: AbortHandle,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.abort.abort();
    }
}

/// State for the worker actor.
pub struct WorkerActorState {
    /// Unique worker ID.
    pub worker_id: String,
    queue: JobQueue,
    handlers: Arc<HandlerRegistry>,
    current: Option<InFlight>,
    event_tx: broadcast::Sender<JobEvent>,
    /// Cleared by `Drain`; the worker then stops claiming jobs.
    accepting: bool,
}

impl WorkerActorState {
    /// Check if the worker is idle.
    pub fn is_idle(&self) -> bool {
        self.current.is_none()
    }

    /// Start the handler for a claimed job on its own task.
    async fn start(&mut self, myself: &ActorRef<WorkerMessage>, job: Job) {
        let job_id = job.id;
        let Some(handler) = self.handlers.get(&job.job_type) else {
            let error = HandlerError::failed(format!("No handler for job type: {}", job.job_type));
            self.report(job_id, Err(error)).await;
            return;
        };

        let timeout = Duration::from_secs(job.timeout_secs);
        let fut = handler.handle(&job);
        let task = tokio::spawn(tokio::time::timeout(timeout, fut));
        let abort = task.abort_handle();

        let me = myself.clone();
        tokio::spawn(async move {
            let outcome = match task.await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(HandlerError::TimedOut(timeout)),
                Err(e) if e.is_panic() => Err(HandlerError::Panicked(panic_message(e.into_panic()))),
                // Aborted by Abandon/Shutdown, which already reported the job.
                Err(_) => return,
            };
            let _ = me.send_message(WorkerMessage::Finished { job_id, outcome });
        });

        self.current = Some(InFlight { job_id, abort });
    }

    async fn report(&self, job_id: JobId, outcome: Result<JobResult, HandlerError>) {
        let result = match outcome {
            Ok(_) => self.queue.mark_succeeded(job_id, &self.worker_id).await,
            Err(error) => self.queue.mark_failed(job_id, &self.worker_id, error).await,
        };
        if let Err(e) = result {
            tracing::warn!(
                worker_id = %self.worker_id,
                "Could not report job {}: {}",
                job_id,
                e
            );
        }
    }

    async fn abandon(&mut self, reason: String) {
        if let Some(in_flight) = self.current.take() {
            in_flight.abort.abort();
            tracing::warn!(
                worker_id = %self.worker_id,
                "Abandoning job {}: {}",
                in_flight.job_id,
                reason
            );
            self.report(in_flight.job_id, Err(HandlerError::Abandoned(reason)))
                .await;
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Worker actor arguments.
pub struct WorkerArgs {
    pub worker_id: String,
    pub queue: JobQueue,
    pub handlers: Arc<HandlerRegistry>,
    pub event_tx: broadcast::Sender<JobEvent>,
    pub poll_interval: Duration,
}

/// Worker actor that executes jobs.
pub struct WorkerActor;

impl Actor for WorkerActor {
    type Msg = WorkerMessage;
    type State = WorkerActorState;
    type Arguments = WorkerArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting worker: {}", args.worker_id);

        // Poll loop; ends once the actor is gone.
        let myself_clone = myself.clone();
        let poll_interval = args.poll_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if myself_clone.send_message(WorkerMessage::Poll).is_err() {
                    break;
                }
            }
        });

        let _ = args.event_tx.send(JobEvent::WorkerStarted {
            worker_id: args.worker_id.clone(),
            timestamp: Utc::now(),
        });

        Ok(WorkerActorState {
            worker_id: args.worker_id,
            queue: args.queue,
            handlers: args.handlers,
            current: None,
            event_tx: args.event_tx,
            accepting: true,
        })
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if let Some(in_flight) = state.current.take() {
            in_flight.abort.abort();
            tracing::warn!(
                worker_id = %state.worker_id,
                "Stopped with job {} in flight; its lease will expire",
                in_flight.job_id
            );
        }
        let _ = state.event_tx.send(JobEvent::WorkerStopped {
            worker_id: state.worker_id.clone(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::Poll => {
                if !state.accepting || !state.is_idle() {
                    return Ok(());
                }
                match state.queue.dequeue_next(&state.worker_id).await {
                    Ok(Some(job)) => state.start(&myself, job).await,
                    Ok(None) => {}
                    Err(e) => {
                        return Err(ActorProcessingErr::from(format!(
                            "Queue unreachable from {}: {}",
                            state.worker_id, e
                        )));
                    }
                }
            }

            WorkerMessage::Finished { job_id, outcome } => {
                // Stale results from a job we already gave up are dropped.
                if state.current.as_ref().map(|c| c.job_id) != Some(job_id) {
                    return Ok(());
                }
                state.current = None;
                state.report(job_id, outcome).await;

                if state.accepting {
                    myself.send_message(WorkerMessage::Poll)?;
                }
            }

            WorkerMessage::Drain => {
                state.accepting = false;
            }

            WorkerMessage::Abandon { reason, reply } => {
                state.abandon(reason).await;
                let _ = reply.send(());
            }

            WorkerMessage::IsIdle { reply } => {
                let _ = reply.send(state.is_idle());
            }

            WorkerMessage::Shutdown => {
                tracing::info!("Shutting down worker: {}", state.worker_id);
                state.accepting = false;
                state.abandon("worker shutting down".to_string()).await;
                myself.stop(None);
            }

            #[cfg(test)]
            WorkerMessage::Crash => {
                return Err(ActorProcessingErr::from(format!(
                    "{} crashed on request",
                    state.worker_id
                )));
            }
        }

        Ok(())
    }
}
