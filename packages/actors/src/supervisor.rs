//! Supervisor actor owning the worker executors of a pool.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use chrono::Utc;
use dispatch_core::{JobEvent, QueueError};
use ractor::{Actor, ActorCell, ActorId, ActorProcessingErr, ActorRef, SupervisionEvent};

use crate::job_queue::JobQueue;
use crate::messages::{SupervisorMessage, WorkerMessage};
use crate::worker_actor::{WorkerActor, WorkerArgs};

/// More crashes than this inside [`RESTART_WINDOW`] stops worker replacement.
const MAX_RESTARTS: usize = 10;
const RESTART_WINDOW: Duration = Duration::from_secs(5);

/// Sliding window of recent worker crashes.
#[derive(Default)]
struct RestartBudget {
    crashes: VecDeque<Instant>,
}

impl RestartBudget {
    /// Record a crash. False once the budget for the window is spent.
    fn allow(&mut self, now: Instant) -> bool {
        while self
            .crashes
            .front()
            .is_some_and(|t| now.duration_since(*t) > RESTART_WINDOW)
        {
            self.crashes.pop_front();
        }
        self.crashes.push_back(now);
        self.crashes.len() <= MAX_RESTARTS
    }

    fn recent(&self) -> usize {
        self.crashes.len()
    }
}

/// State for the supervisor actor.
pub struct SupervisorState {
    queue: JobQueue,
    /// Live workers by actor ID.
    workers: HashMap<ActorId, (String, ActorRef<WorkerMessage>)>,
    /// Worker counter for unique IDs.
    worker_counter: u64,
    /// Set once shutdown starts; crashed workers are no longer replaced.
    stopping: bool,
    restarts: RestartBudget,
}

impl SupervisorState {
    /// Generate a unique worker ID.
    fn next_worker_id(&mut self) -> String {
        self.worker_counter += 1;
        format!("worker-{}", self.worker_counter)
    }
}

async fn spawn_worker(
    myself: &ActorRef<SupervisorMessage>,
    state: &mut SupervisorState,
) -> Result<(), ActorProcessingErr> {
    let worker_id = state.next_worker_id();
    let args = WorkerArgs {
        worker_id: worker_id.clone(),
        queue: state.queue.clone(),
        handlers: state.queue.handlers(),
        event_tx: state.queue.event_sender(),
        poll_interval: state.queue.config().poll_interval(),
    };

    let (worker, _handle) = Actor::spawn_linked(None, WorkerActor, args, myself.get_cell())
        .await
        .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn worker: {}", e)))?;

    state.workers.insert(worker.get_id(), (worker_id, worker));
    Ok(())
}

/// Supervisor arguments.
pub struct SupervisorArgs {
    pub queue: JobQueue,
    pub concurrency: usize,
}

/// Supervisor actor that manages the workers of one pool.
pub struct Supervisor;

impl Actor for Supervisor {
    type Msg = SupervisorMessage;
    type State = SupervisorState;
    type Arguments = SupervisorArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting worker pool supervisor ({} workers)", args.concurrency);

        // Start periodic tick
        let myself_clone = myself.clone();
        let sweep_interval = args.queue.config().sweep_interval();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);
            loop {
                interval.tick().await;
                if myself_clone.send_message(SupervisorMessage::Tick).is_err() {
                    break;
                }
            }
        });

        let mut state = SupervisorState {
            queue: args.queue,
            workers: HashMap::new(),
            worker_counter: 0,
            stopping: false,
            restarts: RestartBudget::default(),
        };
        for _ in 0..args.concurrency {
            spawn_worker(&myself, &mut state).await?;
        }

        Ok(state)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisorMessage::Drain => {
                for (_, worker) in state.workers.values() {
                    let _ = worker.send_message(WorkerMessage::Drain);
                }
            }

            SupervisorMessage::AllIdle { reply } => {
                let mut all_idle = true;
                for (_, worker) in state.workers.values() {
                    let result = ractor::rpc::call(
                        worker,
                        |reply| WorkerMessage::IsIdle { reply },
                        Some(Duration::from_secs(5)),
                    )
                    .await;
                    // A worker that cannot answer is treated as busy.
                    if !matches!(result, Ok(ractor::rpc::CallResult::Success(true))) {
                        all_idle = false;
                        break;
                    }
                }
                let _ = reply.send(all_idle);
            }

            SupervisorMessage::AbandonAll { reason, reply } => {
                for (worker_id, worker) in state.workers.values() {
                    let result = ractor::rpc::call(
                        worker,
                        |reply| WorkerMessage::Abandon {
                            reason: reason.clone(),
                            reply,
                        },
                        Some(Duration::from_secs(5)),
                    )
                    .await;
                    if !matches!(result, Ok(ractor::rpc::CallResult::Success(()))) {
                        tracing::warn!("Worker {} did not confirm abandon", worker_id);
                    }
                }
                let _ = reply.send(());
            }

            SupervisorMessage::WorkerCount { reply } => {
                let _ = reply.send(state.workers.len());
            }

            SupervisorMessage::Shutdown => {
                tracing::info!("Shutting down worker pool supervisor");
                state.stopping = true;
                for (_, worker) in state.workers.values() {
                    let _ = worker.send_message(WorkerMessage::Shutdown);
                }
                myself.stop(None);
            }

            #[cfg(test)]
            SupervisorMessage::CrashWorkers => {
                for (_, worker) in state.workers.values() {
                    let _ = worker.send_message(WorkerMessage::Crash);
                }
            }

            SupervisorMessage::Tick => {
                if let Err(e) = state.queue.sweep_in_background() {
                    tracing::warn!("Failed to request lease sweep: {}", e);
                }
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisionEvent::ActorFailed(cell, reason) => {
                let reason = reason.to_string();
                let Some(worker_id) = forget_worker(state, &cell) else {
                    return Ok(());
                };
                tracing::error!("Worker {} crashed: {}", worker_id, reason);

                let _ = state.queue.event_sender().send(JobEvent::WorkerCrashed {
                    worker_id: worker_id.clone(),
                    reason: reason.clone(),
                    timestamp: Utc::now(),
                });

                match state.queue.release_worker(&worker_id, &reason).await {
                    Ok(0) => {}
                    Ok(n) => tracing::warn!("Requeued {} jobs from crashed {}", n, worker_id),
                    Err(QueueError::Unavailable(e)) => {
                        // A replacement would fail on its first poll.
                        tracing::error!("Queue unavailable, not replacing {}: {}", worker_id, e);
                        return Ok(());
                    }
                    Err(e) => tracing::warn!("Could not release jobs of {}: {}", worker_id, e),
                }

                if state.stopping {
                    return Ok(());
                }
                if !state.restarts.allow(Instant::now()) {
                    tracing::error!(
                        "{} worker crashes within {:?}, not replacing {}",
                        state.restarts.recent(),
                        RESTART_WINDOW,
                        worker_id
                    );
                    return Ok(());
                }
                spawn_worker(&myself, state).await?;
            }
            SupervisionEvent::ActorTerminated(cell, _, _) => {
                if let Some(worker_id) = forget_worker(state, &cell) {
                    tracing::debug!("Worker {} terminated", worker_id);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn forget_worker(state: &mut SupervisorState, cell: &ActorCell) -> Option<String> {
    state
        .workers
        .remove(&cell.get_id())
        .map(|(worker_id, _)| worker_id)
}
