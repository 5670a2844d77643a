//! Queue actor owning every job record.
//!
//! The actor mailbox is the queue's critical section: enqueue, claim and
//! every status transition are processed one message at a time, so two
//! workers can never claim the same job. Handlers never run here.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dispatch_core::{
    Job, JobEvent, JobId, JobStatus, JobStore, QueueConfig, QueueError, QueueStats,
};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::sync::broadcast;

use crate::handler::HandlerRegistry;
use crate::messages::QueueMessage;

/// Arguments for spawning a queue actor.
pub struct QueueArgs<S> {
    pub config: QueueConfig,
    pub handlers: Arc<HandlerRegistry>,
    pub store: Arc<S>,
    pub event_tx: broadcast::Sender<JobEvent>,
}

/// State for the queue actor.
pub struct QueueActorState<S> {
    config: QueueConfig,
    handlers: Arc<HandlerRegistry>,
    store: Arc<S>,
    /// All jobs still held in memory, by ID.
    jobs: HashMap<JobId, Job>,
    /// Pending jobs keyed by enqueue sequence (FIFO).
    pending: BTreeMap<u64, JobId>,
    /// Enqueue sequence of each job; retries keep their original slot.
    order: HashMap<JobId, u64>,
    next_seq: u64,
    running: HashSet<JobId>,
    /// Terminal jobs in the order they finished, for retention eviction.
    finished: VecDeque<(DateTime<Utc>, JobId)>,
    stats: QueueStats,
    event_tx: broadcast::Sender<JobEvent>,
}

// Clamped to ~136 years so date arithmetic cannot overflow.
fn secs(n: u64) -> chrono::Duration {
    chrono::Duration::seconds(n.min(u64::from(u32::MAX)) as i64)
}

fn to_chrono(d: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| secs(u64::MAX))
}

impl<S: JobStore> QueueActorState<S> {
    fn new(args: QueueArgs<S>) -> Self {
        Self {
            config: args.config,
            handlers: args.handlers,
            store: args.store,
            jobs: HashMap::new(),
            pending: BTreeMap::new(),
            order: HashMap::new(),
            next_seq: 0,
            running: HashSet::new(),
            finished: VecDeque::new(),
            stats: QueueStats::default(),
            event_tx: args.event_tx,
        }
    }

    /// Broadcast an event.
    fn emit(&self, event: JobEvent) {
        tracing::debug!("{}", event.description());
        let _ = self.event_tx.send(event);
    }

    fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.pending.len() as u64,
            running: self.running.len() as u64,
            ..self.stats.clone()
        }
    }

    fn push_pending(&mut self, job_id: JobId) {
        let seq = *self.order.entry(job_id).or_insert_with(|| {
            let seq = self.next_seq;
            self.next_seq += 1;
            seq
        });
        self.pending.insert(seq, job_id);
    }

    /// Load unfinished jobs left behind by a previous process.
    ///
    /// Jobs found running lost their executor; they count as a failed attempt.
    async fn recover(&mut self) -> Result<(), QueueError> {
        let mut jobs = self.store.load_unfinished().await?;
        if jobs.is_empty() {
            return Ok(());
        }
        jobs.sort_by_key(|job| (job.enqueued_at, job.id));

        let recovered = jobs.len();
        for job in jobs {
            let job_id = job.id;
            let was_running = matches!(job.status, JobStatus::Running { .. });
            self.jobs.insert(job_id, job);
            if was_running {
                self.running.insert(job_id);
                self.fail(job_id, "executor lost across restart".to_string())
                    .await;
            } else {
                self.push_pending(job_id);
            }
        }

        tracing::info!("Recovered {} unfinished jobs", recovered);
        Ok(())
    }

    async fn enqueue(
        &mut self,
        job_type: String,
        payload: serde_json::Value,
    ) -> Result<Job, QueueError> {
        if !self.handlers.has_handler(&job_type) {
            return Err(QueueError::UnknownJobType(job_type));
        }

        let job = Job::new(job_type, payload)
            .with_max_retries(self.config.default_max_retries)
            .with_timeout(self.config.default_timeout_secs);

        self.store.insert(&job).await?;

        self.jobs.insert(job.id, job.clone());
        self.push_pending(job.id);

        self.emit(JobEvent::JobEnqueued {
            job: job.clone(),
            timestamp: Utc::now(),
        });

        Ok(job)
    }

    async fn dequeue(&mut self, worker_id: String) -> Option<Job> {
        let now = Utc::now();
        let (seq, job_id) = self
            .pending
            .iter()
            .find(|(_, id)| self.jobs.get(id).is_some_and(|job| job.is_eligible(now)))
            .map(|(seq, id)| (*seq, *id))?;

        let timeout_secs = self.jobs.get(&job_id)?.timeout_secs;
        let lease = secs(timeout_secs.saturating_add(self.config.lease_grace_secs));

        self.pending.remove(&seq);
        let job = self.jobs.get_mut(&job_id)?;
        let previous = job.clone();

        job.attempts = job.attempts.saturating_add(1);
        job.status = JobStatus::Running {
            started_at: now,
            worker_id: worker_id.clone(),
            lease_expires_at: now + lease,
        };
        job.updated_at = now;
        let claimed = job.clone();

        if let Err(e) = self.store.update(&claimed).await {
            tracing::warn!("Failed to mark job {} running: {}", job_id, e);
            self.jobs.insert(job_id, previous);
            self.pending.insert(seq, job_id);
            return None;
        }

        self.running.insert(job_id);
        self.emit(JobEvent::JobStarted {
            job_id,
            worker_id,
            attempt: claimed.attempts,
            timestamp: now,
        });

        Some(claimed)
    }

    fn check_owner(&self, job_id: JobId, worker_id: &str) -> Result<(), QueueError> {
        let job = self
            .jobs
            .get(&job_id)
            .ok_or(QueueError::JobNotFound(job_id))?;
        match job.status.owner() {
            Some(owner) if owner == worker_id => Ok(()),
            Some(owner) => Err(QueueError::NotOwner {
                job_id,
                owner: owner.to_string(),
                worker_id: worker_id.to_string(),
            }),
            None => Err(QueueError::NotRunning(job_id)),
        }
    }

    async fn complete(&mut self, job_id: JobId, worker_id: &str) -> Result<(), QueueError> {
        self.check_owner(job_id, worker_id)?;

        let now = Utc::now();
        let job = self
            .jobs
            .get_mut(&job_id)
            .ok_or(QueueError::JobNotFound(job_id))?;
        let started_at = match &job.status {
            JobStatus::Running { started_at, .. } => *started_at,
            _ => now,
        };
        job.status = JobStatus::Succeeded {
            started_at,
            finished_at: now,
        };
        job.updated_at = now;
        let done = job.clone();

        self.running.remove(&job_id);
        self.finished.push_back((now, job_id));
        self.stats.succeeded += 1;

        if let Err(e) = self.store.archive(&done).await {
            tracing::warn!("Failed to archive job {}: {}", job_id, e);
        }

        let duration_ms = (now - started_at).num_milliseconds().max(0) as u64;
        tracing::info!(
            job_id = %job_id,
            job_type = %done.job_type,
            attempts = done.attempts,
            "Job succeeded in {}ms",
            duration_ms
        );
        self.emit(JobEvent::JobSucceeded {
            job_id,
            attempts: done.attempts,
            duration_ms,
            timestamp: now,
        });

        Ok(())
    }

    /// Failure path shared by handler errors, lease expiry and lost executors.
    ///
    /// The job must currently be running.
    async fn fail(&mut self, job_id: JobId, error: String) {
        let now = Utc::now();
        let Some(job) = self.jobs.get_mut(&job_id) else {
            return;
        };

        let will_retry = job.can_retry();
        job.last_error = Some(error.clone());
        job.updated_at = now;
        if will_retry {
            let delay = self.config.retry.delay_for_attempt(job.attempts);
            job.status = JobStatus::Pending;
            job.available_at = now + to_chrono(delay);
        } else {
            job.status = JobStatus::Failed {
                failed_at: now,
                error: error.clone(),
            };
        }
        let snapshot = job.clone();
        self.running.remove(&job_id);

        if will_retry {
            self.push_pending(job_id);
            self.stats.retried += 1;
            if let Err(e) = self.store.update(&snapshot).await {
                tracing::warn!("Failed to mark job {} pending: {}", job_id, e);
            }
            tracing::warn!(
                job_id = %job_id,
                job_type = %snapshot.job_type,
                attempts = snapshot.attempts,
                retry_at = %snapshot.available_at,
                "Job attempt failed: {}",
                error
            );
        } else {
            self.finished.push_back((now, job_id));
            self.stats.failed += 1;
            if let Err(e) = self.store.archive(&snapshot).await {
                tracing::warn!("Failed to archive job {}: {}", job_id, e);
            }
            tracing::error!(
                job_id = %job_id,
                job_type = %snapshot.job_type,
                attempts = snapshot.attempts,
                "Retry limit exceeded: {}",
                error
            );
        }

        self.emit(JobEvent::JobFailed {
            job_id,
            job_type: snapshot.job_type,
            error,
            attempts: snapshot.attempts,
            will_retry,
            timestamp: now,
        });
    }

    async fn reclaim(&mut self, job_id: JobId, worker_id: String, reason: String) {
        self.emit(JobEvent::JobReclaimed {
            job_id,
            worker_id,
            reason: reason.clone(),
            timestamp: Utc::now(),
        });
        self.fail(job_id, reason).await;
    }

    fn running_owned_by(&self, predicate: impl Fn(&JobStatus) -> bool) -> Vec<(JobId, String)> {
        let mut owned: Vec<(JobId, String)> = self
            .running
            .iter()
            .filter_map(|id| self.jobs.get(id))
            .filter(|job| predicate(&job.status))
            .filter_map(|job| job.status.owner().map(|owner| (job.id, owner.to_string())))
            .collect();
        owned.sort();
        owned
    }

    async fn release_worker(&mut self, worker_id: &str, reason: &str) -> usize {
        let owned = self.running_owned_by(|status| status.owner() == Some(worker_id));
        let released = owned.len();
        for (job_id, owner) in owned {
            self.reclaim(job_id, owner, format!("executor lost: {}", reason))
                .await;
        }
        released
    }

    async fn sweep(&mut self) -> usize {
        let now = Utc::now();

        let expired = self.running_owned_by(|status| {
            matches!(status, JobStatus::Running { lease_expires_at, .. } if *lease_expires_at <= now)
        });
        let reclaimed = expired.len();
        for (job_id, owner) in expired {
            self.reclaim(job_id, owner, "lease expired".to_string()).await;
        }

        let retention = secs(self.config.retention_secs);
        while let Some((finished_at, job_id)) = self.finished.front().copied() {
            if now - finished_at < retention {
                break;
            }
            self.finished.pop_front();
            self.jobs.remove(&job_id);
            self.order.remove(&job_id);
        }

        let history = secs(self.config.history_retention_secs);
        match self.store.purge_archived(now - history).await {
            Ok(0) => {}
            Ok(purged) => tracing::debug!("Purged {} archived jobs", purged),
            Err(e) => tracing::warn!("Failed to purge archived jobs: {}", e),
        }

        if reclaimed > 0 {
            tracing::warn!("Reclaimed {} jobs with expired leases", reclaimed);
        }
        reclaimed
    }

    async fn get(&self, job_id: JobId) -> Option<Job> {
        if let Some(job) = self.jobs.get(&job_id) {
            return Some(job.clone());
        }
        match self.store.get(job_id).await {
            Ok(job) => job,
            Err(e) => {
                tracing::warn!("Failed to load job {}: {}", job_id, e);
                None
            }
        }
    }

    fn list(&self, status_filter: Option<&str>, limit: usize) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .values()
            .filter(|j| status_filter.is_none_or(|s| j.status.as_str() == s))
            .cloned()
            .collect();
        jobs.sort_by_key(|job| self.order.get(&job.id).copied().unwrap_or(u64::MAX));
        jobs.truncate(limit);
        jobs
    }
}

/// Queue actor that owns the job records.
pub struct QueueActor<S> {
    _store: PhantomData<fn() -> S>,
}

impl<S> QueueActor<S> {
    pub fn new() -> Self {
        Self {
            _store: PhantomData,
        }
    }
}

impl<S> Default for QueueActor<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: JobStore> Actor for QueueActor<S> {
    type Msg = QueueMessage;
    type State = QueueActorState<S>;
    type Arguments = QueueArgs<S>;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting queue actor");
        let mut state = QueueActorState::new(args);
        state
            .recover()
            .await
            .map_err(|e| ActorProcessingErr::from(format!("Failed to recover jobs: {}", e)))?;
        Ok(state)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            QueueMessage::Enqueue {
                job_type,
                payload,
                reply,
            } => {
                let _ = reply.send(state.enqueue(job_type, payload).await);
            }

            QueueMessage::Dequeue { worker_id, reply } => {
                let _ = reply.send(state.dequeue(worker_id).await);
            }

            QueueMessage::Complete {
                job_id,
                worker_id,
                reply,
            } => {
                let _ = reply.send(state.complete(job_id, &worker_id).await);
            }

            QueueMessage::Fail {
                job_id,
                worker_id,
                error,
                reply,
            } => {
                let result = match state.check_owner(job_id, &worker_id) {
                    Ok(()) => {
                        state.fail(job_id, error.to_string()).await;
                        Ok(())
                    }
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }

            QueueMessage::ReleaseWorker {
                worker_id,
                reason,
                reply,
            } => {
                let _ = reply.send(state.release_worker(&worker_id, &reason).await);
            }

            QueueMessage::GetJob { job_id, reply } => {
                let _ = reply.send(state.get(job_id).await);
            }

            QueueMessage::ListJobs {
                status_filter,
                limit,
                reply,
            } => {
                let _ = reply.send(state.list(status_filter.as_deref(), limit));
            }

            QueueMessage::GetStats { reply } => {
                let _ = reply.send(state.stats());
            }

            QueueMessage::Sweep { reply } => {
                let reclaimed = state.sweep().await;
                if let Some(reply) = reply {
                    let _ = reply.send(reclaimed);
                }
            }

            QueueMessage::Shutdown => {
                tracing::info!("Shutting down queue actor");
                myself.stop(None);
            }
        }

        Ok(())
    }
}
