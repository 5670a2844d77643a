//! Persistence contract for job records.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{Job, JobId, StoreError};

/// Durable backing for the queue.
///
/// The queue keeps the authoritative in-memory copy and writes through to the
/// store on every transition; the store is read only when the queue starts.
pub trait JobStore: Send + Sync + 'static {
    /// Persist a newly enqueued job.
    fn insert(&self, job: &Job) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Overwrite a job after a status transition.
    fn update(&self, job: &Job) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Move a terminal job to history.
    fn archive(&self, job: &Job) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Jobs that were pending or running when the process last stopped.
    fn load_unfinished(&self) -> impl Future<Output = Result<Vec<Job>, StoreError>> + Send;

    /// Drop archived jobs finished before `before`. Returns how many were removed.
    fn purge_archived(
        &self,
        before: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Look up a job that may already have been evicted from memory.
    fn get(&self, id: JobId) -> impl Future<Output = Result<Option<Job>, StoreError>> + Send;
}
