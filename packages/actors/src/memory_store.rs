//! In-process job store for tests and embedded use without a database.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dispatch_core::{Job, JobId, JobStore, StoreError};
use tokio::sync::Mutex;

#[derive(Default)]
struct Tables {
    active: HashMap<JobId, Job>,
    archived: HashMap<JobId, Job>,
}

/// Job store holding everything in memory.
///
/// Clones share the same tables, so a test can keep one handle to inspect
/// what the queue wrote through.
#[derive(Clone, Default)]
pub struct InMemoryJobStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store as if a previous process had left `job` behind.
    pub async fn seed(&self, job: Job) {
        self.tables.lock().await.active.insert(job.id, job);
    }

    pub async fn active_count(&self) -> usize {
        self.tables.lock().await.active.len()
    }

    pub async fn archived(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.tables.lock().await.archived.values().cloned().collect();
        jobs.sort_by_key(|job| job.id);
        jobs
    }
}

impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: &Job) -> Result<(), StoreError> {
        self.tables.lock().await.active.insert(job.id, job.clone());
        Ok(())
    }

    async fn update(&self, job: &Job) -> Result<(), StoreError> {
        self.tables.lock().await.active.insert(job.id, job.clone());
        Ok(())
    }

    async fn archive(&self, job: &Job) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        tables.active.remove(&job.id);
        tables.archived.insert(job.id, job.clone());
        Ok(())
    }

    async fn load_unfinished(&self) -> Result<Vec<Job>, StoreError> {
        Ok(self
            .tables
            .lock()
            .await
            .active
            .values()
            .filter(|job| !job.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn purge_archived(&self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock().await;
        let len = tables.archived.len();
        tables.archived.retain(|_, job| job.updated_at >= before);
        Ok((len - tables.archived.len()) as u64)
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .active
            .get(&id)
            .or_else(|| tables.archived.get(&id))
            .cloned())
    }
}
