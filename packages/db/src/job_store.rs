//! Durable `JobStore` backed by the job repository.

use chrono::{DateTime, Utc};
use dispatch_core::{Job, JobId, JobStore, StoreError};

use crate::repositories::JobRepository;
use crate::{Database, DbError};

/// Job store persisting to SurrealDB, so pending jobs survive a restart.
#[derive(Clone)]
pub struct SurrealJobStore {
    jobs: JobRepository,
}

impl SurrealJobStore {
    pub fn new(db: Database) -> Self {
        Self {
            jobs: JobRepository::new(db),
        }
    }

    pub fn repository(&self) -> &JobRepository {
        &self.jobs
    }
}

impl JobStore for SurrealJobStore {
    async fn insert(&self, job: &Job) -> Result<(), StoreError> {
        Ok(self.jobs.create(job).await?)
    }

    async fn update(&self, job: &Job) -> Result<(), StoreError> {
        Ok(self.jobs.update(job).await?)
    }

    async fn archive(&self, job: &Job) -> Result<(), StoreError> {
        Ok(self.jobs.archive(job).await?)
    }

    async fn load_unfinished(&self) -> Result<Vec<Job>, StoreError> {
        Ok(self.jobs.list_active().await?)
    }

    async fn purge_archived(&self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(self.jobs.purge_history(before).await?)
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        match self.jobs.get(id).await {
            Ok(job) => Ok(Some(job)),
            Err(DbError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
