//! Job repository: active jobs and their archived history.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dispatch_core::{Job, JobId};
use serde::{Deserialize, Serialize};

use crate::{Database, DbError};

/// Fields selected for every job read; SurrealDB requires ORDER BY fields
/// to be part of the selection.
const JOB_FIELDS: &str = "job_id, job_type, status, enqueued_ms, updated_ms, data";

/// Internal record type for SurrealDB.
#[derive(Debug, Serialize, Deserialize)]
struct JobRecord {
    job_id: String,
    job_type: String,
    status: String,
    enqueued_ms: i64,
    updated_ms: i64,
    data: String,
}

impl JobRecord {
    fn from_job(job: &Job) -> Result<Self, DbError> {
        Ok(Self {
            job_id: job.id.to_string(),
            job_type: job.job_type.clone(),
            status: job.status.as_str().to_string(),
            enqueued_ms: job.enqueued_at.timestamp_millis(),
            updated_ms: job.updated_at.timestamp_millis(),
            data: serde_json::to_string(job)?,
        })
    }

    fn into_job(self) -> Result<Job, DbError> {
        Ok(serde_json::from_str(&self.data)?)
    }
}

#[derive(Deserialize)]
struct CountRecord {
    count: i64,
}

/// Repository for job persistence operations.
#[derive(Clone)]
pub struct JobRepository {
    db: Database,
}

impl JobRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a new job in the database.
    pub async fn create(&self, job: &Job) -> Result<(), DbError> {
        let record = JobRecord::from_job(job)?;
        self.db
            .client()
            .query("CREATE type::thing('job', $id) CONTENT $record")
            .bind(("id", record.job_id.clone()))
            .bind(("record", record))
            .await?
            .check()?;
        Ok(())
    }

    /// Overwrite a job, creating it if missing.
    pub async fn update(&self, job: &Job) -> Result<(), DbError> {
        let record = JobRecord::from_job(job)?;
        self.db
            .client()
            .query("UPSERT type::thing('job', $id) CONTENT $record")
            .bind(("id", record.job_id.clone()))
            .bind(("record", record))
            .await?
            .check()?;
        Ok(())
    }

    /// Move a terminal job to history in one transaction.
    pub async fn archive(&self, job: &Job) -> Result<(), DbError> {
        if !job.status.is_terminal() {
            return Err(DbError::Query(format!(
                "Refusing to archive {} job {}",
                job.status.as_str(),
                job.id
            )));
        }

        let record = JobRecord::from_job(job)?;
        self.db
            .client()
            .query(
                r#"
                BEGIN TRANSACTION;
                DELETE type::thing('job', $id);
                UPSERT type::thing('job_history', $id) CONTENT $record;
                COMMIT TRANSACTION;
                "#,
            )
            .bind(("id", record.job_id.clone()))
            .bind(("record", record))
            .await?
            .check()?;
        Ok(())
    }

    /// Get a job by ID, looking in history when it is no longer active.
    pub async fn get(&self, id: JobId) -> Result<Job, DbError> {
        let query = format!(
            "SELECT {fields} FROM type::thing('job', $id); SELECT {fields} FROM type::thing('job_history', $id);",
            fields = JOB_FIELDS
        );
        let mut response = self
            .db
            .client()
            .query(&query)
            .bind(("id", id.to_string()))
            .await?;

        let active: Option<JobRecord> = response.take(0)?;
        let archived: Option<JobRecord> = response.take(1)?;

        active
            .or(archived)
            .ok_or_else(|| DbError::NotFound(format!("Job not found: {}", id)))?
            .into_job()
    }

    /// Active jobs in enqueue order.
    pub async fn list_active(&self) -> Result<Vec<Job>, DbError> {
        let query = format!("SELECT {} FROM job ORDER BY enqueued_ms ASC", JOB_FIELDS);
        let mut response = self.db.client().query(&query).await?;
        let records: Vec<JobRecord> = response.take(0)?;
        records.into_iter().map(JobRecord::into_job).collect()
    }

    /// Archived jobs, most recently finished first.
    pub async fn list_history(&self, limit: usize) -> Result<Vec<Job>, DbError> {
        let query = format!(
            "SELECT {} FROM job_history ORDER BY updated_ms DESC LIMIT $limit",
            JOB_FIELDS
        );
        let mut response = self
            .db
            .client()
            .query(&query)
            .bind(("limit", limit as i64))
            .await?;
        let records: Vec<JobRecord> = response.take(0)?;
        records.into_iter().map(JobRecord::into_job).collect()
    }

    /// Delete archived jobs last updated before `before`.
    pub async fn purge_history(&self, before: DateTime<Utc>) -> Result<u64, DbError> {
        let mut response = self
            .db
            .client()
            .query(
                r#"
                SELECT count() AS count FROM job_history WHERE updated_ms < $before GROUP ALL;
                DELETE job_history WHERE updated_ms < $before;
                "#,
            )
            .bind(("before", before.timestamp_millis()))
            .await?;

        let counts: Vec<CountRecord> = response.take(0)?;
        Ok(counts.first().map(|c| c.count.max(0) as u64).unwrap_or(0))
    }

    /// Count active jobs by status.
    pub async fn count_by_status(&self) -> Result<HashMap<String, u64>, DbError> {
        #[derive(Deserialize)]
        struct StatusCount {
            status: String,
            count: i64,
        }

        let mut response = self
            .db
            .client()
            .query("SELECT status, count() AS count FROM job GROUP BY status")
            .await?;
        let counts: Vec<StatusCount> = response.take(0)?;

        Ok(counts
            .into_iter()
            .map(|c| (c.status, c.count.max(0) as u64))
            .collect())
    }
}
