//! Job domain types for deferred work items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for a job, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current status of a job in its lifecycle.
///
/// Transitions only move forward: `Pending -> Running -> Succeeded | Failed`,
/// with `Running -> Pending` when a failed attempt is scheduled for retry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting to be claimed (possibly still inside its backoff window).
    #[default]
    Pending,
    /// Job is owned by exactly one executor.
    Running {
        started_at: DateTime<Utc>,
        worker_id: String,
        lease_expires_at: DateTime<Utc>,
    },
    /// Handler returned success.
    Succeeded {
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    },
    /// Retries exhausted. Never eligible again.
    Failed {
        failed_at: DateTime<Utc>,
        error: String,
    },
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded { .. } | JobStatus::Failed { .. })
    }

    /// The worker currently owning the job, if running.
    pub fn owner(&self) -> Option<&str> {
        match self {
            JobStatus::Running { worker_id, .. } => Some(worker_id),
            _ => None,
        }
    }

    /// Get a simple status string for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running { .. } => "running",
            JobStatus::Succeeded { .. } => "succeeded",
            JobStatus::Failed { .. } => "failed",
        }
    }
}

/// Result of a successful handler invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    /// Human-readable summary of the result.
    pub summary: String,
    /// Optional structured output data as JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
}

impl JobResult {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            output: None,
        }
    }

    pub fn with_output(summary: impl Into<String>, output: serde_json::Value) -> Self {
        Self {
            summary: summary.into(),
            output: Some(output),
        }
    }
}

/// A job represents a unit of deferred work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for this job.
    pub id: JobId,
    /// Type of job (used for routing to handlers).
    pub job_type: String,
    /// Job payload as JSON.
    pub payload: serde_json::Value,
    /// Current status.
    pub status: JobStatus,
    /// Number of execution attempts so far.
    #[serde(default)]
    pub attempts: u32,
    /// Failed attempts tolerated before the job is marked failed.
    pub max_retries: u32,
    /// Timeout in seconds for a single handler invocation.
    pub timeout_secs: u64,
    /// Error reported by the most recent failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// When the job was submitted.
    pub enqueued_at: DateTime<Utc>,
    /// Earliest time the job may be claimed again.
    pub available_at: DateTime<Utc>,
    /// When the job was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(job_type: impl Into<String>, payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            job_type: job_type.into(),
            payload,
            status: JobStatus::Pending,
            attempts: 0,
            max_retries: 3,
            timeout_secs: 300, // 5 minutes default
            last_error: None,
            enqueued_at: now,
            available_at: now,
            updated_at: now,
        }
    }

    /// Set the max retries for this job.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the timeout for this job.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Whether another attempt is allowed after the current one failed.
    ///
    /// `attempts` already counts the attempt that just failed, so a job may
    /// run at most `max_retries + 1` times.
    pub fn can_retry(&self) -> bool {
        self.attempts <= self.max_retries
    }

    /// Pending and past its backoff window.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, JobStatus::Pending) && self.available_at <= now
    }
}
