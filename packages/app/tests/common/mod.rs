#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use actors::{InMemoryJobStore, JobQueue};
use app::{App, AppConfig, AppError};
use dispatch_core::{
    DataError, Job, JobId, Network, NetworkParams, NetworkStore, QueueConfig, QueueError,
    RetryPolicy,
};
use storage::{Storage, StorageConfig};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Networks kept in a vector, in creation order.
///
/// `fail_next_finds` makes the following lookups fail with a backend error.
#[derive(Default)]
pub struct MemoryNetworks {
    rows: Mutex<Vec<Network>>,
    failing_finds: AtomicU32,
}

impl MemoryNetworks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next_finds(&self, n: u32) {
        self.failing_finds.store(n, Ordering::SeqCst);
    }
}

impl NetworkStore for MemoryNetworks {
    async fn find(&self, id: Uuid) -> Result<Network, DataError> {
        let failing = self
            .failing_finds
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(DataError::Backend("connection reset".into()));
        }
        self.rows
            .lock()
            .await
            .iter()
            .find(|n| n.id == id)
            .cloned()
            .ok_or_else(|| DataError::network_not_found(id))
    }

    async fn all(&self) -> Result<Vec<Network>, DataError> {
        Ok(self.rows.lock().await.clone())
    }

    async fn page(&self, page: usize, per_page: usize) -> Result<Vec<Network>, DataError> {
        let start = page.saturating_sub(1).saturating_mul(per_page);
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .skip(start)
            .take(per_page)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<u64, DataError> {
        Ok(self.rows.lock().await.len() as u64)
    }

    async fn create(&self, params: NetworkParams) -> Result<Network, DataError> {
        let network = Network::build(params)?;
        self.rows.lock().await.push(network.clone());
        Ok(network)
    }

    async fn update(&self, id: Uuid, params: NetworkParams) -> Result<Network, DataError> {
        let mut rows = self.rows.lock().await;
        let row = rows
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| DataError::network_not_found(id))?;
        let updated = row.apply(params)?;
        *row = updated.clone();
        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> Result<(), DataError> {
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|n| n.id != id);
        if rows.len() == before {
            return Err(DataError::network_not_found(id));
        }
        Ok(())
    }
}

/// One worker, no backoff and short polling.
pub fn fast_config() -> AppConfig {
    AppConfig::default()
        .with_queue(
            QueueConfig::default()
                .with_concurrency(1)
                .with_retry(RetryPolicy::immediate())
                .with_poll_interval(Duration::from_millis(10))
                .with_sweep_interval(Duration::from_millis(50))
                .with_shutdown_timeout(Duration::from_secs(5)),
        )
        .with_storage(StorageConfig::memory())
        .with_delivery_timeout(Duration::from_millis(200))
}

pub async fn start_app(
    config: AppConfig,
    networks: Arc<MemoryNetworks>,
) -> Result<App<MemoryNetworks>, AppError> {
    let sink = Storage::new(config.storage.clone()).await?;
    App::assemble(config, networks, InMemoryJobStore::new(), sink).await
}

/// Poll until the job reaches a terminal status or five seconds pass.
pub async fn wait_until_finished(queue: &JobQueue, job_id: JobId) -> Result<Job, QueueError> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let job = queue
            .get(job_id)
            .await?
            .ok_or(QueueError::JobNotFound(job_id))?;
        if job.status.is_terminal() || tokio::time::Instant::now() >= deadline {
            return Ok(job);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
