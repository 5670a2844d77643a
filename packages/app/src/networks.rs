//! Network operations as an HTTP layer would call them.

use std::sync::Arc;

use actors::{BroadcastTrigger, JobQueue, TopicHub};
use dispatch_core::{DataError, JobId, Network, NetworkParams, NetworkStore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::export::{ExportPayload, EXPORT_JOB_TYPE};
use crate::AppError;

/// Topic that receives the network count after every create or update.
pub const COUNT_TOPIC: &str = "networks_count_channel";

pub const PER_PAGE: usize = 10;

/// Payload published on [`COUNT_TOPIC`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountSummary {
    pub count: u64,
}

pub struct NetworkService<N> {
    networks: Arc<N>,
    queue: JobQueue,
    trigger: BroadcastTrigger,
}

impl<N: NetworkStore> NetworkService<N> {
    pub fn new(networks: Arc<N>, queue: JobQueue, hub: Arc<TopicHub>) -> Self {
        Self {
            networks,
            queue,
            trigger: BroadcastTrigger::new(hub, COUNT_TOPIC),
        }
    }

    pub fn store(&self) -> &Arc<N> {
        &self.networks
    }

    /// One page of networks, [`PER_PAGE`] at a time. Pages start at 1; `None` means the first.
    pub async fn list(&self, page: Option<usize>) -> Result<Vec<Network>, AppError> {
        let page = page.unwrap_or(1).max(1);
        Ok(self.networks.page(page, PER_PAGE).await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<Network, AppError> {
        Ok(self.networks.find(id).await?)
    }

    pub async fn create(&self, params: NetworkParams) -> Result<Network, AppError> {
        let network = self.networks.create(params).await?;
        tracing::info!(network_id = %network.id, "Network created");
        self.broadcast_count().await;
        Ok(network)
    }

    pub async fn update(&self, id: Uuid, params: NetworkParams) -> Result<Network, AppError> {
        let network = self.networks.update(id, params).await?;
        tracing::info!(network_id = %network.id, "Network updated");
        self.broadcast_count().await;
        Ok(network)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        self.networks.delete(id).await?;
        tracing::info!(network_id = %id, "Network deleted");
        Ok(())
    }

    /// Queue an export of the first network and return without waiting for it.
    pub async fn export(&self) -> Result<JobId, AppError> {
        let first = self
            .networks
            .page(1, 1)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DataError::NotFound {
                entity: "Network",
                id: "first".into(),
            })?;

        let payload = ExportPayload {
            network_id: first.id,
        };
        let job_id = self.queue.enqueue(EXPORT_JOB_TYPE, payload.to_value()).await?;
        tracing::info!(job_id = %job_id, network_id = %first.id, "Export queued");
        Ok(job_id)
    }

    /// Publish the current count. Failures are logged and never reach the caller.
    async fn broadcast_count(&self) {
        let count = match self.networks.count().await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!("Skipping count broadcast: {}", e);
                return;
            }
        };
        let report = self.trigger.fire(&CountSummary { count }).await;
        tracing::debug!(
            count,
            delivered = report.delivered,
            removed = report.removed,
            "Broadcast network count"
        );
    }
}
