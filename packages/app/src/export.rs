//! Network export job.

use std::sync::Arc;

use actors::{HandlerFuture, JobHandler};
use dispatch_core::{HandlerError, Job, JobResult, Network, NetworkStore};
use serde::{Deserialize, Serialize};
use storage::Storage;
use uuid::Uuid;

pub const EXPORT_JOB_TYPE: &str = "networks_export";

/// Object key the export overwrites on every run.
pub const EXPORT_KEY: &str = "exports/network_ids.csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportPayload {
    pub network_id: Uuid,
}

impl ExportPayload {
    pub fn to_value(self) -> serde_json::Value {
        serde_json::json!({ "network_id": self.network_id })
    }
}

/// One CSV line: `<id>,<name>`.
pub fn export_line(network: &Network) -> String {
    format!("{},{}\n", network.id, network.name)
}

/// Looks the network up and writes its line to the export sink.
pub struct ExportHandler<N> {
    networks: Arc<N>,
    sink: Storage,
}

impl<N: NetworkStore> ExportHandler<N> {
    pub fn new(networks: Arc<N>, sink: Storage) -> Self {
        Self { networks, sink }
    }
}

impl<N: NetworkStore> JobHandler for ExportHandler<N> {
    fn job_type(&self) -> &str {
        EXPORT_JOB_TYPE
    }

    fn handle(&self, job: &Job) -> HandlerFuture {
        let networks = self.networks.clone();
        let sink = self.sink.clone();
        let payload = job.payload.clone();
        let job_id = job.id;

        Box::pin(async move {
            let ExportPayload { network_id } = serde_json::from_value(payload)
                .map_err(|e| HandlerError::failed(format!("Invalid export payload: {}", e)))?;

            let network = networks
                .find(network_id)
                .await
                .map_err(|e| HandlerError::failed(e.to_string()))?;

            sink.put_text(EXPORT_KEY, &export_line(&network))
                .await
                .map_err(|e| HandlerError::failed(format!("Export write failed: {}", e)))?;

            tracing::info!(job_id = %job_id, network_id = %network.id, "Exported network");
            Ok(JobResult::with_output(
                format!("Exported network {}", network.id),
                serde_json::json!({ "key": EXPORT_KEY, "network_id": network.id }),
            ))
        })
    }
}
