//! Startup wiring.

use std::sync::Arc;

use actors::{JobQueue, TopicHub, WorkerPool};
use db::repositories::NetworkRepository;
use db::SurrealJobStore;
use dispatch_core::{JobEvent, JobStore, NetworkStore};
use storage::Storage;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::export::ExportHandler;
use crate::networks::NetworkService;
use crate::{AppConfig, AppError};

/// A running system: queue, pool, hub, export sink and network service.
///
/// Nothing here is global; clone the pieces you need out of it.
pub struct App<N> {
    pub config: AppConfig,
    pub queue: JobQueue,
    pub pool: WorkerPool,
    pub hub: Arc<TopicHub>,
    pub sink: Storage,
    pub networks: NetworkService<N>,
    event_logger: JoinHandle<()>,
}

/// Connect to SurrealDB and the export sink, then start everything.
pub async fn bootstrap(config: AppConfig) -> Result<App<NetworkRepository>, AppError> {
    tracing::info!("Initializing dispatch...");

    let db = db::init(&config.db).await?;
    let sink = Storage::new(config.storage.clone()).await?;
    tracing::info!("Export sink: {}", sink.kind_str());

    let networks = Arc::new(NetworkRepository::new(db.clone()));
    App::assemble(config, networks, SurrealJobStore::new(db), sink).await
}

impl<N: NetworkStore> App<N> {
    /// Start the queue and pool on the given backends.
    pub async fn assemble<S: JobStore>(
        config: AppConfig,
        networks: Arc<N>,
        store: S,
        sink: Storage,
    ) -> Result<Self, AppError> {
        let queue = JobQueue::spawn(config.queue.clone(), store).await?;
        let hub = Arc::new(TopicHub::new(config.delivery_timeout()));

        let pool = WorkerPool::new(queue.clone());
        pool.register_handler(ExportHandler::new(networks.clone(), sink.clone()));
        pool.start(0).await?;

        let event_logger = tokio::spawn(log_events(queue.subscribe_events()));
        let service = NetworkService::new(networks, queue.clone(), hub.clone());

        tracing::info!("Dispatch initialized");
        Ok(Self {
            config,
            queue,
            pool,
            hub,
            sink,
            networks: service,
            event_logger,
        })
    }

    /// Stop the pool, then the queue. In-flight jobs get the configured
    /// shutdown timeout when `graceful` is set.
    pub async fn shutdown(self, graceful: bool) -> Result<(), AppError> {
        tracing::info!(graceful, "Shutting down");
        let stopped = self.pool.stop(graceful).await;
        self.queue.shutdown();
        self.event_logger.abort();
        stopped?;
        Ok(())
    }
}

async fn log_events(mut events: broadcast::Receiver<JobEvent>) {
    loop {
        match events.recv().await {
            Ok(event) if event.is_retry_limit_exceeded() => {
                tracing::warn!("{}", event.description());
            }
            Ok(event) => tracing::debug!("{}", event.description()),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("Event log skipped {} events", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
