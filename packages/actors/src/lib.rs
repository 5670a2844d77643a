//! Job execution and notification fan-out.
//!
//! This crate provides the Ractor-based job queue and worker pool, plus the
//! topic hub used for realtime notifications.
//!
//! # Architecture
//!
//! - `QueueActor` - Owns every job record; its mailbox is the queue's lock
//! - `Supervisor` - Spawns and replaces the workers of a pool
//! - `WorkerActor` - Claims jobs and runs their handlers on separate tasks
//! - `TopicHub` - Per-topic subscriber sets with timeout-bounded fan-out
//!
//! # Usage
//!
//! ```ignore
//! use actors::{InMemoryJobStore, JobQueue, WorkerPool};
//!
//! let queue = JobQueue::spawn(QueueConfig::default(), InMemoryJobStore::new()).await?;
//! let pool = WorkerPool::new(queue.clone());
//! pool.register_handler(MyHandler);
//! pool.start(4).await?;
//!
//! queue.enqueue("my_job", serde_json::json!({})).await?;
//! ```

mod handler;
mod hub;
mod job_queue;
mod memory_store;
mod messages;
mod pool;
mod queue_actor;
mod supervisor;
mod trigger;
mod worker_actor;

pub use handler::{FnHandler, HandlerFuture, HandlerRegistry, HandlerResult, JobHandler};
pub use hub::{ChannelSubscriber, DeliveryFuture, Subscriber, TopicHub};
pub use job_queue::JobQueue;
pub use memory_store::InMemoryJobStore;
pub use messages::{QueueMessage, SupervisorMessage, WorkerMessage};
pub use pool::{PoolError, WorkerPool};
pub use queue_actor::QueueActor;
pub use supervisor::Supervisor;
pub use trigger::BroadcastTrigger;
pub use worker_actor::WorkerActor;

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort};
