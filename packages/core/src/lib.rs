//! Core domain types for the dispatch system.
//!
//! This crate contains shared types used across all packages:
//! - Job, JobStatus and retry configuration for deferred work
//! - Topics and subscriptions for the notification hub
//! - Network/provider records and the data-layer contract
//! - Error types and observability events

mod error;
mod events;
mod job;
pub mod network;
mod queue;
mod store;
mod topic;

pub use error::{DeliveryError, HandlerError, QueueError, StoreError};
pub use events::JobEvent;
pub use job::{Job, JobId, JobResult, JobStatus};
pub use network::{DataError, Network, NetworkParams, NetworkState, NetworkStore};
pub use queue::{BackoffStrategy, QueueConfig, QueueStats, RetryPolicy};
pub use store::JobStore;
pub use topic::{
    PublishReport, SubscriberId, Subscription, SubscriptionToken, Topic, TopicMessage,
};
