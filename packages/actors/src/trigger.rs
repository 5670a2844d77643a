//! Publishes a summary to a fixed topic after a committed mutation.

use std::sync::Arc;

use dispatch_core::{PublishReport, Topic};
use serde::Serialize;

use crate::hub::TopicHub;

/// Best-effort bridge from data-layer mutations to the topic hub.
#[derive(Clone)]
pub struct BroadcastTrigger {
    hub: Arc<TopicHub>,
    topic: Topic,
}

impl BroadcastTrigger {
    pub fn new(hub: Arc<TopicHub>, topic: impl Into<Topic>) -> Self {
        Self {
            hub,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Publish `summary`. Call only after the mutation has been committed.
    pub async fn fire<T: Serialize>(&self, summary: &T) -> PublishReport {
        let payload = match serde_json::to_value(summary) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(topic = %self.topic, "Dropping broadcast, summary not serializable: {}", e);
                return PublishReport::default();
            }
        };
        self.hub.publish(self.topic.clone(), payload).await
    }
}
