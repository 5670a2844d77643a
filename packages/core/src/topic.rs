//! Topic and subscription types for the notification hub.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Name of a pub/sub channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Topic {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Topic {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a delivery channel. One per live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(pub Ulid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Returned by `subscribe`, consumed by `unsubscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionToken {
    pub topic: Topic,
    pub subscriber_id: SubscriberId,
}

/// A live subscription as listed by the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub topic: Topic,
    pub subscriber_id: SubscriberId,
    pub subscribed_at: DateTime<Utc>,
}

/// A message fanned out to subscribers of a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicMessage {
    pub topic: Topic,
    pub payload: serde_json::Value,
    pub published_at: DateTime<Utc>,
}

impl TopicMessage {
    pub fn new(topic: Topic, payload: serde_json::Value) -> Self {
        Self {
            topic,
            payload,
            published_at: Utc::now(),
        }
    }
}

/// Outcome of one `publish` call. Informational only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReport {
    /// Subscribers that accepted the message.
    pub delivered: usize,
    /// Subscribers removed because delivery failed or timed out.
    pub removed: usize,
    /// Subscribers that left between snapshot and delivery.
    pub skipped: usize,
}
