//! Realtime streaming over Server-Sent Events.
//!
//! A connection is a [`ChannelSubscriber`] on one topic. The transport reads
//! `messages`, renders each with [`format_sse_event`] and calls
//! [`disconnect`] when the client goes away. A client that simply vanishes is
//! also dropped by the hub on the next failed delivery.

use std::sync::Arc;

use actors::{ChannelSubscriber, TopicHub};
use dispatch_core::{JobEvent, SubscriptionToken, Topic, TopicMessage};
use tokio::sync::mpsc;

/// Messages buffered per connection before delivery starts waiting.
pub const CONNECTION_BUFFER: usize = 32;

pub struct Connection {
    pub token: SubscriptionToken,
    pub messages: mpsc::Receiver<TopicMessage>,
}

/// Subscribe a new connection to `topic`.
pub async fn connect(hub: &TopicHub, topic: impl Into<Topic>) -> Connection {
    let (subscriber, messages) = ChannelSubscriber::channel(CONNECTION_BUFFER);
    let token = hub.subscribe(topic, Arc::new(subscriber)).await;
    tracing::debug!(topic = %token.topic, subscriber_id = %token.subscriber_id, "Client connected");
    Connection { token, messages }
}

pub async fn disconnect(hub: &TopicHub, connection: Connection) -> bool {
    hub.unsubscribe(&connection.token).await
}

/// Render a hub message as one SSE frame.
pub fn format_sse_event(message: &TopicMessage) -> String {
    let json = serde_json::to_string(&message.payload).unwrap_or_else(|_| "{}".to_string());
    format!("event: {}\ndata: {}\n\n", message.topic, json)
}

/// Render a job event as one SSE frame, for an operator event stream.
pub fn format_job_event(event: &JobEvent) -> String {
    let json = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    format!("data: {}\n\n", json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_frame_names_topic_and_carries_payload() {
        let message = TopicMessage::new(
            Topic::new("networks_count_channel"),
            serde_json::json!({ "count": 5 }),
        );
        assert_eq!(
            format_sse_event(&message),
            "event: networks_count_channel\ndata: {\"count\":5}\n\n"
        );
    }

    #[test]
    fn job_event_frame_is_tagged_json() {
        let event = JobEvent::JobStarted {
            job_id: dispatch_core::JobId::new(),
            worker_id: "worker-1".into(),
            attempt: 1,
            timestamp: chrono::Utc::now(),
        };
        let frame = format_job_event(&event);
        assert!(frame.starts_with("data: {\"event\":\"job_started\""));
        assert!(frame.ends_with("\n\n"));
    }
}
