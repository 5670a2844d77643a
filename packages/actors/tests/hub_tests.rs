use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use actors::{BroadcastTrigger, ChannelSubscriber, DeliveryFuture, Subscriber, TopicHub};
use dispatch_core::{DeliveryError, SubscriberId, Topic, TopicMessage};
use serde_json::json;
use tokio::sync::Notify;

/// Subscriber that never completes a delivery.
struct HungSubscriber {
    id: SubscriberId,
}

impl Subscriber for HungSubscriber {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn deliver(&self, _message: TopicMessage) -> DeliveryFuture {
        Box::pin(std::future::pending::<Result<(), DeliveryError>>())
    }
}

/// Subscriber that blocks until released, then reports success.
struct GatedSubscriber {
    id: SubscriberId,
    gate: Arc<Notify>,
}

impl Subscriber for GatedSubscriber {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn deliver(&self, _message: TopicMessage) -> DeliveryFuture {
        let gate = self.gate.clone();
        Box::pin(async move {
            gate.notified().await;
            Ok::<(), DeliveryError>(())
        })
    }
}

#[tokio::test]
async fn test_count_channel_scenario() -> Result<(), Box<dyn Error>> {
    let hub = TopicHub::new(Duration::from_secs(1));
    let (a, mut rx_a) = ChannelSubscriber::channel(8);
    let (b, mut rx_b) = ChannelSubscriber::channel(8);

    let token_a = hub.subscribe("count", Arc::new(a)).await;
    hub.subscribe("count", Arc::new(b)).await;

    let report = hub.publish("count", json!({ "count": 5 })).await;
    assert_eq!(report.delivered, 2);
    assert_eq!(rx_a.recv().await.ok_or("A got nothing")?.payload, json!({ "count": 5 }));
    assert_eq!(rx_b.recv().await.ok_or("B got nothing")?.payload, json!({ "count": 5 }));

    assert!(hub.unsubscribe(&token_a).await);
    let report = hub.publish("count", json!({ "count": 6 })).await;
    assert_eq!(report.delivered, 1);
    assert_eq!(rx_b.recv().await.ok_or("B got nothing")?.payload, json!({ "count": 6 }));
    assert!(rx_a.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn test_broken_subscriber_removed_after_one_failure() -> Result<(), Box<dyn Error>> {
    let hub = TopicHub::new(Duration::from_secs(1));
    let topic = Topic::new("count");
    let (broken, rx_broken) = ChannelSubscriber::channel(8);
    let (healthy, mut rx_healthy) = ChannelSubscriber::channel(8);
    hub.subscribe(topic.clone(), Arc::new(broken)).await;
    hub.subscribe(topic.clone(), Arc::new(healthy)).await;
    drop(rx_broken);

    let report = hub.publish(topic.clone(), json!({ "count": 1 })).await;
    assert_eq!(report.delivered, 1);
    assert_eq!(report.removed, 1);
    assert_eq!(hub.subscriber_count(&topic).await, 1);
    assert!(rx_healthy.recv().await.is_some());

    let report = hub.publish(topic.clone(), json!({ "count": 2 })).await;
    assert_eq!(report.delivered, 1);
    assert_eq!(report.removed, 0);
    Ok(())
}

#[tokio::test]
async fn test_hung_subscriber_does_not_stall_others() -> Result<(), Box<dyn Error>> {
    let hub = TopicHub::new(Duration::from_millis(100));
    let (healthy, mut rx) = ChannelSubscriber::channel(8);
    hub.subscribe("count", Arc::new(HungSubscriber { id: SubscriberId::new() }))
        .await;
    hub.subscribe("count", Arc::new(healthy)).await;

    let started = tokio::time::Instant::now();
    let report = hub.publish("count", json!({ "count": 3 })).await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(report.delivered, 1);
    assert_eq!(report.removed, 1);
    assert!(rx.recv().await.is_some());
    assert_eq!(hub.subscriber_count(&Topic::new("count")).await, 1);
    Ok(())
}

#[tokio::test]
async fn test_subscriber_added_during_fan_out_misses_message() -> Result<(), Box<dyn Error>> {
    let hub = Arc::new(TopicHub::new(Duration::from_secs(2)));
    let gate = Arc::new(Notify::new());
    hub.subscribe(
        "count",
        Arc::new(GatedSubscriber {
            id: SubscriberId::new(),
            gate: gate.clone(),
        }),
    )
    .await;

    let publisher = {
        let hub = hub.clone();
        tokio::spawn(async move { hub.publish("count", json!({ "count": 7 })).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (late, mut rx_late) = ChannelSubscriber::channel(8);
    hub.subscribe("count", Arc::new(late)).await;
    gate.notify_one();

    let report = publisher.await?;
    assert_eq!(report.delivered, 1);
    assert!(rx_late.try_recv().is_err());
    assert_eq!(hub.subscriber_count(&Topic::new("count")).await, 2);
    Ok(())
}

#[tokio::test]
async fn test_subscriptions_listed_per_topic() -> Result<(), Box<dyn Error>> {
    let hub = TopicHub::default();
    let (sub, _rx) = ChannelSubscriber::channel(8);
    let sub: Arc<dyn Subscriber> = Arc::new(sub);

    hub.subscribe("count", sub.clone()).await;
    hub.subscribe("alerts", sub.clone()).await;

    let topics = hub.topics().await;
    assert_eq!(topics, vec![Topic::new("alerts"), Topic::new("count")]);

    let subscriptions = hub.subscriptions(&Topic::new("count")).await;
    assert_eq!(subscriptions.len(), 1);
    assert_eq!(subscriptions[0].subscriber_id, sub.id());
    Ok(())
}

#[tokio::test]
async fn test_trigger_publishes_summary() -> Result<(), Box<dyn Error>> {
    #[derive(serde::Serialize)]
    struct CountSummary {
        count: u64,
    }

    let hub = Arc::new(TopicHub::default());
    let trigger = BroadcastTrigger::new(hub.clone(), "networks_count_channel");
    let (sub, mut rx) = ChannelSubscriber::channel(8);
    hub.subscribe(trigger.topic().clone(), Arc::new(sub)).await;

    let report = trigger.fire(&CountSummary { count: 5 }).await;
    assert_eq!(report.delivered, 1);

    let message = rx.recv().await.ok_or("nothing delivered")?;
    assert_eq!(message.topic, Topic::new("networks_count_channel"));
    assert_eq!(message.payload, json!({ "count": 5 }));
    Ok(())
}
