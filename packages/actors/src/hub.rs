//! Publish/subscribe topic hub.
//!
//! Each topic has its own lock guarding its subscriber set. `publish` only
//! holds that lock long enough to snapshot the subscribers; delivery happens
//! concurrently and outside the lock, each subscriber bounded by the hub's
//! delivery timeout. A subscriber whose delivery fails or times out is
//! dropped from the topic, and a topic left without subscribers is removed.
//! Nothing is persisted: a message published to a topic with no subscribers
//! is discarded.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dispatch_core::{
    DeliveryError, PublishReport, SubscriberId, Subscription, SubscriptionToken, Topic,
    TopicMessage,
};
use futures_util::future::join_all;
use tokio::sync::{mpsc, Mutex, RwLock};

/// Future returned by [`Subscriber::deliver`].
pub type DeliveryFuture = Pin<Box<dyn Future<Output = Result<(), DeliveryError>> + Send>>;

/// A delivery channel the hub can push messages into, such as a live
/// client connection.
pub trait Subscriber: Send + Sync + 'static {
    /// Stable identity. Subscribing the same id twice to a topic is a no-op.
    fn id(&self) -> SubscriberId;

    fn deliver(&self, message: TopicMessage) -> DeliveryFuture;
}

/// Subscriber backed by a bounded tokio channel.
///
/// Delivery waits for channel capacity, so a reader that stops draining
/// eventually hits the hub's delivery timeout. Dropping the receiver makes
/// the next delivery fail with [`DeliveryError::Closed`].
#[derive(Clone)]
pub struct ChannelSubscriber {
    id: SubscriberId,
    tx: mpsc::Sender<TopicMessage>,
}

impl ChannelSubscriber {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TopicMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                id: SubscriberId::new(),
                tx,
            },
            rx,
        )
    }
}

impl Subscriber for ChannelSubscriber {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn deliver(&self, message: TopicMessage) -> DeliveryFuture {
        let tx = self.tx.clone();
        Box::pin(async move { tx.send(message).await.map_err(|_| DeliveryError::Closed) })
    }
}

struct Entry {
    subscriber: Arc<dyn Subscriber>,
    /// Cleared when the entry leaves the topic; in-flight fan-outs check it.
    active: Arc<AtomicBool>,
    subscribed_at: DateTime<Utc>,
}

#[derive(Default)]
struct TopicSlot {
    entries: HashMap<SubscriberId, Entry>,
    /// Set once the slot is removed from the topic map; subscribers must not
    /// be added to it after that.
    retired: bool,
}

enum Outcome {
    Delivered,
    Skipped,
    Failed(DeliveryError),
}

/// Topic hub with per-topic locking and best-effort fan-out.
pub struct TopicHub {
    // Lock order: `topics` before any slot.
    topics: RwLock<HashMap<Topic, Arc<Mutex<TopicSlot>>>>,
    delivery_timeout: Duration,
}

impl TopicHub {
    pub fn new(delivery_timeout: Duration) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            delivery_timeout,
        }
    }

    pub fn delivery_timeout(&self) -> Duration {
        self.delivery_timeout
    }

    async fn slot(&self, topic: &Topic) -> Option<Arc<Mutex<TopicSlot>>> {
        self.topics.read().await.get(topic).cloned()
    }

    async fn slot_or_create(&self, topic: &Topic) -> Arc<Mutex<TopicSlot>> {
        if let Some(slot) = self.slot(topic).await {
            return slot;
        }
        self.topics
            .write()
            .await
            .entry(topic.clone())
            .or_default()
            .clone()
    }

    /// Drop `topic` from the map if `slot` is still its slot and is empty.
    async fn prune(&self, topic: &Topic, slot: &Arc<Mutex<TopicSlot>>) {
        let mut topics = self.topics.write().await;
        if !topics.get(topic).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            return;
        }
        let mut guard = slot.lock().await;
        if guard.entries.is_empty() {
            guard.retired = true;
            topics.remove(topic);
            tracing::trace!(topic = %topic, "Removed empty topic");
        }
    }

    /// Add `subscriber` to `topic`. Subscribing an id that is already
    /// present returns the existing token.
    pub async fn subscribe(
        &self,
        topic: impl Into<Topic>,
        subscriber: Arc<dyn Subscriber>,
    ) -> SubscriptionToken {
        let topic = topic.into();
        let subscriber_id = subscriber.id();
        loop {
            let slot = self.slot_or_create(&topic).await;
            let mut slot = slot.lock().await;
            // Pruned between lookup and lock; the next lookup creates a new slot.
            if slot.retired {
                continue;
            }
            slot.entries.entry(subscriber_id).or_insert_with(|| {
                tracing::debug!(topic = %topic, subscriber_id = %subscriber_id, "Subscribed");
                Entry {
                    subscriber,
                    active: Arc::new(AtomicBool::new(true)),
                    subscribed_at: Utc::now(),
                }
            });
            break;
        }

        SubscriptionToken {
            topic,
            subscriber_id,
        }
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub async fn unsubscribe(&self, token: &SubscriptionToken) -> bool {
        let Some(slot) = self.slot(&token.topic).await else {
            return false;
        };
        let (removed, now_empty) = {
            let mut guard = slot.lock().await;
            let removed = guard.entries.remove(&token.subscriber_id);
            (removed, guard.entries.is_empty())
        };
        let Some(entry) = removed else {
            return false;
        };
        entry.active.store(false, Ordering::Release);
        tracing::debug!(
            topic = %token.topic,
            subscriber_id = %token.subscriber_id,
            "Unsubscribed"
        );
        if now_empty {
            self.prune(&token.topic, &slot).await;
        }
        true
    }

    /// Deliver `payload` to every subscriber of `topic` at call time.
    ///
    /// Never fails; the report says what happened.
    pub async fn publish(
        &self,
        topic: impl Into<Topic>,
        payload: serde_json::Value,
    ) -> PublishReport {
        let topic = topic.into();
        let Some(slot) = self.slot(&topic).await else {
            tracing::trace!(topic = %topic, "No subscribers, message dropped");
            return PublishReport::default();
        };

        let snapshot: Vec<(SubscriberId, Arc<dyn Subscriber>, Arc<AtomicBool>)> = slot
            .lock()
            .await
            .entries
            .iter()
            .map(|(id, entry)| (*id, entry.subscriber.clone(), entry.active.clone()))
            .collect();
        if snapshot.is_empty() {
            tracing::trace!(topic = %topic, "No subscribers, message dropped");
            return PublishReport::default();
        }

        let message = TopicMessage::new(topic.clone(), payload);
        let timeout = self.delivery_timeout;
        let outcomes = join_all(snapshot.iter().map(|(_, subscriber, active)| {
            let message = message.clone();
            async move {
                if !active.load(Ordering::Acquire) {
                    return Outcome::Skipped;
                }
                match tokio::time::timeout(timeout, subscriber.deliver(message)).await {
                    Ok(Ok(())) => Outcome::Delivered,
                    Ok(Err(e)) => Outcome::Failed(e),
                    Err(_) => Outcome::Failed(DeliveryError::TimedOut(timeout)),
                }
            }
        }))
        .await;

        let mut report = PublishReport::default();
        let mut broken = Vec::new();
        for ((id, _, active), outcome) in snapshot.into_iter().zip(outcomes) {
            match outcome {
                Outcome::Delivered => report.delivered += 1,
                Outcome::Skipped => report.skipped += 1,
                Outcome::Failed(e) => broken.push((id, active, e)),
            }
        }

        if !broken.is_empty() {
            let mut guard = slot.lock().await;
            for (id, active, error) in broken {
                // Only drop the entry this fan-out saw; a re-subscribe since
                // the snapshot has a fresh flag and stays.
                let same = guard
                    .entries
                    .get(&id)
                    .is_some_and(|entry| Arc::ptr_eq(&entry.active, &active));
                if same {
                    guard.entries.remove(&id);
                    active.store(false, Ordering::Release);
                    report.removed += 1;
                    tracing::warn!(
                        topic = %topic,
                        subscriber_id = %id,
                        "Removed subscriber after failed delivery: {}",
                        error
                    );
                }
            }
            let now_empty = guard.entries.is_empty();
            drop(guard);
            if now_empty {
                self.prune(&topic, &slot).await;
            }
        }

        report
    }

    /// Number of live subscribers on `topic`.
    pub async fn subscriber_count(&self, topic: &Topic) -> usize {
        match self.slot(topic).await {
            Some(slot) => slot.lock().await.entries.len(),
            None => 0,
        }
    }

    /// Current subscriptions on `topic`, oldest first.
    pub async fn subscriptions(&self, topic: &Topic) -> Vec<Subscription> {
        let Some(slot) = self.slot(topic).await else {
            return Vec::new();
        };
        let mut subscriptions: Vec<Subscription> = slot
            .lock()
            .await
            .entries
            .iter()
            .map(|(id, entry)| Subscription {
                topic: topic.clone(),
                subscriber_id: *id,
                subscribed_at: entry.subscribed_at,
            })
            .collect();
        subscriptions.sort_by_key(|s| (s.subscribed_at, s.subscriber_id.0));
        subscriptions
    }

    /// Topics that have at least one subscriber.
    pub async fn topics(&self) -> Vec<Topic> {
        let slots: Vec<(Topic, Arc<Mutex<TopicSlot>>)> = self
            .topics
            .read()
            .await
            .iter()
            .map(|(topic, slot)| (topic.clone(), slot.clone()))
            .collect();

        let mut topics = Vec::new();
        for (topic, slot) in slots {
            if !slot.lock().await.entries.is_empty() {
                topics.push(topic);
            }
        }
        topics.sort();
        topics
    }
}

impl Default for TopicHub {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}
