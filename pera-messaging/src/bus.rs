use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::event::{EventEnvelope, EventType};

const CHANNEL_CAPACITY: usize = 1024;

/// Per-topic delivery counters: how many events were published, and how
/// consumers resolved them. Positive acks are at-least-once (the consumer
/// did its work, possibly more than once under redelivery); negative acks
/// are at-most-once (`spec.md` §4.7 — no requeue on nack).
#[derive(Debug, Default)]
pub struct TopicMetrics {
    published: AtomicU64,
    acked: AtomicU64,
    nacked: AtomicU64,
}

impl TopicMetrics {
    #[must_use]
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn acked(&self) -> u64 {
        self.acked.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn nacked(&self) -> u64 {
        self.nacked.load(Ordering::Relaxed)
    }
}

struct Topic {
    sender: broadcast::Sender<EventEnvelope>,
    metrics: Arc<TopicMetrics>,
}

/// In-process topic-keyed publish/subscribe bus (`spec.md` §4.7), built on
/// `tokio::sync::broadcast` per topic. The teacher has no broker
/// collaborator to generalize from; this is the minimal ambient
/// infrastructure every module needs to emit and observe events, built the
/// way the teacher accumulates per-process metrics
/// (`memory-core/src/telemetry`) rather than stubbed out.
pub struct EventBus {
    topics: Mutex<HashMap<&'static str, Topic>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self { topics: Mutex::new(HashMap::new()) }
    }

    fn topic_for(&self, name: &'static str) -> (broadcast::Sender<EventEnvelope>, Arc<TopicMetrics>) {
        let mut topics = self.topics.lock();
        let entry = topics.entry(name).or_insert_with(|| {
            let (sender, _receiver) = broadcast::channel(CHANNEL_CAPACITY);
            Topic { sender, metrics: Arc::new(TopicMetrics::default()) }
        });
        (entry.sender.clone(), entry.metrics.clone())
    }

    /// Publish an event to its type's topic. Returns the number of active
    /// subscribers it reached; zero subscribers is not an error, since
    /// publishing ahead of any consumer subscribing is a valid ordering.
    pub fn publish(&self, event: EventEnvelope) -> usize {
        let (sender, metrics) = self.topic_for(event.event_type.topic());
        metrics.published.fetch_add(1, Ordering::Relaxed);
        sender.send(event).map_or(0, |receiver_count| receiver_count)
    }

    /// Subscribe to a topic, receiving every event published to it from
    /// this point on.
    #[must_use]
    pub fn subscribe(&self, event_type: EventType) -> Subscription {
        let (sender, metrics) = self.topic_for(event_type.topic());
        Subscription { receiver: sender.subscribe(), metrics }
    }

    #[must_use]
    pub fn metrics_for(&self, event_type: EventType) -> Arc<TopicMetrics> {
        self.topic_for(event_type.topic()).1
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A live subscription to one topic, carrying the ack/nack handshake
/// `spec.md` §4.7 requires consumers to perform explicitly.
pub struct Subscription {
    receiver: broadcast::Receiver<EventEnvelope>,
    metrics: Arc<TopicMetrics>,
}

impl Subscription {
    /// Receive the next event, or `None` if the topic was dropped and
    /// lagged events were skipped past recovery.
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscriber lagged, skipping missed events");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Positive ack: the consumer finished processing successfully
    /// (at-least-once semantics — redelivery, if any, is the publisher's
    /// choice, not this bus's).
    pub fn ack(&self) {
        self.metrics.acked.fetch_add(1, Ordering::Relaxed);
    }

    /// Negative ack: the consumer failed and the event is not requeued
    /// (at-most-once semantics).
    pub fn nack(&self) {
        self.metrics.nacked.fetch_add(1, Ordering::Relaxed);
    }
}
