//! # Event Publisher
//!
//! Defines the publishing side of the event bus.

use crate::events::{EventFilter, EventTopic, NetworkEvent};
use crate::subscriber::{EventStream, FilterRegistry, Subscription};
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Trait for publishing events to the bus.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event to the bus.
    ///
    /// # Returns
    ///
    /// The number of active subscribers that received the event.
    async fn publish(&self, event: NetworkEvent) -> usize;

    /// Get the total number of events published.
    fn events_published(&self) -> u64;
}

/// In-memory implementation of the event bus.
///
/// Uses `tokio::sync::broadcast` for multi-producer, multi-consumer semantics.
/// Suitable for a single process; a broker-backed client implements the same
/// traits for a real network.
pub struct InMemoryEventBus {
    /// Broadcast sender for events.
    sender: broadcast::Sender<NetworkEvent>,

    /// Filters of live subscriptions, by subscription id.
    filters: FilterRegistry,

    /// Next subscription id.
    next_id: AtomicU64,

    /// Total events published.
    events_published: AtomicU64,

    /// Channel capacity.
    capacity: usize,
}

impl InMemoryEventBus {
    /// Create a new in-memory event bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new in-memory event bus with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            filters: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(0),
            events_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Subscribe to events matching a filter.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        let receiver = self.sender.subscribe();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut live) = self.filters.write() {
            live.insert(id, filter.clone());
        }

        debug!(id, topics = ?filter.topics, nodes = ?filter.nodes, "New subscription created");

        Subscription::new(receiver, filter, self.filters.clone(), id)
    }

    /// Get a stream of events matching a filter.
    #[must_use]
    pub fn event_stream(&self, filter: EventFilter) -> EventStream {
        EventStream::new(self.subscribe(filter))
    }

    /// Get the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Number of live subscriptions registered with exactly these topics.
    #[must_use]
    pub fn subscriptions_for(&self, topics: &[EventTopic]) -> usize {
        self.filters
            .read()
            .map(|live| live.values().filter(|f| f.topics == topics).count())
            .unwrap_or(0)
    }

    /// Whether any live subscription would accept `event`.
    ///
    /// Broadcast delivery reaches every receiver; this applies each
    /// subscriber's filter, node restriction included.
    #[must_use]
    pub fn has_listener(&self, event: &NetworkEvent) -> bool {
        self.filters
            .read()
            .map(|live| live.values().any(|f| f.matches(event)))
            .unwrap_or(false)
    }

    /// Get the channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: NetworkEvent) -> usize {
        let topic = event.topic();

        self.events_published.fetch_add(1, Ordering::Relaxed);

        match self.sender.send(event) {
            Ok(receiver_count) => {
                debug!(
                    topic = ?topic,
                    receivers = receiver_count,
                    "Event published"
                );
                receiver_count
            }
            Err(e) => {
                warn!(
                    topic = ?topic,
                    error = %e,
                    "Event dropped (no receivers)"
                );
                0
            }
        }
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}
