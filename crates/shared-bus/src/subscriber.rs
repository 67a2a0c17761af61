//! # Event Subscriber
//!
//! Defines the subscription side of the event bus.

use crate::events::{EventFilter, NetworkEvent};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::Stream;
use tracing::{debug, warn};

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The event bus was closed.
    #[error("Event bus closed")]
    Closed,
}

/// Trait for subscribing to events from the bus.
pub trait EventSubscriber: Send + Sync {
    /// Subscribe to events matching a filter.
    fn subscribe(&self, filter: EventFilter) -> Subscription;
}

impl EventSubscriber for crate::publisher::InMemoryEventBus {
    fn subscribe(&self, filter: EventFilter) -> Subscription {
        crate::publisher::InMemoryEventBus::subscribe(self, filter)
    }
}

/// Live subscription filters by subscription id.
pub(crate) type FilterRegistry = Arc<RwLock<HashMap<u64, EventFilter>>>;

/// Unregisters the subscription's filter when dropped.
struct SubscriptionGuard {
    registry: FilterRegistry,
    id: u64,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        let Ok(mut live) = self.registry.write() else {
            return;
        };
        if let Some(filter) = live.remove(&self.id) {
            debug!(id = self.id, topics = ?filter.topics, "Subscription dropped");
        }
    }
}

/// A subscription handle for receiving events.
///
/// When dropped, the subscription is automatically cleaned up.
pub struct Subscription {
    receiver: broadcast::Receiver<NetworkEvent>,
    filter: EventFilter,
    lagged: u64,
    _guard: SubscriptionGuard,
}

impl Subscription {
    pub(crate) fn new(
        receiver: broadcast::Receiver<NetworkEvent>,
        filter: EventFilter,
        registry: FilterRegistry,
        id: u64,
    ) -> Self {
        Self {
            receiver,
            filter,
            lagged: 0,
            _guard: SubscriptionGuard { registry, id },
        }
    }

    /// Receive the next event that matches the filter.
    ///
    /// # Returns
    ///
    /// - `Some(event)` - The next matching event
    /// - `None` - The channel was closed (bus dropped)
    pub async fn recv(&mut self) -> Option<NetworkEvent> {
        loop {
            let event = match self.receiver.recv().await {
                Ok(e) => e,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    self.lagged += count;
                    warn!(lagged = count, topics = ?self.filter.topics, "Subscriber lagged, events dropped");
                    continue;
                }
            };

            if self.filter.matches(&event) {
                return Some(event);
            }
        }
    }

    /// Try to receive the next event without blocking.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(event))` - An event was available and matched
    /// - `Ok(None)` - No event available (would block)
    /// - `Err(SubscriptionError::Closed)` - The channel was closed
    pub fn try_recv(&mut self) -> Result<Option<NetworkEvent>, SubscriptionError> {
        loop {
            let event = match self.receiver.try_recv() {
                Ok(e) => e,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
                Err(broadcast::error::TryRecvError::Lagged(count)) => {
                    self.lagged += count;
                    warn!(lagged = count, topics = ?self.filter.topics, "Subscriber lagged, events dropped");
                    continue;
                }
            };

            if self.filter.matches(&event) {
                return Ok(Some(event));
            }
        }
    }

    /// Get the filter for this subscription.
    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    /// Events lost because this subscriber fell behind the channel.
    #[must_use]
    pub fn lagged(&self) -> u64 {
        self.lagged
    }
}

/// A stream wrapper for subscriptions.
///
/// Implements `tokio_stream::Stream` for use with stream combinators.
pub struct EventStream {
    inner: BroadcastStream<NetworkEvent>,
    filter: EventFilter,
    lagged: u64,
    _guard: SubscriptionGuard,
}

impl EventStream {
    /// Create a new event stream from a subscription.
    #[must_use]
    pub fn new(subscription: Subscription) -> Self {
        let Subscription {
            receiver,
            filter,
            lagged,
            _guard,
        } = subscription;
        Self {
            inner: BroadcastStream::new(receiver),
            filter,
            lagged,
            _guard,
        }
    }

    /// Get the filter for this stream.
    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    /// Events lost because this stream fell behind the channel.
    #[must_use]
    pub fn lagged(&self) -> u64 {
        self.lagged
    }
}

impl Stream for EventStream {
    type Item = NetworkEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => {
                    if this.filter.matches(&event) {
                        return Poll::Ready(Some(event));
                    }
                }
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(count)))) => {
                    this.lagged += count;
                    warn!(lagged = count, topics = ?this.filter.topics, "Stream lagged, events dropped");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
