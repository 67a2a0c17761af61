//! Event bus adapters.
//!
//! Implements the bridge's transport ports on top of `shared-bus`:
//! - [`BusCommandSender`] publishes plugin commands
//! - [`ResultRouter`] decodes plugin results into [`ResultEvent`]s
//! - [`ConnectionMonitor`] logs client lifecycle events

use crate::domain::correlation::CorrelationKey;
use crate::ipc::dispatcher::ResultEvent;
use crate::ports::{CommandSender, TransportError};
use async_trait::async_trait;
use shared_bus::{
    EventFilter, EventPublisher, EventStream, EventTopic, InMemoryEventBus, NetworkEvent,
    Subscription,
};
use shared_types::entities::{ExecutionUnitId, PluginCommand};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

/// Publishes plugin commands on the bus.
pub struct BusCommandSender {
    bus: Arc<InMemoryEventBus>,
}

impl BusCommandSender {
    pub fn new(bus: Arc<InMemoryEventBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl CommandSender for BusCommandSender {
    async fn send(
        &self,
        unit: &ExecutionUnitId,
        command: PluginCommand,
    ) -> Result<(), TransportError> {
        let request_id = command.request_id.clone();
        let event = NetworkEvent::PluginCommand {
            unit: unit.clone(),
            payload: command,
        };

        // The bridge's own listeners share the bus; a route is a listener that accepts this command
        if !self.bus.has_listener(&event) {
            warn!(
                correlation_key = %request_id,
                unit = %unit,
                "No subscribers for plugin command"
            );
            return Err(TransportError::NoRoute(unit.to_string()));
        }

        let receivers = self.bus.publish(event).await;
        if receivers == 0 {
            return Err(TransportError::Closed);
        }

        debug!(
            correlation_key = %request_id,
            unit = %unit,
            receivers,
            "Plugin command published"
        );
        Ok(())
    }
}

/// Turns plugin result notifications into dispatcher input.
pub struct ResultRouter {
    stream: EventStream,
    signature: String,
    results_tx: mpsc::Sender<ResultEvent>,
}

impl ResultRouter {
    /// Subscribe to plugin results. Only results carrying `signature` are routed.
    pub fn new(
        bus: &InMemoryEventBus,
        signature: impl Into<String>,
        results_tx: mpsc::Sender<ResultEvent>,
    ) -> Self {
        let filter = EventFilter::topics(vec![EventTopic::PluginResults]);
        Self {
            stream: bus.event_stream(filter),
            signature: signature.into(),
            results_tx,
        }
    }

    /// Route results until the bus or the dispatcher goes away.
    pub async fn run(mut self) {
        info!(signature = %self.signature, "Result router started");

        while let Some(event) = self.stream.next().await {
            let Some(result) = self.decode(event) else {
                continue;
            };
            if self.results_tx.send(result).await.is_err() {
                warn!("Result channel closed, stopping router");
                return;
            }
        }
        warn!("Event stream ended, result router shutting down");
    }

    /// Decode a plugin result; `None` for anything not meant for the bridge.
    pub fn decode(&self, event: NetworkEvent) -> Option<ResultEvent> {
        let NetworkEvent::PluginResult {
            source,
            signature,
            error,
            payload,
        } = event
        else {
            return None;
        };

        if signature != self.signature {
            debug!(source = %source, signature = %signature, "Ignoring result from other plugin");
            return None;
        }

        let Some(raw_key) = payload.request_id else {
            warn!(source = %source, "Plugin result without REQUEST_ID dropped");
            return None;
        };
        let key = match CorrelationKey::parse(&raw_key) {
            Ok(key) => key,
            Err(e) => {
                warn!(source = %source, error = %e, "Plugin result with invalid REQUEST_ID dropped");
                return None;
            }
        };

        // Transport-level errors win over payload contents
        let outcome = match (error.or(payload.error), payload.response) {
            (Some(err), _) => Err(err),
            (None, Some(response)) => Ok(response),
            (None, None) => Err("result carried neither RESPONSE nor ERROR".to_string()),
        };

        Some(ResultEvent {
            source,
            key,
            outcome,
        })
    }
}

/// Transport lifecycle as seen on the bus.
#[derive(Debug, Default)]
pub struct TransportStatus {
    connected: AtomicBool,
    booted: AtomicBool,
    topics: AtomicUsize,
    failed_topics: AtomicUsize,
}

impl TransportStatus {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn is_booted(&self) -> bool {
        self.booted.load(Ordering::Relaxed)
    }

    pub fn topics(&self) -> usize {
        self.topics.load(Ordering::Relaxed)
    }

    pub fn failed_topics(&self) -> usize {
        self.failed_topics.load(Ordering::Relaxed)
    }
}

/// Logs connection, boot and topic subscription progress.
pub struct ConnectionMonitor {
    subscription: Subscription,
    status: Arc<TransportStatus>,
}

impl ConnectionMonitor {
    pub fn new(bus: &InMemoryEventBus) -> Self {
        Self {
            subscription: bus.subscribe(EventFilter::topics(vec![EventTopic::Connection])),
            status: Arc::new(TransportStatus::default()),
        }
    }

    pub fn status(&self) -> Arc<TransportStatus> {
        self.status.clone()
    }

    pub async fn run(mut self) {
        while let Some(event) = self.subscription.recv().await {
            self.observe(&event);
        }
        debug!("Connection monitor stopped");
    }

    fn observe(&self, event: &NetworkEvent) {
        match event {
            NetworkEvent::ClientConnected { upstream } => {
                self.status.connected.store(true, Ordering::Relaxed);
                info!(upstream = %upstream, "Connected to compute network");
            }
            NetworkEvent::ClientBooted => {
                self.status.booted.store(true, Ordering::Relaxed);
                info!("Network client booted");
            }
            NetworkEvent::TopicSubscribed { event, topic } => {
                self.status.topics.fetch_add(1, Ordering::Relaxed);
                info!(event = %event, topic = %topic, "Subscribed to topic");
            }
            NetworkEvent::TopicSubscribeFailed { topic, error } => {
                self.status.failed_topics.fetch_add(1, Ordering::Relaxed);
                error!(topic = %topic, error = %error, "Topic subscription failed");
            }
            _ => {}
        }
    }
}
