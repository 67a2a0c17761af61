//! # Network Events
//!
//! Defines every event that flows between the bridge and the compute network.
//! Commands travel from the bridge to a node, everything else travels from the
//! network client to the bridge.

use serde::{Deserialize, Serialize};
use shared_types::entities::{ExecutionUnitId, NodeId, PluginCommand, PluginResultPayload};

/// All events that can be published to the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NetworkEvent {
    // =========================================================================
    // CLIENT LIFECYCLE
    // =========================================================================
    /// The network client connected to its upstream broker.
    ClientConnected {
        /// Broker address.
        upstream: String,
    },

    /// The network client finished booting.
    ClientBooted,

    /// The client subscribed to a system topic.
    TopicSubscribed {
        /// Event type delivered on the topic.
        event: String,
        /// Topic name.
        topic: String,
    },

    /// Subscribing to a system topic failed.
    TopicSubscribeFailed {
        /// Topic name.
        topic: String,
        /// Failure description.
        error: String,
    },

    // =========================================================================
    // LIVENESS
    // =========================================================================
    /// A node announced it is alive.
    Heartbeat {
        /// Node emitting the heartbeat.
        node: NodeId,
    },

    // =========================================================================
    // PLUGIN TRAFFIC
    // =========================================================================
    /// Command addressed to a plugin instance.
    /// Source: bridge | Target: execution node
    PluginCommand {
        /// Target execution unit.
        unit: ExecutionUnitId,
        /// Command payload.
        payload: PluginCommand,
    },

    /// Result emitted by a plugin instance.
    /// Source: execution node | Target: bridge
    PluginResult {
        /// Instance that produced the result.
        source: ExecutionUnitId,
        /// Plugin signature of the producing instance.
        signature: String,
        /// Transport-level error attached to the notification, if any.
        error: Option<String>,
        /// Decoded payload.
        payload: PluginResultPayload,
    },
}

impl NetworkEvent {
    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::ClientConnected { .. }
            | Self::ClientBooted
            | Self::TopicSubscribed { .. }
            | Self::TopicSubscribeFailed { .. } => EventTopic::Connection,
            Self::Heartbeat { .. } => EventTopic::Heartbeat,
            Self::PluginCommand { .. } => EventTopic::Commands,
            Self::PluginResult { .. } => EventTopic::PluginResults,
        }
    }

    /// Node this event concerns, if any.
    #[must_use]
    pub fn node(&self) -> Option<&NodeId> {
        match self {
            Self::Heartbeat { node } => Some(node),
            Self::PluginCommand { unit, .. } => Some(&unit.node),
            Self::PluginResult { source, .. } => Some(&source.node),
            _ => None,
        }
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Client connection and boot progress.
    Connection,
    /// Node heartbeats.
    Heartbeat,
    /// Commands sent to plugin instances.
    Commands,
    /// Results emitted by plugin instances.
    PluginResults,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
    /// Nodes to include. Empty means all nodes.
    pub nodes: Vec<NodeId>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self {
            topics,
            nodes: Vec::new(),
        }
    }

    /// Restrict the filter to events concerning the given nodes.
    ///
    /// Events without a node (client lifecycle) never match a node-restricted filter.
    #[must_use]
    pub fn for_nodes(mut self, nodes: Vec<NodeId>) -> Self {
        self.nodes = nodes;
        self
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &NetworkEvent) -> bool {
        let topic_match = self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic());

        let node_match = self.nodes.is_empty()
            || event.node().is_some_and(|node| self.nodes.contains(node));

        topic_match && node_match
    }
}
