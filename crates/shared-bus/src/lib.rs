//! # Shared Bus - Event Bus Between the Bridge and the Compute Network
//!
//! Carries the traffic the network client produces and consumes: connection
//! lifecycle, node heartbeats, plugin commands and plugin results.
//!
//! ```text
//! ┌──────────────┐    PluginCommand    ┌──────────────┐
//! │ Prompt       │ ──────────────────→ │  Execution   │
//! │ Bridge       │                     │  Node        │
//! │              │ ←────────────────── │              │
//! └──────────────┘ Heartbeat /         └──────────────┘
//!                  PluginResult
//! ```
//!
//! The in-memory implementation backs tests and the loopback development node;
//! a broker-backed network client publishes the same `NetworkEvent`s.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod events;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use events::{EventFilter, EventTopic, NetworkEvent};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{EventStream, EventSubscriber, Subscription, SubscriptionError};

/// Maximum events to buffer per subscriber before lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
