//! # Adapter Implementations
//!
//! Concrete implementations of the bridge's outbound ports for running
//! without a broker-backed network client.

pub mod loopback_node;

pub use loopback_node::{LoopbackNode, Responder};
