//! # Bridge Runtime Library
//!
//! Exposes the runtime's configuration loading and adapters for testing.
//! The main entry point is the `main.rs` binary.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod config;

pub use adapters::LoopbackNode;
pub use config::{load_config, load_config_from, LoadError};

/// Heartbeat period of the loopback node.
pub const LOOPBACK_HEARTBEAT_INTERVAL: std::time::Duration = std::time::Duration::from_secs(2);
