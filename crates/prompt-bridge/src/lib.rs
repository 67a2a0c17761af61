#![allow(missing_docs)]

//! Prompt Bridge - synchronous HTTP prompts over an asynchronous compute network.
//!
//! An HTTP caller posts a prompt; the bridge tags it with a correlation key,
//! sends it to a plugin instance on a remote node and answers the caller once
//! the matching result comes back on the shared event stream.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                           PROMPT BRIDGE                              │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │   POST /prompt ─► PromptHandler ──register──► CorrelationTable       │
//! │                        │                          ▲                  │
//! │                        │ PluginCommand            │ resolve          │
//! │                        ▼                          │                  │
//! │                  BusCommandSender          ResultDispatcher          │
//! │                        │                          ▲                  │
//! │                        │                          │ ResultEvent      │
//! │                        │                     ResultRouter            │
//! │   ReadinessController ─┼─► ProvisioningGate       │                  │
//! │          ▲             │          │               │                  │
//! └──────────┼─────────────┼──────────┼───────────────┼──────────────────┘
//!            │ Heartbeat   ▼          ▼ DeploymentApi │ PluginResult
//!            └───────────────  Event Bus  ────────────┘
//! ```
//!
//! # Lifecycle
//!
//! 1. Heartbeats from the target node trigger the provisioning gate
//! 2. The gate checks for, creates or deploys the pipeline instance
//! 3. On success the readiness controller opens the bridge exactly once
//! 4. Only then is the HTTP listener bound
//!
//! # Usage
//!
//! ```ignore
//! use prompt_bridge::{BridgeConfig, BridgeService};
//!
//! let service = BridgeService::new(config, bus, deployments)?;
//! service.run(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod domain;
pub mod ipc;
pub mod middleware;
pub mod ports;
pub mod provisioning;
pub mod readiness;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports for public API
pub use domain::config::BridgeConfig;
pub use domain::correlation::CorrelationKey;
pub use domain::error::{BridgeError, CorrelationError, ErrorKind, ServiceError};
pub use domain::pending::{CorrelationStore, CorrelationTable, RegistrationId, StatsSnapshot};
pub use domain::types::*;
pub use ipc::{PromptHandler, ResultDispatcher, ResultEvent};
pub use ports::{CommandSender, DeploymentApi, DeploymentError, PipelineDescriptor, TransportError};
pub use provisioning::{GateOutcome, GateState, ProvisioningError, ProvisioningGate};
pub use readiness::{HeartbeatOutcome, ReadinessController};
pub use service::{BackgroundTasks, BridgeService};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
