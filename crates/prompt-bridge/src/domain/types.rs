//! Request, response and state types.

use crate::domain::correlation::CorrelationKey;
use crate::domain::pending::StatsSnapshot;
use serde::{Deserialize, Serialize};
use shared_types::entities::{HistoryEntry, PluginCommand};

/// Validated inbound prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRequest {
    pub key: CorrelationKey,
    pub content: String,
    /// Prior exchanges, oldest first
    pub history: Vec<HistoryEntry>,
}

impl PromptRequest {
    /// Outbound command for the plugin instance.
    pub fn to_command(&self) -> PluginCommand {
        PluginCommand {
            request_id: self.key.as_str().to_string(),
            request: self.content.clone(),
            history: self.history.clone(),
        }
    }
}

/// Success body returned to the HTTP caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptResponse {
    pub response: String,
}

/// Whether the bridge accepts traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessState {
    #[default]
    NotReady,
    /// A provisioning gate evaluation is running
    Provisioning,
    Ready,
}

impl ReadinessState {
    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }
}

/// `GET /health` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub readiness: ReadinessState,
    pub execution_unit: String,
    pub transport_booted: bool,
    pub pending: usize,
}

/// `GET /pending` body.
#[derive(Debug, Clone, Serialize)]
pub struct PendingReport {
    pub max_pending: usize,
    #[serde(flatten)]
    pub stats: StatsSnapshot,
}
