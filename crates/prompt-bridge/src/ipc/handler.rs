//! Inbound adapter: turns a synchronous prompt into a correlated plugin command.

use crate::domain::config::{BridgeConfig, LimitsConfig};
use crate::domain::correlation::CorrelationKey;
use crate::domain::error::BridgeError;
use crate::domain::pending::{CorrelationStore, RegistrationId, RemovalReason};
use crate::domain::types::{PromptRequest, PromptResponse, ReadinessState};
use crate::ipc::validation::parse_prompt_request;
use crate::ports::CommandSender;
use shared_types::entities::ExecutionUnitId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Evicts the pending entry if the caller's future is dropped mid-flight.
struct EvictOnDrop<'a> {
    store: &'a dyn CorrelationStore,
    key: &'a CorrelationKey,
    id: RegistrationId,
    armed: bool,
}

impl EvictOnDrop<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for EvictOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed && self.store.remove(self.key, self.id, RemovalReason::Disconnected) {
            debug!(correlation_key = %self.key, "Caller went away, pending request evicted");
        }
    }
}

/// Registers, dispatches and awaits prompts.
pub struct PromptHandler {
    store: Arc<dyn CorrelationStore>,
    sender: Arc<dyn CommandSender>,
    readiness: watch::Receiver<ReadinessState>,
    unit: ExecutionUnitId,
    limits: LimitsConfig,
    request_timeout: Duration,
}

impl PromptHandler {
    pub fn new(
        store: Arc<dyn CorrelationStore>,
        sender: Arc<dyn CommandSender>,
        readiness: watch::Receiver<ReadinessState>,
        config: &BridgeConfig,
    ) -> Self {
        Self {
            store,
            sender,
            readiness,
            unit: config.execution_unit(),
            limits: config.limits.clone(),
            request_timeout: config.timeouts.request,
        }
    }

    pub fn unit(&self) -> &ExecutionUnitId {
        &self.unit
    }

    pub fn pending_count(&self) -> usize {
        self.store.pending_count()
    }

    /// Validate a raw JSON body and submit it.
    pub async fn handle_json(&self, body: &serde_json::Value) -> Result<PromptResponse, BridgeError> {
        let request = parse_prompt_request(body, &self.limits)?;
        let response = self.submit(request).await?;
        Ok(PromptResponse { response })
    }

    /// Register the key, send the command and wait for the matching result.
    pub async fn submit(&self, request: PromptRequest) -> Result<String, BridgeError> {
        if !self.readiness.borrow().is_ready() {
            return Err(BridgeError::NotReady);
        }

        let handle = self
            .store
            .register(request.key.clone(), Some(self.request_timeout))?;
        let key = &request.key;
        let id = handle.id();
        let mut guard = EvictOnDrop {
            store: self.store.as_ref(),
            key,
            id,
            armed: true,
        };

        if let Err(e) = self.sender.send(&self.unit, request.to_command()).await {
            guard.disarm();
            self.store.remove(key, id, RemovalReason::Rollback);
            warn!(
                correlation_key = %key,
                unit = %self.unit,
                error = %e,
                "Dispatch failed, registration rolled back"
            );
            return Err(BridgeError::DispatchFailed(e.to_string()));
        }

        debug!(
            correlation_key = %key,
            unit = %self.unit,
            history = request.history.len(),
            "Dispatched prompt"
        );

        let timeout = handle.timeout();
        let result = match tokio::time::timeout(timeout, handle.wait()).await {
            Ok(delivery) => delivery,
            Err(_) => {
                self.store.remove(key, id, RemovalReason::Timeout);
                warn!(
                    correlation_key = %key,
                    timeout_ms = timeout.as_millis(),
                    "No result before deadline"
                );
                Err(BridgeError::Timeout(timeout))
            }
        };
        guard.disarm();
        result
    }
}
