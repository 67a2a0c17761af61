//! Outbound dispatcher: routes decoded results back to waiting callers.
//!
//! A single consumer task reads [`ResultEvent`]s from a channel, so delivery
//! is decoupled from however the transport surfaces its callbacks.

use crate::domain::correlation::CorrelationKey;
use crate::domain::error::BridgeError;
use crate::domain::pending::CorrelationStore;
use shared_types::entities::ExecutionUnitId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A decoded plugin result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultEvent {
    /// Instance that produced the result
    pub source: ExecutionUnitId,
    pub key: CorrelationKey,
    /// Generated content, or the upstream error text
    pub outcome: Result<String, String>,
}

/// What happened to one result event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The caller received the content
    Resolved,
    /// The caller received an upstream error
    Failed,
    /// Nobody was waiting for this key
    UnknownKey,
    /// Produced by an instance other than ours; dropped
    ForeignSource,
}

pub struct ResultDispatcher {
    store: Arc<dyn CorrelationStore>,
    unit: ExecutionUnitId,
}

impl ResultDispatcher {
    pub fn new(store: Arc<dyn CorrelationStore>, unit: ExecutionUnitId) -> Self {
        Self { store, unit }
    }

    /// Deliver one result event.
    pub fn dispatch(&self, event: ResultEvent) -> DispatchOutcome {
        if event.source != self.unit {
            warn!(
                correlation_key = %event.key,
                source = %event.source,
                expected = %self.unit,
                "Dropping result from unexpected execution unit"
            );
            return DispatchOutcome::ForeignSource;
        }

        let (delivery, outcome) = match event.outcome {
            Ok(content) => (Ok(content), DispatchOutcome::Resolved),
            Err(error) => (Err(BridgeError::Upstream(error)), DispatchOutcome::Failed),
        };

        match self.store.resolve(&event.key, delivery) {
            Ok(()) => outcome,
            // The table already logged it
            Err(_) => DispatchOutcome::UnknownKey,
        }
    }

    /// Consume result events until every sender is gone.
    pub async fn run(self, mut events: mpsc::Receiver<ResultEvent>) {
        info!(unit = %self.unit, "Result dispatcher started");
        while let Some(event) = events.recv().await {
            let key = event.key.clone();
            let outcome = self.dispatch(event);
            debug!(correlation_key = %key, ?outcome, "Result dispatched");
        }
        info!("Result channel closed, dispatcher stopped");
    }
}
