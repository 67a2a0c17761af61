//! Readiness controller: opens the bridge once the execution unit is provisioned.
//!
//! Every heartbeat from the target node triggers a provisioning gate evaluation
//! until one succeeds. The bridge then opens exactly once and stays open.

use crate::domain::types::ReadinessState;
use crate::provisioning::ProvisioningGate;
use shared_bus::{NetworkEvent, Subscription};
use shared_types::entities::NodeId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// What a single heartbeat did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// Heartbeat from a node other than the target
    IgnoredForeignNode,
    /// Already open, nothing to do
    AlreadyReady,
    /// Coalesced into a running evaluation
    Busy,
    /// This heartbeat opened the bridge
    Opened,
    /// The gate failed; waiting for the next heartbeat
    StillClosed,
}

pub struct ReadinessController {
    target: NodeId,
    gate: Arc<ProvisioningGate>,
    state: watch::Sender<ReadinessState>,
    opened: AtomicBool,
}

impl ReadinessController {
    pub fn new(gate: Arc<ProvisioningGate>) -> Self {
        let (state, _) = watch::channel(ReadinessState::NotReady);
        Self {
            target: gate.unit().node.clone(),
            gate,
            state,
            opened: AtomicBool::new(false),
        }
    }

    pub fn target(&self) -> &NodeId {
        &self.target
    }

    pub fn state(&self) -> ReadinessState {
        *self.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.opened.load(Ordering::Acquire)
    }

    /// Watch readiness transitions.
    pub fn subscribe(&self) -> watch::Receiver<ReadinessState> {
        self.state.subscribe()
    }

    /// Resolve once the bridge is open.
    pub async fn wait_ready(&self) {
        if self.is_ready() {
            return;
        }
        let mut rx = self.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait
        let _ = rx.wait_for(|s| s.is_ready()).await;
    }

    /// Handle a liveness signal from `node`.
    pub async fn on_heartbeat(&self, node: &NodeId) -> HeartbeatOutcome {
        if node != &self.target {
            debug!(node = %node, target = %self.target, "Ignoring heartbeat from foreign node");
            return HeartbeatOutcome::IgnoredForeignNode;
        }
        if self.is_ready() {
            return HeartbeatOutcome::AlreadyReady;
        }

        self.state.send_if_modified(|s| {
            if *s == ReadinessState::NotReady {
                *s = ReadinessState::Provisioning;
                true
            } else {
                false
            }
        });

        let Some(result) = self.gate.try_run().await else {
            return HeartbeatOutcome::Busy;
        };

        match result {
            Ok(outcome) => {
                if self
                    .opened
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    return HeartbeatOutcome::AlreadyReady;
                }
                self.state.send_replace(ReadinessState::Ready);
                info!(
                    node = %self.target,
                    unit = %self.gate.unit(),
                    ?outcome,
                    "Execution unit ready, bridge open"
                );
                HeartbeatOutcome::Opened
            }
            Err(e) => {
                self.state.send_replace(ReadinessState::NotReady);
                warn!(node = %self.target, error = %e, "Bridge stays closed until next heartbeat");
                HeartbeatOutcome::StillClosed
            }
        }
    }

    /// Consume heartbeats until the bridge opens.
    ///
    /// Each heartbeat is evaluated on its own task so heartbeats arriving during
    /// an evaluation are coalesced by the gate.
    pub async fn run(self: Arc<Self>, mut heartbeats: Subscription) {
        let mut opened = self.subscribe();
        loop {
            tokio::select! {
                event = heartbeats.recv() => {
                    let Some(event) = event else {
                        warn!("Heartbeat stream closed before the bridge opened");
                        return;
                    };
                    if let NetworkEvent::Heartbeat { node } = event {
                        let controller = self.clone();
                        tokio::spawn(async move {
                            controller.on_heartbeat(&node).await;
                        });
                    }
                }
                changed = opened.wait_for(|s| s.is_ready()) => {
                    if changed.is_ok() {
                        debug!("Readiness controller done");
                    }
                    return;
                }
            }
        }
    }
}
