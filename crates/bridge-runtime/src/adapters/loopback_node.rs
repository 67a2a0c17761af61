//! # Loopback Node
//!
//! An in-process stand-in for a compute node. It implements the deployment
//! API against an in-memory pipeline registry, emits heartbeats and client
//! lifecycle events on the bus, and answers commands sent to a deployed
//! plugin instance.
//!
//! ```text
//!  Bridge ── PluginCommand ──► LoopbackNode ── PluginResult ──► Bridge
//!                                   │
//!                                   └── Heartbeat (every interval)
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use prompt_bridge::{DeploymentApi, DeploymentError, PipelineDescriptor};
use shared_bus::{EventFilter, EventPublisher, EventTopic, InMemoryEventBus, NetworkEvent};
use shared_types::entities::{
    DataCaptureConfig, ExecutionUnitId, NodeId, PluginCommand, PluginInstanceSpec,
    PluginResultPayload, LLM_CODEGEN_SIGNATURE,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Produces the response text for a command.
pub type Responder = Arc<dyn Fn(&PluginCommand) -> Result<String, String> + Send + Sync>;

/// In-memory compute node on a shared bus.
pub struct LoopbackNode {
    node: NodeId,
    bus: Arc<InMemoryEventBus>,
    pipelines: RwLock<HashMap<String, PipelineDescriptor>>,
    responder: Responder,
}

impl LoopbackNode {
    /// Node that echoes every prompt back with its history length.
    pub fn new(node: NodeId, bus: Arc<InMemoryEventBus>) -> Self {
        Self::with_responder(node, bus, Arc::new(echo))
    }

    pub fn with_responder(node: NodeId, bus: Arc<InMemoryEventBus>, responder: Responder) -> Self {
        Self {
            node,
            bus,
            pipelines: RwLock::new(HashMap::new()),
            responder,
        }
    }

    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Whether `instance` is deployed in `pipeline`.
    pub fn is_deployed(&self, pipeline: &str, instance: &str) -> bool {
        self.pipelines
            .read()
            .get(pipeline)
            .is_some_and(|p| p.get_instance(instance).is_some())
    }

    /// Publish the lifecycle a network client goes through on startup.
    pub async fn announce(&self, upstream: &str) {
        self.bus
            .publish(NetworkEvent::ClientConnected {
                upstream: upstream.to_string(),
            })
            .await;
        for (event, topic) in [("heartbeat", "node/heartbeats"), ("result", "node/results")] {
            self.bus
                .publish(NetworkEvent::TopicSubscribed {
                    event: event.to_string(),
                    topic: topic.to_string(),
                })
                .await;
        }
        self.bus.publish(NetworkEvent::ClientBooted).await;
    }

    /// Publish one heartbeat for this node.
    pub async fn heartbeat(&self) -> usize {
        self.bus
            .publish(NetworkEvent::Heartbeat {
                node: self.node.clone(),
            })
            .await
    }

    /// Emit heartbeats until the returned handle is aborted.
    pub fn spawn_heartbeats(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let node = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                node.heartbeat().await;
            }
        })
    }

    /// Answer commands addressed to this node until the bus closes.
    pub fn spawn_responder(self: &Arc<Self>) -> JoinHandle<()> {
        let node = Arc::clone(self);
        let mut commands = self.bus.subscribe(
            EventFilter::topics(vec![EventTopic::Commands]).for_nodes(vec![self.node.clone()]),
        );
        tokio::spawn(async move {
            while let Some(event) = commands.recv().await {
                if let NetworkEvent::PluginCommand { unit, payload } = event {
                    node.respond(unit, payload).await;
                }
            }
            debug!(node = %node.node, "Loopback responder stopped");
        })
    }

    async fn respond(&self, unit: ExecutionUnitId, command: PluginCommand) {
        let signature = {
            let pipelines = self.pipelines.read();
            pipelines
                .get(&unit.pipeline)
                .and_then(|p| p.get_instance(&unit.instance))
                .map(|i| i.signature.clone())
        };
        let Some(signature) = signature else {
            warn!(unit = %unit, request_id = %command.request_id, "Command for an instance that is not deployed");
            self.bus
                .publish(NetworkEvent::PluginResult {
                    error: Some(format!("instance {unit} is not deployed")),
                    source: unit,
                    signature: LLM_CODEGEN_SIGNATURE.to_string(),
                    payload: PluginResultPayload {
                        request_id: Some(command.request_id),
                        ..PluginResultPayload::default()
                    },
                })
                .await;
            return;
        };

        let payload = match (self.responder)(&command) {
            Ok(response) => PluginResultPayload::success(&command.request_id, response),
            Err(error) => PluginResultPayload::failure(&command.request_id, error),
        };
        debug!(unit = %unit, request_id = %command.request_id, "Loopback result");
        self.bus
            .publish(NetworkEvent::PluginResult {
                source: unit,
                signature,
                error: None,
                payload,
            })
            .await;
    }

    fn check_node(&self, node: &NodeId) -> Result<(), DeploymentError> {
        if node == &self.node {
            Ok(())
        } else {
            Err(DeploymentError::Unreachable(node.to_string()))
        }
    }
}

fn echo(command: &PluginCommand) -> Result<String, String> {
    Ok(format!(
        "echo ({} prior): {}",
        command.history.len(),
        command.request
    ))
}

#[async_trait]
impl DeploymentApi for LoopbackNode {
    async fn list_pipelines(&self, node: &NodeId) -> Result<Vec<String>, DeploymentError> {
        self.check_node(node)?;
        let mut names: Vec<String> = self.pipelines.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn get_pipeline(
        &self,
        node: &NodeId,
        name: &str,
    ) -> Result<PipelineDescriptor, DeploymentError> {
        self.check_node(node)?;
        self.pipelines
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| DeploymentError::PipelineNotFound(name.to_string()))
    }

    async fn create_pipeline(
        &self,
        node: &NodeId,
        data_capture: DataCaptureConfig,
        name: &str,
    ) -> Result<PipelineDescriptor, DeploymentError> {
        self.check_node(node)?;
        let mut pipelines = self.pipelines.write();
        if pipelines.contains_key(name) {
            return Err(DeploymentError::Rejected(format!(
                "pipeline {name} already exists"
            )));
        }
        let pipeline = PipelineDescriptor::new(name, data_capture);
        pipelines.insert(name.to_string(), pipeline.clone());
        info!(node = %node, pipeline = name, "Loopback pipeline created");
        Ok(pipeline)
    }

    async fn attach_and_deploy(
        &self,
        node: &NodeId,
        pipeline: &str,
        instance: PluginInstanceSpec,
    ) -> Result<(), DeploymentError> {
        self.check_node(node)?;
        let mut pipelines = self.pipelines.write();
        let target = pipelines
            .get_mut(pipeline)
            .ok_or_else(|| DeploymentError::PipelineNotFound(pipeline.to_string()))?;
        info!(
            node = %node,
            pipeline,
            instance = %instance.name,
            signature = %instance.signature,
            "Loopback instance deployed"
        );
        target.instances.retain(|i| i.name != instance.name);
        target.instances.push(instance);
        Ok(())
    }
}
