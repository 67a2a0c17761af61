//! Outbound ports: what the bridge needs from the compute network.

use async_trait::async_trait;
use shared_types::entities::{
    DataCaptureConfig, ExecutionUnitId, NodeId, PluginCommand, PluginInstanceSpec,
};

/// Transport send failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Nothing is listening for commands
    #[error("no route to {0}")]
    NoRoute(String),
    /// The transport was shut down
    #[error("transport closed")]
    Closed,
    /// The network refused the command
    #[error("command rejected: {0}")]
    Rejected(String),
}

/// Deployment API failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeploymentError {
    #[error("node unreachable: {0}")]
    Unreachable(String),
    #[error("pipeline not found: {0}")]
    PipelineNotFound(String),
    #[error("deployment rejected: {0}")]
    Rejected(String),
}

/// Delivers plugin commands to an execution unit.
#[async_trait]
pub trait CommandSender: Send + Sync {
    async fn send(&self, unit: &ExecutionUnitId, command: PluginCommand)
        -> Result<(), TransportError>;
}

/// A pipeline as reported by a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineDescriptor {
    pub name: String,
    pub data_capture: DataCaptureConfig,
    pub instances: Vec<PluginInstanceSpec>,
}

impl PipelineDescriptor {
    pub fn new(name: impl Into<String>, data_capture: DataCaptureConfig) -> Self {
        Self {
            name: name.into(),
            data_capture,
            instances: Vec::new(),
        }
    }

    /// Instance with this name, if attached.
    pub fn get_instance(&self, name: &str) -> Option<&PluginInstanceSpec> {
        self.instances.iter().find(|i| i.name == name)
    }
}

/// Pipeline management on remote nodes.
#[async_trait]
pub trait DeploymentApi: Send + Sync {
    /// Names of the pipelines deployed on `node`.
    async fn list_pipelines(&self, node: &NodeId) -> Result<Vec<String>, DeploymentError>;

    async fn get_pipeline(
        &self,
        node: &NodeId,
        name: &str,
    ) -> Result<PipelineDescriptor, DeploymentError>;

    /// Create an empty pipeline. Nothing runs until an instance is deployed.
    async fn create_pipeline(
        &self,
        node: &NodeId,
        data_capture: DataCaptureConfig,
        name: &str,
    ) -> Result<PipelineDescriptor, DeploymentError>;

    /// Attach `instance` to an existing pipeline and deploy it.
    async fn attach_and_deploy(
        &self,
        node: &NodeId,
        pipeline: &str,
        instance: PluginInstanceSpec,
    ) -> Result<(), DeploymentError>;
}
