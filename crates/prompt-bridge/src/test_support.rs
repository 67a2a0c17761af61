//! Mock ports shared by unit tests.

use crate::ports::{
    CommandSender, DeploymentApi, DeploymentError, PipelineDescriptor, TransportError,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::entities::{
    DataCaptureConfig, ExecutionUnitId, NodeId, PluginCommand, PluginInstanceSpec,
};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployCall {
    ListPipelines,
    GetPipeline,
    CreatePipeline,
    AttachAndDeploy,
}

/// Deployment API keeping pipelines in memory and logging every call.
#[derive(Default)]
pub struct MockDeploymentApi {
    pipelines: Mutex<HashMap<String, PipelineDescriptor>>,
    calls: Mutex<Vec<DeployCall>>,
    fail_deploys: bool,
    unreachable: bool,
    delay: Option<Duration>,
}

impl MockDeploymentApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pipeline(self, name: &str) -> Self {
        self.pipelines.lock().insert(
            name.to_string(),
            PipelineDescriptor::new(name, DataCaptureConfig::Void),
        );
        self
    }

    pub fn failing_deploys(mut self) -> Self {
        self.fail_deploys = true;
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn count(&self, call: DeployCall) -> usize {
        self.calls.lock().iter().filter(|c| **c == call).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn has_instance(&self, pipeline: &str, instance: &str) -> bool {
        self.pipelines
            .lock()
            .get(pipeline)
            .is_some_and(|p| p.get_instance(instance).is_some())
    }

    async fn record(&self, call: DeployCall) -> Result<(), DeploymentError> {
        self.calls.lock().push(call);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.unreachable {
            return Err(DeploymentError::Unreachable("mock".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DeploymentApi for MockDeploymentApi {
    async fn list_pipelines(&self, _node: &NodeId) -> Result<Vec<String>, DeploymentError> {
        self.record(DeployCall::ListPipelines).await?;
        Ok(self.pipelines.lock().keys().cloned().collect())
    }

    async fn get_pipeline(
        &self,
        _node: &NodeId,
        name: &str,
    ) -> Result<PipelineDescriptor, DeploymentError> {
        self.record(DeployCall::GetPipeline).await?;
        self.pipelines
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| DeploymentError::PipelineNotFound(name.to_string()))
    }

    async fn create_pipeline(
        &self,
        _node: &NodeId,
        data_capture: DataCaptureConfig,
        name: &str,
    ) -> Result<PipelineDescriptor, DeploymentError> {
        self.record(DeployCall::CreatePipeline).await?;
        if self.fail_deploys {
            return Err(DeploymentError::Rejected("create refused".into()));
        }
        let pipeline = PipelineDescriptor::new(name, data_capture);
        self.pipelines
            .lock()
            .insert(name.to_string(), pipeline.clone());
        Ok(pipeline)
    }

    async fn attach_and_deploy(
        &self,
        _node: &NodeId,
        pipeline: &str,
        instance: PluginInstanceSpec,
    ) -> Result<(), DeploymentError> {
        self.record(DeployCall::AttachAndDeploy).await?;
        if self.fail_deploys {
            return Err(DeploymentError::Rejected("deploy refused".into()));
        }
        let mut pipelines = self.pipelines.lock();
        let target = pipelines
            .get_mut(pipeline)
            .ok_or_else(|| DeploymentError::PipelineNotFound(pipeline.to_string()))?;
        target.instances.push(instance);
        Ok(())
    }
}

/// Command sender logging every command it accepts.
#[derive(Default)]
pub struct MockCommandSender {
    sent: Mutex<Vec<(ExecutionUnitId, PluginCommand)>>,
    fail: bool,
}

impl MockCommandSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(ExecutionUnitId, PluginCommand)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl CommandSender for MockCommandSender {
    async fn send(
        &self,
        unit: &ExecutionUnitId,
        command: PluginCommand,
    ) -> Result<(), TransportError> {
        if self.fail {
            return Err(TransportError::NoRoute(unit.to_string()));
        }
        self.sent.lock().push((unit.clone(), command));
        Ok(())
    }
}
