//! Provisioning gate: make sure the execution unit exists before traffic flows.
//!
//! ```text
//!                  pipeline found              instance found
//!   ┌──────────┐ ───────────────► ┌───────────────┐ ─────────────► ┌───────┐
//!   │ CHECKING │                  │ INSTANCE CHECK│                │ READY │
//!   └──────────┘                  └───────────────┘                └───────┘
//!        │ no pipeline                    │ no instance                ▲
//!        ▼                                ▼                            │
//!   ┌─────────────────┐           ┌─────────────────┐   deployed       │
//!   │ CREATE PIPELINE │           │ DEPLOY INSTANCE │ ─────────────────┤
//!   └─────────────────┘           └─────────────────┘                  │
//!        │                       created + deployed                    │
//!        └─────────────────────────────────────────────────────────────┘
//!
//!   Any failed call ends the evaluation in FAILED.
//! ```
//!
//! `Ready` and `Failed` are terminal for one evaluation. The gate never retries
//! on its own; the readiness controller runs it again on the next heartbeat.
//! Only one evaluation runs at a time and `try_run` drops overlapping calls.

use crate::ports::{DeploymentApi, DeploymentError};
use shared_types::entities::{DataCaptureConfig, ExecutionUnitId, PluginInstanceSpec};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Gate evaluation state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Nothing evaluated yet
    Idle,
    Checking,
    InstanceCheck,
    CreatePipeline,
    DeployInstance,
    Ready,
    Failed,
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GateState::Idle => "idle",
            GateState::Checking => "checking",
            GateState::InstanceCheck => "instance-check",
            GateState::CreatePipeline => "create-pipeline",
            GateState::DeployInstance => "deploy-instance",
            GateState::Ready => "ready",
            GateState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How a successful evaluation reached `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// Pipeline and instance were already there
    AlreadyDeployed,
    /// An instance was attached to the existing pipeline
    InstanceDeployed,
    /// The pipeline was created and the instance deployed into it
    PipelineCreated,
}

/// A failed evaluation, with enough context to find the culprit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("provisioning {unit} failed during {stage}: {cause}")]
pub struct ProvisioningError {
    pub unit: ExecutionUnitId,
    pub stage: GateState,
    pub cause: DeploymentError,
}

/// Idempotent check/create/deploy state machine for one execution unit.
pub struct ProvisioningGate {
    api: Arc<dyn DeploymentApi>,
    unit: ExecutionUnitId,
    signature: String,
    running: tokio::sync::Mutex<()>,
    state: parking_lot::Mutex<GateState>,
}

impl ProvisioningGate {
    pub fn new(api: Arc<dyn DeploymentApi>, unit: ExecutionUnitId, signature: impl Into<String>) -> Self {
        Self {
            api,
            unit,
            signature: signature.into(),
            running: tokio::sync::Mutex::new(()),
            state: parking_lot::Mutex::new(GateState::Idle),
        }
    }

    pub fn unit(&self) -> &ExecutionUnitId {
        &self.unit
    }

    /// State reached by the latest (or current) evaluation.
    pub fn state(&self) -> GateState {
        *self.state.lock()
    }

    /// Whether an evaluation is in flight.
    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    /// Run one evaluation, waiting for any in-flight one to finish first.
    pub async fn run(&self) -> Result<GateOutcome, ProvisioningError> {
        let _running = self.running.lock().await;
        self.evaluate().await
    }

    /// Run one evaluation unless one is already in flight.
    ///
    /// Returns `None` when the call was coalesced into the running evaluation.
    pub async fn try_run(&self) -> Option<Result<GateOutcome, ProvisioningError>> {
        let Ok(_running) = self.running.try_lock() else {
            debug!(unit = %self.unit, "Provisioning already in progress, skipping");
            return None;
        };
        Some(self.evaluate().await)
    }

    fn enter(&self, state: GateState) {
        *self.state.lock() = state;
        debug!(unit = %self.unit, state = %state, "Provisioning gate transition");
    }

    fn fail(&self, stage: GateState, cause: DeploymentError) -> ProvisioningError {
        self.enter(GateState::Failed);
        error!(
            node = %self.unit.node,
            pipeline = %self.unit.pipeline,
            instance = %self.unit.instance,
            stage = %stage,
            error = %cause,
            "Provisioning failed"
        );
        ProvisioningError {
            unit: self.unit.clone(),
            stage,
            cause,
        }
    }

    fn instance_spec(&self) -> PluginInstanceSpec {
        PluginInstanceSpec::new(self.unit.instance.clone(), self.signature.clone())
    }

    async fn evaluate(&self) -> Result<GateOutcome, ProvisioningError> {
        let node = &self.unit.node;
        let pipeline = self.unit.pipeline.as_str();

        self.enter(GateState::Checking);
        let names = self
            .api
            .list_pipelines(node)
            .await
            .map_err(|e| self.fail(GateState::Checking, e))?;

        let outcome = if names.iter().any(|n| n == pipeline) {
            info!(node = %node, pipeline, "Pipeline already exists");
            self.check_instance().await?
        } else {
            info!(node = %node, pipeline, "Pipeline not found, creating it");
            self.create_pipeline().await?
        };

        self.enter(GateState::Ready);
        Ok(outcome)
    }

    async fn check_instance(&self) -> Result<GateOutcome, ProvisioningError> {
        let node = &self.unit.node;
        let pipeline = self.unit.pipeline.as_str();
        let instance = self.unit.instance.as_str();

        self.enter(GateState::InstanceCheck);
        let existing = self
            .api
            .get_pipeline(node, pipeline)
            .await
            .map_err(|e| self.fail(GateState::InstanceCheck, e))?;
        if existing.get_instance(instance).is_some() {
            info!(node = %node, pipeline, instance, "Plugin instance already deployed");
            return Ok(GateOutcome::AlreadyDeployed);
        }

        self.enter(GateState::DeployInstance);
        self.api
            .attach_and_deploy(node, pipeline, self.instance_spec())
            .await
            .map_err(|e| self.fail(GateState::DeployInstance, e))?;
        info!(node = %node, pipeline, instance, "Plugin instance deployed");
        Ok(GateOutcome::InstanceDeployed)
    }

    async fn create_pipeline(&self) -> Result<GateOutcome, ProvisioningError> {
        let node = &self.unit.node;
        let pipeline = self.unit.pipeline.as_str();
        let instance = self.unit.instance.as_str();

        self.enter(GateState::CreatePipeline);
        self.api
            .create_pipeline(node, DataCaptureConfig::Void, pipeline)
            .await
            .map_err(|e| self.fail(GateState::CreatePipeline, e))?;
        self.api
            .attach_and_deploy(node, pipeline, self.instance_spec())
            .await
            .map_err(|e| self.fail(GateState::CreatePipeline, e))?;
        info!(node = %node, pipeline, instance, "Pipeline created and instance deployed");
        Ok(GateOutcome::PipelineCreated)
    }
}
