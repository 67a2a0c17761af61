//! Execution unit provisioning.

pub mod gate;

pub use gate::{GateOutcome, GateState, ProvisioningError, ProvisioningGate};
