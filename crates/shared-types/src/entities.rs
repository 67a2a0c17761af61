//! # Core Entities
//!
//! ## Clusters
//!
//! - **Addressing**: `NodeId`, `ExecutionUnitId`
//! - **Commands**: `PluginCommand`, `HistoryEntry`
//! - **Results**: `PluginResultPayload`
//! - **Deployment**: `DataCaptureConfig`, `PluginInstanceSpec`

use serde::{Deserialize, Serialize};
use std::fmt;

/// Signature of the code-generation LLM plugin the bridge talks to.
pub const LLM_CODEGEN_SIGNATURE: &str = "LLM_CODEGEN_01";

/// Default pipeline hosting the plugin instance.
pub const DEFAULT_PIPELINE_NAME: &str = "llm-example";

/// Default plugin instance name.
pub const DEFAULT_INSTANCE_NAME: &str = "llm-example-instance";

// =============================================================================
// ADDRESSING
// =============================================================================

/// Name of an execution node on the compute network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    /// Create a node id from any string-like value.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the node name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Address of a deployed plugin instance: (node, pipeline, instance).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionUnitId {
    /// Node hosting the pipeline.
    pub node: NodeId,
    /// Pipeline name on that node.
    pub pipeline: String,
    /// Plugin instance name inside the pipeline.
    pub instance: String,
}

impl ExecutionUnitId {
    pub fn new(node: impl Into<NodeId>, pipeline: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            pipeline: pipeline.into(),
            instance: instance.into(),
        }
    }
}

impl fmt::Display for ExecutionUnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.node, self.pipeline, self.instance)
    }
}

// =============================================================================
// COMMANDS
// =============================================================================

/// One prior exchange in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Earlier prompt.
    pub request: String,
    /// Response that prompt received.
    pub response: String,
}

/// Command payload delivered to the plugin instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginCommand {
    /// Correlation key echoed back in the result.
    pub request_id: String,
    /// Prompt content.
    pub request: String,
    /// Conversation history, oldest first.
    pub history: Vec<HistoryEntry>,
}

// =============================================================================
// RESULTS
// =============================================================================

/// Result payload emitted by the plugin instance.
///
/// Every field is optional on the wire; the receiving side decides what a
/// usable result is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PluginResultPayload {
    /// Correlation key of the command that produced this result.
    #[serde(rename = "REQUEST_ID", default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Generated content.
    #[serde(rename = "RESPONSE", default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Plugin-reported failure.
    #[serde(rename = "ERROR", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PluginResultPayload {
    /// Successful result for a request.
    pub fn success(request_id: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            request_id: Some(request_id.into()),
            response: Some(response.into()),
            error: None,
        }
    }

    /// Failed result for a request.
    pub fn failure(request_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            request_id: Some(request_id.into()),
            response: None,
            error: Some(error.into()),
        }
    }
}

// =============================================================================
// DEPLOYMENT
// =============================================================================

/// Data capture configuration of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type")]
pub enum DataCaptureConfig {
    /// No input stream; the pipeline is driven by commands only.
    #[default]
    Void,
}

/// Description of a plugin instance to attach to a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInstanceSpec {
    /// Instance name.
    pub name: String,
    /// Plugin signature.
    pub signature: String,
    /// Plugin configuration.
    #[serde(default)]
    pub config: serde_json::Value,
}

impl PluginInstanceSpec {
    pub fn new(name: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            signature: signature.into(),
            config: serde_json::Value::Object(Default::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_unit_display() {
        let unit = ExecutionUnitId::new("node-a", DEFAULT_PIPELINE_NAME, DEFAULT_INSTANCE_NAME);
        assert_eq!(unit.to_string(), "node-a/llm-example/llm-example-instance");
    }

    #[test]
    fn test_result_payload_wire_names() {
        let json = r#"{"REQUEST_ID":"r1","RESPONSE":"def sort(...)"}"#;
        let payload: PluginResultPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.request_id.as_deref(), Some("r1"));
        assert_eq!(payload.response.as_deref(), Some("def sort(...)"));
        assert!(payload.error.is_none());
    }

    #[test]
    fn test_command_wire_names() {
        let command = PluginCommand {
            request_id: "r1".into(),
            request: "write a sort function".into(),
            history: vec![HistoryEntry {
                request: "hi".into(),
                response: "hello".into(),
            }],
        };
        let value = serde_json::to_value(&command).unwrap();
        assert_eq!(value["request_id"], "r1");
        assert_eq!(value["history"][0]["request"], "hi");
    }

    #[test]
    fn test_void_capture_serialization() {
        let value = serde_json::to_value(DataCaptureConfig::Void).unwrap();
        assert_eq!(value["type"], "Void");
    }
}
