//! Bridge configuration with validation.

use crate::domain::correlation::MAX_KEY_LEN;
use serde::{Deserialize, Serialize};
use shared_types::entities::{
    ExecutionUnitId, NodeId, DEFAULT_INSTANCE_NAME, DEFAULT_PIPELINE_NAME, LLM_CODEGEN_SIGNATURE,
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Main bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    /// HTTP server configuration
    pub http: HttpConfig,
    /// Execution unit the bridge forwards prompts to
    pub target: TargetConfig,
    /// Timeout configuration
    pub timeouts: TimeoutConfig,
    /// Request and table limits
    pub limits: LimitsConfig,
    /// CORS configuration
    pub cors: CorsConfig,
}

impl BridgeConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target.node.as_str().trim().is_empty() {
            return Err(ConfigError::MissingTargetNode);
        }
        if self.target.pipeline.is_empty() || self.target.instance.is_empty() {
            return Err(ConfigError::Invalid(
                "pipeline and instance names cannot be empty".into(),
            ));
        }
        if self.target.signature.is_empty() {
            return Err(ConfigError::Invalid("plugin signature cannot be empty".into()));
        }

        if !self.http.prompt_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "prompt path must start with '/': {}",
                self.http.prompt_path
            )));
        }

        if self.limits.max_body_bytes == 0 {
            return Err(ConfigError::InvalidLimit("max_body_bytes cannot be 0".into()));
        }
        if self.limits.max_key_len == 0 {
            return Err(ConfigError::InvalidLimit("max_key_len cannot be 0".into()));
        }
        // Result decoding bounds keys at MAX_KEY_LEN; longer inbound keys could never resolve
        if self.limits.max_key_len > MAX_KEY_LEN {
            return Err(ConfigError::InvalidLimit(format!(
                "max_key_len cannot exceed {MAX_KEY_LEN}"
            )));
        }

        if self.timeouts.request.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "request timeout cannot be 0".into(),
            ));
        }
        if self.timeouts.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "sweep interval cannot be 0".into(),
            ));
        }

        Ok(())
    }

    /// Get HTTP server bind address
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http.host, self.http.port)
    }

    /// Address of the execution unit this bridge owns
    pub fn execution_unit(&self) -> ExecutionUnitId {
        ExecutionUnitId::new(
            self.target.node.clone(),
            self.target.pipeline.clone(),
            self.target.instance.clone(),
        )
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 3000)
    pub port: u16,
    /// Route accepting prompts
    pub prompt_path: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 3000,
            prompt_path: "/prompt".to_string(),
        }
    }
}

/// Target execution unit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Node expected to host the pipeline. Required.
    pub node: NodeId,
    pub pipeline: String,
    pub instance: String,
    /// Plugin signature results must carry
    pub signature: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            node: NodeId::default(),
            pipeline: DEFAULT_PIPELINE_NAME.to_string(),
            instance: DEFAULT_INSTANCE_NAME.to_string(),
            signature: LLM_CODEGEN_SIGNATURE.to_string(),
        }
    }
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// How long a caller waits for its result
    #[serde(with = "humantime_serde")]
    pub request: Duration,
    /// How often expired entries are swept
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(120),
            sweep_interval: Duration::from_secs(5),
        }
    }
}

/// Request and table limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum request body size in bytes
    pub max_body_bytes: usize,
    /// Maximum correlation key length
    pub max_key_len: usize,
    /// Maximum pending requests (0 = unbounded)
    pub max_pending: usize,
    /// Maximum history entries per request (0 = unbounded)
    pub max_history: usize,
    /// Mint a key when the caller supplies none
    pub generate_missing_keys: bool,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 1024 * 1024, // 1 MB
            max_key_len: MAX_KEY_LEN,
            max_pending: 0,
            max_history: 0,
            generate_missing_keys: false,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Enable CORS
    pub enabled: bool,
    /// Allowed origins ("*" for all)
    pub allowed_origins: Vec<String>,
    /// Max age for preflight cache, seconds
    pub max_age: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            max_age: 86400, // 24 hours
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("target node is not configured")]
    MissingTargetNode,
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Duration as "30s", "500ms", "2m" or plain seconds
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        // "ms" before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| "invalid minutes")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
