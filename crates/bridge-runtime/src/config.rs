//! # Environment Configuration
//!
//! The bridge reads its settings from the process environment. Every
//! variable is optional except the target node; unparsable values are
//! logged and the default is kept.
//!
//! | Variable                        | Fallback       | Field                     |
//! |---------------------------------|----------------|---------------------------|
//! | `BRIDGE_HTTP_HOST`              |                | `http.host`               |
//! | `BRIDGE_HTTP_PORT`              | `APP_PORT`     | `http.port`               |
//! | `BRIDGE_PROMPT_PATH`            |                | `http.prompt_path`        |
//! | `BRIDGE_TARGET_NODE`            | `AIXPAND_NODE` | `target.node`             |
//! | `BRIDGE_PIPELINE_NAME`          |                | `target.pipeline`         |
//! | `BRIDGE_INSTANCE_NAME`          |                | `target.instance`         |
//! | `BRIDGE_REQUEST_TIMEOUT_SECS`   |                | `timeouts.request`        |
//! | `BRIDGE_MAX_PENDING`            |                | `limits.max_pending`      |
//! | `BRIDGE_MAX_BODY_BYTES`         |                | `limits.max_body_bytes`   |
//! | `BRIDGE_GENERATE_MISSING_KEYS`  |                | `limits.generate_missing_keys` |

use std::str::FromStr;
use std::time::Duration;

use prompt_bridge::domain::config::ConfigError;
use prompt_bridge::BridgeConfig;
use shared_types::entities::NodeId;
use tracing::warn;

/// Configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("{0}")]
    Invalid(#[from] ConfigError),
}

/// Load and validate configuration from the process environment.
pub fn load_config() -> Result<BridgeConfig, LoadError> {
    load_config_from(|name| std::env::var(name).ok())
}

/// Load and validate configuration through an arbitrary variable lookup.
pub fn load_config_from<F>(lookup: F) -> Result<BridgeConfig, LoadError>
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };
    let mut config = BridgeConfig::default();

    if let Some(host) = env.parsed("BRIDGE_HTTP_HOST") {
        config.http.host = host;
    }
    if let Some(port) = env.parsed_any(&["BRIDGE_HTTP_PORT", "APP_PORT"]) {
        config.http.port = port;
    }
    if let Some(path) = env.string("BRIDGE_PROMPT_PATH") {
        config.http.prompt_path = path;
    }

    if let Some(node) = env.string_any(&["BRIDGE_TARGET_NODE", "AIXPAND_NODE"]) {
        config.target.node = NodeId::new(node);
    }
    if let Some(pipeline) = env.string("BRIDGE_PIPELINE_NAME") {
        config.target.pipeline = pipeline;
    }
    if let Some(instance) = env.string("BRIDGE_INSTANCE_NAME") {
        config.target.instance = instance;
    }

    if let Some(secs) = env.parsed::<u64>("BRIDGE_REQUEST_TIMEOUT_SECS") {
        config.timeouts.request = Duration::from_secs(secs);
    }
    if let Some(max) = env.parsed("BRIDGE_MAX_PENDING") {
        config.limits.max_pending = max;
    }
    if let Some(bytes) = env.parsed("BRIDGE_MAX_BODY_BYTES") {
        config.limits.max_body_bytes = bytes;
    }
    if let Some(generate) = env.parsed("BRIDGE_GENERATE_MISSING_KEYS") {
        config.limits.generate_missing_keys = generate;
    }

    config.validate()?;
    Ok(config)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Non-empty, trimmed value.
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string_any(&self, names: &[&str]) -> Option<String> {
        names.iter().find_map(|name| self.string(name))
    }

    fn parsed<T: FromStr>(&self, name: &str) -> Option<T> {
        let raw = self.string(name)?;
        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(variable = name, value = %raw, "Ignoring unparsable environment value");
                None
            }
        }
    }

    /// First variable that is set wins, even if it fails to parse.
    fn parsed_any<T: FromStr>(&self, names: &[&str]) -> Option<T> {
        let name = names.iter().find(|name| self.string(name).is_some())?;
        self.parsed(name)
    }
}
