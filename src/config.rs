//! Harness configuration.
//!
//! Built-in defaults, optionally overlaid by a JSON file, then by
//! command-line flags.

use crate::core::{Error, Result};
use crate::logging::LoggingConfig;
use crate::paths;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Plugins loaded by default, in order.
pub const DEFAULT_PLUGINS: &[&str] = &["package_manager", "capability_module"];

/// Pubsub topic used by the default messaging calls.
pub const DEFAULT_PUBSUB_TOPIC: &str = "/waku/2/rs/16/32";

/// One asynchronous call issued after the messaging module is initialized.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MethodCallSpec {
    /// Method name
    pub method: String,
    /// JSON arguments
    #[serde(default)]
    pub args: Value,
}

impl MethodCallSpec {
    pub fn new(method: &str, args: Value) -> Self {
        Self {
            method: method.to_string(),
            args,
        }
    }
}

/// Messaging module step configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Run the messaging step
    pub enabled: bool,
    /// Module name
    pub module: String,
    /// Method that configures and starts the module
    pub init_method: String,
    /// Arguments for `init_method`
    pub init_args: Value,
    /// Calls issued after initialization
    pub calls: Vec<MethodCallSpec>,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            module: "waku_module".to_string(),
            init_method: "initWaku".to_string(),
            init_args: json!({
                "host": "0.0.0.0",
                "tcpPort": 60000,
                "clusterId": 16,
                "shards": [32],
                "relay": true
            }),
            calls: vec![
                MethodCallSpec::new("relaySubscribe", json!([DEFAULT_PUBSUB_TOPIC])),
                MethodCallSpec::new(
                    "relayPublish",
                    json!([DEFAULT_PUBSUB_TOPIC, "Hello from logos-test"]),
                ),
            ],
        }
    }
}

/// Top-level harness configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Plugins directory; derived from the executable when unset
    pub plugins_dir: Option<PathBuf>,
    /// Core shared library; `LOGOS_CORE_LIB` or derived from the executable when unset
    pub core_library: Option<PathBuf>,
    /// Plugins to process and load, in order
    pub plugins: Vec<String>,
    /// Pause after loading plugins
    pub settle_delay_ms: u64,
    /// Timeout for calls that wait on a result
    pub call_timeout_ms: u64,
    /// Print method reports for loaded plugins
    pub introspect: bool,
    pub messaging: MessagingConfig,
    pub logging: LoggingConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            plugins_dir: None,
            core_library: None,
            plugins: DEFAULT_PLUGINS.iter().map(|p| p.to_string()).collect(),
            settle_delay_ms: 10_000,
            call_timeout_ms: 30_000,
            introspect: true,
            messaging: MessagingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Parse a configuration document. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::InvalidConfig(format!("Malformed configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        for name in &self.plugins {
            validate_plugin_name(name)?;
        }
        if self.messaging.enabled {
            validate_plugin_name(&self.messaging.module)?;
            if self.messaging.init_method.is_empty() {
                return Err(Error::InvalidConfig(
                    "messaging.init_method is empty".to_string(),
                ));
            }
        }
        if self.call_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "call_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Effective plugins directory, cleaned.
    pub fn resolve_plugins_dir(&self, exe_path: &Path) -> PathBuf {
        match &self.plugins_dir {
            Some(dir) => paths::clean_path(dir),
            None => paths::default_plugins_dir(exe_path),
        }
    }

    /// Effective core library path. `env_override` is the value of `LOGOS_CORE_LIB`.
    pub fn resolve_core_library(&self, exe_path: &Path, env_override: Option<PathBuf>) -> PathBuf {
        self.core_library
            .clone()
            .or(env_override)
            .map(|p| paths::clean_path(&p))
            .unwrap_or_else(|| paths::default_core_library(exe_path))
    }
}

fn validate_plugin_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidConfig("plugin name is empty".to_string()));
    }
    if name.contains(['/', '\\']) || name.contains('\0') {
        return Err(Error::InvalidConfig(format!(
            "plugin name {name:?} must not contain path separators"
        )));
    }
    Ok(())
}
