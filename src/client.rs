//! Plugin-side client for synchronous remote calls.
//!
//! The harness talks to a module through a [`PluginClient`] when it needs an
//! answer before moving on, such as the messaging module's initialization.

use crate::core::{Error, Result};
use crate::host::{call_method, LogosCore};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Client for invoking methods on hosted plugins.
///
/// Waiting on a result before `exec` assumes the core delivers callbacks
/// while its event loop is not running yet.
#[async_trait]
pub trait PluginClient: Send + Sync {
    /// Whether `plugin` is reachable.
    async fn is_connected(&self, plugin: &str) -> bool;

    /// Invoke `plugin.method` and wait for its result.
    async fn invoke_remote_method(&self, plugin: &str, method: &str, args: Value) -> Result<Value>;
}

/// [`PluginClient`] that routes through the hosting core.
pub struct CoreClient {
    core: Arc<dyn LogosCore>,
    timeout: Duration,
}

impl CoreClient {
    /// Create a client with the given per-call timeout.
    pub fn new(core: Arc<dyn LogosCore>, timeout: Duration) -> Self {
        Self { core, timeout }
    }

    /// Per-call timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl PluginClient for CoreClient {
    async fn is_connected(&self, plugin: &str) -> bool {
        self.core.loaded_plugins().iter().any(|p| p == plugin)
    }

    async fn invoke_remote_method(&self, plugin: &str, method: &str, args: Value) -> Result<Value> {
        if !self.is_connected(plugin).await {
            return Err(Error::PluginNotConnected(plugin.to_string()));
        }

        debug!("Invoking {plugin}.{method}");
        let call = call_method(self.core.as_ref(), plugin, method, &args);
        let outcome = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| Error::Timeout {
                plugin: plugin.to_string(),
                method: method.to_string(),
                millis: self.timeout.as_millis() as u64,
            })??;

        if !outcome.success {
            return Err(Error::RemoteCallFailed {
                plugin: plugin.to_string(),
                method: method.to_string(),
                message: outcome.message,
            });
        }

        info!("{plugin}.{method} returned in {}ms", outcome.latency_ms());
        Ok(outcome.payload())
    }
}
