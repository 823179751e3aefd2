//! Hosting core interface.
//!
//! The plugin-hosting core is an external component; this module defines the
//! contract the harness consumes from it and provides two implementations:
//! - [`DynamicCore`]: the real `liblogos_core` shared library
//! - [`InMemoryCore`]: an in-process core for tests and simulated runs

pub mod dynamic;
pub mod ffi;
pub mod memory;

pub use dynamic::DynamicCore;
pub use ffi::MethodCallback;
pub use memory::{InMemoryCore, RecordedCall};

use crate::core::{now, CallId, CallOutcome, Error, Result, Timestamp};
use std::path::Path;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Operations exposed by the plugin-hosting core.
pub trait LogosCore: Send + Sync {
    /// Initialize the core. Must be called first.
    fn init(&self, args: &[String]) -> Result<()>;

    /// Set the directory the core discovers plugins in.
    fn set_plugins_dir(&self, dir: &Path) -> Result<()>;

    /// Start the core; discovers and processes plugins.
    fn start(&self);

    /// Run the core's event loop until it quits. Returns the exit code.
    ///
    /// Must run on the thread that called [`LogosCore::init`].
    fn exec(&self) -> i32;

    /// Release everything the core holds.
    fn cleanup(&self);

    /// Names of plugins currently loaded.
    fn loaded_plugins(&self) -> Vec<String>;

    /// Names of plugins the core knows about.
    fn known_plugins(&self) -> Vec<String>;

    /// Request that a known plugin be loaded.
    fn load_plugin(&self, name: &str) -> Result<bool>;

    /// Register the plugin library at `path`. Returns the plugin name.
    fn process_plugin(&self, path: &Path) -> Result<Option<String>>;

    /// Fire-and-forget method call; `callback` receives the result.
    fn call_plugin_method_async(
        &self,
        plugin: &str,
        method: &str,
        json_args: &str,
        callback: MethodCallback,
    ) -> Result<()>;
}

/// An issued call whose callback has not been awaited yet.
pub struct PendingCall {
    pub id: CallId,
    pub plugin: String,
    pub method: String,
    issued_at: Timestamp,
    receiver: oneshot::Receiver<(bool, String, Timestamp)>,
}

impl PendingCall {
    /// Wait for the core to deliver the result.
    pub async fn wait(self) -> Result<CallOutcome> {
        let (success, message, completed_at) =
            self.receiver.await.map_err(|_| Error::CallbackDropped {
                plugin: self.plugin.clone(),
                method: self.method.clone(),
            })?;

        let outcome = CallOutcome {
            id: self.id,
            plugin: self.plugin,
            method: self.method,
            success,
            message,
            issued_at: self.issued_at,
            completed_at,
        };

        if outcome.success {
            debug!(
                call_id = %outcome.id,
                latency_ms = outcome.latency_ms(),
                "Plugin call completed"
            );
        } else {
            warn!(
                call_id = %outcome.id,
                "Plugin call {}.{} failed: {}",
                outcome.plugin,
                outcome.method,
                outcome.message
            );
        }
        Ok(outcome)
    }
}

/// Issue an asynchronous method call on the current thread.
///
/// The result is collected later through [`PendingCall::wait`].
pub fn dispatch(
    core: &dyn LogosCore,
    plugin: &str,
    method: &str,
    args: &serde_json::Value,
) -> Result<PendingCall> {
    let id = CallId::new();
    let json_args = serde_json::to_string(args)?;
    let (tx, receiver) = oneshot::channel();

    debug!(call_id = %id, plugin, method, args = %json_args, "Dispatching plugin call");

    let issued_at = now();
    core.call_plugin_method_async(
        plugin,
        method,
        &json_args,
        Box::new(move |success, message| {
            // Receiver is gone when the caller timed out.
            let _ = tx.send((success, message, now()));
        }),
    )?;

    Ok(PendingCall {
        id,
        plugin: plugin.to_string(),
        method: method.to_string(),
        issued_at,
        receiver,
    })
}

/// Issue an asynchronous method call and wait for its callback.
pub async fn call_method(
    core: &dyn LogosCore,
    plugin: &str,
    method: &str,
    args: &serde_json::Value,
) -> Result<CallOutcome> {
    dispatch(core, plugin, method, args)?.wait().await
}
