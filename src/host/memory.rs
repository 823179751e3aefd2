//! In-process hosting core.
//!
//! Implements the [`LogosCore`] contract without any native library: plugins
//! are names, methods are Rust closures, and results are delivered from a
//! background thread the way the real core delivers them from its event loop.

use crate::core::Result;
use crate::host::{ffi, LogosCore, MethodCallback};
use crate::paths;
use crate::reflection::DESCRIBE_METHOD;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Handler backing one plugin method.
pub type MethodHandler = Arc<dyn Fn(&Value) -> std::result::Result<Value, String> + Send + Sync>;

/// A call observed by the in-memory core.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedCall {
    /// Target plugin
    pub plugin: String,
    /// Method name
    pub method: String,
    /// Raw JSON arguments
    pub args: String,
}

#[derive(Default)]
struct CoreState {
    init_args: Option<Vec<String>>,
    started: bool,
    cleaned_up: bool,
    plugins_dir: Option<PathBuf>,
    known: Vec<String>,
    loaded: Vec<String>,
    calls: Vec<RecordedCall>,
}

/// [`LogosCore`] implementation living entirely in this process.
pub struct InMemoryCore {
    state: Mutex<CoreState>,
    handlers: HashMap<(String, String), MethodHandler>,
    unloadable: HashSet<String>,
    exit_code: i32,
}

impl InMemoryCore {
    /// Create an empty core.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CoreState::default()),
            handlers: HashMap::new(),
            unloadable: HashSet::new(),
            exit_code: 0,
        }
    }

    /// Core preloaded with the stock Logos modules, used for simulated runs.
    pub fn simulated() -> Self {
        Self::new()
            .with_known_plugin("package_manager")
            .with_known_plugin("capability_module")
            .with_known_plugin("waku_module")
            .with_handler("package_manager", "getPackages", |_| {
                Ok(json!([
                    { "name": "waku_module", "installed": true },
                    { "name": "chat", "installed": false }
                ]))
            })
            .with_handler("capability_module", "requestModule", |args| {
                Ok(json!({ "granted": true, "request": args }))
            })
            .with_handler("waku_module", "initWaku", |args| {
                if args.is_null() {
                    Err("missing node configuration".to_string())
                } else {
                    Ok(json!(true))
                }
            })
            .with_handler("waku_module", "relaySubscribe", |args| {
                Ok(json!({ "subscribed": args }))
            })
            .with_handler("waku_module", "relayPublish", |_| {
                Ok(json!("0x5f1c0b6f2a9d4e37"))
            })
    }

    /// Make a plugin known without processing a library for it.
    pub fn with_known_plugin(self, name: &str) -> Self {
        self.lock().add_known(name);
        self
    }

    /// Register the handler for `plugin.method`.
    pub fn with_handler<F>(mut self, plugin: &str, method: &str, handler: F) -> Self
    where
        F: Fn(&Value) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        self.handlers
            .insert((plugin.to_string(), method.to_string()), Arc::new(handler));
        self
    }

    /// Make `load_plugin` fail for `name` even when it is known.
    pub fn with_unloadable(mut self, name: &str) -> Self {
        self.unloadable.insert(name.to_string());
        self
    }

    /// Exit code returned from `exec`.
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    /// Every method call issued so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// Arguments passed to `init`, if it was called.
    pub fn init_args(&self) -> Option<Vec<String>> {
        self.lock().init_args.clone()
    }

    /// Directory passed to `set_plugins_dir`.
    pub fn plugins_dir(&self) -> Option<PathBuf> {
        self.lock().plugins_dir.clone()
    }

    pub fn is_started(&self) -> bool {
        self.lock().started
    }

    pub fn is_cleaned_up(&self) -> bool {
        self.lock().cleaned_up
    }

    fn lock(&self) -> MutexGuard<'_, CoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn describe(&self, plugin: &str) -> Value {
        let mut methods: Vec<&str> = self
            .handlers
            .keys()
            .filter(|(p, _)| p == plugin)
            .map(|(_, m)| m.as_str())
            .collect();
        methods.sort_unstable();

        let methods: Vec<Value> = methods
            .into_iter()
            .map(|name| {
                json!({
                    "name": name,
                    "signature": format!("{name}(QVariantList)"),
                    "returnType": "QVariant",
                    "isInvokable": true,
                    "parameters": [ { "name": "args", "type": "QVariantList" } ]
                })
            })
            .collect();

        json!({ "methods": methods, "properties": [], "enums": [] })
    }

    fn dispatch(&self, plugin: &str, method: &str, json_args: &str) -> (bool, String) {
        if !self.lock().loaded.iter().any(|p| p == plugin) {
            return (false, format!("Plugin not loaded: {plugin}"));
        }

        let args: Value = match serde_json::from_str(json_args) {
            Ok(args) => args,
            Err(e) => return (false, format!("Invalid JSON arguments: {e}")),
        };

        match self.handlers.get(&(plugin.to_string(), method.to_string())) {
            Some(handler) => match handler(&args) {
                Ok(value) => (true, value.to_string()),
                Err(message) => (false, message),
            },
            None if method == DESCRIBE_METHOD => (true, self.describe(plugin).to_string()),
            None => (false, format!("Method not found: {plugin}.{method}")),
        }
    }
}

impl CoreState {
    fn add_known(&mut self, name: &str) {
        if !self.known.iter().any(|k| k == name) {
            self.known.push(name.to_string());
        }
    }
}

impl Default for InMemoryCore {
    fn default() -> Self {
        Self::new()
    }
}

impl LogosCore for InMemoryCore {
    fn init(&self, args: &[String]) -> Result<()> {
        self.lock().init_args = Some(args.to_vec());
        Ok(())
    }

    fn set_plugins_dir(&self, dir: &Path) -> Result<()> {
        self.lock().plugins_dir = Some(dir.to_path_buf());
        Ok(())
    }

    fn start(&self) {
        let mut state = self.lock();
        state.started = true;

        let Some(dir) = state.plugins_dir.clone() else {
            return;
        };
        let Ok(entries) = std::fs::read_dir(&dir) else {
            debug!("Plugins directory {} is not readable", dir.display());
            return;
        };

        let mut discovered: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension().and_then(|e| e.to_str()) == Some(paths::PLUGIN_EXTENSION)
            })
            .filter_map(|path| paths::plugin_name_from_path(&path))
            .collect();
        discovered.sort();

        for name in discovered {
            debug!("Discovered plugin {name}");
            state.add_known(&name);
        }
    }

    fn exec(&self) -> i32 {
        self.exit_code
    }

    fn cleanup(&self) {
        let mut state = self.lock();
        state.loaded.clear();
        state.cleaned_up = true;
    }

    fn loaded_plugins(&self) -> Vec<String> {
        self.lock().loaded.clone()
    }

    fn known_plugins(&self) -> Vec<String> {
        self.lock().known.clone()
    }

    fn load_plugin(&self, name: &str) -> Result<bool> {
        ffi::to_c_string(name)?;
        let mut state = self.lock();
        if self.unloadable.contains(name) || !state.known.iter().any(|k| k == name) {
            return Ok(false);
        }
        if !state.loaded.iter().any(|l| l == name) {
            state.loaded.push(name.to_string());
        }
        Ok(true)
    }

    /// Known plugins are accepted by name; unknown ones need a library file.
    fn process_plugin(&self, path: &Path) -> Result<Option<String>> {
        ffi::to_c_string(&path.to_string_lossy())?;
        let Some(name) = paths::plugin_name_from_path(path) else {
            return Ok(None);
        };

        let mut state = self.lock();
        if state.known.iter().any(|k| *k == name) {
            return Ok(Some(name));
        }
        if path.is_file() {
            state.add_known(&name);
            return Ok(Some(name));
        }
        Ok(None)
    }

    fn call_plugin_method_async(
        &self,
        plugin: &str,
        method: &str,
        json_args: &str,
        callback: MethodCallback,
    ) -> Result<()> {
        // Same string contract as the native core.
        for value in [plugin, method, json_args] {
            ffi::to_c_string(value)?;
        }

        self.lock().calls.push(RecordedCall {
            plugin: plugin.to_string(),
            method: method.to_string(),
            args: json_args.to_string(),
        });

        let (success, message) = self.dispatch(plugin, method, json_args);
        std::thread::spawn(move || callback(success, message));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn call(core: &InMemoryCore, plugin: &str, method: &str, args: &str) -> (bool, String) {
        let (tx, rx) = mpsc::channel();
        core.call_plugin_method_async(
            plugin,
            method,
            args,
            Box::new(move |ok, msg| {
                let _ = tx.send((ok, msg));
            }),
        )
        .unwrap();
        rx.recv().unwrap()
    }

    #[test]
    fn test_load_requires_known_plugin() {
        let core = InMemoryCore::new().with_known_plugin("package_manager");

        assert!(core.load_plugin("package_manager").unwrap());
        assert!(!core.load_plugin("capability_module").unwrap());
        assert_eq!(core.loaded_plugins(), vec!["package_manager"]);
    }

    #[test]
    fn test_load_is_idempotent() {
        let core = InMemoryCore::new().with_known_plugin("package_manager");
        core.load_plugin("package_manager").unwrap();
        core.load_plugin("package_manager").unwrap();
        assert_eq!(core.loaded_plugins().len(), 1);
    }

    #[test]
    fn test_unloadable_plugin() {
        let core = InMemoryCore::new()
            .with_known_plugin("capability_module")
            .with_unloadable("capability_module");
        assert!(!core.load_plugin("capability_module").unwrap());
        assert!(core.loaded_plugins().is_empty());
    }

    #[test]
    fn test_process_plugin_registers_library() {
        let dir = tempfile::tempdir().unwrap();
        let path = paths::plugin_library_path(dir.path(), "capability_module");
        std::fs::write(&path, b"").unwrap();

        let core = InMemoryCore::new();
        assert_eq!(
            core.process_plugin(&path).unwrap(),
            Some("capability_module".to_string())
        );
        assert_eq!(core.known_plugins(), vec!["capability_module"]);
        assert_eq!(
            core.process_plugin(&dir.path().join("readme.txt")).unwrap(),
            None
        );
    }

    #[test]
    fn test_process_plugin_missing_library() {
        let core = InMemoryCore::new().with_known_plugin("package_manager");

        let known = paths::plugin_library_path(Path::new("/nonexistent"), "package_manager");
        let unknown = paths::plugin_library_path(Path::new("/nonexistent"), "waku_module");

        assert_eq!(
            core.process_plugin(&known).unwrap(),
            Some("package_manager".to_string())
        );
        assert_eq!(core.process_plugin(&unknown).unwrap(), None);
        assert_eq!(core.known_plugins(), vec!["package_manager"]);
    }

    #[test]
    fn test_start_discovers_plugins_dir() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["waku_module", "package_manager"] {
            std::fs::write(paths::plugin_library_path(dir.path(), name), b"").unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let core = InMemoryCore::new();
        core.set_plugins_dir(dir.path()).unwrap();
        core.start();

        assert!(core.is_started());
        assert_eq!(core.known_plugins(), vec!["package_manager", "waku_module"]);
    }

    #[test]
    fn test_call_on_unloaded_plugin_fails() {
        let core = InMemoryCore::simulated();
        let (ok, msg) = call(&core, "waku_module", "relayPublish", "[]");
        assert!(!ok);
        assert_eq!(msg, "Plugin not loaded: waku_module");
    }

    #[test]
    fn test_call_dispatches_to_handler() {
        let core = InMemoryCore::simulated();
        core.load_plugin("waku_module").unwrap();

        let (ok, msg) = call(
            &core,
            "waku_module",
            "relaySubscribe",
            r#"["/waku/2/rs/16/32"]"#,
        );
        assert!(ok);
        assert_eq!(
            serde_json::from_str::<Value>(&msg).unwrap(),
            json!({ "subscribed": ["/waku/2/rs/16/32"] })
        );

        let (ok, msg) = call(&core, "waku_module", "initWaku", "null");
        assert!(!ok);
        assert_eq!(msg, "missing node configuration");

        assert_eq!(core.calls().len(), 2);
        assert_eq!(core.calls()[0].method, "relaySubscribe");
    }

    #[test]
    fn test_call_with_invalid_json() {
        let core = InMemoryCore::simulated();
        core.load_plugin("waku_module").unwrap();
        let (ok, msg) = call(&core, "waku_module", "relayPublish", "{not json");
        assert!(!ok);
        assert!(msg.starts_with("Invalid JSON arguments"));
    }

    #[test]
    fn test_describe_lists_registered_methods() {
        let core = InMemoryCore::simulated();
        core.load_plugin("waku_module").unwrap();

        let (ok, msg) = call(&core, "waku_module", DESCRIBE_METHOD, "[]");
        assert!(ok);
        let doc: Value = serde_json::from_str(&msg).unwrap();
        let names: Vec<&str> = doc["methods"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["initWaku", "relayPublish", "relaySubscribe"]);
    }

    #[test]
    fn test_lifecycle_flags() {
        let core = InMemoryCore::simulated().with_exit_code(3);
        core.init(&[]).unwrap();
        core.load_plugin("package_manager").unwrap();

        assert_eq!(core.init_args(), Some(Vec::new()));
        assert_eq!(core.exec(), 3);

        core.cleanup();
        assert!(core.is_cleaned_up());
        assert!(core.loaded_plugins().is_empty());
    }
}
