//! The test script run against the hosting core.
//!
//! Initializes the core, loads the configured plugins, reports what they
//! expose, talks to the messaging module, then hands control to the core's
//! event loop. Report lines go to stdout; diagnostics go through `tracing`.

use crate::client::{CoreClient, PluginClient};
use crate::config::{HarnessConfig, MethodCallSpec};
use crate::core::{CallOutcome, Result};
use crate::host::{self, LogosCore, PendingCall};
use crate::paths;
use crate::reflection::{self, PluginIntrospection};
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// How long to keep collecting async results once the event loop returns.
pub const RESULT_GRACE: Duration = Duration::from_secs(2);

/// Outcome of processing and loading one plugin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadReport {
    /// Plugin name
    pub name: String,
    /// Library path handed to the core
    pub path: PathBuf,
    /// Name the core reported when processing the library
    pub processed: Option<String>,
    /// Whether the load request succeeded
    pub loaded: bool,
}

/// Outcome of the messaging step.
#[derive(Clone, Debug, Default)]
pub struct MessagingReport {
    /// Messaging module name
    pub module: String,
    /// Module was connected when the step ran
    pub connected: bool,
    /// Result of the initialization call
    pub init_result: Option<Value>,
    /// Why the initialization call failed
    pub init_error: Option<String>,
    /// Async call results, in completion order
    pub outcomes: Vec<CallOutcome>,
    /// Calls that could not be issued or timed out
    pub failures: Vec<String>,
    /// Calls still unanswered when collection stopped
    pub pending: usize,
}

/// Everything that happened during a run.
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    /// Plugins the core knew about after starting
    pub known: Vec<String>,
    /// Every load attempt, configured plugins first
    pub loads: Vec<LoadReport>,
    /// Plugins loaded once all load attempts were made
    pub loaded: Vec<String>,
    /// Method reports, one per plugin that answered
    pub introspections: Vec<PluginIntrospection>,
    /// Messaging step outcome, when the step is enabled
    pub messaging: Option<MessagingReport>,
    /// Exit code returned by the event loop
    pub exit_code: i32,
}

type CallResult = std::result::Result<CallOutcome, String>;

/// Async calls issued before the event loop, collected while it runs.
struct InFlight {
    expected: usize,
    results: mpsc::UnboundedReceiver<CallResult>,
}

/// Drives the hosting core through the test script.
pub struct Harness {
    core: Arc<dyn LogosCore>,
    client: CoreClient,
    config: HarnessConfig,
    plugins_dir: PathBuf,
}

impl Harness {
    /// Create a harness over `core`. `plugins_dir` must already be resolved.
    pub fn new(core: Arc<dyn LogosCore>, config: HarnessConfig, plugins_dir: PathBuf) -> Self {
        let client = CoreClient::new(core.clone(), config.call_timeout());
        Self {
            core,
            client,
            config,
            plugins_dir,
        }
    }

    /// Run the full script. Cleans up the core once it has been initialized,
    /// whatever the outcome.
    pub async fn run(&self) -> Result<RunSummary> {
        println!("=== Logos Test Example ===");

        self.core.init(&[])?;
        println!("Logos Core initialized");

        let result = self.run_initialized().await;

        println!("\nCleaning up...");
        self.core.cleanup();
        info!("Core cleaned up");
        result
    }

    async fn run_initialized(&self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        println!(
            "Setting plugins directory to: {}",
            self.plugins_dir.display()
        );
        self.core.set_plugins_dir(&self.plugins_dir)?;

        self.core.start();
        println!("Logos Core started successfully!");

        summary.known = self.core.known_plugins();
        println!("\n=== Known Plugins ===");
        print_plugin_list(&summary.known, "No plugins found.", "Found");

        println!("\n=== Loading Plugins ===");
        for name in &self.config.plugins {
            summary.loads.push(self.load_plugin(name)?);
        }

        summary.loaded = self.core.loaded_plugins();
        println!("\n=== Loaded Plugins ===");
        print_plugin_list(&summary.loaded, "No plugins loaded.", "Currently loaded");

        if self.config.introspect {
            summary.introspections = self.introspect_loaded(&summary.loaded).await;
        }

        let settle = self.config.settle_delay();
        if !settle.is_zero() {
            info!("Waiting {}ms for plugins to settle", settle.as_millis());
            tokio::time::sleep(settle).await;
        }

        let mut in_flight = None;
        if self.config.messaging.enabled {
            in_flight = self.run_messaging(&mut summary).await?;
        }

        println!("\n=== Running Event Loop ===");
        println!("Press Ctrl+C to exit...");

        // The event loop must own the thread that initialized the core.
        summary.exit_code = self.core.exec();
        info!("Event loop exited with code {}", summary.exit_code);

        if let (Some(in_flight), Some(report)) = (in_flight, summary.messaging.as_mut()) {
            collect_results(in_flight, report, RESULT_GRACE).await;
        }

        Ok(summary)
    }

    fn load_plugin(&self, name: &str) -> Result<LoadReport> {
        let path = paths::plugin_library_path(&self.plugins_dir, name);
        println!("Processing {name} plugin from: {}", path.display());

        let processed = self.core.process_plugin(&path)?;
        match &processed {
            Some(reported) => debug!("Core processed {} as {reported}", path.display()),
            None => warn!("Core could not process {}", path.display()),
        }

        let loaded = self.core.load_plugin(name)?;
        if loaded {
            println!("✓ {name} plugin loaded successfully");
        } else {
            println!("✗ Failed to load {name} plugin");
        }

        Ok(LoadReport {
            name: name.to_string(),
            path,
            processed,
            loaded,
        })
    }

    async fn introspect_loaded(&self, loaded: &[String]) -> Vec<PluginIntrospection> {
        println!("\n=== Plugin Methods ===");
        let mut reports = Vec::new();
        for plugin in loaded {
            match reflection::introspect(&self.client, plugin).await {
                Ok(info) => {
                    print!("{}", info.render());
                    reports.push(info);
                }
                Err(e) => warn!("Could not introspect {plugin}: {e}"),
            }
        }
        reports
    }

    /// Records its report in `summary`. Loading the module on demand adds a
    /// load report and refreshes `summary.loaded`.
    async fn run_messaging(&self, summary: &mut RunSummary) -> Result<Option<InFlight>> {
        let messaging = &self.config.messaging;
        let module = messaging.module.as_str();
        let report = summary.messaging.insert(MessagingReport {
            module: module.to_string(),
            ..Default::default()
        });

        println!("\n=== Messaging ===");
        if !self.client.is_connected(module).await {
            info!("{module} is not loaded yet; loading it");
            summary.loads.push(self.load_plugin(module)?);
            summary.loaded = self.core.loaded_plugins();
        }
        report.connected = self.client.is_connected(module).await;
        if !report.connected {
            warn!("{module} is not connected; skipping messaging");
            return Ok(None);
        }

        let init = self
            .client
            .invoke_remote_method(module, &messaging.init_method, messaging.init_args.clone())
            .await;
        match init {
            Ok(value) => {
                println!("✓ {module}.{} returned: {value}", messaging.init_method);
                report.init_result = Some(value);
            }
            Err(e) => {
                println!("✗ {module}.{} failed: {e}", messaging.init_method);
                report.init_error = Some(e.to_string());
                return Ok(None);
            }
        }

        let mut pending = Vec::new();
        for MethodCallSpec { method, args } in &messaging.calls {
            match host::dispatch(self.core.as_ref(), module, method, args) {
                Ok(call) => {
                    println!("Called {module}.{method} asynchronously");
                    pending.push(call);
                }
                Err(e) => {
                    warn!("Could not call {module}.{method}: {e}");
                    report.failures.push(format!("{method}: {e}"));
                }
            }
        }

        Ok(Some(self.spawn_collector(pending)))
    }

    /// Print async results as they arrive, on a runtime task.
    fn spawn_collector(&self, calls: Vec<PendingCall>) -> InFlight {
        let (tx, results) = mpsc::unbounded_channel();
        let expected = calls.len();
        let timeout = self.client.timeout();

        tokio::spawn(async move {
            let mut waiting: FuturesUnordered<_> = calls
                .into_iter()
                .map(|call| async move {
                    let label = format!("{}.{}", call.plugin, call.method);
                    match tokio::time::timeout(timeout, call.wait()).await {
                        Ok(Ok(outcome)) => Ok(outcome),
                        Ok(Err(e)) => Err(format!("{label}: {e}")),
                        Err(_) => Err(format!(
                            "{label}: timed out after {}ms",
                            timeout.as_millis()
                        )),
                    }
                })
                .collect();

            while let Some(result) = waiting.next().await {
                match &result {
                    Ok(outcome) => println!("Async call result: {outcome}"),
                    Err(e) => println!("Async call error: {e}"),
                }
                if tx.send(result).is_err() {
                    break;
                }
            }
        });

        InFlight { expected, results }
    }
}

async fn collect_results(mut in_flight: InFlight, report: &mut MessagingReport, grace: Duration) {
    let deadline = Instant::now() + grace;
    let mut received = 0;

    while received < in_flight.expected {
        match tokio::time::timeout_at(deadline, in_flight.results.recv()).await {
            Ok(Some(Ok(outcome))) => report.outcomes.push(outcome),
            Ok(Some(Err(e))) => report.failures.push(e),
            Ok(None) | Err(_) => break,
        }
        received += 1;
    }

    report.pending = in_flight.expected - received;
    if report.pending > 0 {
        warn!("{} async call(s) still unanswered", report.pending);
    }
}

fn print_plugin_list(plugins: &[String], empty: &str, label: &str) {
    if plugins.is_empty() {
        println!("{empty}");
        return;
    }
    println!("{label} {} plugin(s):", plugins.len());
    for plugin in plugins {
        println!("  - {plugin}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::InMemoryCore;
    use serde_json::json;

    fn quick_config() -> HarnessConfig {
        HarnessConfig {
            settle_delay_ms: 0,
            call_timeout_ms: 2_000,
            ..Default::default()
        }
    }

    fn harness(core: Arc<InMemoryCore>, config: HarnessConfig) -> Harness {
        Harness::new(core, config, PathBuf::from("/opt/logos/modules"))
    }

    #[tokio::test]
    async fn test_full_run_against_simulated_core() {
        let core = Arc::new(InMemoryCore::simulated().with_exit_code(7));
        let summary = harness(core.clone(), quick_config()).run().await.unwrap();

        assert_eq!(summary.exit_code, 7);
        assert_eq!(summary.loads.len(), 3);
        assert!(summary.loads.iter().all(|l| l.loaded));
        assert_eq!(
            summary.loads[0].processed.as_deref(),
            Some("package_manager")
        );
        assert_eq!(
            summary.loaded,
            vec!["package_manager", "capability_module", "waku_module"]
        );
        assert_eq!(summary.introspections.len(), 2);

        let messaging = summary.messaging.unwrap();
        assert!(messaging.connected);
        assert_eq!(messaging.init_result, Some(json!(true)));
        assert_eq!(messaging.outcomes.len(), 2);
        assert!(messaging.outcomes.iter().all(|o| o.success));
        assert_eq!(messaging.pending, 0);

        assert_eq!(core.plugins_dir(), Some(PathBuf::from("/opt/logos/modules")));
        assert!(core.is_started());
        assert!(core.is_cleaned_up());
    }

    #[tokio::test]
    async fn test_failed_load_does_not_abort() {
        let core = Arc::new(InMemoryCore::simulated().with_unloadable("package_manager"));
        let config = HarnessConfig {
            messaging: crate::config::MessagingConfig {
                enabled: false,
                ..Default::default()
            },
            ..quick_config()
        };

        let summary = harness(core.clone(), config).run().await.unwrap();

        assert!(!summary.loads[0].loaded);
        assert!(summary.loads[1].loaded);
        assert_eq!(summary.loaded, vec!["capability_module"]);
        assert!(summary.messaging.is_none());
        assert!(core.is_cleaned_up());
    }

    #[tokio::test]
    async fn test_messaging_skipped_when_module_missing() {
        let core = Arc::new(
            InMemoryCore::new()
                .with_known_plugin("package_manager")
                .with_known_plugin("capability_module"),
        );
        let config = HarnessConfig {
            introspect: false,
            ..quick_config()
        };

        let summary = harness(core.clone(), config).run().await.unwrap();

        let last = summary.loads.last().unwrap();
        assert_eq!(last.name, "waku_module");
        assert!(!last.loaded);
        assert_eq!(summary.loaded, vec!["package_manager", "capability_module"]);

        let messaging = summary.messaging.unwrap();
        assert!(!messaging.connected);
        assert!(messaging.init_result.is_none());
        assert!(core.calls().iter().all(|c| c.plugin != "waku_module"));
    }

    #[tokio::test]
    async fn test_messaging_module_loaded_on_demand() {
        let core = Arc::new(InMemoryCore::simulated());
        let config = HarnessConfig {
            introspect: false,
            plugins: vec!["package_manager".to_string()],
            ..quick_config()
        };

        let summary = harness(core.clone(), config).run().await.unwrap();

        let names: Vec<&str> = summary.loads.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["package_manager", "waku_module"]);
        assert_eq!(
            summary.loads[1].path,
            paths::plugin_library_path(&PathBuf::from("/opt/logos/modules"), "waku_module")
        );
        assert!(summary.loads[1].loaded);
        assert_eq!(summary.loaded, vec!["package_manager", "waku_module"]);
        assert!(summary.messaging.unwrap().connected);
    }

    #[tokio::test]
    async fn test_connected_module_is_not_reloaded() {
        let core = Arc::new(InMemoryCore::simulated());
        let config = HarnessConfig {
            introspect: false,
            plugins: vec!["waku_module".to_string()],
            ..quick_config()
        };

        let summary = harness(core, config).run().await.unwrap();

        assert_eq!(summary.loads.len(), 1);
        assert_eq!(summary.loaded, vec!["waku_module"]);
        assert_eq!(summary.messaging.unwrap().outcomes.len(), 2);
    }

    #[tokio::test]
    async fn test_init_failure_skips_calls() {
        let core = Arc::new(InMemoryCore::simulated());
        let mut config = quick_config();
        config.introspect = false;
        config.messaging.init_args = Value::Null;

        let summary = harness(core.clone(), config).run().await.unwrap();

        let messaging = summary.messaging.unwrap();
        assert!(messaging
            .init_error
            .as_deref()
            .unwrap()
            .contains("missing node configuration"));
        assert!(messaging.outcomes.is_empty());
        let methods: Vec<String> = core.calls().into_iter().map(|c| c.method).collect();
        assert_eq!(methods, vec!["initWaku"]);
    }

    #[tokio::test]
    async fn test_failed_async_call_is_reported() {
        let core = Arc::new(InMemoryCore::simulated());
        let mut config = quick_config();
        config.introspect = false;
        config.messaging.calls = vec![
            MethodCallSpec::new("relayPublish", json!(["/waku/2/rs/16/32", "hi"])),
            MethodCallSpec::new("filterSubscribe", json!([])),
        ];

        let summary = harness(core, config).run().await.unwrap();

        let messaging = summary.messaging.unwrap();
        assert_eq!(messaging.outcomes.len(), 2);
        let failed: Vec<&CallOutcome> = messaging.outcomes.iter().filter(|o| !o.success).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].method, "filterSubscribe");
    }

    #[tokio::test]
    async fn test_cleanup_runs_after_error() {
        let core = Arc::new(InMemoryCore::simulated());
        let config = HarnessConfig {
            plugins: vec!["bad\0name".to_string()],
            ..quick_config()
        };

        let result = harness(core.clone(), config).run().await;

        assert!(result.is_err());
        assert!(core.is_cleaned_up());
    }

    #[tokio::test]
    async fn test_collect_results_counts_pending() {
        let (tx, results) = mpsc::unbounded_channel::<CallResult>();
        tx.send(Err("waku_module.relayPublish: boom".to_string())).unwrap();

        let mut report = MessagingReport::default();
        let in_flight = InFlight {
            expected: 3,
            results,
        };
        collect_results(in_flight, &mut report, Duration::from_millis(20)).await;

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.pending, 2);
        drop(tx);
    }
}
